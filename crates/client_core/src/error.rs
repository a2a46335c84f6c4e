use thiserror::Error;

/// Failures reported by the transport, the cache and the flows built on them.
///
/// Validation failures are not represented here: they never leave the form
/// controller and surface as [`crate::form::SubmitOutcome::Invalid`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// Network failure or a non-2xx response. `message` carries the server's
    /// `error` string when the body had one.
    #[error("{message}")]
    Transport {
        status: Option<u16>,
        message: String,
    },
    /// A 404 for a single resource.
    #[error("{resource} not found")]
    NotFound {
        resource: String,
        message: Option<String>,
    },
    #[error("unexpected response body: {0}")]
    Decode(String),
    /// The background task driving a request was aborted before settling.
    #[error("request task aborted: {0}")]
    Aborted(String),
}

impl ClientError {
    pub fn transport(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Transport {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>, message: Option<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            message,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport { status, .. } => *status,
            Self::NotFound { .. } => Some(404),
            Self::Decode(_) | Self::Aborted(_) => None,
        }
    }

    /// Text suitable for a notification: the server message when there is one.
    pub fn user_message(&self) -> String {
        match self {
            Self::NotFound {
                message: Some(message),
                ..
            } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            return Self::Decode(value.to_string());
        }
        Self::Transport {
            status: value.status().map(|status| status.as_u16()),
            message: value.to_string(),
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(value: serde_json::Error) -> Self {
        Self::Decode(value.to_string())
    }
}
