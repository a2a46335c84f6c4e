use serde::{Deserialize, Serialize};

/// Body returned by the user-information API on a rejected request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub error: String,
}

impl ApiErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }

    /// Extracts the server message from a raw response body, if it carries one.
    pub fn from_body(body: &str) -> Option<Self> {
        let parsed: Self = serde_json::from_str(body).ok()?;
        if parsed.error.trim().is_empty() {
            return None;
        }
        Some(parsed)
    }
}
