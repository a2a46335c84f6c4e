use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use shared::error::ApiErrorBody;
use tracing::{debug, warn};
use url::Url;

use crate::error::ClientError;

/// HTTP collaborator used by the cache. Implementations reject non-2xx
/// responses, carrying the server's `error` message when the body has one.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, path: &str) -> Result<Value, ClientError>;
    async fn post(&self, path: &str, body: Value) -> Result<Value, ClientError>;
    async fn put(&self, path: &str, body: Value) -> Result<Value, ClientError>;
    async fn delete(&self, path: &str) -> Result<Value, ClientError>;
}

pub struct HttpTransport {
    http: Client,
    base_url: Url,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> Result<Self, url::ParseError> {
        Ok(Self::with_client(Client::new(), Url::parse(base_url)?))
    }

    pub fn with_client(http: Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Appends `path` to the base URL, keeping any path prefix the base has.
    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        let raw = format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Url::parse(&raw)
            .map_err(|err| ClientError::transport(None, format!("invalid request url '{raw}': {err}")))
    }

    async fn send(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, ClientError> {
        let url = self.endpoint(path)?;
        debug!(%method, %url, "sending request");

        let mut request = self.http.request(method.clone(), url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let server_message = ApiErrorBody::from_body(&text).map(|body| body.error);
            warn!(
                %method,
                path,
                status = status.as_u16(),
                message = server_message.as_deref().unwrap_or(""),
                "request rejected"
            );
            if status == StatusCode::NOT_FOUND {
                return Err(ClientError::not_found(path, server_message));
            }
            return Err(ClientError::transport(
                Some(status.as_u16()),
                server_message.unwrap_or_else(|| format!("request failed with status {status}")),
            ));
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, path: &str) -> Result<Value, ClientError> {
        self.send(Method::GET, path, None).await
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, ClientError> {
        self.send(Method::POST, path, Some(body)).await
    }

    async fn put(&self, path: &str, body: Value) -> Result<Value, ClientError> {
        self.send(Method::PUT, path, Some(body)).await
    }

    async fn delete(&self, path: &str) -> Result<Value, ClientError> {
        self.send(Method::DELETE, path, None).await
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
