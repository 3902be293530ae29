//! HTTP helper for the chat backend's REST endpoints.
//!
//! Every request is JSON in, JSON out. A non-2xx status becomes
//! [`ApiError::Rejected`] carrying the body's `message` when the backend sent
//! one, else `HTTP <code>`.

#[cfg(test)]
#[path = "api_test.rs"]
mod api_test;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("invalid response body: {0}")]
    Body(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub clients: u32,
    #[serde(default)]
    pub max_clients: u32,
    #[serde(default)]
    pub database_connected: bool,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `POST /login`.
    ///
    /// # Errors
    ///
    /// [`ApiError::Rejected`] for bad credentials or any other non-2xx status;
    /// [`ApiError::Http`] when the backend cannot be reached.
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, ApiError> {
        let body = serde_json::to_value(LoginRequest { username, password })?;
        self.request(Method::POST, "/login", Some(body)).await
    }

    /// `GET /health`.
    ///
    /// # Errors
    ///
    /// Same as [`ApiClient::login`].
    pub async fn health(&self) -> Result<HealthStatus, ApiError> {
        self.request(Method::GET, "/health", None).await
    }

    async fn request<T: DeserializeOwned>(&self, method: Method, path: &str, body: Option<Value>) -> Result<T, ApiError> {
        let url = format!("{}{path}", self.base_url);
        debug!(%method, %url, "api: request");

        let request = self.http.request(method, &url);
        let request = if let Some(json) = body {
            request.json(&json)
        } else {
            request
        };

        let response = request.send().await?;
        let status = response.status();
        let value = response.json::<Value>().await.unwrap_or(Value::Null);
        debug!(status = status.as_u16(), "api: response");

        if !status.is_success() {
            let message = value
                .get("message")
                .and_then(Value::as_str)
                .filter(|m| !m.is_empty())
                .map_or_else(|| format!("HTTP {}", status.as_u16()), ToOwned::to_owned);
            warn!(%url, status = status.as_u16(), %message, "api: request rejected");
            return Err(ApiError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        Ok(serde_json::from_value(value)?)
    }
}
