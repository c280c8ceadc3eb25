use crate::application::ports::SessionStore;
use crate::shared::config::BackendConfig;
use crate::shared::error::AppError;
use reqwest::{Method, RequestBuilder, Response};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Shared HTTP plumbing for the hosted backend: base URL, api key, bearer.
#[derive(Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    sessions: Arc<dyn SessionStore>,
}

impl BackendClient {
    pub fn new(config: &BackendConfig, sessions: Arc<dyn SessionStore>) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout.max(1)))
            .build()
            .map_err(|err| AppError::Configuration(format!("HTTP client: {err}")))?;
        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
            sessions,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn anon_key(&self) -> &str {
        &self.anon_key
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Access token of the signed-in user, falling back to the anon key.
    pub async fn bearer(&self) -> String {
        match self.sessions.current().await {
            Some(session) => session.access_token,
            None => self.anon_key.clone(),
        }
    }

    pub async fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let bearer = self.bearer().await;
        self.request_with_token(method, path, &bearer)
    }

    pub fn request_with_token(&self, method: Method, path: &str, token: &str) -> RequestBuilder {
        self.http
            .request(method, self.url(path))
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
    }

    pub async fn send(&self, request: RequestBuilder) -> Result<Response, AppError> {
        let response = request.send().await?;
        ensure_success(response).await
    }

    pub async fn send_json(&self, request: RequestBuilder) -> Result<Value, AppError> {
        let response = self.send(request).await?;
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

async fn ensure_success(response: Response) -> Result<Response, AppError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = error_message(&body).unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    });
    tracing::debug!(status = status.as_u16(), %message, "backend rejected request");
    Err(AppError::remote_status(status.as_u16(), message))
}

/// Picks the human-readable part of a backend error body.
pub fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["message", "msg", "error_description", "error"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .filter(|message| !message.trim().is_empty())
        .map(str::to_string)
}
