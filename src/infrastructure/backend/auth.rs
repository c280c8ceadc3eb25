use super::client::BackendClient;
use crate::application::ports::{AuthGateway, SignUpOutcome};
use crate::domain::entities::{AuthSession, AuthUser};
use crate::shared::error::{AppError, RemoteErrorKind};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use reqwest::Method;
use serde_json::{json, Value};

const AUTH_PREFIX: &str = "auth/v1";

pub struct AuthClient {
    client: BackendClient,
}

impl AuthClient {
    pub fn new(client: BackendClient) -> Self {
        Self { client }
    }

    fn path(endpoint: &str) -> String {
        format!("{AUTH_PREFIX}/{endpoint}")
    }
}

/// The token endpoint answers bad credentials with 400.
fn rejected_credentials(err: AppError) -> AppError {
    match err {
        AppError::Remote(mut remote) if remote.status == Some(400) => {
            remote.kind = RemoteErrorKind::Auth;
            AppError::Remote(remote)
        }
        other => other,
    }
}

pub fn parse_user(value: &Value) -> Result<AuthUser, AppError> {
    let id = value
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::Deserialization("auth user without id".into()))?;
    Ok(AuthUser {
        id: id.to_string(),
        email: value
            .get("email")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

/// `expires_at` (epoch seconds) wins over `expires_in`.
pub fn parse_session(value: &Value, now: DateTime<Utc>) -> Result<AuthSession, AppError> {
    let access_token = value
        .get("access_token")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::Deserialization("auth response without access_token".into()))?;
    let user = value
        .get("user")
        .ok_or_else(|| AppError::Deserialization("auth response without user".into()))
        .and_then(parse_user)?;
    let expires_at = value
        .get("expires_at")
        .and_then(Value::as_i64)
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .or_else(|| {
            value
                .get("expires_in")
                .and_then(Value::as_i64)
                .map(|secs| now + ChronoDuration::seconds(secs))
        });
    Ok(AuthSession {
        access_token: access_token.to_string(),
        refresh_token: value
            .get("refresh_token")
            .and_then(Value::as_str)
            .map(str::to_string),
        expires_at,
        user,
    })
}

/// A sign-up answer without a token means email confirmation is pending.
pub fn parse_sign_up(value: &Value, now: DateTime<Utc>) -> Result<SignUpOutcome, AppError> {
    if value.get("access_token").is_some() {
        return parse_session(value, now).map(SignUpOutcome::SignedIn);
    }
    let user = value.get("user").unwrap_or(value);
    parse_user(user).map(SignUpOutcome::ConfirmationRequired)
}

#[async_trait]
impl AuthGateway for AuthClient {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        username: &str,
    ) -> Result<SignUpOutcome, AppError> {
        let request = self
            .client
            .request_with_token(Method::POST, &Self::path("signup"), self.client.anon_key())
            .json(&json!({
                "email": email,
                "password": password,
                "data": {"username": username},
            }));
        let body = self.client.send_json(request).await?;
        parse_sign_up(&body, Utc::now())
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, AppError> {
        let request = self
            .client
            .request_with_token(Method::POST, &Self::path("token"), self.client.anon_key())
            .query(&[("grant_type", "password")])
            .json(&json!({"email": email, "password": password}));
        let body = self
            .client
            .send_json(request)
            .await
            .map_err(rejected_credentials)?;
        parse_session(&body, Utc::now())
    }

    async fn send_password_reset(
        &self,
        email: &str,
        redirect_to: Option<String>,
    ) -> Result<(), AppError> {
        let mut request = self
            .client
            .request_with_token(Method::POST, &Self::path("recover"), self.client.anon_key())
            .json(&json!({"email": email}));
        if let Some(redirect_to) = redirect_to {
            request = request.query(&[("redirect_to", redirect_to)]);
        }
        self.client.send(request).await?;
        Ok(())
    }

    async fn update_password(
        &self,
        access_token: &str,
        new_password: &str,
    ) -> Result<AuthUser, AppError> {
        let request = self
            .client
            .request_with_token(Method::PUT, &Self::path("user"), access_token)
            .json(&json!({"password": new_password}));
        let body = self.client.send_json(request).await?;
        parse_user(&body)
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), AppError> {
        let request = self
            .client
            .request_with_token(Method::POST, &Self::path("logout"), access_token);
        self.client.send(request).await?;
        Ok(())
    }
}
