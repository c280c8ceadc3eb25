use crate::application::ports::{AuthGateway, SessionStore, SignUpOutcome};
use crate::domain::entities::{AuthSession, AuthUser};
use crate::shared::error::{AppError, RemoteErrorKind};
use crate::shared::validation::{check_email, ValidationErrors, ValidationFailureKind};
use chrono::Utc;
use std::sync::Arc;

pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const MIN_USERNAME_LENGTH: usize = 3;
pub const MAX_USERNAME_LENGTH: usize = 30;

#[derive(Debug, Clone)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub password_confirmation: String,
    pub username: String,
}

pub struct AuthService {
    gateway: Arc<dyn AuthGateway>,
    sessions: Arc<dyn SessionStore>,
}

impl AuthService {
    pub fn new(gateway: Arc<dyn AuthGateway>, sessions: Arc<dyn SessionStore>) -> Self {
        Self { gateway, sessions }
    }

    pub async fn sign_up(&self, request: SignUpRequest) -> Result<SignUpOutcome, AppError> {
        let mut errors = ValidationErrors::new();
        let email = check_email(&mut errors, "email", &request.email);
        let username = check_username(&mut errors, &request.username);
        check_new_password(
            &mut errors,
            &request.password,
            &request.password_confirmation,
        );
        errors.into_result()?;
        let (email, username) = (email.unwrap_or_default(), username.unwrap_or_default());

        let outcome = self
            .gateway
            .sign_up(&email, &request.password, &username)
            .await?;
        match &outcome {
            SignUpOutcome::SignedIn(session) => {
                tracing::info!(user_id = %session.user.id, "signed up and signed in");
                self.sessions.store(session.clone()).await;
            }
            SignUpOutcome::ConfirmationRequired(user) => {
                tracing::info!(user_id = %user.id, "sign-up awaiting email confirmation");
            }
        }
        Ok(outcome)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AppError> {
        let mut errors = ValidationErrors::new();
        let email = check_email(&mut errors, "email", email);
        if password.is_empty() {
            errors.push(
                "password",
                ValidationFailureKind::Required,
                "Password is required",
            );
        }
        errors.into_result()?;
        let email = email.unwrap_or_default();

        let session = self.gateway.sign_in_with_password(&email, password).await?;
        tracing::info!(user_id = %session.user.id, "signed in");
        self.sessions.store(session.clone()).await;
        Ok(session)
    }

    pub async fn request_password_reset(
        &self,
        email: &str,
        redirect_to: Option<&str>,
    ) -> Result<(), AppError> {
        let mut errors = ValidationErrors::new();
        let email = check_email(&mut errors, "email", email);
        errors.into_result()?;
        let email = email.unwrap_or_default();
        self.gateway
            .send_password_reset(&email, redirect_to.map(str::to_string))
            .await
    }

    pub async fn update_password(
        &self,
        new_password: &str,
        confirmation: &str,
    ) -> Result<AuthUser, AppError> {
        let mut errors = ValidationErrors::new();
        check_new_password(&mut errors, new_password, confirmation);
        errors.into_result()?;

        let session = self.current_session().await.ok_or_else(|| {
            AppError::remote(RemoteErrorKind::Auth, "Sign in again to change your password")
        })?;
        self.gateway
            .update_password(&session.access_token, new_password)
            .await
    }

    /// Local session is cleared even when the backend call fails.
    pub async fn sign_out(&self) -> Result<(), AppError> {
        let Some(session) = self.sessions.clear().await else {
            return Ok(());
        };
        tracing::info!(user_id = %session.user.id, "signing out");
        self.gateway.sign_out(&session.access_token).await
    }

    /// 期限切れのセッションは返さない
    pub async fn current_session(&self) -> Option<AuthSession> {
        self.sessions
            .current()
            .await
            .filter(|session| !session.is_expired_at(Utc::now()))
    }

    pub async fn current_user(&self) -> Option<AuthUser> {
        self.current_session().await.map(|session| session.user)
    }
}

fn check_username(errors: &mut ValidationErrors, value: &str) -> Option<String> {
    let username = value.trim().to_ascii_lowercase();
    if username.is_empty() {
        errors.push(
            "username",
            ValidationFailureKind::Required,
            "Username is required",
        );
        return None;
    }
    let length = username.chars().count();
    if length < MIN_USERNAME_LENGTH {
        errors.push(
            "username",
            ValidationFailureKind::TooShort,
            format!("Username must be at least {MIN_USERNAME_LENGTH} characters"),
        );
        return None;
    }
    if length > MAX_USERNAME_LENGTH {
        errors.push(
            "username",
            ValidationFailureKind::TooLong,
            format!("Username must be at most {MAX_USERNAME_LENGTH} characters"),
        );
        return None;
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        errors.push(
            "username",
            ValidationFailureKind::InvalidFormat,
            "Username may only contain letters, numbers and underscores",
        );
        return None;
    }
    Some(username)
}

fn check_new_password(errors: &mut ValidationErrors, password: &str, confirmation: &str) {
    if password.is_empty() {
        errors.push(
            "password",
            ValidationFailureKind::Required,
            "Password is required",
        );
    } else if password.chars().count() < MIN_PASSWORD_LENGTH {
        errors.push(
            "password",
            ValidationFailureKind::TooShort,
            format!("Password must be at least {MIN_PASSWORD_LENGTH} characters"),
        );
    }
    if password != confirmation {
        errors.push(
            "password_confirmation",
            ValidationFailureKind::Mismatch,
            "Passwords do not match",
        );
    }
}
