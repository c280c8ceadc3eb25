use crate::domain::entities::{AuthSession, AuthUser};
use crate::shared::error::AppError;
use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignUpOutcome {
    SignedIn(AuthSession),
    /// Account created; the backend wants the email address confirmed first.
    ConfirmationRequired(AuthUser),
}

#[async_trait]
pub trait AuthGateway: Send + Sync {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        username: &str,
    ) -> Result<SignUpOutcome, AppError>;

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, AppError>;

    async fn send_password_reset(
        &self,
        email: &str,
        redirect_to: Option<String>,
    ) -> Result<(), AppError>;

    async fn update_password(
        &self,
        access_token: &str,
        new_password: &str,
    ) -> Result<AuthUser, AppError>;

    async fn sign_out(&self, access_token: &str) -> Result<(), AppError>;
}
