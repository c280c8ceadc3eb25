use crate::shared::validation::{ValidationErrors, ValidationFailureKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteErrorKind {
    Network,
    Auth,
    Constraint,
    NotFound,
    Timeout,
    Server,
}

impl RemoteErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteErrorKind::Network => "network",
            RemoteErrorKind::Auth => "auth",
            RemoteErrorKind::Constraint => "constraint",
            RemoteErrorKind::NotFound => "not_found",
            RemoteErrorKind::Timeout => "timeout",
            RemoteErrorKind::Server => "server",
        }
    }

    /// HTTP ステータスからエラー種別を推定する
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => RemoteErrorKind::Auth,
            404 => RemoteErrorKind::NotFound,
            400 | 409 | 422 => RemoteErrorKind::Constraint,
            408 | 504 => RemoteErrorKind::Timeout,
            _ => RemoteErrorKind::Server,
        }
    }
}

/// Rejection reported by the hosted backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} ({}): {}", self.kind.as_str(), status, self.message),
            None => write!(f, "{}: {}", self.kind.as_str(), self.message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(ValidationErrors),
    #[error("Remote error: {0}")]
    Remote(RemoteError),
    #[error("Subscription error: {0}")]
    Subscription(String),
    #[error("Upload error: {0}")]
    Upload(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Deserialization error: {0}")]
    Deserialization(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(
        field: impl Into<String>,
        kind: ValidationFailureKind,
        message: impl Into<String>,
    ) -> Self {
        AppError::Validation(ValidationErrors::single(field, kind, message))
    }

    pub fn remote(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        AppError::Remote(RemoteError {
            kind,
            status: None,
            message: message.into(),
        })
    }

    pub fn remote_status(status: u16, message: impl Into<String>) -> Self {
        AppError::Remote(RemoteError {
            kind: RemoteErrorKind::from_status(status),
            status: Some(status),
            message: message.into(),
        })
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, AppError::Validation(_))
    }

    pub fn remote_kind(&self) -> Option<RemoteErrorKind> {
        match self {
            AppError::Remote(remote) => Some(remote.kind),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Remote(_) => "REMOTE_ERROR",
            AppError::Subscription(_) => "SUBSCRIPTION_ERROR",
            AppError::Upload(_) => "UPLOAD_ERROR",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Deserialization(_) => "DESERIALIZATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        AppError::Validation(errors)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Deserialization(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return AppError::remote(RemoteErrorKind::Timeout, err.to_string());
        }
        match err.status() {
            Some(status) => AppError::remote_status(status.as_u16(), err.to_string()),
            None => AppError::remote(RemoteErrorKind::Network, err.to_string()),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for AppError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        AppError::Subscription(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for AppError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        AppError::remote(RemoteErrorKind::Timeout, err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_maps_to_kind() {
        assert_eq!(RemoteErrorKind::from_status(401), RemoteErrorKind::Auth);
        assert_eq!(RemoteErrorKind::from_status(409), RemoteErrorKind::Constraint);
        assert_eq!(RemoteErrorKind::from_status(404), RemoteErrorKind::NotFound);
        assert_eq!(RemoteErrorKind::from_status(503), RemoteErrorKind::Server);
    }

    #[test]
    fn display_includes_status_when_present() {
        let err = AppError::remote_status(409, "duplicate key");
        assert_eq!(
            err.to_string(),
            "Remote error: constraint (409): duplicate key"
        );
        assert_eq!(err.remote_kind(), Some(RemoteErrorKind::Constraint));
        assert_eq!(err.code(), "REMOTE_ERROR");
    }
}
