use crate::shared::error::{AppError, RemoteErrorKind};
use std::future::Future;
use std::time::Duration;

/// Bounds a backend call; expiry surfaces as a `Timeout` remote error.
pub async fn bounded<T, F>(limit: Duration, what: &str, call: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(AppError::remote(
            RemoteErrorKind::Timeout,
            format!("{what} did not complete within {limit:?}"),
        )),
    }
}
