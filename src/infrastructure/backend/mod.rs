//! Adapters for the hosted backend (PostgREST rows, realtime, storage, auth).

pub mod auth;
pub mod client;
pub mod realtime;
pub mod rest;
pub mod storage;

pub use auth::AuthClient;
pub use client::BackendClient;
pub use realtime::RealtimeClient;
pub use rest::RestGateway;
pub use storage::StorageClient;

use crate::application::ports::SessionStore;
use crate::shared::config::AppConfig;
use crate::shared::error::AppError;
use std::sync::Arc;

/// The three port adapters, sharing one HTTP client and session store.
pub struct HostedBackend {
    pub rows: Arc<RestGateway>,
    pub storage: Arc<StorageClient>,
    pub auth: Arc<AuthClient>,
}

impl HostedBackend {
    pub fn connect(config: &AppConfig, sessions: Arc<dyn SessionStore>) -> Result<Self, AppError> {
        let client = BackendClient::new(&config.backend, sessions)?;
        let realtime = RealtimeClient::new(
            &config.backend.url,
            &config.backend.anon_key,
            config.heartbeat_interval(),
            config.request_timeout(),
        );
        tracing::info!(url = %config.backend.url, "hosted backend configured");
        Ok(Self {
            rows: Arc::new(RestGateway::new(client.clone(), realtime)),
            storage: Arc::new(StorageClient::new(client.clone())),
            auth: Arc::new(AuthClient::new(client)),
        })
    }
}
