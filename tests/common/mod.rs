#![allow(dead_code)]

use creatorspace_lib::application::ports::Row;
use creatorspace_lib::infrastructure::memory::InMemoryBackend;
use creatorspace_lib::shared::config::ReconnectConfig;
use creatorspace_lib::{AppConfig, AppState};
use serde_json::{json, Value};
use std::future::Future;
use std::time::Duration;

pub const WAIT: Duration = Duration::from_secs(5);

pub fn row(value: Value) -> Row {
    value.as_object().cloned().unwrap_or_default()
}

/// Defaults with a reconnect policy short enough for tests.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.backend.url = "http://localhost:54321".into();
    config.backend.anon_key = "anon".into();
    config.realtime.reconnect = ReconnectConfig {
        enabled: true,
        initial_backoff_ms: 20,
        max_backoff_ms: 100,
        max_attempts: 5,
    };
    config
}

pub async fn seeded_backend() -> InMemoryBackend {
    let backend = InMemoryBackend::new();
    backend
        .seed(
            "profiles",
            [
                row(json!({"id": "u1", "username": "ada", "display_name": "Ada", "followers_count": 120})),
                row(json!({"id": "u2", "username": "grace", "followers_count": 80})),
                row(json!({"id": "u3", "username": "linus", "followers_count": 300})),
            ],
        )
        .await;
    backend
}

pub async fn app() -> (AppState, InMemoryBackend) {
    let backend = seeded_backend().await;
    let state = AppState::in_memory(test_config(), backend.clone());
    (state, backend)
}

pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(WAIT, future)
        .await
        .unwrap_or_else(|_| panic!("timed out after {WAIT:?}"))
}
