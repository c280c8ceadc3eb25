//! CreatorSpace client core: optimistic mutations reconciled with the
//! backend's realtime change feed.

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;
pub mod shared;
pub mod state;

pub use shared::config::AppConfig;
pub use shared::error::AppError;
pub use state::AppState;

/// `RUST_LOG` wins; otherwise debug for this crate and info elsewhere. Safe to call twice.
pub fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "creatorspace_lib=debug,conversation_tail=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
