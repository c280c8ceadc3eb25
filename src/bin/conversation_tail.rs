use anyhow::{Context, Result};
use creatorspace_lib::application::sync::ListenerState;
use creatorspace_lib::{init_logging, AppConfig, AppState};
use tracing::{info, warn};

const ENV_EMAIL: &str = "CREATORSPACE_EMAIL";
const ENV_PASSWORD: &str = "CREATORSPACE_PASSWORD";
const ENV_CONVERSATION_ID: &str = "CREATORSPACE_CONVERSATION_ID";

fn required_env(key: &str) -> Result<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .with_context(|| format!("{key} is not set"))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let config = AppConfig::from_env().context("failed to load configuration")?;
    let email = required_env(ENV_EMAIL)?;
    let password = required_env(ENV_PASSWORD)?;
    let conversation_id = required_env(ENV_CONVERSATION_ID)?;

    let state = AppState::connect(config).context("failed to configure backend")?;
    let session = state
        .auth
        .sign_in(&email, &password)
        .await
        .context("sign-in failed")?;
    info!(user_id = %session.user.id, "signed in");

    let conversation = state
        .open_conversation(&conversation_id)
        .await
        .context("failed to open conversation")?;
    let mut updates = conversation.watch();

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                if let Some(error) = &snapshot.error {
                    warn!(code = error.code(), %error, "conversation error");
                }
                let pending = snapshot.items.iter().filter(|item| item.is_optimistic).count();
                let latest = snapshot.items.last().map(|item| {
                    format!(
                        "{}: {}",
                        item.payload
                            .sender
                            .as_ref()
                            .map(|profile| profile.label().to_string())
                            .unwrap_or_else(|| item.payload.sender_id.clone()),
                        item.payload.body.content()
                    )
                });
                info!(
                    messages = snapshot.items.len(),
                    pending,
                    unread = conversation.unread_count(&session.user.id),
                    latest = latest.as_deref().unwrap_or("-"),
                    "conversation updated"
                );
                if conversation.resource().listener_state().await == ListenerState::Stale {
                    warn!("change feed is stale, showing last known state");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        }
    }

    conversation.close().await;
    if let Err(err) = state.auth.sign_out().await {
        warn!(error = %err, "sign-out failed");
    }
    Ok(())
}
