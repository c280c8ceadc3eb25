use crate::application::ports::{RemoteDataGateway, Row};
use crate::application::shared::mappers::{decode_presence, encode_presence};
use crate::application::sync::{
    ProfileDirectory, ResourceKind, ResourceOptions, ResourceState, SyncedResource,
};
use crate::domain::entities::{Presence, PresenceStatus, SyncedItem};
use crate::domain::value_objects::Scope;
use crate::shared::error::AppError;
use crate::shared::validation::ValidationFailureKind;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;

pub struct PresenceKind;

impl ResourceKind for PresenceKind {
    type Payload = Presence;
    type Patch = PresenceStatus;

    const TABLE: &'static str = "user_presence";
    const SCOPE_COLUMN: &'static str = "user_id";
    const ID_COLUMN: &'static str = "user_id";
    const ORDER_COLUMN: &'static str = "last_seen";

    fn parent_key(payload: &Presence) -> &str {
        &payload.user_id
    }

    fn encode(payload: &Presence) -> Row {
        encode_presence(payload)
    }

    fn encode_patch(patch: &PresenceStatus) -> Row {
        let mut row = Row::new();
        row.insert("status".into(), Value::String(patch.as_str().to_string()));
        row
    }

    fn decode(row: &Row) -> Result<SyncedItem<Presence>, AppError> {
        decode_presence(row)
    }

    fn validate(payload: Presence) -> Result<Presence, AppError> {
        if payload.user_id.trim().is_empty() {
            return Err(AppError::validation(
                "user_id",
                ValidationFailureKind::Required,
                "User is required",
            ));
        }
        Ok(payload)
    }
}

/// 指定ユーザー群のオンライン状態
pub struct PresenceBoard {
    resource: SyncedResource<PresenceKind>,
}

impl PresenceBoard {
    pub async fn open<I, S>(
        remote: Arc<dyn RemoteDataGateway>,
        profiles: Arc<ProfileDirectory>,
        user_ids: I,
        options: ResourceOptions,
    ) -> Result<Self, AppError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let scope = Scope::any_of(PresenceKind::SCOPE_COLUMN, user_ids).map_err(|message| {
            AppError::validation("user_ids", ValidationFailureKind::Required, message)
        })?;
        let resource = SyncedResource::open(remote, profiles, scope, options).await;
        Ok(Self { resource })
    }

    pub fn state(&self) -> ResourceState<Presence> {
        self.resource.state()
    }

    pub fn watch(&self) -> watch::Receiver<ResourceState<Presence>> {
        self.resource.watch()
    }

    pub fn resource(&self) -> &SyncedResource<PresenceKind> {
        &self.resource
    }

    /// Upserts the caller's own status. The user need not be on this board.
    pub async fn set_status(
        &self,
        user_id: &str,
        status: PresenceStatus,
    ) -> Result<SyncedItem<Presence>, AppError> {
        let presence = Presence {
            user_id: user_id.to_string(),
            status,
            last_seen: Utc::now(),
        };
        if self.resource.scope().matches(user_id) {
            return self.resource.upsert(presence).await;
        }

        let presence = PresenceKind::validate(presence)?;
        let own_scope = Scope::new(PresenceKind::SCOPE_COLUMN, user_id).map_err(|message| {
            AppError::validation("user_id", ValidationFailureKind::Required, message)
        })?;
        self.resource.gateway().upsert(&own_scope, &presence).await
    }

    pub fn status_of(&self, user_id: &str) -> PresenceStatus {
        self.state()
            .items
            .iter()
            .find(|item| item.payload.user_id == user_id)
            .map(|item| item.payload.status)
            .unwrap_or(PresenceStatus::Offline)
    }

    pub fn online_users(&self) -> Vec<String> {
        self.state()
            .items
            .iter()
            .filter(|item| item.payload.status == PresenceStatus::Online)
            .map(|item| item.payload.user_id.clone())
            .collect()
    }

    pub async fn close(&self) {
        self.resource.close().await;
    }
}
