//! ポートのモック。各サービスのテストから共有する。

use crate::application::ports::{
    AuthGateway, ChangeEvent, ChangeFilter, Filter, ObjectStorage, RemoteDataGateway, Row,
    RowQuery, SignUpOutcome, StoredObject, Subscription, UploadProgress,
};
use crate::domain::entities::{AuthSession, AuthUser};
use crate::infrastructure::memory::InMemoryBackend;
use crate::shared::error::AppError;
use async_trait::async_trait;
use bytes::Bytes;
use mockall::mock;
use serde_json::Value;
use tokio::sync::mpsc;

mock! {
    pub Remote {}

    #[async_trait]
    impl RemoteDataGateway for Remote {
        async fn list(&self, query: &RowQuery) -> Result<Vec<Row>, AppError>;
        async fn create(&self, table: &str, row: Row) -> Result<Row, AppError>;
        async fn update(&self, table: &str, target: &Filter, patch: Row) -> Result<Row, AppError>;
        async fn upsert(&self, table: &str, row: Row, on_conflict: &str) -> Result<Row, AppError>;
        async fn remove(&self, table: &str, target: &Filter) -> Result<(), AppError>;
        async fn subscribe_change_feed(&self, filter: ChangeFilter) -> Result<Subscription, AppError>;
    }
}

mock! {
    pub Storage {}

    #[async_trait]
    impl ObjectStorage for Storage {
        async fn upload(
            &self,
            bucket: &str,
            path: &str,
            body: Bytes,
            content_type: &str,
            progress: Option<UploadProgress>,
        ) -> Result<StoredObject, AppError>;
        async fn remove(&self, bucket: &str, paths: &[String]) -> Result<(), AppError>;
        fn public_url(&self, bucket: &str, path: &str) -> String;
    }
}

mock! {
    pub Auth {}

    #[async_trait]
    impl AuthGateway for Auth {
        async fn sign_up(&self, email: &str, password: &str, username: &str) -> Result<SignUpOutcome, AppError>;
        async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthSession, AppError>;
        async fn send_password_reset(&self, email: &str, redirect_to: Option<String>) -> Result<(), AppError>;
        async fn update_password(&self, access_token: &str, new_password: &str) -> Result<AuthUser, AppError>;
        async fn sign_out(&self, access_token: &str) -> Result<(), AppError>;
    }
}

pub fn row(value: Value) -> Row {
    value.as_object().cloned().unwrap_or_default()
}

/// Subscription whose events are driven by the returned sender.
pub fn manual_subscription(id: &str) -> (mpsc::UnboundedSender<ChangeEvent>, Subscription) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, Subscription::new(id, rx, None))
}

/// In-memory backend whose `profiles` lookups never answer.
pub struct StalledProfiles {
    inner: InMemoryBackend,
}

impl StalledProfiles {
    pub fn new(inner: InMemoryBackend) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl RemoteDataGateway for StalledProfiles {
    async fn list(&self, query: &RowQuery) -> Result<Vec<Row>, AppError> {
        if query.table == "profiles" {
            return std::future::pending().await;
        }
        self.inner.list(query).await
    }

    async fn create(&self, table: &str, row: Row) -> Result<Row, AppError> {
        self.inner.create(table, row).await
    }

    async fn update(&self, table: &str, target: &Filter, patch: Row) -> Result<Row, AppError> {
        self.inner.update(table, target, patch).await
    }

    async fn upsert(&self, table: &str, row: Row, on_conflict: &str) -> Result<Row, AppError> {
        self.inner.upsert(table, row, on_conflict).await
    }

    async fn remove(&self, table: &str, target: &Filter) -> Result<(), AppError> {
        RemoteDataGateway::remove(&self.inner, table, target).await
    }

    async fn subscribe_change_feed(&self, filter: ChangeFilter) -> Result<Subscription, AppError> {
        self.inner.subscribe_change_feed(filter).await
    }
}
