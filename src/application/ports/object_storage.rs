use crate::shared::error::AppError;
use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredObject {
    pub bucket: String,
    pub path: String,
    pub public_url: String,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UploadState {
    pub sent: u64,
    pub total: u64,
    pub finished: bool,
}

impl UploadState {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return if self.finished { 1.0 } else { 0.0 };
        }
        (self.sent as f64 / self.total as f64).min(1.0)
    }
}

/// Byte-level progress reporter shared between the caller and the storage adapter.
#[derive(Clone)]
pub struct UploadProgress {
    tx: Arc<watch::Sender<UploadState>>,
}

impl UploadProgress {
    pub fn new(total: u64) -> (Self, watch::Receiver<UploadState>) {
        let (tx, rx) = watch::channel(UploadState {
            sent: 0,
            total,
            finished: false,
        });
        (Self { tx: Arc::new(tx) }, rx)
    }

    pub fn advance(&self, bytes: u64) {
        self.tx.send_modify(|state| {
            state.sent = state.sent.saturating_add(bytes);
            if state.total > 0 {
                state.sent = state.sent.min(state.total);
            }
        });
    }

    pub fn finish(&self) {
        self.tx.send_modify(|state| {
            state.sent = state.total;
            state.finished = true;
        });
    }

    pub fn snapshot(&self) -> UploadState {
        *self.tx.borrow()
    }
}

impl std::fmt::Debug for UploadProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("UploadProgress").field(&self.snapshot()).finish()
    }
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        data: Bytes,
        content_type: &str,
        progress: Option<UploadProgress>,
    ) -> Result<StoredObject, AppError>;

    async fn remove(&self, bucket: &str, paths: &[String]) -> Result<(), AppError>;

    fn public_url(&self, bucket: &str, path: &str) -> String;
}
