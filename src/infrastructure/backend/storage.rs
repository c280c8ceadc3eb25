use super::client::BackendClient;
use crate::application::ports::{ObjectStorage, StoredObject, UploadProgress};
use crate::shared::error::AppError;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Body, Method};
use serde_json::json;

const STORAGE_PREFIX: &str = "storage/v1/object";
pub const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

pub struct StorageClient {
    client: BackendClient,
}

impl StorageClient {
    pub fn new(client: BackendClient) -> Self {
        Self { client }
    }
}

pub fn object_path(bucket: &str, path: &str) -> String {
    format!("{STORAGE_PREFIX}/{bucket}/{}", path.trim_start_matches('/'))
}

/// Splits the body so progress can be reported as chunks are consumed.
pub fn chunks(data: &Bytes, size: usize) -> Vec<Bytes> {
    let size = size.max(1);
    (0..data.len())
        .step_by(size)
        .map(|start| data.slice(start..(start + size).min(data.len())))
        .collect()
}

#[async_trait]
impl ObjectStorage for StorageClient {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        data: Bytes,
        content_type: &str,
        progress: Option<UploadProgress>,
    ) -> Result<StoredObject, AppError> {
        let size = data.len() as u64;
        let reporter = progress.clone();
        let body = Body::wrap_stream(futures::stream::iter(
            chunks(&data, UPLOAD_CHUNK_SIZE).into_iter().map(move |chunk| {
                if let Some(progress) = &reporter {
                    progress.advance(chunk.len() as u64);
                }
                Ok::<Bytes, std::io::Error>(chunk)
            }),
        ));

        let request = self
            .client
            .request(Method::POST, &object_path(bucket, path))
            .await
            .header("content-type", content_type)
            .header("content-length", size)
            .header("x-upsert", "false")
            .body(body);
        self.client.send(request).await.map_err(|err| {
            tracing::warn!(bucket, path, error = %err, "upload rejected");
            AppError::Upload(err.to_string())
        })?;

        if let Some(progress) = &progress {
            progress.finish();
        }
        tracing::debug!(bucket, path, size, "object uploaded");
        Ok(StoredObject {
            bucket: bucket.to_string(),
            path: path.to_string(),
            public_url: self.public_url(bucket, path),
            size,
        })
    }

    async fn remove(&self, bucket: &str, paths: &[String]) -> Result<(), AppError> {
        if paths.is_empty() {
            return Ok(());
        }
        let request = self
            .client
            .request(Method::DELETE, &format!("{STORAGE_PREFIX}/{bucket}"))
            .await
            .json(&json!({ "prefixes": paths }));
        self.client.send(request).await?;
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!(
            "{}/{STORAGE_PREFIX}/public/{bucket}/{}",
            self.client.base_url(),
            path.trim_start_matches('/')
        )
    }
}
