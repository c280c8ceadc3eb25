//! In-process backend implementing every port. Used by tests and demo mode.

pub mod query;

use crate::application::ports::remote_gateway::value_as_text;
use crate::application::ports::{
    AuthGateway, ChangeEvent, ChangeFilter, ChangeKind, Filter, ObjectStorage, RemoteDataGateway,
    Row, RowQuery, SignUpOutcome, StoredObject, Subscription, UploadProgress,
};
use crate::application::shared::mappers::row::timestamp_value;
use crate::domain::entities::{AuthSession, AuthUser};
use crate::shared::error::{AppError, RemoteErrorKind};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex, RwLock};

/// Operation a queued fault applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    List,
    Create,
    Update,
    Upsert,
    Remove,
    Subscribe,
    Upload,
    RemoveObjects,
    Auth,
}

#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub data: Bytes,
    pub content_type: String,
}

#[derive(Debug, Clone)]
struct UserRecord {
    id: String,
    email: String,
    password: String,
}

struct Feed {
    filter: ChangeFilter,
    tx: mpsc::UnboundedSender<ChangeEvent>,
}

struct Inner {
    tables: RwLock<HashMap<String, Vec<Row>>>,
    objects: RwLock<HashMap<(String, String), StoredBlob>>,
    users: Mutex<HashMap<String, UserRecord>>,
    tokens: Mutex<HashMap<String, String>>,
    password_resets: Mutex<Vec<String>>,
    feeds: Mutex<Vec<Feed>>,
    faults: Mutex<HashMap<FaultPoint, VecDeque<AppError>>>,
    write_gate: watch::Sender<bool>,
    response_delay: Mutex<Option<Duration>>,
    require_confirmation: AtomicBool,
}

/// Tables, object store, users and change-feed fan-out in memory.
#[derive(Clone)]
pub struct InMemoryBackend {
    inner: Arc<Inner>,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    pub fn new() -> Self {
        let (write_gate, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                tables: RwLock::new(HashMap::new()),
                objects: RwLock::new(HashMap::new()),
                users: Mutex::new(HashMap::new()),
                tokens: Mutex::new(HashMap::new()),
                password_resets: Mutex::new(Vec::new()),
                feeds: Mutex::new(Vec::new()),
                faults: Mutex::new(HashMap::new()),
                write_gate,
                response_delay: Mutex::new(None),
                require_confirmation: AtomicBool::new(false),
            }),
        }
    }

    /// Inserts rows as-is, without notifying feeds.
    pub async fn seed(&self, table: &str, rows: impl IntoIterator<Item = Row>) {
        let mut tables = self.inner.tables.write().await;
        tables.entry(table.to_string()).or_default().extend(rows);
    }

    pub async fn rows(&self, table: &str) -> Vec<Row> {
        self.inner
            .tables
            .read()
            .await
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn object(&self, bucket: &str, path: &str) -> Option<StoredBlob> {
        self.inner
            .objects
            .read()
            .await
            .get(&(bucket.to_string(), path.to_string()))
            .cloned()
    }

    pub async fn object_paths(&self, bucket: &str) -> Vec<String> {
        let mut paths: Vec<String> = self
            .inner
            .objects
            .read()
            .await
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, path)| path.clone())
            .collect();
        paths.sort();
        paths
    }

    pub async fn password_resets(&self) -> Vec<String> {
        self.inner.password_resets.lock().await.clone()
    }

    /// Live change-feed subscriptions.
    pub async fn feed_count(&self) -> usize {
        let mut feeds = self.inner.feeds.lock().await;
        feeds.retain(|feed| !feed.tx.is_closed());
        feeds.len()
    }

    /// Ends every open subscription as a dropped connection would.
    pub async fn disconnect_feeds(&self) {
        let dropped = {
            let mut feeds = self.inner.feeds.lock().await;
            std::mem::take(&mut *feeds).len()
        };
        tracing::info!(dropped, "in-memory feeds disconnected");
    }

    /// The next call at `point` fails with `error`.
    pub async fn fail_next(&self, point: FaultPoint, error: AppError) {
        self.inner
            .faults
            .lock()
            .await
            .entry(point)
            .or_default()
            .push_back(error);
    }

    /// Writes block until `release_writes`.
    pub fn hold_writes(&self) {
        self.inner.write_gate.send_replace(true);
    }

    pub fn release_writes(&self) {
        self.inner.write_gate.send_replace(false);
    }

    /// Delay between applying a write (and notifying feeds) and answering it.
    pub async fn set_response_delay(&self, delay: Option<Duration>) {
        *self.inner.response_delay.lock().await = delay;
    }

    pub fn require_email_confirmation(&self, required: bool) {
        self.inner
            .require_confirmation
            .store(required, Ordering::SeqCst);
    }

    async fn check_fault(&self, point: FaultPoint) -> Result<(), AppError> {
        let fault = self
            .inner
            .faults
            .lock()
            .await
            .get_mut(&point)
            .and_then(VecDeque::pop_front);
        match fault {
            Some(err) => {
                tracing::debug!(?point, error = %err, "injected fault");
                Err(err)
            }
            None => Ok(()),
        }
    }

    async fn before_write(&self, point: FaultPoint) -> Result<(), AppError> {
        let mut gate = self.inner.write_gate.subscribe();
        if gate.wait_for(|held| !*held).await.is_err() {
            return Err(AppError::Internal("write gate closed".into()));
        }
        self.check_fault(point).await
    }

    async fn after_write(&self) {
        let delay = *self.inner.response_delay.lock().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    async fn publish(&self, kind: ChangeKind, table: &str, new: Option<Row>, old: Option<Row>) {
        let mut feeds = self.inner.feeds.lock().await;
        feeds.retain(|feed| !feed.tx.is_closed());
        let Some(subject) = new.as_ref().or(old.as_ref()) else {
            return;
        };
        let event = ChangeEvent {
            kind,
            table: table.to_string(),
            new: new.clone(),
            old: old.clone(),
            commit_timestamp: Some(Utc::now()),
        };
        for feed in feeds.iter().filter(|feed| feed.filter.matches(table, subject)) {
            let _ = feed.tx.send(event.clone());
        }
    }

    fn stamp(mut row: Row) -> Row {
        let now = Utc::now();
        row.entry("id".to_string())
            .or_insert_with(|| Value::String(uuid::Uuid::new_v4().to_string()));
        row.entry("created_at".to_string())
            .or_insert_with(|| timestamp_value(&now));
        row
    }

    fn merge(target: &mut Row, patch: Row) {
        for (key, value) in patch {
            target.insert(key, value);
        }
    }

    async fn session_for(&self, user: &UserRecord) -> AuthSession {
        let token = format!("mem-{}", uuid::Uuid::new_v4().simple());
        self.inner
            .tokens
            .lock()
            .await
            .insert(token.clone(), user.id.clone());
        AuthSession {
            access_token: token,
            refresh_token: Some(format!("mem-refresh-{}", uuid::Uuid::new_v4().simple())),
            expires_at: Some(Utc::now() + ChronoDuration::hours(1)),
            user: AuthUser {
                id: user.id.clone(),
                email: Some(user.email.clone()),
            },
        }
    }
}

#[async_trait]
impl RemoteDataGateway for InMemoryBackend {
    async fn list(&self, query: &RowQuery) -> Result<Vec<Row>, AppError> {
        self.check_fault(FaultPoint::List).await?;
        let tables = self.inner.tables.read().await;
        Ok(query::evaluate(&tables, query))
    }

    async fn create(&self, table: &str, row: Row) -> Result<Row, AppError> {
        self.before_write(FaultPoint::Create).await?;
        let row = Self::stamp(row);
        {
            let mut tables = self.inner.tables.write().await;
            let rows = tables.entry(table.to_string()).or_default();
            if let Some(id) = row.get("id").and_then(value_as_text) {
                let duplicate = rows.iter().any(|existing| {
                    existing.get("id").and_then(value_as_text).as_deref() == Some(id.as_str())
                });
                if duplicate {
                    return Err(AppError::remote_status(
                        409,
                        format!("duplicate key value violates unique constraint on {table}.id"),
                    ));
                }
            }
            rows.push(row.clone());
        }
        self.publish(ChangeKind::Insert, table, Some(row.clone()), None)
            .await;
        self.after_write().await;
        Ok(row)
    }

    async fn update(&self, table: &str, target: &Filter, patch: Row) -> Result<Row, AppError> {
        self.before_write(FaultPoint::Update).await?;
        let (old, updated) = {
            let mut tables = self.inner.tables.write().await;
            let existing = tables
                .get_mut(table)
                .and_then(|rows| rows.iter_mut().find(|row| target.matches(row)))
                .ok_or_else(|| AppError::NotFound(format!("{table} where {target}")))?;
            let old = existing.clone();
            Self::merge(existing, patch);
            (old, existing.clone())
        };
        self.publish(ChangeKind::Update, table, Some(updated.clone()), Some(old))
            .await;
        self.after_write().await;
        Ok(updated)
    }

    async fn upsert(&self, table: &str, row: Row, on_conflict: &str) -> Result<Row, AppError> {
        self.before_write(FaultPoint::Upsert).await?;
        let key = row.get(on_conflict).and_then(value_as_text).ok_or_else(|| {
            AppError::remote_status(400, format!("upsert without {on_conflict}"))
        })?;
        let conflict = Filter::eq(on_conflict, key);
        let (kind, old, stored) = {
            let mut tables = self.inner.tables.write().await;
            let rows = tables.entry(table.to_string()).or_default();
            match rows.iter_mut().find(|existing| conflict.matches(existing)) {
                Some(existing) => {
                    let old = existing.clone();
                    Self::merge(existing, row);
                    (ChangeKind::Update, Some(old), existing.clone())
                }
                None => {
                    let mut fresh = row;
                    if on_conflict != "id" {
                        fresh
                            .entry("created_at".to_string())
                            .or_insert_with(|| timestamp_value(&Utc::now()));
                    } else {
                        fresh = Self::stamp(fresh);
                    }
                    rows.push(fresh.clone());
                    (ChangeKind::Insert, None, fresh)
                }
            }
        };
        self.publish(kind, table, Some(stored.clone()), old).await;
        self.after_write().await;
        Ok(stored)
    }

    async fn remove(&self, table: &str, target: &Filter) -> Result<(), AppError> {
        self.before_write(FaultPoint::Remove).await?;
        let removed = {
            let mut tables = self.inner.tables.write().await;
            match tables.get_mut(table) {
                Some(rows) => {
                    let (gone, kept): (Vec<Row>, Vec<Row>) =
                        rows.drain(..).partition(|row| target.matches(row));
                    *rows = kept;
                    gone
                }
                None => Vec::new(),
            }
        };
        for row in removed {
            self.publish(ChangeKind::Delete, table, None, Some(row)).await;
        }
        self.after_write().await;
        Ok(())
    }

    async fn subscribe_change_feed(&self, filter: ChangeFilter) -> Result<Subscription, AppError> {
        self.check_fault(FaultPoint::Subscribe).await?;
        let (tx, rx) = mpsc::unbounded_channel();
        let id = format!("memory:{}:{}", filter.table, uuid::Uuid::new_v4().simple());
        tracing::debug!(%id, "in-memory feed subscribed");
        self.inner.feeds.lock().await.push(Feed { filter, tx });
        Ok(Subscription::new(id, rx, None))
    }
}

#[async_trait]
impl ObjectStorage for InMemoryBackend {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        data: Bytes,
        content_type: &str,
        progress: Option<UploadProgress>,
    ) -> Result<StoredObject, AppError> {
        self.check_fault(FaultPoint::Upload).await?;
        let key = (bucket.to_string(), path.to_string());
        let size = data.len() as u64;
        {
            let mut objects = self.inner.objects.write().await;
            if objects.contains_key(&key) {
                return Err(AppError::Upload(format!("{bucket}/{path} already exists")));
            }
            if let Some(progress) = &progress {
                for chunk in data.chunks(64 * 1024) {
                    progress.advance(chunk.len() as u64);
                }
            }
            objects.insert(
                key,
                StoredBlob {
                    data,
                    content_type: content_type.to_string(),
                },
            );
        }
        if let Some(progress) = &progress {
            progress.finish();
        }
        Ok(StoredObject {
            bucket: bucket.to_string(),
            path: path.to_string(),
            public_url: self.public_url(bucket, path),
            size,
        })
    }

    async fn remove(&self, bucket: &str, paths: &[String]) -> Result<(), AppError> {
        self.check_fault(FaultPoint::RemoveObjects).await?;
        let mut objects = self.inner.objects.write().await;
        for path in paths {
            objects.remove(&(bucket.to_string(), path.clone()));
        }
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("memory://{bucket}/{path}")
    }
}

#[async_trait]
impl AuthGateway for InMemoryBackend {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        username: &str,
    ) -> Result<SignUpOutcome, AppError> {
        self.check_fault(FaultPoint::Auth).await?;
        let user = {
            let mut users = self.inner.users.lock().await;
            if users.contains_key(email) {
                return Err(AppError::remote_status(422, "User already registered"));
            }
            let user = UserRecord {
                id: uuid::Uuid::new_v4().to_string(),
                email: email.to_string(),
                password: password.to_string(),
            };
            users.insert(email.to_string(), user.clone());
            user
        };
        self.seed(
            "profiles",
            [json!({
                "id": user.id,
                "username": username,
                "followers_count": 0,
                "created_at": timestamp_value(&Utc::now()),
            })
            .as_object()
            .cloned()
            .unwrap_or_default()],
        )
        .await;

        if self.inner.require_confirmation.load(Ordering::SeqCst) {
            return Ok(SignUpOutcome::ConfirmationRequired(AuthUser {
                id: user.id,
                email: Some(user.email),
            }));
        }
        Ok(SignUpOutcome::SignedIn(self.session_for(&user).await))
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, AppError> {
        self.check_fault(FaultPoint::Auth).await?;
        let user = self
            .inner
            .users
            .lock()
            .await
            .get(email)
            .filter(|user| user.password == password)
            .cloned()
            .ok_or_else(|| AppError::remote(RemoteErrorKind::Auth, "Invalid login credentials"))?;
        Ok(self.session_for(&user).await)
    }

    async fn send_password_reset(
        &self,
        email: &str,
        _redirect_to: Option<String>,
    ) -> Result<(), AppError> {
        self.check_fault(FaultPoint::Auth).await?;
        self.inner
            .password_resets
            .lock()
            .await
            .push(email.to_string());
        Ok(())
    }

    async fn update_password(
        &self,
        access_token: &str,
        new_password: &str,
    ) -> Result<AuthUser, AppError> {
        self.check_fault(FaultPoint::Auth).await?;
        let user_id = self
            .inner
            .tokens
            .lock()
            .await
            .get(access_token)
            .cloned()
            .ok_or_else(|| AppError::remote(RemoteErrorKind::Auth, "Invalid token"))?;
        let mut users = self.inner.users.lock().await;
        let user = users
            .values_mut()
            .find(|user| user.id == user_id)
            .ok_or_else(|| AppError::remote(RemoteErrorKind::Auth, "User not found"))?;
        user.password = new_password.to_string();
        Ok(AuthUser {
            id: user.id.clone(),
            email: Some(user.email.clone()),
        })
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), AppError> {
        self.check_fault(FaultPoint::Auth).await?;
        self.inner.tokens.lock().await.remove(access_token);
        Ok(())
    }
}
