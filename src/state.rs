use crate::application::ports::{AuthGateway, ObjectStorage, RemoteDataGateway, SessionStore};
use crate::application::resources::{CommentThread, Conversation, PresenceBoard};
use crate::application::services::{AuthService, DiscoveryService, FeedService, StoryService};
use crate::application::sync::{ProfileDirectory, ResourceOptions};
use crate::infrastructure::backend::HostedBackend;
use crate::infrastructure::memory::InMemoryBackend;
use crate::infrastructure::session_store::MemorySessionStore;
use crate::shared::config::AppConfig;
use crate::shared::error::AppError;
use std::sync::Arc;
use std::time::Duration;

/// アプリケーション全体の状態を管理する構造体
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub remote: Arc<dyn RemoteDataGateway>,
    pub storage: Arc<dyn ObjectStorage>,
    pub profiles: Arc<ProfileDirectory>,
    pub auth: Arc<AuthService>,
    pub stories: Arc<StoryService>,
    pub feed: Arc<FeedService>,
    pub discovery: Arc<DiscoveryService>,
}

impl AppState {
    /// Wires every service against the hosted backend.
    pub fn connect(config: AppConfig) -> Result<Self, AppError> {
        config.validate()?;
        let sessions: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
        let backend = HostedBackend::connect(&config, Arc::clone(&sessions))?;
        Ok(Self::assemble(
            config,
            backend.rows,
            backend.storage,
            backend.auth,
            sessions,
        ))
    }

    /// Same wiring over an in-process backend.
    pub fn in_memory(config: AppConfig, backend: InMemoryBackend) -> Self {
        let backend = Arc::new(backend);
        Self::assemble(
            config,
            backend.clone(),
            backend.clone(),
            backend,
            Arc::new(MemorySessionStore::new()),
        )
    }

    fn assemble(
        config: AppConfig,
        remote: Arc<dyn RemoteDataGateway>,
        storage: Arc<dyn ObjectStorage>,
        auth: Arc<dyn AuthGateway>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        let timeout = config.mutation_timeout();
        let profiles = Arc::new(ProfileDirectory::new(
            Arc::clone(&remote),
            config.cache.profile_capacity,
        ));
        let stories = StoryService::new(
            Arc::clone(&remote),
            Arc::clone(&storage),
            config.storage.story_bucket.clone(),
            timeout,
        );
        let discovery = DiscoveryService::new(
            Arc::clone(&remote),
            Duration::from_secs(config.cache.discovery_ttl),
            timeout,
        );
        Self {
            auth: Arc::new(AuthService::new(auth, sessions)),
            stories: Arc::new(stories),
            feed: Arc::new(FeedService::new(Arc::clone(&remote), timeout)),
            discovery: Arc::new(discovery),
            profiles,
            remote,
            storage,
            config: Arc::new(config),
        }
    }

    pub fn resource_options(&self) -> ResourceOptions {
        ResourceOptions::from_config(&self.config)
    }

    pub async fn open_comments(&self, post_id: &str) -> Result<CommentThread, AppError> {
        CommentThread::open(
            Arc::clone(&self.remote),
            Arc::clone(&self.profiles),
            post_id,
            self.resource_options(),
        )
        .await
    }

    pub async fn open_conversation(&self, conversation_id: &str) -> Result<Conversation, AppError> {
        Conversation::open(
            Arc::clone(&self.remote),
            Arc::clone(&self.storage),
            Arc::clone(&self.profiles),
            conversation_id,
            self.config.storage.message_image_bucket.clone(),
            self.resource_options(),
        )
        .await
    }

    pub async fn open_presence<I, S>(&self, user_ids: I) -> Result<PresenceBoard, AppError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        PresenceBoard::open(
            Arc::clone(&self.remote),
            Arc::clone(&self.profiles),
            user_ids,
            self.resource_options(),
        )
        .await
    }
}
