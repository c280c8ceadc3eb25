use crate::application::ports::SessionStore;
use crate::domain::entities::AuthSession;
use async_trait::async_trait;
use tokio::sync::RwLock;

/// プロセス内のみで保持するセッション
#[derive(Default)]
pub struct MemorySessionStore {
    session: RwLock<Option<AuthSession>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn current(&self) -> Option<AuthSession> {
        self.session.read().await.clone()
    }

    async fn store(&self, session: AuthSession) {
        *self.session.write().await = Some(session);
    }

    async fn clear(&self) -> Option<AuthSession> {
        self.session.write().await.take()
    }
}
