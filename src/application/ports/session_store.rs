use crate::domain::entities::AuthSession;
use async_trait::async_trait;

/// 認証セッションの保持先
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn current(&self) -> Option<AuthSession>;

    async fn store(&self, session: AuthSession);

    async fn clear(&self) -> Option<AuthSession>;
}
