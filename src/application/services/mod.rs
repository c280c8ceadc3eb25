pub mod auth_service;
pub mod discovery_service;
pub mod feed_service;
pub mod story_service;

pub use auth_service::{AuthService, SignUpRequest};
pub use discovery_service::{DiscoveryService, DiscoverySnapshot};
pub use feed_service::{FeedCursor, FeedPage, FeedService};
pub use story_service::{MediaUpload, StoryDraft, StoryService};
