pub mod comment;
pub mod message;
pub mod post;
pub mod presence;
pub mod profile;
pub mod session;
pub mod story;
pub mod synced_item;

pub use comment::Comment;
pub use message::{Message, MessageBody, MessageType};
pub use post::Post;
pub use presence::{Presence, PresenceStatus};
pub use profile::Profile;
pub use session::{AuthSession, AuthUser};
pub use story::{MediaType, Story};
pub use synced_item::{SyncPayload, SyncedItem};
