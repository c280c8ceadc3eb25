pub mod comments;
pub mod messages;
pub mod presence;

pub use comments::{CommentKind, CommentPatch, CommentThread};
pub use messages::{Conversation, MessageKind, MessagePatch};
pub use presence::{PresenceBoard, PresenceKind};
