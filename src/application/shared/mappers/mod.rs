pub mod comments;
pub mod messages;
pub mod posts;
pub mod presence;
pub mod profiles;
pub mod row;
pub mod stories;

pub use comments::{decode_comment, encode_comment};
pub use messages::{decode_message, encode_message, encode_read_receipt};
pub use posts::decode_post;
pub use presence::{decode_presence, encode_presence};
pub use profiles::decode_profile;
pub use stories::{decode_story, encode_story, StoryRowDraft};
