pub mod entities;
pub mod value_objects;

pub use entities::{SyncPayload, SyncedItem};
pub use value_objects::{ItemId, Scope};
