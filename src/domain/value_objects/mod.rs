pub mod item_id;
pub mod scope;

pub use item_id::{ItemId, TEMP_ID_PREFIX};
pub use scope::{Scope, ScopeKey};
