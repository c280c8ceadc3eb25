pub mod collection;
pub mod gateway;
pub mod kind;
pub mod listener;
pub mod profiles;
pub mod resource;
pub mod store;

pub use collection::{DedupPolicy, OptimisticCollection, UpsertOutcome};
pub use gateway::ResourceGateway;
pub use kind::ResourceKind;
pub use listener::{ChangeFeedListener, ListenerHandle, ListenerState, ReconnectPolicy};
pub use profiles::ProfileDirectory;
pub use resource::{DeleteRequest, ResourceOptions, SyncedResource};
pub use store::{ResourceState, ResourceStore};
