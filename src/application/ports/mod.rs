pub mod auth_gateway;
pub mod object_storage;
pub mod remote_gateway;
pub mod session_store;

pub use auth_gateway::{AuthGateway, SignUpOutcome};
pub use object_storage::{ObjectStorage, StoredObject, UploadProgress, UploadState};
pub use remote_gateway::{
    ChangeEvent, ChangeFilter, ChangeKind, Filter, Order, RemoteDataGateway, Row, RowQuery,
    Subscription,
};
pub use session_store::SessionStore;
