pub mod config;
pub mod error;
pub mod validation;

pub use config::{AppConfig, DedupMode};
pub use error::{AppError, RemoteError, RemoteErrorKind, Result};
pub use validation::{ValidationErrors, ValidationFailureKind};
