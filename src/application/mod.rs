pub mod ports;
pub mod resources;
pub mod services;
pub mod shared;
pub mod sync;
