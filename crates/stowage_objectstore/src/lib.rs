//! Storage backend implementations of the [`stowage_core::store`] traits.

mod config;
pub use config::Config;
mod errors;
pub use errors::{Error, Result};
mod memory;
pub use memory::MemoryStore;
pub(crate) mod s3;
pub use s3::S3Config;
pub use s3::S3;
