//! # Stowage Core
//!
//! Types shared by every part of stowage: the multipart upload value types, part planning, the
//! error taxonomy, and the [`store`] traits storage backends implement.
mod access;
pub use access::{cdn_url, AccessClass, DownloadInfo, DownloadType};

mod config;
pub use config::{DownloadConfig, MultipartConfig};

pub mod errors;
pub use errors::{Error, Result};

pub mod listing;
pub use listing::{FileEntry, FlatListing, Listing};

pub mod parts;
pub use parts::{percent_complete, Part, PartPolicy};

mod service;
pub use service::StorageService;

pub mod store;
pub use store::{MultipartStore, ObjectCatalog, StorageBackend};

mod upload;
pub use upload::{
    validate_completion, CompletedPart, IntegrityToken, ObjectLocation, SessionId,
    UploadSession, UploadTarget, DEFAULT_PART_URL_TTL,
};
