//! # Storage Abstractions
//!
//! Defines the interoperability layer between [`crate::StorageService`] (and through it the HTTP
//! surface in `stowage_http`) and storage backend implementations.
//!
//! ## Known Implementations
//!
//! ### stowage_objectstore::S3
//!
//! Delegates to the S3 multipart API. Part upload targets and download links are presigned URLs,
//! so part bytes never pass through the service.
//!
//! ### stowage_objectstore::MemoryStore
//!
//! Keeps objects and upload sessions in process memory. Used in tests.
use std::time::Duration;

use async_trait::async_trait;

use crate::errors::Result;
use crate::listing::{FlatListing, Listing};
use crate::upload::{CompletedPart, ObjectLocation, SessionId, UploadTarget};

/// Native multipart upload support of a storage backend.
///
/// Implementations hold no session state of their own beyond what the backend tracks, so every
/// method may be called concurrently from any number of requests.
#[async_trait]
pub trait MultipartStore: Send + Sync + 'static {
    /// Start a multipart upload of `key`.
    async fn initiate(&self, key: &str, content_type: &str) -> Result<SessionId>;

    /// Produce a destination that accepts the bytes of one part for `expires_in`.
    async fn authorize_part(
        &self,
        key: &str,
        session: &SessionId,
        part_number: u32,
        expires_in: Duration,
    ) -> Result<UploadTarget>;

    /// Assemble the object from its parts. The backend is free to reject parts that are out of
    /// order, duplicated or unknown with [`crate::Error::Assembly`].
    async fn complete(
        &self,
        key: &str,
        session: &SessionId,
        parts: &[CompletedPart],
    ) -> Result<ObjectLocation>;

    /// Release the session and any parts stored for it. Aborting a session that is already
    /// aborted or completed succeeds.
    async fn abort(&self, key: &str, session: &SessionId) -> Result<()>;
}

/// Browsing and download access to stored objects.
#[async_trait]
pub trait ObjectCatalog: Send + Sync + 'static {
    /// List one level below `prefix`.
    async fn list(&self, prefix: &str) -> Result<Listing>;

    /// List every file below `prefix`, following pagination until exhausted.
    async fn list_flat(&self, prefix: &str) -> Result<FlatListing>;

    /// Store a zero-byte object under `key`, which already ends in the delimiter.
    async fn put_folder_marker(&self, key: &str) -> Result<()>;

    /// Signed URL that downloads `key` as an attachment.
    async fn presign_download(&self, key: &str, expires_in: Duration) -> Result<String>;
}

/// Everything the service needs from a backend.
pub trait StorageBackend: MultipartStore + ObjectCatalog {}

impl<T: MultipartStore + ObjectCatalog> StorageBackend for T {}
