//! The network operations the orchestrator and the folder browser depend on.
//!
//! [`HttpTransport`](crate::HttpTransport) implements both traits against a stowage server; tests
//! substitute in-process fakes.

use async_trait::async_trait;

use stowage_core::{
    CompletedPart, DownloadInfo, FlatListing, IntegrityToken, Listing, ObjectLocation, Part,
    Result, SessionId, UploadTarget,
};

use crate::source::PartBody;

/// Called with the number of bytes of the current part sent so far.
pub type TransmitProgress<'a> = &'a (dyn Fn(u64) + Send + Sync);

/// Multipart upload protocol as seen from the client.
#[async_trait]
pub trait UploadTransport: Send + Sync {
    async fn initiate(&self, key: &str, content_type: &str) -> Result<SessionId>;

    async fn authorize_part(
        &self,
        key: &str,
        session: &SessionId,
        part_number: u32,
    ) -> Result<UploadTarget>;

    /// Send one part's bytes to its upload target.
    ///
    /// Returns the integrity token the backend handed back for the part, or `None` if the
    /// backend accepted the bytes without one.
    async fn transmit(
        &self,
        target: &UploadTarget,
        part: &Part,
        body: PartBody,
        progress: TransmitProgress<'_>,
    ) -> Result<Option<IntegrityToken>>;

    async fn complete(
        &self,
        key: &str,
        session: &SessionId,
        parts: &[CompletedPart],
    ) -> Result<ObjectLocation>;

    async fn abort(&self, key: &str, session: &SessionId) -> Result<()>;
}

/// Folder listing and download resolution as seen from the client.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    async fn list(&self, prefix: &str) -> Result<Listing>;

    async fn list_flat(&self, prefix: &str) -> Result<FlatListing>;

    /// Create a folder, returning its normalized key.
    async fn create_folder(&self, key: &str) -> Result<String>;

    async fn download_info(&self, key: &str) -> Result<DownloadInfo>;

    async fn download_url(&self, key: &str) -> Result<String>;
}
