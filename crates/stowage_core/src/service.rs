use std::sync::Arc;

use crate::access::{cdn_url, AccessClass, DownloadInfo};
use crate::config::{DownloadConfig, MultipartConfig};
use crate::errors::{Error, Result};
use crate::listing::{normalize_folder_key, FlatListing, Listing};
use crate::parts::S3_MAX_PARTS;
use crate::store::StorageBackend;
use crate::upload::{validate_completion, CompletedPart, ObjectLocation, SessionId, UploadTarget};

/// Stateless façade over a [`StorageBackend`].
///
/// Every operation validates its arguments before the backend is contacted, so a
/// [`Error::Validation`] always means nothing was sent.
#[derive(Clone)]
pub struct StorageService {
    backend: Arc<dyn StorageBackend>,
    multipart: MultipartConfig,
    downloads: DownloadConfig,
}

fn require<'a>(value: Option<&'a str>, name: &'static str) -> Result<&'a str> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(Error::Validation(format!("{name} is required"))),
    }
}

impl StorageService {
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        multipart: MultipartConfig,
        downloads: DownloadConfig,
    ) -> Self {
        Self {
            backend,
            multipart,
            downloads,
        }
    }

    pub async fn initiate(
        &self,
        key: Option<&str>,
        content_type: Option<&str>,
    ) -> Result<SessionId> {
        let key = require(key, "fileName")?;
        let content_type = require(content_type, "fileType")?;
        let session = self.backend.initiate(key, content_type).await?;
        tracing::debug!(key, %session, "initiated multipart upload");
        Ok(session)
    }

    /// `part_number` is taken as the raw path segment so that anything other than a positive
    /// integer within the backend's part limit is a validation error.
    pub async fn authorize_part(
        &self,
        key: Option<&str>,
        session: Option<&str>,
        part_number: Option<&str>,
    ) -> Result<UploadTarget> {
        let key = require(key, "fileName")?;
        let session = SessionId::new(require(session, "uploadId")?);
        let raw = require(part_number, "partNumber")?;
        let part_number = match raw.parse::<u32>() {
            Ok(n) if (1..=S3_MAX_PARTS).contains(&n) => n,
            _ => {
                return Err(Error::Validation(format!(
                    "partNumber must be an integer between 1 and {S3_MAX_PARTS}, got {raw:?}"
                )))
            }
        };
        self.backend
            .authorize_part(key, &session, part_number, self.multipart.part_url_ttl())
            .await
    }

    pub async fn complete(
        &self,
        key: Option<&str>,
        session: Option<&str>,
        parts: Option<&[CompletedPart]>,
    ) -> Result<ObjectLocation> {
        let key = require(key, "fileName")?;
        let session = SessionId::new(require(session, "uploadId")?);
        let parts = parts.ok_or_else(|| Error::validation("parts are required"))?;
        validate_completion(parts)?;
        let location = self.backend.complete(key, &session, parts).await?;
        tracing::info!(key, %session, parts = parts.len(), "completed multipart upload");
        Ok(location)
    }

    pub async fn abort(&self, key: Option<&str>, session: Option<&str>) -> Result<()> {
        let key = require(key, "fileName")?;
        let session = SessionId::new(require(session, "uploadId")?);
        self.backend.abort(key, &session).await?;
        tracing::info!(key, %session, "aborted multipart upload");
        Ok(())
    }

    pub async fn list(&self, prefix: &str) -> Result<Listing> {
        self.backend.list(prefix).await
    }

    pub async fn list_flat(&self, prefix: &str) -> Result<FlatListing> {
        self.backend.list_flat(prefix).await
    }

    /// Create a folder, returning its normalized key.
    pub async fn create_folder(&self, key: Option<&str>) -> Result<String> {
        let key = normalize_folder_key(key.unwrap_or_default())?;
        self.backend.put_folder_marker(&key).await?;
        Ok(key)
    }

    pub async fn download_url(&self, key: &str) -> Result<String> {
        let key = require(Some(key), "key")?;
        self.backend
            .presign_download(key, self.downloads.url_ttl())
            .await
    }

    /// Public objects come from the CDN mirror, gated ones through a signed URL. Keys in neither
    /// class are refused.
    pub async fn resolve_download(&self, key: &str) -> Result<DownloadInfo> {
        let key = require(Some(key), "key")?;
        let access_class = AccessClass::classify(key)?;
        let url = match access_class {
            AccessClass::Public => cdn_url(&self.downloads.cdn_base_url, key),
            AccessClass::Gated => {
                self.backend
                    .presign_download(key, self.downloads.url_ttl())
                    .await?
            }
        };
        Ok(DownloadInfo {
            url,
            access_class,
            download_type: access_class.download_type(),
        })
    }
}
