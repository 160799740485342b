use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use stowage_core::listing::{is_folder_marker, DELIMITER};
use stowage_core::{
    validate_completion, CompletedPart, FileEntry, FlatListing, IntegrityToken, Listing,
    MultipartStore, ObjectCatalog, ObjectLocation, SessionId, UploadTarget,
};

use super::errors::Error;

struct StoredObject {
    data: Bytes,
    content_type: Option<String>,
    last_modified: DateTime<Utc>,
}

struct PendingUpload {
    key: String,
    content_type: String,
    parts: BTreeMap<u32, (IntegrityToken, Bytes)>,
}

#[derive(Default)]
struct Inner {
    objects: BTreeMap<String, StoredObject>,
    uploads: HashMap<SessionId, PendingUpload>,
}

/// Backend that keeps objects and multipart sessions in process memory.
///
/// Part upload targets are `memory://` URLs; the bytes a client would PUT there are handed over
/// with [`MemoryStore::put_part`] instead.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Store the bytes of one part, as the holder of an upload target would.
    pub fn put_part(
        &self,
        session: &SessionId,
        part_number: u32,
        data: Bytes,
    ) -> stowage_core::Result<IntegrityToken> {
        let mut inner = self.lock();
        let upload = inner
            .uploads
            .get_mut(session)
            .ok_or_else(|| Error::NoSuchUpload(session.to_string()))?;
        let e_tag = IntegrityToken::new(format!("\"{}\"", Uuid::new_v4().simple()));
        upload.parts.insert(part_number, (e_tag.clone(), data));
        Ok(e_tag)
    }

    /// Store a complete object directly.
    pub fn put_object(&self, key: &str, data: impl Into<Bytes>) {
        self.lock().objects.insert(
            key.to_string(),
            StoredObject {
                data: data.into(),
                content_type: None,
                last_modified: Utc::now(),
            },
        );
    }

    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.lock().objects.get(key).map(|o| o.data.clone())
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.lock()
            .objects
            .get(key)
            .and_then(|o| o.content_type.clone())
    }

    /// Number of multipart uploads neither completed nor aborted.
    pub fn pending_uploads(&self) -> usize {
        self.lock().uploads.len()
    }

    fn entry(key: &str, object: &StoredObject) -> FileEntry {
        FileEntry {
            key: key.to_string(),
            size: object.data.len() as u64,
            last_modified: Some(object.last_modified),
        }
    }
}

#[async_trait]
impl MultipartStore for MemoryStore {
    async fn initiate(&self, key: &str, content_type: &str) -> stowage_core::Result<SessionId> {
        let session = SessionId::new(Uuid::new_v4().to_string());
        self.lock().uploads.insert(
            session.clone(),
            PendingUpload {
                key: key.to_string(),
                content_type: content_type.to_string(),
                parts: BTreeMap::new(),
            },
        );
        Ok(session)
    }

    async fn authorize_part(
        &self,
        key: &str,
        session: &SessionId,
        part_number: u32,
        expires_in: Duration,
    ) -> stowage_core::Result<UploadTarget> {
        Ok(UploadTarget {
            url: format!(
                "memory:///{key}?uploadId={session}&partNumber={part_number}&expires={}",
                expires_in.as_secs()
            ),
            expires_in,
        })
    }

    async fn complete(
        &self,
        key: &str,
        session: &SessionId,
        parts: &[CompletedPart],
    ) -> stowage_core::Result<ObjectLocation> {
        validate_completion(parts)?;

        let mut inner = self.lock();
        let upload = match inner.uploads.get(session) {
            Some(upload) if upload.key == key => upload,
            _ => return Err(Error::NoSuchUpload(session.to_string()).into()),
        };

        let mut data = BytesMut::new();
        for part in parts {
            match upload.parts.get(&part.part_number) {
                Some((e_tag, bytes)) if *e_tag == part.e_tag => data.extend_from_slice(bytes),
                _ => {
                    return Err(Error::InvalidPart(format!(
                        "part {} with etag {} was not uploaded",
                        part.part_number, part.e_tag,
                    ))
                    .into())
                }
            }
        }

        let content_type = upload.content_type.clone();
        inner.uploads.remove(session);
        inner.objects.insert(
            key.to_string(),
            StoredObject {
                data: data.freeze(),
                content_type: Some(content_type),
                last_modified: Utc::now(),
            },
        );
        Ok(ObjectLocation::new(format!("memory:///{key}")))
    }

    async fn abort(&self, _key: &str, session: &SessionId) -> stowage_core::Result<()> {
        self.lock().uploads.remove(session);
        Ok(())
    }
}

#[async_trait]
impl ObjectCatalog for MemoryStore {
    async fn list(&self, prefix: &str) -> stowage_core::Result<Listing> {
        let inner = self.lock();
        let mut folders = BTreeSet::new();
        let mut files = Vec::new();

        for (key, object) in inner.objects.range(prefix.to_string()..) {
            let Some(rest) = key.strip_prefix(prefix) else {
                break;
            };
            match rest.find(DELIMITER) {
                Some(i) => {
                    folders.insert(format!("{prefix}{}", &rest[..=i]));
                }
                None if !rest.is_empty() => files.push(Self::entry(key, object)),
                None => (),
            }
        }

        Ok(Listing {
            folders: folders.into_iter().collect(),
            files,
        })
    }

    async fn list_flat(&self, prefix: &str) -> stowage_core::Result<FlatListing> {
        let inner = self.lock();
        let files = inner
            .objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .filter(|(key, _)| !is_folder_marker(key))
            .map(|(key, object)| Self::entry(key, object))
            .collect();
        Ok(FlatListing { files })
    }

    async fn put_folder_marker(&self, key: &str) -> stowage_core::Result<()> {
        self.put_object(key, Bytes::new());
        Ok(())
    }

    async fn presign_download(
        &self,
        key: &str,
        expires_in: Duration,
    ) -> stowage_core::Result<String> {
        Ok(format!(
            "memory:///{key}?disposition=attachment&expires={}",
            expires_in.as_secs()
        ))
    }
}
