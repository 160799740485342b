//! Files queued for upload and the byte streams their parts are sent from.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use bytes::Bytes;
use futures::stream::{self, Stream};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

use stowage_core::{Error, Part, Result};

/// Content type sent when the caller does not know better.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Read buffer used when streaming a part, and the chunk size of in-memory parts. Every chunk is
/// one progress tick.
const CHUNK_SIZE: usize = 64 * 1024;

/// Bytes of exactly one part, streamed.
pub type PartBody = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send + Sync>>;

#[derive(Debug, Clone)]
enum FileSource {
    Path(PathBuf),
    Bytes(Bytes),
}

/// One file to upload: its target key, content type, size and where its bytes come from.
#[derive(Debug, Clone)]
pub struct UploadFile {
    name: String,
    content_type: String,
    size: u64,
    source: FileSource,
}

impl UploadFile {
    /// Upload a file from disk under its own file name.
    ///
    /// Only the file's metadata is read here; its content is streamed one part at a time during
    /// the upload.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| Error::Validation(format!("{} is not a file", path.display())))?;

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| Error::Validation(format!("cannot read {}: {e}", path.display())))?;
        if !metadata.is_file() {
            return Err(Error::Validation(format!("{} is not a file", path.display())));
        }

        Ok(Self {
            name,
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            size: metadata.len(),
            source: FileSource::Path(path.to_path_buf()),
        })
    }

    /// Upload in-memory bytes under `name`.
    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        Self {
            name: name.into(),
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            size: bytes.len() as u64,
            source: FileSource::Bytes(bytes),
        }
    }

    /// Place the file under `prefix`, the folder currently browsed.
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.name = format!("{prefix}{}", self.name);
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        let content_type = content_type.into();
        if !content_type.is_empty() {
            self.content_type = content_type;
        }
        self
    }

    /// Object key the file is uploaded to.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Open a stream over exactly the bytes of `part`.
    pub async fn part_body(&self, part: &Part) -> Result<PartBody> {
        if part.end() > self.size {
            return Err(Error::Validation(format!(
                "part {} ends at byte {} beyond the {} bytes of {}",
                part.number,
                part.end(),
                self.size,
                self.name,
            )));
        }

        match &self.source {
            FileSource::Bytes(bytes) => {
                let slice = bytes.slice(part.offset as usize..part.end() as usize);
                let chunks: Vec<std::io::Result<Bytes>> = (0..slice.len())
                    .step_by(CHUNK_SIZE)
                    .map(|start| Ok(slice.slice(start..slice.len().min(start + CHUNK_SIZE))))
                    .collect();
                Ok(Box::pin(stream::iter(chunks)))
            }
            FileSource::Path(path) => {
                let mut file = tokio::fs::File::open(path)
                    .await
                    .map_err(|e| Error::Transport(format!("opening {}: {e}", path.display())))?;
                file.seek(SeekFrom::Start(part.offset))
                    .await
                    .map_err(|e| Error::Transport(format!("seeking {}: {e}", path.display())))?;
                let reader = file.take(part.length);
                Ok(Box::pin(ReaderStream::with_capacity(reader, CHUNK_SIZE)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::TryStreamExt;
    use tokio::io::AsyncWriteExt;

    use stowage_core::PartPolicy;

    use super::*;

    async fn collect(body: PartBody) -> Vec<u8> {
        let chunks: Vec<Bytes> = body.try_collect().await.unwrap();
        chunks.concat()
    }

    fn policy(part_size: u64) -> PartPolicy {
        PartPolicy {
            part_size,
            min_part_size: 1,
            ..PartPolicy::default()
        }
    }

    #[tokio::test]
    async fn in_memory_parts_cover_the_file() {
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let file = UploadFile::from_bytes("blob.bin", data.clone());
        let parts = policy(90_000).plan(file.size()).unwrap();

        let mut joined = Vec::new();
        for part in &parts {
            let bytes = collect(file.part_body(part).await.unwrap()).await;
            assert_eq!(bytes.len() as u64, part.length);
            joined.extend(bytes);
        }
        assert_eq!(joined, data);
    }

    #[tokio::test]
    async fn disk_parts_read_only_their_range() {
        let dir = std::env::temp_dir().join(format!("stowage-source-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("report.csv");
        let mut f = tokio::fs::File::create(&path).await.unwrap();
        f.write_all(b"0123456789abcdefghij").await.unwrap();
        f.flush().await.unwrap();

        let file = UploadFile::from_path(&path)
            .await
            .unwrap()
            .with_prefix("reports/")
            .with_content_type("text/csv");
        assert_eq!(file.name(), "reports/report.csv");
        assert_eq!(file.content_type(), "text/csv");
        assert_eq!(file.size(), 20);

        let parts = policy(8).plan(file.size()).unwrap();
        let mut read = Vec::new();
        for part in &parts {
            read.push(collect(file.part_body(part).await.unwrap()).await);
        }
        assert_eq!(
            read,
            vec![b"01234567".to_vec(), b"89abcdef".to_vec(), b"ghij".to_vec()]
        );

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn missing_files_are_rejected() {
        let err = UploadFile::from_path("/definitely/not/here.bin")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn empty_content_type_keeps_the_default() {
        let file = UploadFile::from_bytes("a", "x").with_content_type("");
        assert_eq!(file.content_type(), DEFAULT_CONTENT_TYPE);
    }
}
