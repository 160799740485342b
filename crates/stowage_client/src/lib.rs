//! # Stowage Client
//!
//! Client side of stowage: the [`Uploader`] that drives one multipart upload through an
//! [`UploadTransport`], the [`UploadQueue`] that runs several uploads one after another with
//! per-upload progress and cancellation, and the [`FolderTree`] used to browse the object store.
//!
//! [`HttpTransport`] implements both [`UploadTransport`] and [`CatalogClient`] against a running
//! stowage server.
//!
//! ## Example
//!
//! ```rust,ignore
//! use stowage_client::{HttpTransport, UploadFile, UploadQueue, Uploader};
//!
//! let transport = HttpTransport::new("http://localhost:13030")?;
//! let queue = UploadQueue::new(Uploader::new(transport));
//!
//! let id = queue.enqueue(UploadFile::from_path("video.mp4").await?.with_prefix("public/"));
//! queue.run().await;
//!
//! for done in queue.completed() {
//!     println!("{} -> {}", done.file_name, done.location);
//! }
//! ```
mod browse;
pub use browse::{breadcrumbs, Crumb, FolderTree, TreeNode, PREFETCH_LIMIT};

mod http;
pub use http::HttpTransport;

mod progress;
pub use progress::ProgressBoard;

mod queue;
pub use queue::{CompletedUpload, FailedUpload, UploadQueue};

mod source;
pub use source::{PartBody, UploadFile, DEFAULT_CONTENT_TYPE};

mod transport;
pub use transport::{CatalogClient, TransmitProgress, UploadTransport};

mod uploader;
pub use uploader::{ProgressFn, Uploader};

pub use tokio_util::sync::CancellationToken;
