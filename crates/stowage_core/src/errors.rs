use thiserror;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure taxonomy shared by the upload service, its storage backends and the client-side
/// orchestrator.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A required field is missing or malformed. Always caused by the caller and always detected
    /// before the storage backend is contacted.
    #[error("validation error: {0}")]
    Validation(String),

    /// Network failure or non-2xx response while moving part bytes.
    #[error("transport error: {0}")]
    Transport(String),

    /// The backend accepted a part but did not hand back its integrity token.
    #[error("missing integrity token for part {0}")]
    Integrity(u32),

    /// The backend refused to assemble the object from the given parts.
    #[error("assembly error: {0}")]
    Assembly(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("upload cancelled")]
    Cancelled,
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Whether the error was caused by the request rather than by the service or the network.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::Validation(_) | Error::Assembly(_))
    }
}
