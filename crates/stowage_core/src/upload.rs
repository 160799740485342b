//! Value types passed between the upload orchestrator, the upload service and the storage
//! backend.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

/// Validity of a part upload target unless configured otherwise.
pub const DEFAULT_PART_URL_TTL: Duration = Duration::from_secs(3600);

/// Opaque multipart upload identifier issued by the storage backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque value the backend returns for every stored part (an S3 ETag). Required to assemble the
/// final object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IntegrityToken(String);

impl IntegrityToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IntegrityToken {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A part the backend has acknowledged, in the shape the completion request carries it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedPart {
    #[serde(rename = "PartNumber")]
    pub part_number: u32,
    #[serde(rename = "ETag")]
    pub e_tag: IntegrityToken,
}

/// Time-limited destination that accepts one part's bytes directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    pub url: String,
    pub expires_in: Duration,
}

/// Reference to an assembled object, returned verbatim to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectLocation(String);

impl ObjectLocation {
    pub fn new(location: impl Into<String>) -> Self {
        Self(location.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One in-flight multipart upload as seen by the client that drives it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    id: SessionId,
    key: String,
    content_type: String,
    parts: Vec<CompletedPart>,
}

impl UploadSession {
    pub fn new(id: SessionId, key: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            id,
            key: key.into(),
            content_type: content_type.into(),
            parts: Vec::new(),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn parts(&self) -> &[CompletedPart] {
        &self.parts
    }

    /// Number of the part expected next.
    pub fn next_part_number(&self) -> u32 {
        self.parts.len() as u32 + 1
    }

    /// Record an acknowledged part. Parts must arrive in sequence, starting at 1.
    pub fn record_part(&mut self, part_number: u32, e_tag: IntegrityToken) -> Result<()> {
        let expected = self.next_part_number();
        if part_number != expected {
            return Err(Error::Assembly(format!(
                "part {part_number} recorded while part {expected} was expected",
            )));
        }
        self.parts.push(CompletedPart {
            part_number,
            e_tag,
        });
        Ok(())
    }

    /// Consume the session, yielding the ordered part list for the completion request.
    pub fn into_parts(self) -> Vec<CompletedPart> {
        self.parts
    }
}

/// Check that a completion request lists at least one part, in strictly ascending order and
/// without duplicates.
pub fn validate_completion(parts: &[CompletedPart]) -> Result<()> {
    if parts.is_empty() {
        return Err(Error::validation("parts are required"));
    }
    if let Some(part) = parts.iter().find(|p| p.part_number == 0) {
        return Err(Error::Validation(format!(
            "invalid part number {}",
            part.part_number
        )));
    }
    if let Some(pair) = parts
        .windows(2)
        .find(|pair| pair[0].part_number >= pair[1].part_number)
    {
        return Err(Error::Assembly(format!(
            "part {} listed after part {}; parts must be in ascending order without duplicates",
            pair[1].part_number, pair[0].part_number,
        )));
    }
    Ok(())
}
