//! Splitting a file into the contiguous byte ranges uploaded as one multipart upload.

use crate::errors::{Error, Result};

const MIB: u64 = 1024 * 1024;

/// Part size used when none is configured.
pub const DEFAULT_PART_SIZE: u64 = 500 * MIB;

/// Smallest part S3 accepts, except for the final part of an upload.
pub const S3_MIN_PART_SIZE: u64 = 5 * MIB;

/// Largest part S3 accepts.
pub const S3_MAX_PART_SIZE: u64 = 5 * 1024 * MIB;

/// Largest number of parts in a single S3 multipart upload.
pub const S3_MAX_PARTS: u32 = 10_000;

/// One contiguous byte range of the source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Part {
    /// 1-based sequence number.
    pub number: u32,
    pub offset: u64,
    pub length: u64,
}

impl Part {
    /// Offset one past the last byte of this part.
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// Part size together with the limits the storage backend imposes on multipart uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartPolicy {
    pub part_size: u64,
    pub min_part_size: u64,
    pub max_part_size: u64,
    pub max_parts: u32,
}

impl Default for PartPolicy {
    fn default() -> Self {
        Self {
            part_size: DEFAULT_PART_SIZE,
            min_part_size: S3_MIN_PART_SIZE,
            max_part_size: S3_MAX_PART_SIZE,
            max_parts: S3_MAX_PARTS,
        }
    }
}

impl PartPolicy {
    pub fn with_part_size(part_size: u64) -> Self {
        Self {
            part_size,
            ..Self::default()
        }
    }

    /// Number of parts a file of `size` bytes is split into.
    pub fn part_count(&self, size: u64) -> u64 {
        if self.part_size == 0 {
            return 0;
        }
        size.div_ceil(self.part_size)
    }

    /// Split a file of `size` bytes into parts.
    ///
    /// Every part except the last is exactly `part_size` long, numbering starts at 1 and has no
    /// gaps, and the part lengths add up to `size`. Empty files and plans the backend would refuse
    /// are rejected before anything is sent anywhere.
    pub fn plan(&self, size: u64) -> Result<Vec<Part>> {
        if size == 0 {
            return Err(Error::validation(
                "empty files are not supported for multipart upload",
            ));
        }
        if self.part_size < self.min_part_size || self.part_size > self.max_part_size {
            return Err(Error::Validation(format!(
                "part size {} outside backend limits [{}, {}]",
                self.part_size, self.min_part_size, self.max_part_size,
            )));
        }

        let count = self.part_count(size);
        if count > u64::from(self.max_parts) {
            return Err(Error::Validation(format!(
                "file of {size} bytes needs {count} parts of {} bytes, backend allows at most {}",
                self.part_size, self.max_parts,
            )));
        }

        let parts = (0..count)
            .map(|i| {
                let offset = i * self.part_size;
                Part {
                    number: (i + 1) as u32,
                    offset,
                    length: self.part_size.min(size - offset),
                }
            })
            .collect();
        Ok(parts)
    }
}

/// Overall completion of an upload as a whole percentage, rounded half up and clamped to
/// `0..=100`.
pub fn percent_complete(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let done = u128::from(done.min(total));
    let total = u128::from(total);
    ((200 * done + total) / (2 * total)) as u8
}
