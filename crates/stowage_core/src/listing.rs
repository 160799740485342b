use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

/// Separator between folder levels in object keys.
pub const DELIMITER: char = '/';

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// One level of the folder hierarchy below a prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    /// Immediate subfolders, each a prefix ending in [`DELIMITER`].
    pub folders: Vec<String>,
    pub files: Vec<FileEntry>,
}

impl Listing {
    pub fn len(&self) -> usize {
        self.folders.len() + self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Every file below a prefix, at any depth.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatListing {
    pub files: Vec<FileEntry>,
}

/// Folder keys always end in the delimiter; `reports/2024` and `reports/2024/` name the same
/// folder.
pub fn normalize_folder_key(key: &str) -> Result<String> {
    if key.is_empty() || key.chars().all(|c| c == DELIMITER) {
        return Err(Error::validation("missing folder key"));
    }
    if key.ends_with(DELIMITER) {
        Ok(key.to_string())
    } else {
        Ok(format!("{key}{DELIMITER}"))
    }
}

/// Whether a key is a zero-byte folder marker rather than a file.
pub fn is_folder_marker(key: &str) -> bool {
    key.ends_with(DELIMITER)
}

/// Last path segment of a key, ignoring a trailing delimiter.
pub fn display_name(key: &str) -> &str {
    key.trim_end_matches(DELIMITER)
        .rsplit(DELIMITER)
        .next()
        .unwrap_or(key)
}

#[cfg(test)]
mod tests {
    use rstest::*;

    use super::*;

    #[rstest]
    #[case("reports/2024", "reports/2024/")]
    #[case("reports/2024/", "reports/2024/")]
    #[case("top", "top/")]
    fn folder_keys_are_normalized(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize_folder_key(input).unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("/")]
    fn missing_folder_key(#[case] input: &str) {
        assert!(matches!(
            normalize_folder_key(input),
            Err(Error::Validation(_))
        ));
    }

    #[rstest]
    #[case("reports/2024/", "2024")]
    #[case("reports/2024/q1.csv", "q1.csv")]
    #[case("readme.md", "readme.md")]
    fn display_names(#[case] key: &str, #[case] expected: &str) {
        assert_eq!(display_name(key), expected);
    }

    #[test]
    fn file_entry_wire_format() {
        let entry = FileEntry {
            key: "a/b.txt".to_string(),
            size: 12,
            last_modified: None,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"key": "a/b.txt", "size": 12, "lastModified": null})
        );
    }
}
