//! Classification of stored objects into access classes by key path.

use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};
use crate::listing::display_name;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessClass {
    /// Mirrored on the CDN and served unsigned.
    Public,
    /// Served through short-lived signed URLs only.
    Gated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadType {
    Cdn,
    Presigned,
}

impl AccessClass {
    /// Classify a key by its path. Matching is case-insensitive: a key belongs to a class if it
    /// starts with `public/` (resp. `gated/`) or has a `public` (resp. `gated`) folder anywhere in
    /// its path. Public wins over gated. Any other key has no access class.
    pub fn classify(key: &str) -> Result<AccessClass> {
        let lower = key.to_lowercase();
        let in_folder = |folder: &str| {
            lower.starts_with(&format!("{folder}/")) || lower.contains(&format!("/{folder}/"))
        };

        if in_folder("public") {
            Ok(AccessClass::Public)
        } else if in_folder("gated") {
            Ok(AccessClass::Gated)
        } else {
            Err(Error::validation("file must be in public/ or gated/ folder"))
        }
    }

    pub fn download_type(&self) -> DownloadType {
        match self {
            AccessClass::Public => DownloadType::Cdn,
            AccessClass::Gated => DownloadType::Presigned,
        }
    }
}

/// Where and how an object can be downloaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadInfo {
    pub url: String,
    #[serde(rename = "type")]
    pub access_class: AccessClass,
    pub download_type: DownloadType,
}

/// CDN URL of a public object: the CDN base followed by the object's file name.
pub fn cdn_url(cdn_base_url: &str, key: &str) -> String {
    let base = cdn_base_url.trim_end_matches('/');
    format!("{base}/{}", display_name(key))
}
