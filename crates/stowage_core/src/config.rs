use std::time::Duration;

use serde::Deserialize;

const DEFAULT_TTL_SECS: u64 = 3600;

fn default_ttl_secs() -> u64 {
    DEFAULT_TTL_SECS
}

/// How download links are handed out.
#[derive(Clone, Debug, Deserialize)]
pub struct DownloadConfig {
    /// Base URL of the CDN mirror serving `public/` objects. The object's file name is appended
    /// to it.
    pub cdn_base_url: String,
    /// Validity of signed download URLs.
    #[serde(default = "default_ttl_secs")]
    pub url_ttl_secs: u64,
}

impl DownloadConfig {
    pub fn url_ttl(&self) -> Duration {
        Duration::from_secs(self.url_ttl_secs)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct MultipartConfig {
    /// Validity of part upload targets.
    #[serde(default = "default_ttl_secs")]
    pub part_url_ttl_secs: u64,
}

impl Default for MultipartConfig {
    fn default() -> Self {
        Self {
            part_url_ttl_secs: DEFAULT_TTL_SECS,
        }
    }
}

impl MultipartConfig {
    pub fn part_url_ttl(&self) -> Duration {
        Duration::from_secs(self.part_url_ttl_secs)
    }
}
