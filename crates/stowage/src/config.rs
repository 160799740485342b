use serde::Deserialize;

use stowage_core::{DownloadConfig, MultipartConfig};

fn default_listen() -> String {
    String::from("0.0.0.0:13030")
}

#[derive(Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen")]
    pub listen: String,
    pub backend: stowage_objectstore::Config,
    pub downloads: DownloadConfig,
    #[serde(default)]
    pub multipart: MultipartConfig,
}
