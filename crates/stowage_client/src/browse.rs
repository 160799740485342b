//! Lazily loaded view of the folder hierarchy.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use stowage_core::listing::display_name;
use stowage_core::{FileEntry, Listing};

use crate::transport::CatalogClient;

/// Most subfolders whose child counts are fetched by one [`FolderTree::prefetch_counts`] call.
pub const PREFETCH_LIMIT: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeNode {
    Folder {
        key: String,
        name: String,
        /// Number of direct children, once known.
        child_count: Option<usize>,
    },
    File {
        name: String,
        entry: FileEntry,
    },
}

impl TreeNode {
    pub fn key(&self) -> &str {
        match self {
            TreeNode::Folder { key, .. } => key,
            TreeNode::File { entry, .. } => &entry.key,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            TreeNode::Folder { name, .. } | TreeNode::File { name, .. } => name,
        }
    }

    pub fn is_folder(&self) -> bool {
        matches!(self, TreeNode::Folder { .. })
    }
}

/// One step of the path from the root to a folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Crumb {
    pub name: String,
    pub prefix: String,
}

/// Split a folder prefix into the folders leading up to it, outermost first.
pub fn breadcrumbs(prefix: &str) -> Vec<Crumb> {
    let mut crumbs = Vec::new();
    let mut path = String::new();
    for segment in prefix.split('/').filter(|s| !s.is_empty()) {
        path.push_str(segment);
        path.push('/');
        crumbs.push(Crumb {
            name: segment.to_string(),
            prefix: path.clone(),
        });
    }
    crumbs
}

#[derive(Default)]
struct TreeState {
    listings: HashMap<String, Listing>,
    counts: HashMap<String, usize>,
    /// Folders whose count could not be fetched; not retried.
    uncountable: HashSet<String>,
}

/// Folder hierarchy fetched one level at a time. The children of a folder are fetched at most
/// once and cached for the life of the tree.
pub struct FolderTree<C> {
    catalog: C,
    state: Mutex<TreeState>,
}

impl<C: CatalogClient> FolderTree<C> {
    pub fn new(catalog: C) -> Self {
        Self {
            catalog,
            state: Mutex::new(TreeState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, TreeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    fn nodes(&self, listing: &Listing) -> Vec<TreeNode> {
        let state = self.state();
        let folders = listing.folders.iter().map(|key| TreeNode::Folder {
            key: key.clone(),
            name: display_name(key).to_string(),
            child_count: state.counts.get(key).copied(),
        });
        let files = listing.files.iter().map(|entry| TreeNode::File {
            name: display_name(&entry.key).to_string(),
            entry: entry.clone(),
        });
        folders.chain(files).collect()
    }

    async fn fetch(&self, folder: &str) -> stowage_core::Result<Listing> {
        let cached = self.state().listings.get(folder).cloned();
        if let Some(listing) = cached {
            return Ok(listing);
        }
        let listing = self.catalog.list(folder).await?;
        let mut state = self.state();
        state.counts.insert(folder.to_string(), listing.len());
        state
            .listings
            .entry(folder.to_string())
            .or_insert(listing.clone());
        Ok(listing)
    }

    /// Children of `folder` (`""` for the root), folders first.
    ///
    /// A failed listing is logged and yields no children; it is not cached, so the next call
    /// tries again.
    pub async fn children(&self, folder: &str) -> Vec<TreeNode> {
        match self.fetch(folder).await {
            Ok(listing) => self.nodes(&listing),
            Err(e) => {
                tracing::warn!("failed to list folder {folder:?}: {e}");
                Vec::new()
            }
        }
    }

    /// Fetch the children of up to [`PREFETCH_LIMIT`] subfolders of `folder` whose child count
    /// is not yet known, so the next [`FolderTree::children`] call can show their counts.
    /// Failures are logged and skipped. Returns the number of counts fetched.
    pub async fn prefetch_counts(&self, folder: &str) -> usize {
        let listing = match self.fetch(folder).await {
            Ok(listing) => listing,
            Err(e) => {
                tracing::warn!("failed to list folder {folder:?}: {e}");
                return 0;
            }
        };

        let todo: Vec<String> = {
            let state = self.state();
            listing
                .folders
                .iter()
                .filter(|key| !state.counts.contains_key(*key))
                .filter(|key| !state.uncountable.contains(*key))
                .take(PREFETCH_LIMIT)
                .cloned()
                .collect()
        };

        let mut fetched = 0;
        for key in todo {
            match self.fetch(&key).await {
                Ok(_) => fetched += 1,
                Err(e) => {
                    tracing::warn!("failed to count children of {key:?}: {e}");
                    self.state().uncountable.insert(key);
                }
            }
        }
        fetched
    }

    /// Drop every cached listing, e.g. after creating a folder or uploading a file.
    pub fn invalidate(&self) {
        let mut state = self.state();
        state.listings.clear();
        state.counts.clear();
        state.uncountable.clear();
    }
}
