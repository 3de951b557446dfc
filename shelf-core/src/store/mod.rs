//! File store seam.
//!
//! Sessions never touch the filesystem directly; they go through a
//! [`FileStore`] which lists directories, reads files and renames
//! entries. [`LocalStore`] is the on-disk implementation.

pub mod local;

pub use local::LocalStore;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};

use crate::error::ShelfError;
use crate::protocol::ListingEntry;

/// One entry of a directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub size: u64,
    pub is_dir: bool,
}

impl DirEntry {
    /// Hidden entries start with `.`; they are left out of listings.
    pub fn is_hidden(&self) -> bool {
        self.name.starts_with('.')
    }
}

/// Directory primitives the protocol is built on.
///
/// Paths are `/`-separated and relative to the store root, exactly as
/// they travel in command arguments (e.g. `Docs/sub`).
#[async_trait]
pub trait FileStore: Send + Sync {
    /// All entries of `dir`, hidden ones included, sorted by name.
    async fn list_entries(&self, dir: &str) -> Result<Vec<DirEntry>, ShelfError>;

    /// Whole content of the file at `path`.
    async fn read_file(&self, path: &str) -> Result<Vec<u8>, ShelfError>;

    /// Rename `from` to `to` (both store paths).
    async fn rename_entry(&self, from: &str, to: &str) -> Result<(), ShelfError>;

    /// Non-hidden entries of `dir`.
    async fn visible_entries(&self, dir: &str) -> Result<Vec<DirEntry>, ShelfError> {
        let mut entries = self.list_entries(dir).await?;
        entries.retain(|e| !e.is_hidden());
        Ok(entries)
    }

    /// The entry of `dir` named exactly `name`, if any.
    async fn find_entry(&self, dir: &str, name: &str) -> Result<Option<DirEntry>, ShelfError> {
        let entries = self.list_entries(dir).await?;
        Ok(entries.into_iter().find(|e| e.name == name))
    }
}

/// Join a store directory and an entry name.
pub fn join(dir: &str, name: &str) -> String {
    let dir = dir.trim_end_matches('/');
    if dir.is_empty() || dir == "." {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

/// Parent of a store path, as a client computes it after a `back` reply.
///
/// `Docs/sub/deep` → `Docs/sub`; a single component is its own parent.
pub fn parent(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) if idx > 0 => &trimmed[..idx],
        _ => trimmed,
    }
}

/// Depth-first walk of `dir`, skipping hidden entries.
///
/// A subdirectory that cannot be read is logged and listed without
/// children; only a failure on `dir` itself is returned.
pub fn walk_tree<'a>(
    store: &'a dyn FileStore,
    dir: String,
) -> BoxFuture<'a, Result<Vec<ListingEntry>, ShelfError>> {
    async move {
        let mut out = Vec::new();
        for entry in store.visible_entries(&dir).await? {
            if entry.is_dir {
                let path = join(&dir, &entry.name);
                let children = match walk_tree(store, path.clone()).await {
                    Ok(children) => children,
                    Err(e) => {
                        tracing::warn!(path = %path, "cannot read subdirectory: {e}");
                        Vec::new()
                    }
                };
                out.push(ListingEntry::directory(entry.name, entry.size, children));
            } else {
                out.push(ListingEntry::file(entry.name, entry.size));
            }
        }
        Ok(out)
    }
    .boxed()
}
