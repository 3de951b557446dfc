use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use crate::error::ShelfError;
use crate::store::{DirEntry, FileStore};

/// [`FileStore`] backed by a directory on the local filesystem.
///
/// Store paths are resolved below `base`; absolute paths and `..`
/// components are refused.
#[derive(Debug, Clone)]
pub struct LocalStore {
    base: PathBuf,
}

impl LocalStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    fn resolve(&self, rel: &str) -> Result<PathBuf, ShelfError> {
        let mut path = self.base.clone();
        for component in Path::new(rel).components() {
            match component {
                Component::Normal(part) => path.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(ShelfError::InvalidPath(rel.to_string()));
                }
            }
        }
        Ok(path)
    }
}

#[async_trait]
impl FileStore for LocalStore {
    async fn list_entries(&self, dir: &str) -> Result<Vec<DirEntry>, ShelfError> {
        let path = self.resolve(dir)?;
        let mut reader = tokio::fs::read_dir(&path)
            .await
            .map_err(|e| ShelfError::store(&path, e))?;

        let mut entries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| ShelfError::store(&path, e))?
        {
            let metadata = entry
                .metadata()
                .await
                .map_err(|e| ShelfError::store(entry.path(), e))?;
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                size: metadata.len(),
                is_dir: metadata.is_dir(),
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>, ShelfError> {
        let path = self.resolve(path)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| ShelfError::store(&path, e))
    }

    async fn rename_entry(&self, from: &str, to: &str) -> Result<(), ShelfError> {
        let from = self.resolve(from)?;
        let to = self.resolve(to)?;
        tokio::fs::rename(&from, &to)
            .await
            .map_err(|e| ShelfError::store(&from, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::walk_tree;

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let docs = dir.path().join("Docs");
        std::fs::create_dir_all(docs.join("sub")).unwrap();
        std::fs::write(docs.join("a.txt"), b"0123456789").unwrap();
        std::fs::write(docs.join(".secret"), b"x").unwrap();
        std::fs::write(docs.join("sub").join("b.txt"), b"bbbbb").unwrap();
        std::fs::write(docs.join("sub").join(".hidden"), b"h").unwrap();
        dir
    }

    #[tokio::test]
    async fn lists_sorted_entries_with_sizes() {
        let dir = fixture();
        let store = LocalStore::new(dir.path());

        let entries = store.list_entries("Docs").await.unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec![".secret", "a.txt", "sub"]);
        assert_eq!(entries[1].size, 10);
        assert!(entries[2].is_dir);

        let visible = store.visible_entries("Docs").await.unwrap();
        assert_eq!(visible.len(), 2);
    }

    #[tokio::test]
    async fn read_and_rename() {
        let dir = fixture();
        let store = LocalStore::new(dir.path());

        assert_eq!(store.read_file("Docs/a.txt").await.unwrap(), b"0123456789");

        store.rename_entry("Docs/a.txt", "Docs/.a.txt").await.unwrap();
        assert!(store.find_entry("Docs", "a.txt").await.unwrap().is_none());
        assert!(store.find_entry("Docs", ".a.txt").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn refuses_escaping_paths() {
        let dir = fixture();
        let store = LocalStore::new(dir.path().join("Docs"));

        assert!(matches!(
            store.list_entries("../").await,
            Err(ShelfError::InvalidPath(_))
        ));
        assert!(matches!(
            store.read_file("/etc/passwd").await,
            Err(ShelfError::InvalidPath(_))
        ));
    }

    #[tokio::test]
    async fn missing_directory_is_a_store_error() {
        let dir = fixture();
        let store = LocalStore::new(dir.path());
        assert!(matches!(
            store.list_entries("Nope").await,
            Err(ShelfError::Store { .. })
        ));
    }

    #[tokio::test]
    async fn tree_skips_hidden_entries_at_every_depth() {
        let dir = fixture();
        let store = LocalStore::new(dir.path());

        let tree = walk_tree(&store, "Docs".to_string()).await.unwrap();
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].name, "a.txt");
        let sub = tree[1].children.as_ref().unwrap();
        assert_eq!(sub.len(), 1);
        assert_eq!(sub[0].name, "b.txt");
    }
}
