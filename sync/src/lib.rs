//! Mirrors an object-store tree onto local disk and back.
//!
//! The store simulates a directory hierarchy with `/`-separated keys; one
//! walk in each direction preserves that hierarchy symmetrically without an
//! explicit manifest. Listing in either direction produces the same
//! [`StagedFile`] shape, so the mirroring logic is written once.

use std::path::Path as FsPath;
use std::sync::Arc;

use futures::StreamExt;
use object_store::ObjectStore;
use object_store::path::Path;
use tokio::fs;
use types::error::{SyncError, SyncResult};
use types::location::StagedFile;

/// Recursive list/download/upload against one bucket.
pub struct TreeSync {
    store: Arc<dyn ObjectStore>,
}

impl TreeSync {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// List every object under a directory prefix, as paths relative to it.
    ///
    /// The prefix key itself and pure directory markers (keys ending in `/`)
    /// stage no file and are excluded. Entries come back sorted by relative
    /// path, which fixes the discovery order for the whole run.
    pub async fn list_tree(&self, prefix: &str) -> SyncResult<Vec<StagedFile>> {
        let root = prefix.trim_end_matches('/');
        let root_path = Path::from(root);
        let mut listing = self.store.list(Some(&root_path));
        let mut entries = Vec::new();
        while let Some(meta) = listing.next().await {
            let meta = meta?;
            let key = meta.location.as_ref();
            let Some(rel) = key.strip_prefix(root) else {
                continue;
            };
            if let Some(entry) = StagedFile::from_relative(rel.trim_start_matches('/')) {
                entries.push(entry);
            }
        }
        entries.sort_by_key(|e| e.relative());
        Ok(entries)
    }

    /// Download everything under a directory prefix into `local_dest`,
    /// recreating subdirectories as needed.
    pub async fn download_tree(&self, prefix: &str, local_dest: &FsPath) -> SyncResult<()> {
        if !prefix.ends_with('/') {
            return Err(SyncError::Validation(format!(
                "tree download requires a directory prefix, got '{prefix}'"
            )));
        }
        fs::create_dir_all(local_dest).await?;
        for entry in self.list_tree(prefix).await? {
            let dir = local_dest.join(&entry.rel_path);
            if !entry.rel_path.is_empty() {
                fs::create_dir_all(&dir).await?;
            }
            let key = Path::from(format!("{prefix}{}", entry.relative()));
            let body = self.store.get(&key).await?.bytes().await?;
            fs::write(dir.join(&entry.name), body).await?;
            tracing::debug!(file = %entry.relative(), "downloaded");
        }
        Ok(())
    }

    /// Download a single object to `local_dest`.
    pub async fn download_file(&self, key: &str, local_dest: &FsPath) -> SyncResult<()> {
        if key.ends_with('/') {
            return Err(SyncError::Validation(format!(
                "single-object download requires a file key, got '{key}'"
            )));
        }
        let body = self.store.get(&Path::from(key)).await?.bytes().await?;
        if let Some(parent) = local_dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(local_dest, body).await?;
        Ok(())
    }

    /// Upload a local tree under a directory prefix, mirroring its structure.
    ///
    /// `put` is the commit step of the remote write; its failure surfaces
    /// rather than being swallowed.
    pub async fn upload_tree(&self, local_src: &FsPath, prefix: &str) -> SyncResult<()> {
        let prefix = if prefix.ends_with('/') {
            prefix.to_string()
        } else {
            format!("{prefix}/")
        };
        for entry in list_local_tree(local_src).await? {
            let body = fs::read(local_src.join(entry.relative())).await?;
            let key = Path::from(format!("{prefix}{}", entry.relative()));
            self.store.put(&key, body.into()).await?;
            tracing::debug!(file = %entry.relative(), "uploaded");
        }
        Ok(())
    }
}

/// List every file under a local directory, as paths relative to it, sorted
/// the same way [`TreeSync::list_tree`] sorts remote entries.
pub async fn list_local_tree(root: &FsPath) -> SyncResult<Vec<StagedFile>> {
    let mut out = Vec::new();
    let mut pending = vec![(root.to_path_buf(), String::new())];
    while let Some((dir, rel)) = pending.pop() {
        let mut reader = fs::read_dir(&dir).await?;
        while let Some(entry) = reader.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type().await?.is_dir() {
                pending.push((entry.path(), format!("{rel}{name}/")));
            } else {
                out.push(StagedFile { rel_path: rel.clone(), name });
            }
        }
    }
    out.sort_by_key(|e| e.relative());
    Ok(out)
}
