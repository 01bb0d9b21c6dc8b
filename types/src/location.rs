//! Addressing vocabulary for the object store and the staged trees.

use crate::error::{PredictError, PredictResult};

/// A bucket plus a path within it, parsed from a caller-supplied address.
///
/// A path ending in `/` denotes a directory prefix; anything else names a
/// single object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLocation {
    bucket: String,
    path: String,
}

impl RemoteLocation {
    /// Parse an address of the form `<prefix>bucket/path`.
    pub fn parse(address: &str, prefix: &str) -> PredictResult<Self> {
        let Some(rest) = address.strip_prefix(prefix) else {
            return Err(PredictError::Validation(format!(
                "location must start with '{prefix}'"
            )));
        };
        let Some((bucket, path)) = rest.split_once('/') else {
            return Err(PredictError::Validation(format!(
                "location '{address}' must name a path within the bucket"
            )));
        };
        if bucket.is_empty() || path.is_empty() {
            return Err(PredictError::Validation(format!(
                "location '{address}' must name a bucket and a path"
            )));
        }
        Ok(Self { bucket: bucket.to_string(), path: path.to_string() })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_dir(&self) -> bool {
        self.path.ends_with('/')
    }

    /// Normalize the path to directory form.
    pub fn into_dir(mut self) -> Self {
        if !self.path.ends_with('/') {
            self.path.push('/');
        }
        self
    }

    /// Last path segment; the object's file name for file-shaped paths.
    pub fn leaf_name(&self) -> &str {
        match self.path.trim_end_matches('/').rsplit_once('/') {
            Some((_, leaf)) => leaf,
            None => self.path.trim_end_matches('/'),
        }
    }
}

/// One file discovered under a tree root, remote or local.
///
/// `rel_path` is empty for direct children of the root and otherwise ends
/// with `/`; `name` never contains `/`. The same shape drives both mirroring
/// directions so the hierarchy logic exists once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub rel_path: String,
    pub name: String,
}

impl StagedFile {
    /// Split a root-relative key into directory part and leaf name.
    ///
    /// Returns `None` for the root key itself and for pure directory
    /// markers (keys ending in `/`), neither of which stages a file.
    pub fn from_relative(rel: &str) -> Option<Self> {
        if rel.is_empty() || rel.ends_with('/') {
            return None;
        }
        let (rel_path, name) = match rel.rsplit_once('/') {
            Some((dir, leaf)) => (format!("{dir}/"), leaf.to_string()),
            None => (String::new(), rel.to_string()),
        };
        Some(Self { rel_path, name })
    }

    /// Root-relative path of the file, `rel_path` and `name` joined.
    pub fn relative(&self) -> String {
        format!("{}{}", self.rel_path, self.name)
    }
}
