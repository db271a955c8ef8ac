use std::path::{Path, PathBuf};

use async_std::path::Path as AsyncPath;
use async_std::prelude::*;
use url::Url;

pub const IMAGE_EXTENSION: &str = "jpg";

/// A remote photo paired with the file name it is stored under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhotoDescriptor {
    pub url: Url,
    pub file_name: String,
}

impl PhotoDescriptor {
    /// Derives the file name from the final path segment of `url`.
    ///
    /// Returns `None` when the URL has no non-empty final segment to name the file after.
    pub fn from_url(url: Url) -> Option<Self> {
        let segment = url.path_segments()?.last()?;
        if segment.is_empty() {
            return None;
        }

        let file_name = format!("{}.{}", segment, IMAGE_EXTENSION);
        Some(PhotoDescriptor { url, file_name })
    }
}

/// A flat directory of image files. The file system is the only index.
#[derive(Clone, Debug)]
pub struct CacheDirectory {
    path: PathBuf,
}

impl CacheDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CacheDirectory { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_path(&self, file_name: &str) -> PathBuf {
        self.path.join(file_name)
    }

    /// Lists the regular files directly inside the directory, in no particular order.
    pub async fn list(&self) -> std::io::Result<Vec<PathBuf>> {
        let mut entries = async_std::fs::read_dir(AsyncPath::new(&self.path)).await?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next().await {
            let entry = entry?;
            if entry.file_type().await?.is_file() {
                files.push(entry.path().into());
            }
        }
        Ok(files)
    }

    /// Number of files missing to reach `minimum`.
    pub async fn deficit(&self, minimum: usize) -> std::io::Result<usize> {
        let present = self.list().await?.len();
        Ok(minimum.saturating_sub(present))
    }

    /// Whether `path` names something directly inside this directory.
    ///
    /// Both sides are canonicalized, so `path` has to exist.
    pub async fn contains(&self, path: &Path) -> bool {
        let dir = match canonicalize(&self.path).await {
            Some(dir) => dir,
            None => return false,
        };
        match canonicalize(path).await {
            Some(path) => path.parent() == Some(dir.as_path()),
            None => false,
        }
    }
}

/// Resolves `path` to an absolute path with symlinks followed, if it exists.
pub async fn canonicalize(path: &Path) -> Option<PathBuf> {
    async_std::fs::canonicalize(AsyncPath::new(path))
        .await
        .ok()
        .map(Into::into)
}
