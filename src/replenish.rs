use std::num::NonZeroU32;
use std::path::{Path, PathBuf};

use async_std::path::Path as AsyncPath;
use async_std::prelude::*;
use thiserror::Error;
use url::Url;

use crate::cache::{CacheDirectory, PhotoDescriptor};
use crate::unsplash::{PhotoSource, SourceError};

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("request for {url} failed: {error}")]
    Request { url: Url, error: surf::Error },
    #[error("{url} answered with status {status}")]
    Status { url: Url, status: surf::StatusCode },
    #[error("couldn't stream {url} into {}", .path.display())]
    Stream {
        url: Url,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no file name can be derived from {0}")]
    NoFileName(Url),
}

#[derive(Debug)]
pub struct FailedDownload {
    pub file_name: Option<String>,
    pub error: DownloadError,
}

#[derive(Error, Debug)]
pub enum ReplenishError {
    #[error("couldn't get photos to download")]
    Source(#[from] SourceError),
    #[error("couldn't list cache directory {}", .path.display())]
    List {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{} of {} downloads failed", .failed.len(), .failed.len() + .completed.len())]
    Partial {
        completed: Vec<PathBuf>,
        failed: Vec<FailedDownload>,
    },
}

/// Files added to the cache by a fully successful replenishment.
#[derive(Debug, PartialEq, Eq)]
pub struct Replenishment {
    pub downloaded: Vec<PathBuf>,
}

/// How far a download got before it stopped. Only a `Streaming` download owns a file on disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DownloadState {
    Pending,
    Streaming,
}

pub struct Replenisher<S> {
    source: S,
    cache: CacheDirectory,
}

impl<S: PhotoSource> Replenisher<S> {
    pub fn new(source: S, cache: CacheDirectory) -> Self {
        Replenisher { source, cache }
    }

    pub fn cache(&self) -> &CacheDirectory {
        &self.cache
    }

    /// Downloads `count` new photos into the cache directory.
    ///
    /// Every download runs to completion before this returns. Files from successful downloads
    /// stay on disk even when a sibling fails.
    #[tracing::instrument(skip(self), fields(dir = %self.cache.path().display()))]
    pub async fn replenish(&self, count: NonZeroU32) -> Result<Replenishment, ReplenishError> {
        let urls = self.source.random_photo_urls(count).await?;

        tracing::info!("Downloading {} photos", urls.len());
        let downloads = urls.into_iter().map(|url| async move {
            let photo = match PhotoDescriptor::from_url(url.clone()) {
                Some(photo) => photo,
                None => {
                    return Err(FailedDownload {
                        file_name: None,
                        error: DownloadError::NoFileName(url),
                    })
                },
            };
            let target = self.cache.file_path(&photo.file_name);
            download(&photo, &target).await.map_err(|error| FailedDownload {
                file_name: Some(photo.file_name.clone()),
                error,
            })
        });

        let (completed, failed): (Vec<_>, Vec<_>) = futures::future::join_all(downloads)
            .await
            .into_iter()
            .partition(Result::is_ok);
        let completed: Vec<PathBuf> = completed.into_iter().filter_map(Result::ok).collect();
        let failed: Vec<FailedDownload> = failed.into_iter().filter_map(Result::err).collect();

        if failed.is_empty() {
            tracing::info!("All photos downloaded");
            Ok(Replenishment {
                downloaded: completed,
            })
        } else {
            for failure in &failed {
                tracing::error!(file = ?failure.file_name, "{}", failure.error);
            }
            Err(ReplenishError::Partial { completed, failed })
        }
    }

    /// Tops the cache up to `minimum` files. Does nothing, not even a request, when it is full.
    pub async fn top_up(&self, minimum: usize) -> Result<Option<Replenishment>, ReplenishError> {
        let deficit = self
            .cache
            .deficit(minimum)
            .await
            .map_err(|source| ReplenishError::List {
                path: self.cache.path().to_path_buf(),
                source,
            })?;

        let count = u32::try_from(deficit).unwrap_or(u32::MAX);
        match NonZeroU32::new(count) {
            None => {
                tracing::debug!(minimum, "Cache already holds enough photos");
                Ok(None)
            },
            Some(count) => self.replenish(count).await.map(Some),
        }
    }
}

/// Streams one photo to `target`, removing what it wrote if the transfer breaks off.
#[tracing::instrument(skip_all, fields(file = %photo.file_name))]
async fn download(photo: &PhotoDescriptor, target: &Path) -> Result<PathBuf, DownloadError> {
    match stream_to_file(&photo.url, target).await {
        Ok(()) => {
            tracing::info!("Downloaded {:?}", photo.file_name);
            Ok(target.to_path_buf())
        },
        Err((DownloadState::Pending, err)) => {
            tracing::warn!("Download failed before anything was written: {}", err);
            Err(err)
        },
        Err((DownloadState::Streaming, err)) => {
            tracing::warn!("Download failed mid-stream: {}", err);
            // Cleanup is best-effort.
            let _ = async_std::fs::remove_file(AsyncPath::new(target)).await;
            tracing::debug!("Removed partial file {}", target.display());
            Err(err)
        },
    }
}

async fn stream_to_file(url: &Url, target: &Path) -> Result<(), (DownloadState, DownloadError)> {
    let mut res = surf::get(url.as_str()).await.map_err(|error| {
        let error = DownloadError::Request {
            url: url.clone(),
            error,
        };
        (DownloadState::Pending, error)
    })?;

    let status = res.status();
    if !status.is_success() {
        let error = DownloadError::Status {
            url: url.clone(),
            status,
        };
        return Err((DownloadState::Pending, error));
    }

    let stream_error = |state, source| {
        let error = DownloadError::Stream {
            url: url.clone(),
            path: target.to_path_buf(),
            source,
        };
        (state, error)
    };

    let mut file = async_std::fs::File::create(AsyncPath::new(target))
        .await
        .map_err(|err| stream_error(DownloadState::Pending, err))?;

    let state = DownloadState::Streaming;
    async_std::io::copy(&mut res, &mut file)
        .await
        .map_err(|err| stream_error(state, err))?;
    file.flush().await.map_err(|err| stream_error(state, err))?;
    file.sync_all().await.map_err(|err| stream_error(state, err))?;

    Ok(())
}
