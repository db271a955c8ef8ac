use std::num::NonZeroU32;

use rusty_wallpapers_api_structs::{Orientation, RandomPhoto, RandomPhotoQuery};
use thiserror::Error;
use url::Url;

use crate::config::{CollectionFilter, Config};

/// Upper bound Unsplash puts on `count` for `/photos/random`.
pub const MAX_PHOTOS_PER_REQUEST: usize = 30;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("photo source unavailable: {0}")]
    Unavailable(surf::Error),
    #[error("photo source answered with status {0}")]
    Status(surf::StatusCode),
    #[error("malformed photo source response: {0}")]
    MalformedResponse(String),
    #[error("requested {requested} photos but received {received}")]
    CountMismatch { requested: u32, received: usize },
    #[error("couldn't encode query string")]
    Query(#[from] serde_qs::Error),
}

#[async_trait::async_trait]
pub trait PhotoSource {
    /// Fetches `count` random full-resolution photo URLs in a single request.
    async fn random_photo_urls(&self, count: NonZeroU32) -> Result<Vec<Url>, SourceError>;
}

#[derive(Clone, Debug)]
pub struct UnsplashClient {
    endpoint: Url,
    access_key: String,
    collections: CollectionFilter,
}

impl UnsplashClient {
    pub fn new(config: &Config) -> Self {
        UnsplashClient {
            endpoint: config.api_endpoint.clone(),
            access_key: config.access_key.clone(),
            collections: config.collections.clone(),
        }
    }

    fn request_url(&self, count: NonZeroU32) -> Result<String, SourceError> {
        let query = serde_qs::to_string(&RandomPhotoQuery {
            orientation: Orientation::Landscape,
            count: count.get(),
            collections: self.collections.joined(),
        })?;

        Ok(format!(
            "{}/photos/random?{}",
            self.endpoint.as_str().trim_end_matches('/'),
            query
        ))
    }
}

#[async_trait::async_trait]
impl PhotoSource for UnsplashClient {
    #[tracing::instrument(skip(self), fields(collections = %self.collections.joined()))]
    async fn random_photo_urls(&self, count: NonZeroU32) -> Result<Vec<Url>, SourceError> {
        let url = self.request_url(count)?;
        tracing::info!("Requesting new photos from Unsplash");

        let mut res = surf::get(url)
            .header("Authorization", format!("Client-ID {}", self.access_key))
            .header("Accept-Version", "v1")
            .await
            .map_err(SourceError::Unavailable)?;

        let status = res.status();
        if !status.is_success() {
            tracing::warn!(%status, "Unsplash rejected the request");
            return Err(SourceError::Status(status));
        }

        let body = res.body_bytes().await.map_err(SourceError::Unavailable)?;
        let urls = parse_photo_urls(&body)?;

        if urls.len() != count.get() as usize {
            return Err(SourceError::CountMismatch {
                requested: count.get(),
                received: urls.len(),
            });
        }

        tracing::debug!(?urls, "Received photo URLs from Unsplash");
        Ok(urls)
    }
}

fn parse_photo_urls(body: &[u8]) -> Result<Vec<Url>, SourceError> {
    let photos: Vec<RandomPhoto> = serde_json::from_slice(body)
        .map_err(|err| SourceError::MalformedResponse(err.to_string()))?;

    photos
        .into_iter()
        .map(|photo| {
            Url::parse(&photo.urls.full).map_err(|err| {
                SourceError::MalformedResponse(format!(
                    "photo {} has invalid full URL {:?}: {}",
                    photo.id, photo.urls.full, err
                ))
            })
        })
        .collect()
}
