use std::path::PathBuf;

use thiserror::Error;
use url::Url;

use crate::unsplash::MAX_PHOTOS_PER_REQUEST;
use crate::Args;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("personal wallpaper ratio must be within [0, 1], got {0}")]
    RatioOutOfRange(f64),
    #[error("minimum cached photos must be at most {}, got {0}", MAX_PHOTOS_PER_REQUEST)]
    MinCachedTooLarge(usize),
    #[error("at least one collection identifier is required")]
    NoCollections,
    #[error("invalid API endpoint {endpoint:?}")]
    Endpoint {
        endpoint: String,
        #[source]
        source: url::ParseError,
    },
}

/// Ordered list of Unsplash collection identifiers, sent as-is.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollectionFilter(Vec<String>);

impl CollectionFilter {
    pub fn new<I, S>(ids: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids: Vec<String> = ids.into_iter().map(Into::into).collect();
        if ids.is_empty() {
            return Err(ConfigError::NoCollections);
        }
        Ok(CollectionFilter(ids))
    }

    /// Parses a comma-separated list, trimming whitespace and dropping empty entries.
    pub fn parse(list: &str) -> Result<Self, ConfigError> {
        Self::new(
            list.split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty()),
        )
    }

    pub fn ids(&self) -> &[String] {
        &self.0
    }

    pub fn joined(&self) -> String {
        self.0.join(",")
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub access_key: String,
    pub collections: CollectionFilter,
    pub personal_ratio: f64,
    pub remote_dir: PathBuf,
    pub personal_dir: PathBuf,
    pub min_cached: usize,
    pub api_endpoint: Url,
}

impl Config {
    pub fn from_args(args: &Args) -> Result<Self, ConfigError> {
        let ratio = args.personal_ratio;
        if !ratio.is_finite() || !(0.0..=1.0).contains(&ratio) {
            return Err(ConfigError::RatioOutOfRange(ratio));
        }

        // The cache is topped up with a single request.
        if args.min_cached > MAX_PHOTOS_PER_REQUEST {
            return Err(ConfigError::MinCachedTooLarge(args.min_cached));
        }

        let api_endpoint = Url::parse(&args.api_endpoint).map_err(|source| ConfigError::Endpoint {
            endpoint: args.api_endpoint.clone(),
            source,
        })?;

        Ok(Config {
            access_key: args.access_key.clone(),
            collections: CollectionFilter::parse(&args.collections)?,
            personal_ratio: ratio,
            remote_dir: args.remote_dir.clone(),
            personal_dir: args.personal_dir.clone(),
            min_cached: args.min_cached,
            api_endpoint,
        })
    }
}
