use structopt::StructOpt;

pub mod cache;
pub mod config;
pub mod desktop;
pub mod replenish;
pub mod rotate;
pub mod telemetry;
pub mod unsplash;

#[cfg(test)]
mod test_support;

use crate::config::{Config, ConfigError};
use crate::desktop::Gsettings;
use crate::rotate::{RotateError, Rotator};
use crate::unsplash::UnsplashClient;

#[derive(Debug)]
pub enum Error {
    ConfigError(ConfigError),
    TelemetryInitError(anyhow::Error),
    RotateError(RotateError),
}

impl From<Error> for i32 {
    fn from(error: Error) -> i32 {
        match error {
            Error::ConfigError(_) => 2,
            Error::TelemetryInitError(_) => 3,
            Error::RotateError(_) => 4,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::ConfigError(err) => {
                write!(f, "Invalid configuration: {}", err)
            },
            Error::TelemetryInitError(err) => {
                write!(f, "Failed to init telemetry: {}", err)
            },
            Error::RotateError(err) => {
                write!(f, "Failed to rotate wallpaper: {}", err)
            },
        }
    }
}

#[derive(Debug, StructOpt)]
pub struct Args {
    /// Unsplash API access key.
    #[structopt(long, env = "ACCESS_KEY", hide_env_values = true)]
    pub access_key: String,

    /// Comma-separated Unsplash collection IDs to pick photos from.
    #[structopt(long, env = "COLLECTIONS")]
    pub collections: String,

    /// Probability of using a personal wallpaper instead of an Unsplash one.
    #[structopt(long, default_value = "0", env = "MY_WALLPAPERS_RATIO")]
    pub personal_ratio: f64,

    /// Directory holding downloaded Unsplash wallpapers.
    #[structopt(
        long,
        parse(from_os_str),
        default_value = "unsplash_wallpapers",
        env = "UNSPLASH_WALLPAPERS_DIR"
    )]
    pub remote_dir: std::path::PathBuf,

    /// Directory holding personal wallpapers.
    #[structopt(
        long,
        parse(from_os_str),
        default_value = "my_wallpapers",
        env = "PERSONAL_WALLPAPERS_DIR"
    )]
    pub personal_dir: std::path::PathBuf,

    /// Number of Unsplash wallpapers to keep downloaded.
    #[structopt(long, default_value = "10", env = "MIN_DOWNLOADED_UNSPLASH_WALLPAPERS")]
    pub min_cached: usize,

    /// Unsplash API base URL.
    #[structopt(
        long,
        default_value = "https://api.unsplash.com",
        env = "UNSPLASH_API_ENDPOINT"
    )]
    pub api_endpoint: String,
}

pub async fn main() -> Result<(), Error> {
    dotenv::dotenv().ok();
    let args = Args::from_args();

    telemetry::init().map_err(Error::TelemetryInitError)?;

    let config = Config::from_args(&args).map_err(Error::ConfigError)?;
    tracing::debug!(?config.collections, ratio = config.personal_ratio, "Loaded configuration");

    let mut rotator = Rotator::new(
        &config,
        Gsettings,
        UnsplashClient::new(&config),
        rand::thread_rng(),
    );
    let rotation = rotator.run().await.map_err(Error::RotateError)?;
    tracing::debug!(?rotation, "Rotation finished");

    Ok(())
}
