use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use async_std::process::Command;
use thiserror::Error;
use url::Url;

const SCHEMA: &str = "org.gnome.desktop.background";
const LIGHT_KEY: &str = "picture-uri";
const DARK_KEY: &str = "picture-uri-dark";

#[derive(Error, Debug)]
pub enum DesktopError {
    #[error("couldn't run `{command}`")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` exited with {status}: {stderr}")]
    Command {
        command: String,
        status: ExitStatus,
        stderr: String,
    },
    #[error("{} isn't an absolute path", .0.display())]
    NotAbsolute(PathBuf),
}

/// The wallpaper URIs currently configured, as reported by the desktop.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CurrentWallpapers {
    pub light: String,
    pub dark: String,
}

#[async_trait::async_trait]
pub trait Desktop {
    async fn current_wallpapers(&self) -> Result<CurrentWallpapers, DesktopError>;

    /// Sets both the light and dark wallpaper to the file at `path`.
    async fn set_wallpaper(&self, path: &Path) -> Result<(), DesktopError>;
}

/// GNOME desktop, driven through the `gsettings` command.
#[derive(Clone, Copy, Debug, Default)]
pub struct Gsettings;

impl Gsettings {
    async fn run(&self, args: &[&str]) -> Result<String, DesktopError> {
        let command = format!("gsettings {}", args.join(" "));
        tracing::debug!("Running `{}`", command);

        let output = Command::new("gsettings")
            .args(args)
            .output()
            .await
            .map_err(|source| DesktopError::Io {
                command: command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(DesktopError::Command {
                command,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait::async_trait]
impl Desktop for Gsettings {
    async fn current_wallpapers(&self) -> Result<CurrentWallpapers, DesktopError> {
        let light = self.run(&["get", SCHEMA, LIGHT_KEY]).await?;
        let dark = self.run(&["get", SCHEMA, DARK_KEY]).await?;
        Ok(CurrentWallpapers {
            light: unquote(&light).to_string(),
            dark: unquote(&dark).to_string(),
        })
    }

    async fn set_wallpaper(&self, path: &Path) -> Result<(), DesktopError> {
        let uri = path_to_uri(path)?;
        let value = gvariant_string(uri.as_str());
        self.run(&["set", SCHEMA, LIGHT_KEY, &value]).await?;
        self.run(&["set", SCHEMA, DARK_KEY, &value]).await?;
        Ok(())
    }
}

pub fn path_to_uri(path: &Path) -> Result<Url, DesktopError> {
    Url::from_file_path(path).map_err(|()| DesktopError::NotAbsolute(path.to_path_buf()))
}

/// Resolves a wallpaper URI back to a local path.
///
/// Accepts `file://` URIs, optionally still wrapped in GVariant quotes, and bare absolute
/// paths. Anything else has no local file behind it.
pub fn uri_to_path(uri: &str) -> Option<PathBuf> {
    let uri = unquote(uri);
    if uri.starts_with("file://") {
        return Url::parse(uri).ok()?.to_file_path().ok();
    }

    let path = Path::new(uri);
    if path.is_absolute() {
        Some(path.to_path_buf())
    } else {
        None
    }
}

fn unquote(value: &str) -> &str {
    let value = value.trim();
    value
        .strip_prefix('\'')
        .and_then(|v| v.strip_suffix('\''))
        .unwrap_or(value)
}

fn gvariant_string(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}
