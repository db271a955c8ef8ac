use std::num::NonZeroU32;
use std::path::{Path, PathBuf};

use async_std::path::Path as AsyncPath;
use rand::seq::SliceRandom;
use rand::Rng;
use thiserror::Error;

use crate::cache::{canonicalize, CacheDirectory};
use crate::config::Config;
use crate::desktop::{uri_to_path, CurrentWallpapers, Desktop};
use crate::replenish::Replenisher;
use crate::unsplash::PhotoSource;

#[derive(Error, Debug)]
pub enum RotateError {
    #[error("couldn't list wallpapers in {}", .path.display())]
    List {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WallpaperKind {
    Personal,
    Remote,
}

/// What a rotation ended up doing.
#[derive(Debug, PartialEq, Eq)]
pub struct Rotation {
    pub kind: WallpaperKind,
    pub applied: Option<PathBuf>,
    pub removed: Vec<PathBuf>,
}

pub struct Rotator<D, S, R> {
    desktop: D,
    replenisher: Replenisher<S>,
    personal: CacheDirectory,
    personal_ratio: f64,
    min_cached: usize,
    rng: R,
}

impl<D, S, R> Rotator<D, S, R>
where
    D: Desktop,
    S: PhotoSource,
    R: Rng,
{
    pub fn new(config: &Config, desktop: D, source: S, rng: R) -> Self {
        Rotator {
            desktop,
            replenisher: Replenisher::new(source, CacheDirectory::new(&config.remote_dir)),
            personal: CacheDirectory::new(&config.personal_dir),
            personal_ratio: config.personal_ratio,
            min_cached: config.min_cached,
            rng,
        }
    }

    /// Picks and applies a new wallpaper, then tops the remote cache back up.
    ///
    /// Desktop and download failures are logged and reflected in the returned [`Rotation`];
    /// only an unreadable wallpaper directory is an error.
    #[tracing::instrument(skip(self))]
    pub async fn run(&mut self) -> Result<Rotation, RotateError> {
        let mut kind = if self.rng.gen::<f64>() < self.personal_ratio {
            WallpaperKind::Personal
        } else {
            WallpaperKind::Remote
        };

        let mut rotation = Rotation {
            kind,
            applied: None,
            removed: Vec::new(),
        };

        if kind == WallpaperKind::Personal {
            tracing::info!("Using personal wallpaper");
            let photos = list(&self.personal).await?;
            match photos.choose(&mut self.rng) {
                Some(photo) => rotation.applied = self.apply(photo).await,
                None => {
                    tracing::error!(
                        "No files were found in {}. Add photos to it, or set the personal \
                         wallpaper ratio to 0. Falling back to an Unsplash wallpaper.",
                        self.personal.path().display()
                    );
                    kind = WallpaperKind::Remote;
                },
            }
        }

        if kind == WallpaperKind::Remote {
            tracing::info!("Using Unsplash wallpaper");
            self.rotate_remote(&mut rotation).await?;
        }
        rotation.kind = kind;

        match self.replenisher.top_up(self.min_cached).await {
            Ok(Some(replenishment)) => tracing::info!(
                "Downloaded {} new Unsplash wallpapers",
                replenishment.downloaded.len()
            ),
            Ok(None) => {},
            Err(err) => tracing::error!("Couldn't replenish Unsplash wallpapers: {}", err),
        }

        Ok(rotation)
    }

    async fn rotate_remote(&mut self, rotation: &mut Rotation) -> Result<(), RotateError> {
        let cache = self.replenisher.cache().clone();

        let current = match self.desktop.current_wallpapers().await {
            Ok(current) => current,
            Err(err) => {
                tracing::warn!("Couldn't read the current wallpaper: {}", err);
                CurrentWallpapers::default()
            },
        };
        let previous: Vec<PathBuf> = previous_paths(&current);

        let mut candidates = fresh_candidates(&cache, &previous).await?;
        if candidates.is_empty() {
            tracing::error!(
                "No Unsplash wallpaper is downloaded other than the current one! Downloading one now"
            );
            if let Err(err) = self.replenisher.replenish(NonZeroU32::MIN).await {
                tracing::error!("Couldn't download an Unsplash wallpaper: {}", err);
            }
            candidates = fresh_candidates(&cache, &previous).await?;
        }

        let photo = match candidates.choose(&mut self.rng) {
            Some(photo) => photo.clone(),
            None => {
                tracing::error!("No Unsplash wallpaper available other than the current one");
                return Ok(());
            },
        };

        rotation.applied = self.apply(&photo).await;
        if rotation.applied.is_some() {
            for path in previous {
                if let Some(removed) = remove_previous(&cache, &path).await {
                    rotation.removed.push(removed);
                }
            }
        }

        Ok(())
    }

    async fn apply(&self, photo: &Path) -> Option<PathBuf> {
        let path = match canonicalize(photo).await {
            Some(path) => path,
            None => {
                tracing::error!("Couldn't resolve {}", photo.display());
                return None;
            },
        };

        match self.desktop.set_wallpaper(&path).await {
            Ok(()) => {
                tracing::info!("Set new wallpaper {}", path.display());
                Some(path)
            },
            Err(err) => {
                tracing::error!("Error setting wallpaper: {}", err);
                None
            },
        }
    }
}

async fn list(dir: &CacheDirectory) -> Result<Vec<PathBuf>, RotateError> {
    dir.list().await.map_err(|source| RotateError::List {
        path: dir.path().to_path_buf(),
        source,
    })
}

/// Cached photos other than the ones currently shown.
async fn fresh_candidates(
    cache: &CacheDirectory,
    previous: &[PathBuf],
) -> Result<Vec<PathBuf>, RotateError> {
    let mut previous_resolved = Vec::new();
    for path in previous {
        previous_resolved.extend(canonicalize(path).await);
    }

    let mut candidates = Vec::new();
    for photo in list(cache).await? {
        match canonicalize(&photo).await {
            Some(resolved) if previous_resolved.contains(&resolved) => {},
            _ => candidates.push(photo),
        }
    }
    Ok(candidates)
}

/// Local files behind the current light and dark wallpapers, without duplicates.
fn previous_paths(current: &CurrentWallpapers) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = uri_to_path(&current.light).into_iter().collect();
    if current.dark != current.light {
        paths.extend(uri_to_path(&current.dark));
    }
    paths
}

/// Deletes a previously applied wallpaper if it lives in the remote cache.
async fn remove_previous(cache: &CacheDirectory, path: &Path) -> Option<PathBuf> {
    if !AsyncPath::new(path).exists().await {
        tracing::info!(
            "Tried to remove non-existent Unsplash wallpaper: {}",
            path.display()
        );
        return None;
    }
    if !cache.contains(path).await {
        tracing::debug!("Keeping {}, it isn't an Unsplash wallpaper", path.display());
        return None;
    }

    match async_std::fs::remove_file(AsyncPath::new(path)).await {
        Ok(()) => {
            tracing::info!("Deleted old Unsplash wallpaper {}", path.display());
            Some(path.to_path_buf())
        },
        Err(err) => {
            tracing::warn!("Couldn't delete {}: {}", path.display(), err);
            None
        },
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::TempDir;

    use super::*;
    use crate::config::CollectionFilter;
    use crate::desktop::{path_to_uri, DesktopError};
    use crate::test_support::{serve_images, FakeSource};

    #[derive(Default)]
    struct FakeDesktop {
        current: CurrentWallpapers,
        fail_set: bool,
        set: Mutex<Vec<PathBuf>>,
    }

    impl FakeDesktop {
        fn showing(light: &Path, dark: &Path) -> Self {
            FakeDesktop {
                current: CurrentWallpapers {
                    light: format!("'{}'", path_to_uri(light).unwrap()),
                    dark: format!("'{}'", path_to_uri(dark).unwrap()),
                },
                ..Default::default()
            }
        }
    }

    #[async_trait::async_trait]
    impl<'a> Desktop for &'a FakeDesktop {
        async fn current_wallpapers(&self) -> Result<CurrentWallpapers, DesktopError> {
            Ok(self.current.clone())
        }

        async fn set_wallpaper(&self, path: &Path) -> Result<(), DesktopError> {
            if self.fail_set {
                return Err(DesktopError::NotAbsolute(path.to_path_buf()));
            }
            self.set.lock().unwrap().push(path.to_path_buf());
            Ok(())
        }
    }

    struct Dirs {
        remote: TempDir,
        personal: TempDir,
    }

    impl Dirs {
        fn new(remote: &[&str], personal: &[&str]) -> Self {
            let dirs = Dirs {
                remote: tempfile::tempdir().unwrap(),
                personal: tempfile::tempdir().unwrap(),
            };
            for name in remote {
                std::fs::write(dirs.remote(name), name).unwrap();
            }
            for name in personal {
                std::fs::write(dirs.personal(name), name).unwrap();
            }
            dirs
        }

        fn remote(&self, name: &str) -> PathBuf {
            self.remote.path().canonicalize().unwrap().join(name)
        }

        fn personal(&self, name: &str) -> PathBuf {
            self.personal.path().canonicalize().unwrap().join(name)
        }

        fn config(&self, personal_ratio: f64, min_cached: usize) -> Config {
            Config {
                access_key: "test-key".to_string(),
                collections: CollectionFilter::parse("317099").unwrap(),
                personal_ratio,
                remote_dir: self.remote.path().to_path_buf(),
                personal_dir: self.personal.path().to_path_buf(),
                min_cached,
                api_endpoint: url::Url::parse("http://127.0.0.1:9").unwrap(),
            }
        }

        fn remote_listing(&self) -> Vec<String> {
            let mut names: Vec<_> = std::fs::read_dir(self.remote.path())
                .unwrap()
                .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
                .collect();
            names.sort();
            names
        }
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[async_std::test]
    async fn personal_photo_is_applied_and_nothing_removed() {
        let dirs = Dirs::new(&["u1.jpg", "u2.jpg"], &["beach.jpg"]);
        let desktop = FakeDesktop::showing(&dirs.remote("u1.jpg"), &dirs.remote("u1.jpg"));
        let source = FakeSource::failing();
        let mut rotator = Rotator::new(&dirs.config(1.0, 2), &desktop, source.clone(), rng());

        let rotation = rotator.run().await.unwrap();

        assert_eq!(rotation.kind, WallpaperKind::Personal);
        assert_eq!(rotation.applied, Some(dirs.personal("beach.jpg")));
        assert!(rotation.removed.is_empty());
        assert_eq!(*desktop.set.lock().unwrap(), [dirs.personal("beach.jpg")]);
        assert_eq!(dirs.remote_listing(), ["u1.jpg", "u2.jpg"]);
        assert_eq!(source.calls(), 0);
    }

    #[async_std::test]
    async fn empty_personal_dir_falls_back_to_remote() {
        let dirs = Dirs::new(&["u1.jpg"], &[]);
        let desktop = FakeDesktop::default();
        let mut rotator = Rotator::new(&dirs.config(1.0, 1), &desktop, FakeSource::failing(), rng());

        let rotation = rotator.run().await.unwrap();

        assert_eq!(rotation.kind, WallpaperKind::Remote);
        assert_eq!(rotation.applied, Some(dirs.remote("u1.jpg")));
    }

    #[async_std::test]
    async fn previous_remote_wallpaper_is_replaced_and_cache_topped_up() {
        let base = serve_images(HashMap::from([("fresh".to_string(), b"new".to_vec())])).await;
        let dirs = Dirs::new(&["u1.jpg", "u2.jpg"], &[]);
        let desktop = FakeDesktop::showing(&dirs.remote("u1.jpg"), &dirs.remote("u1.jpg"));
        let source = FakeSource::new(vec![base.join("fresh").unwrap()]);
        let mut rotator = Rotator::new(&dirs.config(0.0, 2), &desktop, source.clone(), rng());

        let rotation = rotator.run().await.unwrap();

        assert_eq!(rotation.kind, WallpaperKind::Remote);
        assert_eq!(rotation.applied, Some(dirs.remote("u2.jpg")));
        assert_eq!(rotation.removed, [dirs.remote("u1.jpg")]);
        assert_eq!(source.calls(), 1);
        assert_eq!(dirs.remote_listing(), ["fresh.jpg", "u2.jpg"]);
    }

    #[async_std::test]
    async fn distinct_dark_wallpaper_is_removed_too() {
        let dirs = Dirs::new(&["u1.jpg", "u2.jpg", "u3.jpg"], &[]);
        let desktop = FakeDesktop::showing(&dirs.remote("u1.jpg"), &dirs.remote("u2.jpg"));
        let mut rotator = Rotator::new(&dirs.config(0.0, 1), &desktop, FakeSource::failing(), rng());

        let rotation = rotator.run().await.unwrap();

        assert_eq!(rotation.applied, Some(dirs.remote("u3.jpg")));
        assert_eq!(rotation.removed, [dirs.remote("u1.jpg"), dirs.remote("u2.jpg")]);
        assert_eq!(dirs.remote_listing(), ["u3.jpg"]);
    }

    #[async_std::test]
    async fn personal_photo_is_never_removed() {
        let dirs = Dirs::new(&["u1.jpg"], &["beach.jpg"]);
        let desktop = FakeDesktop::showing(&dirs.personal("beach.jpg"), &dirs.personal("beach.jpg"));
        let mut rotator = Rotator::new(&dirs.config(0.0, 1), &desktop, FakeSource::failing(), rng());

        let rotation = rotator.run().await.unwrap();

        assert_eq!(rotation.applied, Some(dirs.remote("u1.jpg")));
        assert!(rotation.removed.is_empty());
        assert!(dirs.personal("beach.jpg").exists());
    }

    #[async_std::test]
    async fn empty_remote_cache_downloads_one_first() {
        let base = serve_images(HashMap::from([
            ("first".to_string(), b"1".to_vec()),
            ("second".to_string(), b"2".to_vec()),
        ]))
        .await;
        let dirs = Dirs::new(&[], &[]);
        let desktop = FakeDesktop::default();
        let source = FakeSource::new(vec![base.join("first").unwrap(), base.join("second").unwrap()]);
        let mut rotator = Rotator::new(&dirs.config(0.0, 2), &desktop, source.clone(), rng());

        let rotation = rotator.run().await.unwrap();

        assert_eq!(rotation.applied, Some(dirs.remote("first.jpg")));
        // One request for the wallpaper itself, one to top the cache up to two.
        assert_eq!(source.calls(), 2);
        assert_eq!(dirs.remote_listing(), ["first.jpg", "second.jpg"]);
    }

    #[async_std::test]
    async fn only_current_wallpaper_cached_downloads_a_replacement() {
        let base = serve_images(HashMap::from([("fresh".to_string(), b"new".to_vec())])).await;
        let dirs = Dirs::new(&["u1.jpg"], &[]);
        let desktop = FakeDesktop::showing(&dirs.remote("u1.jpg"), &dirs.remote("u1.jpg"));
        let source = FakeSource::new(vec![base.join("fresh").unwrap()]);
        let mut rotator = Rotator::new(&dirs.config(0.0, 1), &desktop, source.clone(), rng());

        let rotation = rotator.run().await.unwrap();

        assert_eq!(rotation.applied, Some(dirs.remote("fresh.jpg")));
        assert_eq!(rotation.removed, [dirs.remote("u1.jpg")]);
        assert_eq!(source.calls(), 1);
        assert_eq!(dirs.remote_listing(), ["fresh.jpg"]);
    }

    #[async_std::test]
    async fn failed_set_keeps_previous_and_still_replenishes() {
        let base = serve_images(HashMap::from([("fresh".to_string(), b"new".to_vec())])).await;
        let dirs = Dirs::new(&["u1.jpg", "u2.jpg"], &[]);
        let desktop = FakeDesktop {
            fail_set: true,
            ..FakeDesktop::showing(&dirs.remote("u1.jpg"), &dirs.remote("u1.jpg"))
        };
        let source = FakeSource::new(vec![base.join("fresh").unwrap()]);
        let mut rotator = Rotator::new(&dirs.config(0.0, 3), &desktop, source.clone(), rng());

        let rotation = rotator.run().await.unwrap();

        assert_eq!(rotation.applied, None);
        assert!(rotation.removed.is_empty());
        assert_eq!(source.calls(), 1);
        assert_eq!(dirs.remote_listing(), ["fresh.jpg", "u1.jpg", "u2.jpg"]);
    }

    #[async_std::test]
    async fn unreadable_directory_is_an_error() {
        let dirs = Dirs::new(&[], &[]);
        let mut config = dirs.config(0.0, 1);
        config.remote_dir = dirs.remote.path().join("missing");
        let desktop = FakeDesktop::default();
        let mut rotator = Rotator::new(&config, &desktop, FakeSource::failing(), rng());

        assert!(matches!(rotator.run().await, Err(RotateError::List { .. })));
    }
}
