//! Rendered image cache.
//!
//! One PNG per device, `image-<device>.png`, reused while younger than the
//! freshness window. New images are written to a temporary file in the cache
//! directory and renamed into place, so a reader never sees a partial file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::registry::is_safe_name;
use crate::{persist_atomically, Error, FRESHNESS_WINDOW_SECS};

/// File-backed image cache keyed by device name.
#[derive(Debug, Clone)]
pub struct ImageCache {
    dir: PathBuf,
    freshness: Duration,
}

impl ImageCache {
    /// Cache in `dir`, created if missing.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, Error> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            Error::Io(format!(
                "Failed to create image directory '{}': {}",
                dir.display(),
                e
            ))
        })?;
        Ok(Self {
            dir,
            freshness: Duration::from_secs(FRESHNESS_WINDOW_SECS),
        })
    }

    /// Override the freshness window.
    pub fn with_freshness(mut self, freshness: Duration) -> Self {
        self.freshness = freshness;
        self
    }

    /// Cache directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Cached image path for `device`.
    ///
    /// # Errors
    ///
    /// [`Error::Invalid`] if `device` is not a safe file stem.
    pub fn path_for(&self, device: &str) -> Result<PathBuf, Error> {
        if !is_safe_name(device) {
            return Err(Error::invalid("device", format!("unsafe name '{}'", device)));
        }
        Ok(self.dir.join(format!("image-{}.png", device)))
    }

    /// Whether `device` has an image younger than the freshness window.
    pub fn is_fresh(&self, device: &str) -> bool {
        let Ok(path) = self.path_for(device) else {
            return false;
        };
        match std::fs::metadata(&path).and_then(|m| m.modified()) {
            // A timestamp in the future counts as brand new
            Ok(modified) => modified.elapsed().unwrap_or_default() < self.freshness,
            Err(_) => false,
        }
    }

    /// Path to a fresh image of `device`, calling `render` for new PNG bytes
    /// when the cached one is missing or stale.
    ///
    /// If rendering fails and an older image exists, the older image is
    /// served and the failure logged. Otherwise the render error is returned.
    pub fn get_or_render<F>(&self, device: &str, render: F) -> Result<PathBuf, Error>
    where
        F: FnOnce() -> Result<Vec<u8>, Error>,
    {
        let path = self.path_for(device)?;
        if self.is_fresh(device) {
            tracing::debug!("Using cached image for: {}", device);
            return Ok(path);
        }

        match self.store(&path, render) {
            Ok(()) => {
                tracing::debug!("Image created for: {}", device);
                Ok(path)
            }
            Err(e) if path.exists() => {
                tracing::warn!("Render failed for {}, serving previous image: {}", device, e);
                Ok(path)
            }
            Err(e) => Err(e),
        }
    }

    /// Render `device` unconditionally, replacing any cached image.
    pub fn refresh<F>(&self, device: &str, render: F) -> Result<PathBuf, Error>
    where
        F: FnOnce() -> Result<Vec<u8>, Error>,
    {
        let path = self.path_for(device)?;
        self.store(&path, render)?;
        tracing::debug!("Image refreshed for: {}", device);
        Ok(path)
    }

    fn store<F>(&self, path: &Path, render: F) -> Result<(), Error>
    where
        F: FnOnce() -> Result<Vec<u8>, Error>,
    {
        let png = render()?;
        persist_atomically(path, &png)
    }

    /// Delete every cached image. Returns the number removed.
    pub fn clear(&self) -> Result<usize, Error> {
        let mut removed = 0;
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let is_image = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("image-") && n.ends_with(".png"));
            if is_image {
                std::fs::remove_file(&path)?;
                removed += 1;
            }
        }
        tracing::info!("Cleared {} cached images", removed);
        Ok(removed)
    }
}
