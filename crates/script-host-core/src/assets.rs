//! Packaged-asset loading with a local extraction cache.
//!
//! The guest engine binary ships as a packaged asset. On first load it
//! is extracted into a cache directory; subsequent loads read the
//! cached copy. Extraction is idempotent: the source bytes never
//! change, so a concurrent duplicate extraction by another process is a
//! benign race (identical content, harmless overwrite) and is not
//! protected by a cross-process lock.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use script_host_common::ScriptHostError;

/// Loads named byte assets, caching extracted copies on local storage.
///
/// Contract: returns identical bytes on every call for a given name.
#[derive(Debug, Clone)]
pub struct AssetStore {
    assets_dir: PathBuf,
    cache_dir: PathBuf,
}

impl AssetStore {
    /// Create a store reading from `assets_dir` and caching into
    /// `cache_dir`.
    pub fn new(assets_dir: impl Into<PathBuf>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            assets_dir: assets_dir.into(),
            cache_dir: cache_dir.into(),
        }
    }

    /// Load an asset's bytes, extracting into the cache on first use.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the asset is missing from both the cache
    /// and the assets directory, or if the cache cannot be written.
    pub fn load(&self, name: &str) -> Result<Vec<u8>, ScriptHostError> {
        let cached = self.cache_dir.join(name);

        // Existence check once per load; see module docs for the
        // cross-process race tolerance.
        if cached.exists() {
            debug!(path = %cached.display(), "Loading asset from cache");
            return Ok(fs::read(&cached)?);
        }

        let source = self.assets_dir.join(name);
        let bytes = fs::read(&source)?;

        self.write_cache(&cached, &bytes)?;

        info!(
            asset = name,
            bytes = bytes.len(),
            cache = %cached.display(),
            "Asset extracted to cache"
        );

        Ok(bytes)
    }

    /// Path the asset would be cached at.
    pub fn cache_path(&self, name: &str) -> PathBuf {
        self.cache_dir.join(name)
    }

    fn write_cache(&self, cached: &Path, bytes: &[u8]) -> Result<(), ScriptHostError> {
        fs::create_dir_all(&self.cache_dir)?;
        fs::write(cached, bytes)?;
        Ok(())
    }
}
