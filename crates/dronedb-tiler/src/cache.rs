//! Tile/Thumb Cache Manager (spec §4.12): a per-user cache keyed by
//! `CRC64(source_path*mtime*tile_size)`, partitioned by tile size, with
//! probabilistic GC, `ThreadLock`-collapsed concurrent builds, and
//! hash-addressed (or always-fresh) downloads for URL sources.

use dronedb_build::LockRegistry;
use dronedb_core::error::{DdbError, Result};
use dronedb_core::hash::str_crc64;
use rand::Rng;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Probability (1-in-N) that a cache access triggers a GC sweep.
const GC_PROBABILITY_DENOM: u32 = 1000;
const GC_MAX_AGE: Duration = Duration::from_secs(5 * 24 * 3600);

pub struct CacheManager {
    root: PathBuf,
    locks: LockRegistry,
}

impl CacheManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), locks: LockRegistry::new() }
    }

    /// The default per-user cache location, grounded in the `directories`
    /// crate's platform-appropriate cache dir.
    pub fn default_location() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("org", "DroneDB", "dronedb")
            .ok_or_else(|| DdbError::app("could not determine a per-user cache directory"))?;
        Ok(dirs.cache_dir().to_path_buf())
    }

    pub fn cache_key(source_path: &str, mtime: i64, tile_size: u32) -> String {
        str_crc64(format!("{source_path}*{mtime}*{tile_size}").as_bytes())
    }

    fn tile_path(&self, key: &str, z: u32, x: i64, y: i64) -> PathBuf {
        self.root.join(key).join(z.to_string()).join(x.to_string()).join(format!("{y}.png"))
    }

    fn thumb_path(&self, key: &str, size: u32) -> PathBuf {
        self.root.join(size.to_string()).join(format!("{key}.webp"))
    }

    /// Returns the cached tile if present (and `!force`); otherwise builds
    /// it via `render` inside a `ThreadLock` keyed by the output path so
    /// concurrent requests for the same tile collapse into one build.
    pub fn get_or_build_tile(
        &self,
        key: &str,
        z: u32,
        x: i64,
        y: i64,
        force: bool,
        render: impl FnOnce() -> Result<Vec<u8>>,
    ) -> Result<PathBuf> {
        self.maybe_gc()?;
        let path = self.tile_path(key, z, x, y);
        if path.is_file() && !force {
            return Ok(path);
        }
        let _lock = self.locks.acquire(path.to_string_lossy().to_string());
        if path.is_file() && !force {
            return Ok(path);
        }
        let bytes = render()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DdbError::fs(parent, e.to_string()))?;
        }
        std::fs::write(&path, bytes).map_err(|e| DdbError::fs(&path, e.to_string()))?;
        Ok(path)
    }

    /// Returns the cached thumbnail if present (and `!force`); otherwise
    /// renders via `render` (an RGBA image) and encodes it to WebP.
    pub fn get_or_build_thumb(
        &self,
        key: &str,
        size: u32,
        force: bool,
        render: impl FnOnce() -> Result<image::RgbaImage>,
    ) -> Result<PathBuf> {
        self.maybe_gc()?;
        let path = self.thumb_path(key, size);
        if path.is_file() && !force {
            return Ok(path);
        }
        let _lock = self.locks.acquire(path.to_string_lossy().to_string());
        if path.is_file() && !force {
            return Ok(path);
        }
        let image = render()?;
        let encoder = webp::Encoder::from_rgba(image.as_raw(), image.width(), image.height());
        let encoded = encoder.encode(80.0);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DdbError::fs(parent, e.to_string()))?;
        }
        std::fs::write(&path, &*encoded).map_err(|e| DdbError::fs(&path, e.to_string()))?;
        Ok(path)
    }

    /// Downloads `url` into the cache (hash-addressed under `expected_hash`
    /// when the caller has one, else CRC64-of-URL and always re-fetched),
    /// protected by a `ThreadLock` keyed on the destination path.
    pub fn ensure_local(&self, url: &url::Url, expected_hash: Option<&str>) -> Result<PathBuf> {
        let key = match expected_hash {
            Some(hash) => hash.to_string(),
            None => str_crc64(url.as_str().as_bytes()),
        };
        let dest = self.root.join("downloads").join(&key);

        if dest.is_file() && expected_hash.is_some() {
            return Ok(dest);
        }

        let _lock = self.locks.acquire(dest.to_string_lossy().to_string());
        if dest.is_file() && expected_hash.is_some() {
            return Ok(dest);
        }

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DdbError::fs(parent, e.to_string()))?;
        }
        let client = reqwest::blocking::Client::builder()
            .build()
            .map_err(|e| DdbError::Net(e.to_string()))?;
        let mut response = client.get(url.clone()).send().map_err(|e| DdbError::Net(e.to_string()))?;
        let mut file = std::fs::File::create(&dest).map_err(|e| DdbError::fs(&dest, e.to_string()))?;
        response.copy_to(&mut file).map_err(|e| DdbError::Net(e.to_string()))?;
        Ok(dest)
    }

    /// With probability 1/1000, scans the top-level cache directories and
    /// removes any entry older than 5 days, cleaning up empty parents.
    fn maybe_gc(&self) -> Result<()> {
        if rand::thread_rng().gen_range(0..GC_PROBABILITY_DENOM) != 0 {
            return Ok(());
        }
        self.gc()
    }

    pub fn gc(&self) -> Result<()> {
        if !self.root.is_dir() {
            return Ok(());
        }
        let now = SystemTime::now();
        for entry in std::fs::read_dir(&self.root).map_err(|e| DdbError::fs(&self.root, e.to_string()))? {
            let entry = entry.map_err(|e| DdbError::fs(&self.root, e.to_string()))?;
            let path = entry.path();
            gc_recursive(&path, now)?;
        }
        Ok(())
    }
}

fn gc_recursive(path: &Path, now: SystemTime) -> Result<()> {
    if path.is_dir() {
        let mut any_remaining = false;
        for entry in std::fs::read_dir(path).map_err(|e| DdbError::fs(path, e.to_string()))? {
            let entry = entry.map_err(|e| DdbError::fs(path, e.to_string()))?;
            gc_recursive(&entry.path(), now)?;
        }
        for entry in std::fs::read_dir(path).map_err(|e| DdbError::fs(path, e.to_string()))? {
            let _ = entry;
            any_remaining = true;
            break;
        }
        if !any_remaining {
            let _ = std::fs::remove_dir(path);
        }
    } else {
        let metadata = std::fs::metadata(path).map_err(|e| DdbError::fs(path, e.to_string()))?;
        if let Ok(modified) = metadata.modified() {
            if now.duration_since(modified).unwrap_or_default() > GC_MAX_AGE {
                let _ = std::fs::remove_file(path);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::tempdir;

    #[test]
    fn cache_key_is_deterministic() {
        let a = CacheManager::cache_key("ortho.tif", 1000, 256);
        let b = CacheManager::cache_key("ortho.tif", 1000, 256);
        let c = CacheManager::cache_key("ortho.tif", 1001, 256);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn get_or_build_tile_caches_after_first_render() {
        let dir = tempdir().unwrap();
        let cache = CacheManager::new(dir.path());
        let calls = AtomicU32::new(0);
        let key = "deadbeef";

        let path1 = cache
            .get_or_build_tile(key, 10, 5, 5, false, || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec![1, 2, 3])
            })
            .unwrap();
        let path2 = cache
            .get_or_build_tile(key, 10, 5, 5, false, || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec![9, 9, 9])
            })
            .unwrap();

        assert_eq!(path1, path2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(std::fs::read(&path1).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn force_rebuild_bypasses_cache() {
        let dir = tempdir().unwrap();
        let cache = CacheManager::new(dir.path());
        let key = "cafebabe";
        cache.get_or_build_tile(key, 1, 0, 0, false, || Ok(vec![1])).unwrap();
        let path = cache.get_or_build_tile(key, 1, 0, 0, true, || Ok(vec![2])).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), vec![2]);
    }

    #[test]
    fn gc_removes_stale_entries_and_empty_dirs() {
        let dir = tempdir().unwrap();
        let cache = CacheManager::new(dir.path());
        let stale_path = dir.path().join("somekey").join("10").join("5").join("5.png");
        std::fs::create_dir_all(stale_path.parent().unwrap()).unwrap();
        std::fs::write(&stale_path, b"x").unwrap();

        let old_time = SystemTime::now() - Duration::from_secs(6 * 24 * 3600);
        let old_time = filetime::FileTime::from_system_time(old_time);
        filetime::set_file_mtime(&stale_path, old_time).unwrap();

        cache.gc().unwrap();
        assert!(!stale_path.exists());
    }
}
