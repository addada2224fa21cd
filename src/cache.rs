use anyhow::Result;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::error::SliceMapError;
use crate::fingerprint::Fingerprint;

/// Extension of rendered tile files
pub const TILE_EXTENSION: &str = "jpg";

/// File name of the tile with the given subset index, e.g. `00003.jpg`
pub fn tile_file_name(subset_index: u32) -> String {
    format!("{:05}.{}", subset_index, TILE_EXTENSION)
}

/// On-disk store of rendered tiles.
///
/// Layout: `<root>/<fp[0..2]>/<fp[2..4]>/<fp[4..]>/<%05d>.jpg`
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, fingerprint: &Fingerprint) -> PathBuf {
        let (first, second, rest) = fingerprint.split();
        self.root.join(first).join(second).join(rest)
    }

    pub fn exists(&self, fingerprint: &Fingerprint) -> bool {
        self.path_for(fingerprint).is_dir()
    }

    /// Create the entry directory and its prefix directories.
    ///
    /// Sibling jobs may create the same prefixes at the same moment; an
    /// "already exists" outcome is success.
    pub fn ensure_directories(&self, fingerprint: &Fingerprint) -> io::Result<PathBuf> {
        let path = self.path_for(fingerprint);
        match fs::create_dir_all(&path) {
            Ok(()) => Ok(path),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && path.is_dir() => Ok(path),
            Err(e) => Err(e),
        }
    }

    pub fn tile_path(&self, fingerprint: &Fingerprint, subset_index: u32) -> PathBuf {
        self.path_for(fingerprint).join(tile_file_name(subset_index))
    }

    pub fn tile_exists(&self, fingerprint: &Fingerprint, subset_index: u32) -> bool {
        self.tile_path(fingerprint, subset_index).is_file()
    }

    /// True once every tile `0..subset_count` is present
    pub fn is_complete(&self, fingerprint: &Fingerprint, subset_count: u32) -> bool {
        (0..subset_count).all(|index| self.tile_exists(fingerprint, index))
    }

    pub async fn read_tile(
        &self,
        fingerprint: &Fingerprint,
        subset_index: u32,
    ) -> Result<Vec<u8>, SliceMapError> {
        let path = self.tile_path(fingerprint, subset_index);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(SliceMapError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove entries whose directory has not been modified within `max_age`.
    ///
    /// `is_active` is consulted right before each removal; entries it reports
    /// (jobs still registered) are never touched. Returns the number of entries
    /// removed.
    pub fn sweep_expired<F>(&self, max_age: Duration, is_active: F) -> Result<usize>
    where
        F: Fn(&Fingerprint) -> bool,
    {
        let now = SystemTime::now();
        let mut removed = 0;

        for entry in self.list_entries()? {
            let Some(fingerprint) = entry.fingerprint else {
                continue;
            };

            let modified = match fs::metadata(&entry.path).and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(e) => {
                    tracing::trace!("⚠️  Cannot stat cache entry {:?}: {}", entry.path, e);
                    continue;
                }
            };

            let age = now.duration_since(modified).unwrap_or_default();
            if age <= max_age {
                continue;
            }
            if is_active(&fingerprint) {
                tracing::debug!("⏳ Keeping expired entry {} while its job runs", fingerprint);
                continue;
            }

            match fs::remove_dir_all(&entry.path) {
                Ok(()) => {
                    tracing::debug!("🗑️  Removed expired cache entry {}", fingerprint);
                    removed += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!("⚠️ Failed to remove cache entry {:?}: {}", entry.path, e);
                }
            }
        }

        Ok(removed)
    }

    fn list_entries(&self) -> Result<Vec<CacheEntry>> {
        let mut entries = Vec::new();
        if !self.root.is_dir() {
            return Ok(entries);
        }

        for first in subdirectories(&self.root)? {
            for second in subdirectories(&first)? {
                for leaf in subdirectories(&second)? {
                    let key = [&first, &second, &leaf]
                        .iter()
                        .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
                        .collect::<String>();
                    entries.push(CacheEntry {
                        fingerprint: Fingerprint::parse(&key),
                        path: leaf,
                    });
                }
            }
        }

        Ok(entries)
    }
}

struct CacheEntry {
    fingerprint: Option<Fingerprint>,
    path: PathBuf,
}

fn subdirectories(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    Ok(dirs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::compute_fingerprint;
    use crate::models::{Dimensions, Origin};
    use tempfile::TempDir;

    fn fingerprint(path: &str) -> Fingerprint {
        compute_fingerprint(path, &Origin::default(), &Dimensions::default())
    }

    #[test]
    fn test_path_layout() {
        let store = CacheStore::new(PathBuf::from("/cache"));
        let fp = fingerprint("/data/a");
        let s = fp.as_str();
        assert_eq!(
            store.path_for(&fp),
            PathBuf::from(format!("/cache/{}/{}/{}", &s[..2], &s[2..4], &s[4..]))
        );
        assert!(store
            .tile_path(&fp, 7)
            .to_string_lossy()
            .ends_with("00007.jpg"));
    }

    #[test]
    fn test_ensure_directories_is_idempotent() -> Result<()> {
        let temp = TempDir::new()?;
        let store = CacheStore::new(temp.path().to_path_buf());
        let fp = fingerprint("/data/a");

        assert!(!store.exists(&fp));
        store.ensure_directories(&fp)?;
        store.ensure_directories(&fp)?;
        assert!(store.exists(&fp));
        Ok(())
    }

    #[test]
    fn test_concurrent_directory_creation() -> Result<()> {
        let temp = TempDir::new()?;
        let store = CacheStore::new(temp.path().to_path_buf());
        let fp = fingerprint("/data/race");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let fp = fp.clone();
                std::thread::spawn(move || store.ensure_directories(&fp).map(|_| ()))
            })
            .collect();

        for handle in handles {
            handle.join().unwrap()?;
        }
        assert!(store.exists(&fp));
        Ok(())
    }

    #[tokio::test]
    async fn test_read_tile_not_found_then_bytes() -> Result<()> {
        let temp = TempDir::new()?;
        let store = CacheStore::new(temp.path().to_path_buf());
        let fp = fingerprint("/data/a");

        assert!(matches!(
            store.read_tile(&fp, 0).await,
            Err(SliceMapError::NotFound)
        ));

        store.ensure_directories(&fp)?;
        assert!(matches!(
            store.read_tile(&fp, 0).await,
            Err(SliceMapError::NotFound)
        ));

        fs::write(store.tile_path(&fp, 0), b"jpeg bytes")?;
        assert!(store.tile_exists(&fp, 0));
        assert_eq!(store.read_tile(&fp, 0).await?, b"jpeg bytes");
        Ok(())
    }

    #[test]
    fn test_is_complete_requires_every_tile() -> Result<()> {
        let temp = TempDir::new()?;
        let store = CacheStore::new(temp.path().to_path_buf());
        let fp = fingerprint("/data/a");
        store.ensure_directories(&fp)?;

        fs::write(store.tile_path(&fp, 0), b"a")?;
        assert!(store.is_complete(&fp, 1));
        assert!(!store.is_complete(&fp, 2));

        fs::write(store.tile_path(&fp, 1), b"b")?;
        assert!(store.is_complete(&fp, 2));
        Ok(())
    }

    #[test]
    fn test_sweep_expired_skips_active_jobs() -> Result<()> {
        let temp = TempDir::new()?;
        let store = CacheStore::new(temp.path().to_path_buf());
        let old = fingerprint("/data/old");
        let busy = fingerprint("/data/busy");
        store.ensure_directories(&old)?;
        store.ensure_directories(&busy)?;

        // Nothing is older than an hour yet
        assert_eq!(store.sweep_expired(Duration::from_secs(3600), |_| false)?, 0);

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(store.sweep_expired(Duration::from_millis(1), |fp| fp == &busy)?, 1);
        assert!(!store.exists(&old));
        assert!(store.exists(&busy));
        Ok(())
    }

    #[tokio::test]
    async fn test_sweep_sees_jobs_registered_after_start() -> Result<()> {
        use crate::jobs::JobRegistry;
        use tokio::sync::oneshot;

        let temp = TempDir::new()?;
        let store = CacheStore::new(temp.path().to_path_buf());
        let fp = fingerprint("/data/rerun");
        store.ensure_directories(&fp)?;
        std::thread::sleep(Duration::from_millis(20));

        let registry = JobRegistry::default();
        let (release, wait) = oneshot::channel::<()>();

        // Registered between sweeps, consulted live at removal time
        assert!(registry.try_start(&fp, move |_| async move {
            let _ = wait.await;
            Ok(())
        }));
        assert_eq!(
            store.sweep_expired(Duration::from_millis(1), |fp| registry.is_registered(fp))?,
            0
        );
        assert!(store.exists(&fp));

        let _ = release.send(());
        Ok(())
    }
}
