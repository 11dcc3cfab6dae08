//! The local wheel cache: a flat directory of wheel files keyed by their
//! original filename. There is no index file; the filename is the key, and
//! the SHA-256 digest decides whether an entry is trustworthy.

use std::env;
use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

/// A handle to the cache directory.
#[derive(Debug, Clone)]
pub struct Cache {
    root: PathBuf,
}

impl Cache {
    /// Open (creating if necessary) a cache at the given directory.
    pub fn at(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let root = root.into();
        fs_err::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Open the default cache directory.
    ///
    /// Priority: `PIPG_CACHE_DIR`, then the platform convention: on macOS
    /// `~/Library/Caches/pipg/wheels`, elsewhere `$XDG_CACHE_HOME/pipg/wheels`
    /// falling back to `~/.cache/pipg/wheels`.
    pub fn from_env() -> Result<Self, CacheError> {
        Self::at(default_cache_dir().ok_or(CacheError::NoCacheDir)?)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Look up a cached wheel by filename.
    ///
    /// A hit requires a regular file and, when `expected_sha256` is nonempty,
    /// a matching digest. A stale entry (digest mismatch or unreadable) is
    /// deleted and reported as a miss.
    pub fn get(&self, filename: &str, expected_sha256: &str) -> Option<PathBuf> {
        let path = self.root.join(filename);
        let metadata = fs_err::metadata(&path).ok()?;
        if !metadata.is_file() {
            return None;
        }

        if !expected_sha256.is_empty() {
            match file_digest(&path) {
                Ok(digest) if digest.eq_ignore_ascii_case(expected_sha256) => {}
                Ok(_) => {
                    debug!("Cache hash mismatch for {filename}, removing");
                    let _ = fs_err::remove_file(&path);
                    return None;
                }
                Err(err) => {
                    debug!("Failed to hash cached {filename} ({err}), removing");
                    let _ = fs_err::remove_file(&path);
                    return None;
                }
            }
        }

        debug!("Cache hit for {filename}");
        Some(path)
    }

    /// Copy a file into the cache under the given filename.
    ///
    /// The copy goes through a sibling temp file and an atomic rename, so
    /// concurrent writers of the same key can only race whole files; the last
    /// rename wins and all writers carry identical, verified content.
    pub fn put(&self, source: &Path, filename: &str) -> Result<PathBuf, CacheError> {
        let target = self.root.join(filename);
        let temp = self.root.join(format!("{filename}.tmp"));

        if let Err(err) = fs_err::copy(source, &temp) {
            let _ = fs_err::remove_file(&temp);
            return Err(err.into());
        }
        if let Err(err) = fs_err::rename(&temp, &target) {
            let _ = fs_err::remove_file(&temp);
            return Err(err.into());
        }

        debug!("Cached {filename}");
        Ok(target)
    }
}

/// The SHA-256 hex digest of the file at `path`.
pub fn file_digest(path: &Path) -> io::Result<String> {
    let mut file = fs_err::File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

fn default_cache_dir() -> Option<PathBuf> {
    if let Some(dir) = env::var_os("PIPG_CACHE_DIR").filter(|dir| !dir.is_empty()) {
        return Some(PathBuf::from(dir));
    }

    if cfg!(target_os = "macos") {
        let home = env::var_os("HOME").filter(|home| !home.is_empty())?;
        return Some(
            PathBuf::from(home)
                .join("Library")
                .join("Caches")
                .join("pipg")
                .join("wheels"),
        );
    }

    if let Some(xdg) = env::var_os("XDG_CACHE_HOME").filter(|xdg| !xdg.is_empty()) {
        return Some(PathBuf::from(xdg).join("pipg").join("wheels"));
    }
    let home = env::var_os("HOME").filter(|home| !home.is_empty())?;
    Some(PathBuf::from(home).join(".cache").join("pipg").join("wheels"))
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("Could not determine a cache directory; set PIPG_CACHE_DIR")]
    NoCacheDir,
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use tempfile::tempdir;

    use super::{file_digest, Cache};

    fn write_fixture(dir: &std::path::Path, name: &str, contents: &[u8]) -> PathBuf {
        let path = dir.join(name);
        fs_err::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn miss_on_empty_cache() {
        let dir = tempdir().unwrap();
        let cache = Cache::at(dir.path()).unwrap();
        assert!(cache.get("pkg-1.0-py3-none-any.whl", "").is_none());
    }

    #[test]
    fn put_then_get() {
        let dir = tempdir().unwrap();
        let scratch = tempdir().unwrap();
        let cache = Cache::at(dir.path()).unwrap();

        let source = write_fixture(scratch.path(), "source.whl", b"wheel bytes");
        let digest = file_digest(&source).unwrap();
        cache.put(&source, "pkg-1.0-py3-none-any.whl").unwrap();

        let hit = cache.get("pkg-1.0-py3-none-any.whl", &digest).unwrap();
        assert_eq!(fs_err::read(hit).unwrap(), b"wheel bytes");
    }

    #[test]
    fn get_without_digest_accepts_any_content() {
        let dir = tempdir().unwrap();
        let cache = Cache::at(dir.path()).unwrap();
        write_fixture(dir.path(), "pkg-1.0-py3-none-any.whl", b"anything");
        assert!(cache.get("pkg-1.0-py3-none-any.whl", "").is_some());
    }

    #[test]
    fn digest_comparison_is_case_insensitive() {
        let dir = tempdir().unwrap();
        let cache = Cache::at(dir.path()).unwrap();
        let path = write_fixture(dir.path(), "pkg-1.0-py3-none-any.whl", b"wheel bytes");
        let digest = file_digest(&path).unwrap().to_uppercase();
        assert!(cache.get("pkg-1.0-py3-none-any.whl", &digest).is_some());
    }

    #[test]
    fn stale_entry_is_removed() {
        let dir = tempdir().unwrap();
        let cache = Cache::at(dir.path()).unwrap();
        let path = write_fixture(dir.path(), "pkg-1.0-py3-none-any.whl", b"corrupted");

        let expected = "0".repeat(64);
        assert!(cache.get("pkg-1.0-py3-none-any.whl", &expected).is_none());
        assert!(!path.exists());
    }
}
