use crate::error::{PackagingError, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Copies of files, keyed by the path they were taken from.
///
/// Used to remember the previous version of a zip so the next build can diff entries
/// against it.
#[derive(Debug, Clone)]
pub struct FileCacheByPath {
    dir: PathBuf,
}

impl FileCacheByPath {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn key(&self, path: &Path) -> PathBuf {
        let abs = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        let digest = blake3::hash(abs.to_string_lossy().as_bytes());
        self.dir.join(hex::encode(digest.as_bytes()))
    }

    /// Store a copy of `path`, replacing any previous copy.
    pub fn add(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            PackagingError::io(format!("failed to create {}", self.dir.display()), e)
        })?;

        let dst = self.key(path);
        fs::copy(path, &dst).map_err(|e| {
            PackagingError::io(
                format!("failed to cache {} as {}", path.display(), dst.display()),
                e,
            )
        })?;
        tracing::trace!(src = %path.display(), cached = %dst.display(), "cached file");
        Ok(())
    }

    /// The cached copy of `path`, if there is one.
    pub fn get(&self, path: &Path) -> Option<PathBuf> {
        let p = self.key(path);
        p.is_file().then_some(p)
    }

    pub fn remove(&self, path: &Path) -> Result<()> {
        let p = self.key(path);
        match fs::remove_file(&p) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PackagingError::io(
                format!("failed to remove cached {}", p.display()),
                e,
            )),
        }
    }
}
