use crate::error::{PackagingError, Result};
use directories::ProjectDirs;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// State file kept by the dex rename manager inside the intermediate directory.
pub const STATE_FILE: &str = "dex-renamer-state.txt";

/// Directory (below the intermediate directory) holding cached copies of merged zips.
pub const ZIP_CACHE_DIR: &str = "zip-cache";

/// Packaging options that are not part of an individual change set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackagerOptions {
    /// ABIs whose native libraries are packaged; empty means all.
    pub accepted_abis: BTreeSet<String>,
    /// Also package `gdbserver` / `gdb.setup` next to native libraries.
    pub jni_debug_mode: bool,
}

fn is_name_only(s: &str) -> bool {
    !s.contains('/') && !s.contains('\\')
}

pub fn default_intermediate_base_dir() -> Result<PathBuf> {
    let proj = ProjectDirs::from("eu", "lastviking", "incpack").ok_or_else(|| {
        PackagingError::InvalidIntermediateDir {
            path: PathBuf::from("<platform cache directory>"),
        }
    })?;
    Ok(proj.cache_dir().to_path_buf())
}

/// Resolve `--intermediate`: a bare name lives under the platform cache directory, in a
/// subdirectory named after the APK so that different APKs never share state.
pub fn resolve_intermediate_dir(intermediate: &str, apk: &Path) -> Result<PathBuf> {
    if !is_name_only(intermediate) {
        return Ok(PathBuf::from(intermediate));
    }

    let stem = apk
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "apk".to_string());
    Ok(default_intermediate_base_dir()?.join(intermediate).join(stem))
}

/// Create the intermediate directory if needed; fail if the path exists but is not a directory.
pub fn ensure_intermediate_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        if !dir.is_dir() {
            return Err(PackagingError::InvalidIntermediateDir {
                path: dir.to_path_buf(),
            });
        }
        return Ok(());
    }

    fs::create_dir_all(dir)
        .map_err(|e| PackagingError::io(format!("failed to create {}", dir.display()), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_path_is_kept() {
        let p = resolve_intermediate_dir("build/inc", Path::new("out/app.apk")).unwrap();
        assert_eq!(p, PathBuf::from("build/inc"));
    }

    #[test]
    fn ensure_creates_and_validates() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("a").join("b");
        ensure_intermediate_dir(&dir).unwrap();
        assert!(dir.is_dir());
        ensure_intermediate_dir(&dir).unwrap();

        let file = tmp.path().join("file");
        fs::write(&file, b"x").unwrap();
        assert!(matches!(
            ensure_intermediate_dir(&file),
            Err(PackagingError::InvalidIntermediateDir { .. })
        ));
    }
}
