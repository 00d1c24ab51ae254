use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Change classification of a build artifact between two builds.
///
/// Unchanged files are filtered out upstream and never reach the packager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FileStatus {
    New,
    Changed,
    Removed,
}

impl FileStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FileStatus::New => "new",
            FileStatus::Changed => "changed",
            FileStatus::Removed => "removed",
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the base of a [`RelativeFile`] currently is on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Base is a directory; the artifact is a plain file below it.
    Directory,
    /// Base is a zip file; the artifact is an entry inside it.
    Archive,
    Missing,
}

/// Identity of a build artifact: a base (directory or zip) plus a path relative to it.
///
/// The relative path is kept in OS-independent form (`/` separated) so it can be used
/// directly as an archive entry name and compared across platforms.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelativeFile {
    base: PathBuf,
    relative_path: String,
}

impl RelativeFile {
    pub fn new(base: impl Into<PathBuf>, relative_path: impl AsRef<str>) -> Self {
        let relative_path = relative_path
            .as_ref()
            .split(['/', std::path::MAIN_SEPARATOR])
            .filter(|seg| !seg.is_empty())
            .collect::<Vec<_>>()
            .join("/");

        Self {
            base: base.into(),
            relative_path,
        }
    }

    /// Build from a base and a file below it. Returns `None` if `file` is not under `base`.
    pub fn from_file(base: &Path, file: &Path) -> Option<Self> {
        let rel = file.strip_prefix(base).ok()?;
        let mut segs = Vec::new();
        for comp in rel.components() {
            match comp {
                Component::Normal(s) => segs.push(s.to_string_lossy().into_owned()),
                Component::CurDir => {}
                _ => return None,
            }
        }
        if segs.is_empty() {
            return None;
        }

        Some(Self {
            base: base.to_path_buf(),
            relative_path: segs.join("/"),
        })
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    /// Location of the artifact on disk (only meaningful for directory bases).
    pub fn file(&self) -> PathBuf {
        let mut out = self.base.clone();
        for seg in self.relative_path.split('/') {
            out.push(seg);
        }
        out
    }

    /// Last segment of the relative path, e.g. `classes.dex` for `y/classes.dex`.
    pub fn file_name(&self) -> &str {
        self.relative_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.relative_path)
    }

    pub fn source_kind(&self) -> SourceKind {
        if self.base.is_dir() {
            SourceKind::Directory
        } else if self.base.is_file() {
            SourceKind::Archive
        } else {
            SourceKind::Missing
        }
    }
}

impl fmt::Display for RelativeFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}!/{}", self.base.display(), self.relative_path)
    }
}

/// Incremental change set handed to the packager for one content category.
pub type ChangeSet = BTreeMap<RelativeFile, FileStatus>;
