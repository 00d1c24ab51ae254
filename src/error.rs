use crate::types::{FileStatus, RelativeFile};
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PackagingError>;

#[derive(Debug, Error)]
pub enum PackagingError {
    /// A REMOVED or CHANGED entry names an artifact that never got a slot.
    #[error("incremental update refers to '{file}' as {status}, but this file is not known")]
    UnknownArtifact { file: RelativeFile, status: FileStatus },

    /// A NEW entry names an artifact that already owns a slot.
    #[error("incremental update refers to '{file}' as new, but it is already packaged")]
    AlreadyTracked { file: RelativeFile },

    #[error("dex name map is inconsistent: {0}")]
    Inconsistent(String),

    #[error("failed to read state file {}", path.display())]
    StateRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write state file {}", path.display())]
    StateWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed state file {} (line {line}): {reason}", path.display())]
    MalformedState {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("'{}' {reason}", path.display())]
    InvalidOutput { path: PathBuf, reason: String },

    #[error("intermediate directory '{}' is not a directory", path.display())]
    InvalidIntermediateDir { path: PathBuf },

    #[error("source of '{file}' is neither a directory nor an archive")]
    MissingSource { file: RelativeFile },

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{context}")]
    Zip {
        context: String,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("packager is already closed")]
    Closed,
}

impl PackagingError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        PackagingError::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn zip(context: impl Into<String>, source: zip::result::ZipError) -> Self {
        PackagingError::Zip {
            context: context.into(),
            source,
        }
    }
}
