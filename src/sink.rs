//! The archive-level operations the packager issues.

use crate::error::Result;
use std::path::Path;

/// Maps an entry of a merged zip to its name in the package. `None` skips the entry.
pub type NameRemap<'a> = &'a dyn Fn(&str) -> Option<String>;

/// True for package names that must not be taken from a merged zip.
pub type IgnorePredicate<'a> = &'a dyn Fn(&str) -> bool;

/// Something that can be mutated entry by entry and finalized once.
pub trait ArchiveSink {
    fn delete_file(&mut self, name: &str) -> Result<()>;

    /// Store the contents of `source` as `name`, replacing any existing entry.
    fn write_file(&mut self, source: &Path, name: &str) -> Result<()>;

    /// Copy entries of the zip at `source`. Each entry name is passed through `remap`, and
    /// the resulting package name is skipped if `ignore` says so.
    fn write_zip(&mut self, source: &Path, remap: NameRemap<'_>, ignore: IgnorePredicate<'_>)
    -> Result<()>;

    /// Finalize the archive. Calling it again does nothing.
    fn close(&mut self) -> Result<()>;
}

pub trait ArchiveSinkFactory {
    fn make(&self, apk: &Path) -> Result<Box<dyn ArchiveSink>>;
}
