//! Building change sets from directories and zip files.

use crate::error::{PackagingError, Result};
use crate::file_cache::FileCacheByPath;
use crate::types::{ChangeSet, FileStatus, RelativeFile};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::File;
use std::path::{Path, PathBuf};

/// Every regular file below `dir`, reported as NEW.
pub fn from_directory(dir: &Path) -> Result<ChangeSet> {
    let mut out = ChangeSet::new();
    for entry in walkdir::WalkDir::new(dir).follow_links(false) {
        let entry = entry.map_err(|e| {
            let context = format!("failed to walk {}", dir.display());
            match e.into_io_error() {
                Some(io) => PackagingError::io(context, io),
                None => PackagingError::io(context, std::io::Error::other("filesystem loop")),
            }
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(rf) = RelativeFile::from_file(dir, entry.path()) {
            out.insert(rf, FileStatus::New);
        }
    }
    Ok(out)
}

/// File entries of a zip with their CRC-32 and uncompressed size.
fn zip_entries(zip: &Path) -> Result<BTreeMap<String, (u32, u64)>> {
    let f = File::open(zip)
        .map_err(|e| PackagingError::io(format!("failed to open {}", zip.display()), e))?;
    let mut archive = zip::ZipArchive::new(f)
        .map_err(|e| PackagingError::zip(format!("failed to read {}", zip.display()), e))?;

    let mut out = BTreeMap::new();
    for i in 0..archive.len() {
        let entry = archive.by_index_raw(i).map_err(|e| {
            PackagingError::zip(format!("failed to read entry {i} of {}", zip.display()), e)
        })?;
        if entry.is_dir() {
            continue;
        }
        out.insert(entry.name().to_string(), (entry.crc32(), entry.size()));
    }
    Ok(out)
}

/// Every file entry of `zip`, all with the same status. The base of each entry is the zip.
pub fn from_zip(zip: &Path, status: FileStatus) -> Result<ChangeSet> {
    Ok(zip_entries(zip)?
        .into_keys()
        .map(|name| (RelativeFile::new(zip, name), status))
        .collect())
}

/// Diff `zip` against the copy of it held in `cache`.
///
/// Entries are CHANGED when their CRC-32 or size differ. Without a cached copy every entry
/// is NEW.
pub fn from_zip_with_cache(zip: &Path, cache: &FileCacheByPath) -> Result<ChangeSet> {
    let Some(old_zip) = cache.get(zip) else {
        return from_zip(zip, FileStatus::New);
    };

    let new_entries = zip_entries(zip)?;
    let old_entries = zip_entries(&old_zip)?;

    let mut out = ChangeSet::new();
    for (name, meta) in &new_entries {
        match old_entries.get(name) {
            None => {
                out.insert(RelativeFile::new(zip, name), FileStatus::New);
            }
            Some(old) if old != meta => {
                out.insert(RelativeFile::new(zip, name), FileStatus::Changed);
            }
            Some(_) => {}
        }
    }
    for name in old_entries.keys() {
        if !new_entries.contains_key(name) {
            out.insert(RelativeFile::new(zip, name), FileStatus::Removed);
        }
    }

    Ok(out)
}

/// Merge sets; for an artifact present in several sets the last one wins.
pub fn union<I>(sets: I) -> ChangeSet
where
    I: IntoIterator<Item = ChangeSet>,
{
    let mut out = ChangeSet::new();
    for set in sets {
        out.extend(set);
    }
    out
}

/// Number of distinct bases in `set` that are directories.
pub fn base_directory_count(set: &ChangeSet) -> usize {
    set.keys()
        .map(RelativeFile::base)
        .filter(|b| b.is_dir())
        .collect::<BTreeSet<_>>()
        .len()
}

/// Everything inside the given zips and directories, as NEW.
pub fn from_zips_and_directories<'a, I>(paths: I) -> Result<ChangeSet>
where
    I: IntoIterator<Item = &'a Path>,
{
    let mut sets = Vec::new();
    for p in paths {
        if p.is_file() {
            sets.push(from_zip(p, FileStatus::New)?);
        } else {
            sets.push(from_directory(p)?);
        }
    }
    Ok(union(sets))
}

/// Turn file-level changes into artifact-level changes.
///
/// `bases` are the zips and directories that make up the input. A changed file that is itself
/// a base is read as a zip. Any other file is attributed to the closest base directory that
/// contains it, and dropped if there is none.
pub fn make_from_base_files(
    bases: &[PathBuf],
    updates: &HashMap<PathBuf, FileStatus>,
    cache: &FileCacheByPath,
) -> Result<ChangeSet> {
    let base_set: BTreeSet<&Path> = bases.iter().map(PathBuf::as_path).collect();
    let mut out = ChangeSet::new();

    for (file, &status) in updates {
        if base_set.contains(&file.as_path()) {
            let entries = match status {
                FileStatus::New => from_zip(file, FileStatus::New)?,
                FileStatus::Changed => from_zip_with_cache(file, cache)?,
                FileStatus::Removed => removed_zip_entries(file, cache)?,
            };
            out.extend(entries);
            continue;
        }

        let owner = file.ancestors().skip(1).find(|p| base_set.contains(p));
        match owner.and_then(|base| RelativeFile::from_file(base, file)) {
            Some(rf) => {
                out.insert(rf, status);
            }
            None => {
                tracing::debug!(file = %file.display(), "change outside every base ignored");
            }
        }
    }

    Ok(out)
}

/// Entries of a removed zip, read from the zip itself if it is still around or from its
/// cached copy otherwise.
fn removed_zip_entries(zip: &Path, cache: &FileCacheByPath) -> Result<ChangeSet> {
    let source = if zip.is_file() {
        zip.to_path_buf()
    } else {
        match cache.get(zip) {
            Some(cached) => cached,
            None => {
                tracing::warn!(zip = %zip.display(), "removed zip has no cached copy");
                return Ok(ChangeSet::new());
            }
        }
    };

    Ok(zip_entries(&source)?
        .into_keys()
        .map(|name| (RelativeFile::new(zip, name), FileStatus::Removed))
        .collect())
}
