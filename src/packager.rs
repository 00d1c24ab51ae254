//! Incremental updates of an APK from per-category change sets.
//!
//! Each `update_*` method turns a change set into archive updates and applies them to the
//! archive sink. Dex files get their package names from the [`DexRenameManager`]; every
//! other category is packaged under its relative path, with the category's own filtering.

use crate::abi_filter::NativeLibraryAbiFilter;
use crate::config::PackagerOptions;
use crate::error::{PackagingError, Result};
use crate::name_map::NameMap;
use crate::packaged_update::{
    UpdateSet, asset_updates, from_change_set, java_resource_updates, native_library_updates,
};
use crate::rename_manager::DexRenameManager;
use crate::sink::{ArchiveSink, ArchiveSinkFactory};
use crate::types::{ChangeSet, FileStatus, SourceKind};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::{self, File};
use std::path::{Path, PathBuf};

/// Decides which package names a zip merge may produce in one batch.
///
/// A name is ignored unless some archive-sourced update of the batch targets it, and also
/// when a plain file of the same batch is written under that name.
#[derive(Debug, Clone, Default)]
pub struct MergeFilter {
    archive_targets: HashSet<String>,
    plain_targets: HashSet<String>,
}

impl MergeFilter {
    pub fn new<A, P>(archive_targets: A, plain_targets: P) -> Self
    where
        A: IntoIterator<Item = String>,
        P: IntoIterator<Item = String>,
    {
        Self {
            archive_targets: archive_targets.into_iter().collect(),
            plain_targets: plain_targets.into_iter().collect(),
        }
    }

    pub fn is_ignored(&self, name: &str) -> bool {
        !self.archive_targets.contains(name) || self.plain_targets.contains(name)
    }
}

/// Fail unless `apk` can be written: it must not be a directory, and must either be a
/// writable file or creatable.
pub fn check_output_file(apk: &Path) -> Result<()> {
    let invalid = |reason: &str| PackagingError::InvalidOutput {
        path: apk.to_path_buf(),
        reason: reason.to_string(),
    };

    if apk.is_dir() {
        return Err(invalid("is a directory"));
    }

    if apk.exists() {
        let meta = fs::metadata(apk).map_err(|_| invalid("cannot be inspected"))?;
        if meta.permissions().readonly() {
            return Err(invalid("is not writable"));
        }
        return Ok(());
    }

    File::create(apk).map_err(|_| invalid("cannot be created"))?;
    fs::remove_file(apk).map_err(|_| invalid("cannot be deleted after creation"))?;
    Ok(())
}

pub struct IncrementalPackager {
    sink: Box<dyn ArchiveSink>,
    dex_renamer: DexRenameManager,
    abi_filter: NativeLibraryAbiFilter,
    closed: bool,
}

impl IncrementalPackager {
    /// Open the package at `apk` for incremental updates.
    ///
    /// `intermediate_dir` must exist and must not be shared with another package.
    pub fn new(
        apk: &Path,
        intermediate_dir: &Path,
        factory: &dyn ArchiveSinkFactory,
        options: PackagerOptions,
    ) -> Result<Self> {
        check_output_file(apk)?;
        if !intermediate_dir.is_dir() {
            return Err(PackagingError::InvalidIntermediateDir {
                path: intermediate_dir.to_path_buf(),
            });
        }

        let sink = factory.make(apk)?;
        let dex_renamer = DexRenameManager::open(intermediate_dir)?;

        tracing::debug!(
            apk = %apk.display(),
            intermediate = %intermediate_dir.display(),
            "incremental packager opened"
        );

        Ok(Self {
            sink,
            dex_renamer,
            abi_filter: NativeLibraryAbiFilter::new(options.accepted_abis, options.jni_debug_mode),
            closed: false,
        })
    }

    pub fn dex_name_map(&self) -> &NameMap {
        self.dex_renamer.name_map()
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(PackagingError::Closed);
        }
        Ok(())
    }

    pub fn update_dex(&mut self, changes: &ChangeSet) -> Result<()> {
        self.check_open()?;
        let updates = self.dex_renamer.update(changes)?;
        self.update_files(&updates)
    }

    pub fn update_java_resources(&mut self, changes: &ChangeSet) -> Result<()> {
        self.update_files(&java_resource_updates(changes))
    }

    pub fn update_assets(&mut self, changes: &ChangeSet) -> Result<()> {
        self.update_files(&asset_updates(changes))
    }

    pub fn update_android_resources(&mut self, changes: &ChangeSet) -> Result<()> {
        self.update_files(&from_change_set(changes))
    }

    pub fn update_native_libraries(&mut self, changes: &ChangeSet) -> Result<()> {
        let updates = native_library_updates(changes, &self.abi_filter);
        self.update_files(&updates)
    }

    /// Apply a set of updates to the archive.
    ///
    /// Deletes go out first. Files from directories are written one by one, and each zip
    /// that sources updates is merged once with its entries renamed to their targets.
    pub fn update_files(&mut self, updates: &UpdateSet) -> Result<()> {
        self.check_open()?;

        let mut deleted = 0usize;
        for u in updates.iter().filter(|u| u.status == FileStatus::Removed) {
            self.sink.delete_file(&u.name)?;
            deleted += 1;
        }

        let mut plain: Vec<(PathBuf, &str)> = Vec::new();
        let mut archives: BTreeMap<&Path, HashMap<&str, String>> = BTreeMap::new();
        for u in updates.iter().filter(|u| u.status != FileStatus::Removed) {
            match u.source.source_kind() {
                SourceKind::Directory => plain.push((u.source.file(), u.name.as_str())),
                SourceKind::Archive => {
                    archives
                        .entry(u.source.base())
                        .or_default()
                        .insert(u.source.relative_path(), u.name.clone());
                }
                SourceKind::Missing => {
                    return Err(PackagingError::MissingSource {
                        file: u.source.clone(),
                    });
                }
            }
        }

        for (file, name) in &plain {
            self.sink.write_file(file, name)?;
        }

        let filter = MergeFilter::new(
            archives.values().flat_map(|m| m.values().cloned()),
            plain.iter().map(|(_, name)| name.to_string()),
        );
        let is_ignored = |name: &str| filter.is_ignored(name);
        for (zip, remap) in &archives {
            let remap_fn = |entry: &str| remap.get(entry).cloned();
            self.sink.write_zip(zip, &remap_fn, &is_ignored)?;
        }

        tracing::debug!(
            deleted,
            files = plain.len(),
            zips = archives.len(),
            "archive updated"
        );
        Ok(())
    }

    /// Finalize the archive, then save the dex name map. Both are attempted; the first
    /// failure is returned.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let sink_result = self.sink.close();
        let renamer_result = self.dex_renamer.close();
        sink_result.and(renamer_result)
    }
}

impl Drop for IncrementalPackager {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "failed to close incremental packager");
        }
    }
}
