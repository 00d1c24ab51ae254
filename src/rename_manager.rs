//! Stable assignment of dex artifacts to the `classesN.dex` entries of an APK.
//!
//! Dex files have to be renamed when packaged, and the names must form a sequence without
//! gaps: `classes.dex`, `classes2.dex`, `classes3.dex`, ... When dex artifacts are added,
//! changed or removed between builds, [`DexRenameManager::update`] works out the smallest set
//! of archive updates that keeps that sequence dense. For example:
//!
//! - empty archive, `a.dex` added: `classes.dex` is added and refers to `a.dex`
//! - `b.dex` added later: `classes2.dex` is added and refers to `b.dex`
//! - `a.dex` removed: `classes.dex` is updated to refer to `b.dex`, `classes2.dex` is removed
//!
//! The artifact-to-name map is persisted in the intermediate directory when the manager is
//! closed and reloaded by the next build.

use crate::codec::{properties_decode, properties_encode};
use crate::config::STATE_FILE;
use crate::dex_names::{CLASSES_DEX, DexNameSupplier, slot_index};
use crate::error::{PackagingError, Result};
use crate::name_map::NameMap;
use crate::packaged_update::{PackagedFileUpdate, UpdateSet};
use crate::types::{ChangeSet, FileStatus, RelativeFile};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

const BASE_KEY_PREFIX: &str = "base.";
const FILE_KEY_PREFIX: &str = "file.";
const RENAMED_KEY_PREFIX: &str = "renamed.";

pub struct DexRenameManager {
    name_map: NameMap,
    incremental_dir: PathBuf,
    closed: bool,
}

impl DexRenameManager {
    /// Open a manager bound to `incremental_dir`, loading any state a previous build left.
    pub fn open(incremental_dir: &Path) -> Result<Self> {
        if !incremental_dir.is_dir() {
            return Err(PackagingError::InvalidIntermediateDir {
                path: incremental_dir.to_path_buf(),
            });
        }

        let name_map = Self::load_name_map(incremental_dir)?;
        tracing::debug!(
            dir = %incremental_dir.display(),
            slots = name_map.len(),
            "dex rename state loaded"
        );

        Ok(Self {
            name_map,
            incremental_dir: incremental_dir.to_path_buf(),
            closed: false,
        })
    }

    /// Read the persisted map. A missing state file yields an empty map.
    pub fn load_name_map(incremental_dir: &Path) -> Result<NameMap> {
        let path = incremental_dir.join(STATE_FILE);
        let text = match fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(NameMap::new()),
            Err(source) => return Err(PackagingError::StateRead { path, source }),
        };

        let props = properties_decode(&text).map_err(|e| PackagingError::MalformedState {
            path: path.clone(),
            line: e.line,
            reason: e.reason,
        })?;

        let mut map = NameMap::new();
        for i in 0usize.. {
            let base = props.get(&format!("{BASE_KEY_PREFIX}{i}"));
            let file = props.get(&format!("{FILE_KEY_PREFIX}{i}"));
            let renamed = props.get(&format!("{RENAMED_KEY_PREFIX}{i}"));
            let (Some(base), Some(file), Some(renamed)) = (base, file, renamed) else {
                break;
            };

            let rf = RelativeFile::new(base, file);
            if map.contains_name(renamed) || map.name_of(&rf).is_some() {
                return Err(PackagingError::Inconsistent(format!(
                    "state file {} maps '{rf}' or '{renamed}' more than once",
                    path.display()
                )));
            }
            map.insert(rf, renamed.clone());
        }

        Ok(map)
    }

    pub fn name_map(&self) -> &NameMap {
        &self.name_map
    }

    fn write_state(&self) -> Result<()> {
        let path = self.incremental_dir.join(STATE_FILE);

        let mut pairs: Vec<(String, String)> = Vec::with_capacity(self.name_map.len() * 3);
        for (idx, (rf, name)) in self.name_map.entries_by_slot().into_iter().enumerate() {
            pairs.push((
                format!("{BASE_KEY_PREFIX}{idx}"),
                rf.base().to_string_lossy().into_owned(),
            ));
            pairs.push((
                format!("{FILE_KEY_PREFIX}{idx}"),
                rf.relative_path().to_string(),
            ));
            pairs.push((format!("{RENAMED_KEY_PREFIX}{idx}"), name.to_string()));
        }

        let header = chrono::Local::now()
            .format("%a %b %d %H:%M:%S %Y")
            .to_string();
        let text = properties_encode(
            Some(&header),
            pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        );

        let write = || -> std::io::Result<()> {
            let mut f = File::create(&path)?;
            f.write_all(text.as_bytes())?;
            f.sync_all()
        };
        write().map_err(|source| PackagingError::StateWrite {
            path: path.clone(),
            source,
        })?;

        tracing::info!(
            state = %path.display(),
            slots = self.name_map.len(),
            "dex rename state saved"
        );
        Ok(())
    }

    /// Apply a batch of dex changes and return the archive updates that mirror them.
    ///
    /// Guarantees, after the batch:
    /// - slot names are `classes.dex .. classesN.dex` with no gaps
    /// - each artifact owns at most one slot and vice versa
    /// - if an artifact whose file name is `classes.dex` was added, it owns `classes.dex`
    ///
    /// Freed slots are reused lowest first (reported as CHANGED). Remaining gaps are closed
    /// by moving the artifact in the highest slot down, so the highest slot is the only one
    /// ever deleted from the archive.
    ///
    /// The batch is staged on a copy of the map; on error the map is left as it was.
    pub fn update(&mut self, changes: &ChangeSet) -> Result<UpdateSet> {
        if self.closed {
            return Err(PackagingError::Closed);
        }

        let mut map = self.name_map.clone();

        // Current slots, in sequence order.
        let mut supplier = DexNameSupplier::new();
        let mut name_list: Vec<String> = Vec::with_capacity(map.len());
        for _ in 0..map.len() {
            let next = supplier.next_name();
            if !map.contains_name(&next) {
                return Err(PackagingError::Inconsistent(format!(
                    "'{next}' is not assigned, but the map has {} entries",
                    map.len()
                )));
            }
            name_list.push(next);
        }

        // Free the slots of removed artifacts.
        let mut freed: Vec<String> = Vec::new();
        let mut deleted_files: HashMap<String, RelativeFile> = HashMap::new();
        for rf in with_status(changes, FileStatus::Removed) {
            let name = map
                .remove_file(rf)
                .ok_or_else(|| unknown(rf, FileStatus::Removed))?;
            deleted_files.insert(name.clone(), rf.clone());
            freed.push(name);
        }
        freed.sort_by_key(|n| slot_index(n));
        let mut deleted_names: VecDeque<String> = freed.into();

        // New artifacts; a literal classes.dex goes first.
        let mut added_files: Vec<RelativeFile> = Vec::new();
        for rf in with_status(changes, FileStatus::New) {
            if map.name_of(rf).is_some() {
                return Err(PackagingError::AlreadyTracked { file: rf.clone() });
            }
            added_files.push(rf.clone());
        }
        added_files.sort_by(classes_dex_first);
        let adding_classes_dex = added_files.iter().any(|rf| rf.file_name() == CLASSES_DEX);

        // A literal classes.dex claims the classes.dex slot from whoever holds it.
        if adding_classes_dex {
            if let Some(holder) = map.file_of(CLASSES_DEX).cloned() {
                if holder.file_name() != CLASSES_DEX {
                    map.remove_file(&holder);
                    added_files.push(holder);
                    deleted_names.push_front(CLASSES_DEX.to_string());
                }
            }
        }

        let mut added_names: BTreeSet<String> = BTreeSet::new();
        let mut updated_names: BTreeSet<String> = BTreeSet::new();
        for rf in added_files {
            let name = match deleted_names.pop_front() {
                Some(reused) => {
                    deleted_files.remove(&reused);
                    updated_names.insert(reused.clone());
                    reused
                }
                None => {
                    let minted = supplier.next_name();
                    added_names.insert(minted.clone());
                    name_list.push(minted.clone());
                    minted
                }
            };
            map.insert(rf, name);
        }

        for rf in with_status(changes, FileStatus::Changed) {
            let name = map
                .name_of(rf)
                .ok_or_else(|| unknown(rf, FileStatus::Changed))?;
            updated_names.insert(name.to_string());
        }

        // Compaction: close the remaining gaps from the top of the sequence.
        let mut finally_deleted: BTreeSet<String> = BTreeSet::new();
        loop {
            let Some(last_deleted) = deleted_names.back().cloned() else {
                break;
            };
            let Some(last_name) = name_list.pop() else {
                return Err(PackagingError::Inconsistent(format!(
                    "'{last_deleted}' was freed but no slots remain"
                )));
            };

            if last_deleted == last_name {
                deleted_names.pop_back();
                finally_deleted.insert(last_name);
                continue;
            }

            let Some(target) = deleted_names.pop_front() else {
                break;
            };
            let file = map.file_of(&last_name).cloned().ok_or_else(|| {
                PackagingError::Inconsistent(format!("no artifact owns '{last_name}'"))
            })?;

            map.insert(file.clone(), target.clone());
            deleted_files.remove(&target);
            updated_names.remove(&last_name);
            updated_names.insert(target);
            deleted_files.insert(last_name.clone(), file);
            finally_deleted.insert(last_name);
        }

        if let Some(name) = added_names
            .iter()
            .chain(updated_names.iter())
            .find(|n| finally_deleted.contains(*n))
        {
            return Err(PackagingError::Inconsistent(format!(
                "'{name}' would be both written and deleted"
            )));
        }

        let mut updates = UpdateSet::new();
        for (names, status) in [
            (&added_names, FileStatus::New),
            (&updated_names, FileStatus::Changed),
        ] {
            for name in names {
                let file = map.file_of(name).ok_or_else(|| {
                    PackagingError::Inconsistent(format!("no artifact owns '{name}'"))
                })?;
                updates.insert(PackagedFileUpdate::new(file.clone(), name.clone(), status));
            }
        }
        for name in &finally_deleted {
            let file = deleted_files.get(name).ok_or_else(|| {
                PackagingError::Inconsistent(format!("no removed artifact recorded for '{name}'"))
            })?;
            updates.insert(PackagedFileUpdate::new(
                file.clone(),
                name.clone(),
                FileStatus::Removed,
            ));
        }

        self.name_map = map;

        tracing::debug!(
            added = added_names.len(),
            updated = updated_names.len(),
            deleted = finally_deleted.len(),
            slots = self.name_map.len(),
            "dex slots updated"
        );

        Ok(updates)
    }

    /// Persist the map. Only the first successful call writes.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }

        self.write_state()?;
        self.closed = true;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for DexRenameManager {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "failed to save dex rename state");
        }
    }
}

fn with_status(changes: &ChangeSet, status: FileStatus) -> impl Iterator<Item = &RelativeFile> {
    changes
        .iter()
        .filter(move |(_, st)| **st == status)
        .map(|(rf, _)| rf)
}

fn unknown(rf: &RelativeFile, status: FileStatus) -> PackagingError {
    PackagingError::UnknownArtifact {
        file: rf.clone(),
        status,
    }
}

fn classes_dex_first(a: &RelativeFile, b: &RelativeFile) -> Ordering {
    let a_primary = a.file_name() == CLASSES_DEX;
    let b_primary = b.file_name() == CLASSES_DEX;
    b_primary
        .cmp(&a_primary)
        .then_with(|| a.relative_path().cmp(b.relative_path()))
        .then_with(|| a.base().cmp(b.base()))
}
