use crate::dex_names::slot_index;
use crate::types::RelativeFile;
use std::collections::HashMap;

/// Bijective mapping between artifacts and archive slot names.
///
/// Both directions are kept in sync on every mutation; inserting a pair evicts any
/// previous mapping of either side, so no two artifacts ever share a name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameMap {
    by_file: HashMap<RelativeFile, String>,
    by_name: HashMap<String, RelativeFile>,
}

impl NameMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_file.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_file.is_empty()
    }

    pub fn name_of(&self, file: &RelativeFile) -> Option<&str> {
        self.by_file.get(file).map(String::as_str)
    }

    pub fn file_of(&self, name: &str) -> Option<&RelativeFile> {
        self.by_name.get(name)
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Map `file` to `name`, dropping whatever either of them was mapped to before.
    pub fn insert(&mut self, file: RelativeFile, name: String) {
        if let Some(old_name) = self.by_file.remove(&file) {
            self.by_name.remove(&old_name);
        }
        if let Some(old_file) = self.by_name.remove(&name) {
            self.by_file.remove(&old_file);
        }
        self.by_name.insert(name.clone(), file.clone());
        self.by_file.insert(file, name);
    }

    pub fn remove_file(&mut self, file: &RelativeFile) -> Option<String> {
        let name = self.by_file.remove(file)?;
        self.by_name.remove(&name);
        Some(name)
    }

    /// Entries ordered by slot position; names outside the dex sequence sort last.
    pub fn entries_by_slot(&self) -> Vec<(&RelativeFile, &str)> {
        let mut out: Vec<(&RelativeFile, &str)> = self
            .by_file
            .iter()
            .map(|(f, n)| (f, n.as_str()))
            .collect();
        out.sort_by(|a, b| {
            let ka = (slot_index(a.1).unwrap_or(usize::MAX), a.1);
            let kb = (slot_index(b.1).unwrap_or(usize::MAX), b.1);
            ka.cmp(&kb)
        });
        out
    }

    /// True if the assigned names are exactly `classes.dex .. classesN.dex` for N entries.
    pub fn is_dense(&self) -> bool {
        let slots = self
            .by_name
            .keys()
            .map(|n| slot_index(n))
            .collect::<Option<Vec<usize>>>();
        let mut idx = match slots {
            Some(v) => v,
            None => return false,
        };
        idx.sort_unstable();
        idx.iter().enumerate().all(|(i, &n)| n == i + 1)
    }
}
