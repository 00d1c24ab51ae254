use crate::abi_filter::NativeLibraryAbiFilter;
use crate::types::{ChangeSet, FileStatus, RelativeFile};
use std::collections::BTreeSet;

/// Prefix of asset entries inside an APK.
pub const ASSETS_PREFIX: &str = "assets/";

/// One archive-level change: put `source` at `name`, or delete `name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackagedFileUpdate {
    pub source: RelativeFile,
    pub name: String,
    pub status: FileStatus,
}

impl PackagedFileUpdate {
    pub fn new(source: RelativeFile, name: impl Into<String>, status: FileStatus) -> Self {
        Self {
            source,
            name: name.into(),
            status,
        }
    }
}

pub type UpdateSet = BTreeSet<PackagedFileUpdate>;

/// One update per entry, packaged under the artifact's own relative path.
pub fn from_change_set(changes: &ChangeSet) -> UpdateSet {
    changes
        .iter()
        .map(|(rf, &status)| {
            PackagedFileUpdate::new(rf.clone(), rf.relative_path().to_string(), status)
        })
        .collect()
}

/// Assets are packaged below `assets/`.
pub fn asset_updates(changes: &ChangeSet) -> UpdateSet {
    from_change_set(changes)
        .into_iter()
        .map(|u| PackagedFileUpdate {
            name: format!("{ASSETS_PREFIX}{}", u.name),
            ..u
        })
        .collect()
}

/// Java resources, minus any compiled classes that leaked into the resource stream.
///
/// TODO: drop the `.class` filter once shrinker outputs stop emitting classes as resources.
pub fn java_resource_updates(changes: &ChangeSet) -> UpdateSet {
    let filtered: ChangeSet = changes
        .iter()
        .filter(|(rf, _)| !rf.relative_path().ends_with(".class"))
        .map(|(rf, &st)| (rf.clone(), st))
        .collect();
    from_change_set(&filtered)
}

pub fn native_library_updates(changes: &ChangeSet, filter: &NativeLibraryAbiFilter) -> UpdateSet {
    let filtered: ChangeSet = changes
        .iter()
        .filter(|(rf, _)| filter.accepts(rf.relative_path()))
        .map(|(rf, &st)| (rf.clone(), st))
        .collect();
    from_change_set(&filtered)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(entries: &[(&str, FileStatus)]) -> ChangeSet {
        entries
            .iter()
            .map(|(p, st)| (RelativeFile::new("base", p), *st))
            .collect()
    }

    #[test]
    fn names_follow_relative_paths() {
        let updates = from_change_set(&set(&[
            ("res/layout/main.xml", FileStatus::New),
            ("AndroidManifest.xml", FileStatus::Changed),
        ]));
        let names: Vec<(&str, FileStatus)> =
            updates.iter().map(|u| (u.name.as_str(), u.status)).collect();
        assert_eq!(
            names,
            [
                ("AndroidManifest.xml", FileStatus::Changed),
                ("res/layout/main.xml", FileStatus::New)
            ]
        );
    }

    #[test]
    fn assets_get_prefixed() {
        let updates = asset_updates(&set(&[("fonts/a.ttf", FileStatus::Removed)]));
        let u = updates.iter().next().unwrap();
        assert_eq!(u.name, "assets/fonts/a.ttf");
        assert_eq!(u.source.relative_path(), "fonts/a.ttf");
        assert_eq!(u.status, FileStatus::Removed);
    }

    #[test]
    fn class_files_are_not_java_resources() {
        let updates = java_resource_updates(&set(&[
            ("com/foo/Bar.class", FileStatus::New),
            ("com/foo/messages.properties", FileStatus::New),
        ]));
        assert_eq!(updates.len(), 1);
        assert_eq!(
            updates.iter().next().unwrap().name,
            "com/foo/messages.properties"
        );
    }

    #[test]
    fn native_libraries_are_abi_filtered() {
        let filter = NativeLibraryAbiFilter::new(["arm64-v8a".to_string()], false);
        let updates = native_library_updates(
            &set(&[
                ("lib/arm64-v8a/libfoo.so", FileStatus::New),
                ("lib/x86/libfoo.so", FileStatus::New),
                ("lib/arm64-v8a/gdbserver", FileStatus::New),
            ]),
            &filter,
        );
        assert_eq!(updates.len(), 1);
        assert_eq!(updates.iter().next().unwrap().name, "lib/arm64-v8a/libfoo.so");
    }
}
