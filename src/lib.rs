//! Incremental APK packaging.
//!
//! An [`IncrementalPackager`] keeps an existing APK in sync with build outputs by applying
//! per-category change sets, instead of rebuilding the archive. Dex files are packaged under
//! the `classes.dex`, `classes2.dex`, ... names, which [`DexRenameManager`] keeps gap-free
//! and stable across builds.

pub mod abi_filter;
pub mod codec;
pub mod config;
pub mod dex_names;
pub mod error;
pub mod file_cache;
pub mod file_sets;
pub mod name_map;
pub mod packaged_update;
pub mod packager;
pub mod rename_manager;
pub mod sink;
pub mod types;
pub mod zip_sink;

pub use abi_filter::NativeLibraryAbiFilter;
pub use config::PackagerOptions;
pub use error::{PackagingError, Result};
pub use file_cache::FileCacheByPath;
pub use name_map::NameMap;
pub use packaged_update::{PackagedFileUpdate, UpdateSet};
pub use packager::{IncrementalPackager, MergeFilter};
pub use rename_manager::DexRenameManager;
pub use sink::{ArchiveSink, ArchiveSinkFactory};
pub use types::{ChangeSet, FileStatus, RelativeFile, SourceKind};
pub use zip_sink::{ZipArchiveSink, ZipArchiveSinkFactory};
