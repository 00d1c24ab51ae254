use crate::error::{PackagingError, Result};
use crate::sink::{ArchiveSink, ArchiveSinkFactory, IgnorePredicate, NameRemap};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

const MANIFEST: &str = "META-INF/MANIFEST.MF";
const MAVEN_DIR: &str = "META-INF/maven/";
const SIGNATURE_EXTENSIONS: [&str; 4] = [".SF", ".RSA", ".DSA", ".EC"];

#[derive(Debug)]
struct Entry {
    data: Vec<u8>,
    method: CompressionMethod,
}

/// Zip file kept in memory while it is being updated and written out on close.
pub struct ZipArchiveSink {
    path: PathBuf,
    order: Vec<String>,
    entries: HashMap<String, Entry>,
    closed: bool,
}

/// Opens a [`ZipArchiveSink`] per package.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZipArchiveSinkFactory;

impl ArchiveSinkFactory for ZipArchiveSinkFactory {
    fn make(&self, apk: &Path) -> Result<Box<dyn ArchiveSink>> {
        Ok(Box::new(ZipArchiveSink::open(apk)?))
    }
}

/// Entries a merged jar carries that have no place in a package.
fn is_excluded_from_merge(name: &str) -> bool {
    if name == MANIFEST || name.starts_with(MAVEN_DIR) {
        return true;
    }
    let Some(file) = name.strip_prefix("META-INF/") else {
        return false;
    };
    if file.contains('/') {
        return false;
    }
    let upper = file.to_ascii_uppercase();
    SIGNATURE_EXTENSIONS.iter().any(|ext| upper.ends_with(ext))
}

fn method_for(name: &str) -> CompressionMethod {
    if name.ends_with(".so") {
        CompressionMethod::Stored
    } else {
        CompressionMethod::Deflated
    }
}

fn read_entry<R: Read>(
    entry: &mut R,
    name: &str,
    stored: bool,
    size: u64,
    zip: &Path,
) -> Result<Entry> {
    let method = if stored {
        CompressionMethod::Stored
    } else {
        method_for(name)
    };
    let mut data = Vec::with_capacity(size as usize);
    entry.read_to_end(&mut data).map_err(|e| {
        PackagingError::io(format!("failed to read {name} from {}", zip.display()), e)
    })?;
    Ok(Entry { data, method })
}

fn open_archive(zip: &Path) -> Result<zip::ZipArchive<File>> {
    let f = File::open(zip)
        .map_err(|e| PackagingError::io(format!("failed to open {}", zip.display()), e))?;
    zip::ZipArchive::new(f)
        .map_err(|e| PackagingError::zip(format!("failed to read {}", zip.display()), e))
}

impl ZipArchiveSink {
    /// Load `path` if it exists, or start an empty archive.
    pub fn open(path: &Path) -> Result<Self> {
        let mut sink = Self {
            path: path.to_path_buf(),
            order: Vec::new(),
            entries: HashMap::new(),
            closed: false,
        };

        if path.is_file() {
            let mut archive = open_archive(path)?;
            for i in 0..archive.len() {
                let mut entry = archive.by_index(i).map_err(|e| {
                    PackagingError::zip(format!("failed to read entry {i} of {}", path.display()), e)
                })?;
                if entry.is_dir() {
                    continue;
                }
                let name = entry.name().to_string();
                let stored = entry.compression() == CompressionMethod::Stored;
                let size = entry.size();
                let e = read_entry(&mut entry, &name, stored, size, path)?;
                sink.put(name, e);
            }
            tracing::debug!(apk = %path.display(), entries = sink.order.len(), "archive loaded");
        }

        Ok(sink)
    }

    pub fn entry_names(&self) -> &[String] {
        &self.order
    }

    fn put(&mut self, name: String, entry: Entry) {
        if self.entries.insert(name.clone(), entry).is_none() {
            self.order.push(name);
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(PackagingError::Closed);
        }
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "archive".to_string());
        self.path.with_file_name(format!(".{name}.tmp"))
    }

    fn write_out(&self, dst: &Path) -> Result<()> {
        let f = File::create(dst)
            .map_err(|e| PackagingError::io(format!("failed to create {}", dst.display()), e))?;
        let mut w = zip::ZipWriter::new(BufWriter::new(f));

        for name in &self.order {
            let Some(entry) = self.entries.get(name) else {
                continue;
            };
            let opts = SimpleFileOptions::default()
                .compression_method(entry.method)
                .large_file(entry.data.len() as u64 >= u32::MAX as u64);
            w.start_file(name.as_str(), opts)
                .map_err(|e| PackagingError::zip(format!("failed to add {name}"), e))?;
            w.write_all(&entry.data)
                .map_err(|e| PackagingError::io(format!("failed to write {name}"), e))?;
        }

        let mut out = w
            .finish()
            .map_err(|e| PackagingError::zip(format!("failed to finish {}", dst.display()), e))?;
        out.flush()
            .map_err(|e| PackagingError::io(format!("failed to flush {}", dst.display()), e))?;
        Ok(())
    }
}

impl ArchiveSink for ZipArchiveSink {
    fn delete_file(&mut self, name: &str) -> Result<()> {
        self.check_open()?;
        if self.entries.remove(name).is_some() {
            self.order.retain(|n| n != name);
        }
        tracing::trace!(entry = name, "delete");
        Ok(())
    }

    fn write_file(&mut self, source: &Path, name: &str) -> Result<()> {
        self.check_open()?;
        let data = fs::read(source)
            .map_err(|e| PackagingError::io(format!("failed to read {}", source.display()), e))?;
        self.put(
            name.to_string(),
            Entry {
                data,
                method: method_for(name),
            },
        );
        tracing::trace!(entry = name, src = %source.display(), "write file");
        Ok(())
    }

    fn write_zip(
        &mut self,
        source: &Path,
        remap: NameRemap<'_>,
        ignore: IgnorePredicate<'_>,
    ) -> Result<()> {
        self.check_open()?;
        let mut archive = open_archive(source)?;

        let mut merged = 0usize;
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).map_err(|e| {
                PackagingError::zip(format!("failed to read entry {i} of {}", source.display()), e)
            })?;
            if entry.is_dir() || is_excluded_from_merge(entry.name()) {
                continue;
            }
            let Some(target) = remap(entry.name()) else {
                continue;
            };
            if ignore(&target) {
                continue;
            }

            let stored = entry.compression() == CompressionMethod::Stored;
            let size = entry.size();
            let e = read_entry(&mut entry, &target, stored, size, source)?;
            self.put(target, e);
            merged += 1;
        }

        tracing::trace!(src = %source.display(), merged, "write zip");
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }

        let tmp = self.temp_path();
        if let Err(e) = self.write_out(&tmp) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        fs::rename(&tmp, &self.path).map_err(|e| {
            PackagingError::io(
                format!("failed to move {} to {}", tmp.display(), self.path.display()),
                e,
            )
        })?;

        self.closed = true;
        tracing::debug!(apk = %self.path.display(), entries = self.order.len(), "archive written");
        Ok(())
    }
}

impl Drop for ZipArchiveSink {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(apk = %self.path.display(), error = %e, "failed to write archive");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_zip(path: &Path, entries: &[(&str, &[u8], CompressionMethod)]) {
        let mut w = zip::ZipWriter::new(File::create(path).unwrap());
        for (name, data, method) in entries {
            w.start_file(*name, SimpleFileOptions::default().compression_method(*method))
                .unwrap();
            w.write_all(data).unwrap();
        }
        w.finish().unwrap();
    }

    fn contents(path: &Path) -> Vec<(String, Vec<u8>, CompressionMethod)> {
        let mut a = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
        (0..a.len())
            .map(|i| {
                let mut e = a.by_index(i).unwrap();
                let mut data = Vec::new();
                e.read_to_end(&mut data).unwrap();
                (e.name().to_string(), data, e.compression())
            })
            .collect()
    }

    #[test]
    fn writes_and_deletes() {
        let tmp = tempfile::tempdir().unwrap();
        let apk = tmp.path().join("app.apk");
        let src = tmp.path().join("a.txt");
        fs::write(&src, b"hello").unwrap();

        let mut sink = ZipArchiveSink::open(&apk).unwrap();
        sink.write_file(&src, "a.txt").unwrap();
        sink.write_file(&src, "lib/x86/libz.so").unwrap();
        sink.write_file(&src, "b.txt").unwrap();
        sink.delete_file("b.txt").unwrap();
        sink.delete_file("never-there").unwrap();
        sink.close().unwrap();
        sink.close().unwrap();

        let c = contents(&apk);
        assert_eq!(c.len(), 2);
        assert_eq!(c[0], ("a.txt".to_string(), b"hello".to_vec(), CompressionMethod::Deflated));
        assert_eq!(c[1].0, "lib/x86/libz.so");
        assert_eq!(c[1].2, CompressionMethod::Stored);
        assert!(!tmp.path().join(".app.apk.tmp").exists());
    }

    #[test]
    fn reopen_keeps_entries_and_overwrites_in_place() {
        let tmp = tempfile::tempdir().unwrap();
        let apk = tmp.path().join("app.apk");
        make_zip(
            &apk,
            &[
                ("classes.dex", b"one", CompressionMethod::Deflated),
                ("res/raw.bin", b"raw", CompressionMethod::Stored),
            ],
        );
        let src = tmp.path().join("new.dex");
        fs::write(&src, b"two").unwrap();

        let mut sink = ZipArchiveSink::open(&apk).unwrap();
        sink.write_file(&src, "classes.dex").unwrap();
        assert_eq!(sink.entry_names(), ["classes.dex", "res/raw.bin"]);
        drop(sink);

        let c = contents(&apk);
        assert_eq!(c[0].1, b"two");
        assert_eq!(c[1].2, CompressionMethod::Stored);
    }

    #[test]
    fn merge_remaps_and_filters() {
        let tmp = tempfile::tempdir().unwrap();
        let jar = tmp.path().join("dep.jar");
        make_zip(
            &jar,
            &[
                ("META-INF/MANIFEST.MF", b"m", CompressionMethod::Deflated),
                ("META-INF/CERT.RSA", b"s", CompressionMethod::Deflated),
                ("META-INF/maven/g/a/pom.xml", b"p", CompressionMethod::Deflated),
                ("META-INF/services/x.Y", b"svc", CompressionMethod::Deflated),
                ("fonts/a.ttf", b"font", CompressionMethod::Deflated),
                ("fonts/b.ttf", b"font2", CompressionMethod::Deflated),
                ("skip.txt", b"s", CompressionMethod::Deflated),
            ],
        );
        let apk = tmp.path().join("app.apk");

        let mut sink = ZipArchiveSink::open(&apk).unwrap();
        let remap = |n: &str| -> Option<String> {
            if n == "skip.txt" {
                None
            } else if n.starts_with("fonts/") {
                Some(format!("assets/{n}"))
            } else {
                Some(n.to_string())
            }
        };
        let ignore = |n: &str| n == "assets/fonts/b.ttf";
        sink.write_zip(&jar, &remap, &ignore).unwrap();
        sink.close().unwrap();

        let names: Vec<String> = contents(&apk).into_iter().map(|(n, _, _)| n).collect();
        assert_eq!(names, ["META-INF/services/x.Y", "assets/fonts/a.ttf"]);
    }

    #[test]
    fn closed_sink_rejects_writes() {
        let tmp = tempfile::tempdir().unwrap();
        let mut sink = ZipArchiveSink::open(&tmp.path().join("x.apk")).unwrap();
        sink.close().unwrap();
        assert!(matches!(
            sink.delete_file("a"),
            Err(PackagingError::Closed)
        ));
    }

    #[test]
    fn signature_files_are_recognised() {
        assert!(is_excluded_from_merge("META-INF/CERT.SF"));
        assert!(is_excluded_from_merge("META-INF/key.ec"));
        assert!(!is_excluded_from_merge("META-INF/sub/CERT.SF"));
        assert!(!is_excluded_from_merge("META-INF/LICENSE"));
        assert!(!is_excluded_from_merge("other/MANIFEST.MF"));
    }
}
