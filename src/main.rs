use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use incpack::config::{self, PackagerOptions, ZIP_CACHE_DIR};
use incpack::file_sets;
use incpack::{
    ChangeSet, DexRenameManager, FileCacheByPath, FileStatus, IncrementalPackager, RelativeFile,
    ZipArchiveSinkFactory,
};
use std::path::{Path, PathBuf};

mod logging;

#[derive(Parser, Debug)]
#[command(name = "incpack")]
#[command(version, about = "Incrementally update an APK from build outputs")]
struct Cli {
    /// APK to update (created if missing).
    #[arg(long, global = true, default_value = "app.apk")]
    output: PathBuf,

    /// Intermediate state: a name (no slashes) or a directory path.
    ///
    /// A name is placed under the platform cache directory, in a subdirectory named after
    /// the APK. Every APK needs its own intermediate directory.
    #[arg(long, global = true, default_value = "default")]
    intermediate: String,

    /// Increase logging verbosity (use together with RUST_LOG for fine control).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Args, Debug)]
struct ChangeArgs {
    /// Directory or zip the changed files are relative to
    #[arg(long)]
    base: PathBuf,

    /// Relative path of an added file (repeatable)
    #[arg(long = "new", value_name = "REL")]
    new_files: Vec<String>,

    /// Relative path of a modified file (repeatable)
    #[arg(long = "changed", value_name = "REL")]
    changed: Vec<String>,

    /// Relative path of a deleted file (repeatable)
    #[arg(long = "removed", value_name = "REL")]
    removed: Vec<String>,

    /// Report every file under the base instead. For a zip base, entries are diffed
    /// against the copy cached by the previous run.
    #[arg(long, default_value_t = false)]
    scan: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Package dex files as classes.dex, classes2.dex, ...
    Dex(ChangeArgs),

    /// Package Java resources under their relative paths
    JavaResources(ChangeArgs),

    /// Package assets below assets/
    Assets(ChangeArgs),

    /// Package compiled Android resources under their relative paths
    AndroidResources(ChangeArgs),

    /// Package native libraries (lib/<abi>/...)
    NativeLibs {
        #[command(flatten)]
        changes: ChangeArgs,

        /// Only package these ABIs (repeatable; default: all)
        #[arg(long = "abi")]
        abis: Vec<String>,

        /// Also package gdbserver and gdb.setup
        #[arg(long, default_value_t = false)]
        jni_debug: bool,
    },

    /// Print the persisted dex name map in slot order
    ShowMap,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose)?;

    let inc_dir = config::resolve_intermediate_dir(&cli.intermediate, &cli.output)
        .with_context(|| format!("Failed to resolve --intermediate {}", cli.intermediate))?;

    if let Command::ShowMap = cli.cmd {
        let map = DexRenameManager::load_name_map(&inc_dir)
            .with_context(|| format!("Failed to load state from {}", inc_dir.display()))?;
        if map.is_empty() {
            println!("No dex files packaged yet.");
        }
        for (rf, name) in map.entries_by_slot() {
            println!("{:<16} {}", name, rf);
        }
        return Ok(());
    }

    config::ensure_intermediate_dir(&inc_dir)?;
    let cache = FileCacheByPath::new(inc_dir.join(ZIP_CACHE_DIR));

    let (changes_args, options) = match &cli.cmd {
        Command::NativeLibs {
            changes,
            abis,
            jni_debug,
        } => (
            changes,
            PackagerOptions {
                accepted_abis: abis.iter().cloned().collect(),
                jni_debug_mode: *jni_debug,
            },
        ),
        Command::Dex(c)
        | Command::JavaResources(c)
        | Command::Assets(c)
        | Command::AndroidResources(c) => (c, PackagerOptions::default()),
        Command::ShowMap => return Ok(()),
    };

    let changes = collect_changes(changes_args, &cache)?;
    if changes.is_empty() {
        println!("Nothing to do.");
        return Ok(());
    }

    tracing::info!(
        apk = %cli.output.display(),
        intermediate = %inc_dir.display(),
        count = changes.len(),
        "packaging starting"
    );

    let mut packager =
        IncrementalPackager::new(&cli.output, &inc_dir, &ZipArchiveSinkFactory, options)
            .with_context(|| format!("Failed to open {}", cli.output.display()))?;

    match &cli.cmd {
        Command::Dex(_) => packager.update_dex(&changes),
        Command::JavaResources(_) => packager.update_java_resources(&changes),
        Command::Assets(_) => packager.update_assets(&changes),
        Command::AndroidResources(_) => packager.update_android_resources(&changes),
        Command::NativeLibs { .. } => packager.update_native_libraries(&changes),
        Command::ShowMap => Ok(()),
    }
    .with_context(|| format!("Failed to update {}", cli.output.display()))?;

    packager
        .close()
        .with_context(|| format!("Failed to finish {}", cli.output.display()))?;

    if changes_args.scan && changes_args.base.is_file() {
        cache
            .add(&changes_args.base)
            .with_context(|| format!("Failed to cache {}", changes_args.base.display()))?;
    }

    print_summary(&changes);
    Ok(())
}

fn collect_changes(args: &ChangeArgs, cache: &FileCacheByPath) -> Result<ChangeSet> {
    if args.scan {
        if !(args.new_files.is_empty() && args.changed.is_empty() && args.removed.is_empty()) {
            return Err(anyhow!("--scan cannot be combined with --new/--changed/--removed"));
        }
        return scan_base(&args.base, cache);
    }

    let mut changes = ChangeSet::new();
    for (paths, status) in [
        (&args.new_files, FileStatus::New),
        (&args.changed, FileStatus::Changed),
        (&args.removed, FileStatus::Removed),
    ] {
        for rel in paths {
            let rf = RelativeFile::new(&args.base, rel);
            if let Some(prev) = changes.insert(rf, status) {
                return Err(anyhow!("{rel} is listed as both {prev} and {status}"));
            }
        }
    }
    Ok(changes)
}

fn scan_base(base: &Path, cache: &FileCacheByPath) -> Result<ChangeSet> {
    if base.is_file() {
        file_sets::from_zip_with_cache(base, cache)
            .with_context(|| format!("Failed to read {}", base.display()))
    } else if base.is_dir() {
        file_sets::from_directory(base).with_context(|| format!("Failed to scan {}", base.display()))
    } else {
        Err(anyhow!("{} does not exist", base.display()))
    }
}

fn print_summary(changes: &ChangeSet) {
    let count = |st: FileStatus| changes.values().filter(|s| **s == st).count();
    println!("Packaged changes:");
    println!("  new:     {}", count(FileStatus::New));
    println!("  changed: {}", count(FileStatus::Changed));
    println!("  removed: {}", count(FileStatus::Removed));
}
