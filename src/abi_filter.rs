use std::collections::BTreeSet;

const GDBSERVER: &str = "gdbserver";
const GDB_SETUP: &str = "gdb.setup";

/// Decides which `lib/<abi>/<file>` entries belong in the package.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NativeLibraryAbiFilter {
    accepted_abis: BTreeSet<String>,
    jni_debug_mode: bool,
}

impl NativeLibraryAbiFilter {
    /// An empty ABI set accepts every ABI.
    pub fn new(accepted_abis: impl IntoIterator<Item = String>, jni_debug_mode: bool) -> Self {
        Self {
            accepted_abis: accepted_abis.into_iter().collect(),
            jni_debug_mode,
        }
    }

    pub fn accepts(&self, path: &str) -> bool {
        let mut segs = path.split('/');
        let (Some("lib"), Some(abi), Some(file), None) =
            (segs.next(), segs.next(), segs.next(), segs.next())
        else {
            return false;
        };
        if abi.is_empty() || file.is_empty() {
            return false;
        }

        if !self.accepted_abis.is_empty() && !self.accepted_abis.contains(abi) {
            return false;
        }

        file.ends_with(".so") || (self.jni_debug_mode && (file == GDBSERVER || file == GDB_SETUP))
    }
}
