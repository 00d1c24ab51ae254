/// Name of the primary dex entry in an APK.
pub const CLASSES_DEX: &str = "classes.dex";

/// Slot name for a 1-based position in the dex sequence.
pub fn slot_name(index: usize) -> String {
    if index <= 1 {
        CLASSES_DEX.to_string()
    } else {
        format!("classes{index}.dex")
    }
}

/// 1-based position of a slot name, or `None` if `name` is not part of the sequence.
///
/// `classes1.dex` is not a valid slot: the first slot is always `classes.dex`.
pub fn slot_index(name: &str) -> Option<usize> {
    if name == CLASSES_DEX {
        return Some(1);
    }

    let digits = name.strip_prefix("classes")?.strip_suffix(".dex")?;
    if digits.is_empty() || digits.starts_with('0') || !digits.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }

    match digits.parse::<usize>() {
        Ok(n) if n >= 2 => Some(n),
        _ => None,
    }
}

/// Produces `classes.dex`, `classes2.dex`, `classes3.dex`, ... one name per call.
#[derive(Debug, Default, Clone)]
pub struct DexNameSupplier {
    issued: usize,
}

impl DexNameSupplier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_name(&mut self) -> String {
        self.issued += 1;
        slot_name(self.issued)
    }

    /// Start over from `classes.dex`.
    pub fn reset(&mut self) {
        self.issued = 0;
    }
}

impl Iterator for DexNameSupplier {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        Some(self.next_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supplier_sequence() {
        let names: Vec<String> = DexNameSupplier::new().take(4).collect();
        assert_eq!(
            names,
            ["classes.dex", "classes2.dex", "classes3.dex", "classes4.dex"]
        );
    }

    #[test]
    fn supplier_restarts() {
        let mut s = DexNameSupplier::new();
        s.next_name();
        s.next_name();
        s.reset();
        assert_eq!(s.next_name(), CLASSES_DEX);
    }

    #[test]
    fn index_parsing() {
        assert_eq!(slot_index("classes.dex"), Some(1));
        assert_eq!(slot_index("classes2.dex"), Some(2));
        assert_eq!(slot_index("classes17.dex"), Some(17));
        assert_eq!(slot_index("classes1.dex"), None);
        assert_eq!(slot_index("classes02.dex"), None);
        assert_eq!(slot_index("classesX.dex"), None);
        assert_eq!(slot_index("foo.dex"), None);
        assert_eq!(slot_index(&slot_name(9)), Some(9));
    }
}
