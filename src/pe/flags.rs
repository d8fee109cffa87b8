//! Suspicion flags accumulated while parsing a PE structure.

/// A monotonic set of structural anomalies. The API only ever adds flags;
/// there is no way to clear one, so "flags accumulate, never clear" holds by
/// construction for the lifetime of a parsed image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SuspicionFlags(u8);

impl SuspicionFlags {
    /// The section holding the entry point is named neither `.text` nor `CODE`.
    pub const EXEC_SECTION_NOT_TEXT: u8 = 0x01;
    /// The file declares no import directory at all.
    pub const NO_IMPORTS: u8 = 0x02;
    /// The import directory is structurally broken.
    pub const CORRUPTED_IMPORTS: u8 = 0x04;
    /// A section's raw extent passes the end of the file.
    pub const SECTION_OUT_OF_BOUND: u8 = 0x08;
    /// Import data is readable but abnormal (unterminated names, tables
    /// outside their section).
    pub const SUSPICIOUS_IMPORTS: u8 = 0x10;

    /// An empty flag set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a flag. Adding an already-present flag is a no-op.
    pub fn insert(&mut self, flag: u8) {
        self.0 |= flag;
    }

    /// Check whether a flag is present.
    pub fn contains(&self, flag: u8) -> bool {
        self.0 & flag != 0
    }

    /// Whether no flag has been raised.
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// The raw bit value.
    pub fn bits(&self) -> u8 {
        self.0
    }

    /// Names of the raised flags, in bit order.
    pub fn names(&self) -> Vec<&'static str> {
        let all = [
            (Self::EXEC_SECTION_NOT_TEXT, "exec-section-not-text"),
            (Self::NO_IMPORTS, "no-imports"),
            (Self::CORRUPTED_IMPORTS, "corrupted-imports"),
            (Self::SECTION_OUT_OF_BOUND, "section-out-of-bound"),
            (Self::SUSPICIOUS_IMPORTS, "suspicious-imports"),
        ];
        all.iter()
            .filter(|(bit, _)| self.contains(*bit))
            .map(|&(_, name)| name)
            .collect()
    }
}

impl std::fmt::Display for SuspicionFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", self.names().join("|"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_contains() {
        let mut flags = SuspicionFlags::new();
        assert!(flags.is_empty());

        flags.insert(SuspicionFlags::NO_IMPORTS);
        assert!(flags.contains(SuspicionFlags::NO_IMPORTS));
        assert!(!flags.contains(SuspicionFlags::CORRUPTED_IMPORTS));

        // inserting twice changes nothing
        let before = flags.bits();
        flags.insert(SuspicionFlags::NO_IMPORTS);
        assert_eq!(flags.bits(), before);
    }

    #[test]
    fn test_display_names() {
        let mut flags = SuspicionFlags::new();
        assert_eq!(flags.to_string(), "none");

        flags.insert(SuspicionFlags::EXEC_SECTION_NOT_TEXT);
        flags.insert(SuspicionFlags::SECTION_OUT_OF_BOUND);
        assert_eq!(
            flags.to_string(),
            "exec-section-not-text|section-out-of-bound"
        );
    }
}
