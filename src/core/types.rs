//! Core type definitions used throughout packscan.

use serde::{Deserialize, Serialize};

/// Scan coverage mode.
///
/// The mode governs which window signatures *not* anchored to the entry
/// point are tested against. Entry-point-only signatures are always tested
/// at the entry point, regardless of mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    /// Test every signature only at the entry point.
    Normal,
    /// Also scan the whole entry-point section with non-anchored signatures.
    Deep,
    /// Also scan the entire file with non-anchored signatures.
    Hardcore,
}

impl Default for ScanMode {
    fn default() -> Self {
        ScanMode::Deep
    }
}

impl ScanMode {
    /// Get string representation for configuration storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanMode::Normal => "normal",
            ScanMode::Deep => "deep",
            ScanMode::Hardcore => "hardcore",
        }
    }

    /// Parse from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "normal" => Some(ScanMode::Normal),
            "deep" => Some(ScanMode::Deep),
            "hardcore" => Some(ScanMode::Hardcore),
            _ => None,
        }
    }
}

impl std::fmt::Display for ScanMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of scanning a single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanVerdict {
    /// A signature matched; the tool name is reported alongside.
    Matched,
    /// The file parsed as a PE but no signature matched.
    NoMatch,
    /// The file is not a PE (or could not be read) and was skipped.
    NotPe,
}

impl std::fmt::Display for ScanVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanVerdict::Matched => write!(f, "matched"),
            ScanVerdict::NoMatch => write!(f, "no match"),
            ScanVerdict::NotPe => write!(f, "not a PE file"),
        }
    }
}
