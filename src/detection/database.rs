//! Line-oriented signature database loading.
//!
//! The database format is three logical lines per record:
//!
//! ```text
//! <tool name>
//! signature = <hex bytes, nibbles may be '?', whitespace ignored>
//! ep_only = true|false
//! ```
//!
//! A blank line or a `;` comment at the first or second position abandons
//! the in-progress record and scanning resumes at the following line. This
//! is deliberate: the historical loader behaves this way, and changing it
//! would alter which signatures load from real-world databases. At the
//! third position no such check exists — anything but the two exact
//! `ep_only` values fails the load.

use crate::core::error::{Error, Result};
use crate::detection::signature::{preprocess_pattern, Signature};
use std::path::Path;

const SIGNATURE_FIELD: &str = "signature = ";
const EP_ONLY_TRUE: &str = "ep_only = true";
const EP_ONLY_FALSE: &str = "ep_only = false";

/// An ordered signature collection; file order is match priority.
/// Immutable after a successful load — a failed load yields no value at all.
#[derive(Debug, Default)]
pub struct SignatureDatabase {
    signatures: Vec<Signature>,
}

impl SignatureDatabase {
    /// Load a database from a text file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::file_read(path, e))?;
        Self::parse(&contents)
    }

    /// Parse a database from text.
    pub fn parse(text: &str) -> Result<Self> {
        let mut signatures = Vec::new();
        let mut lines = text.lines();

        while let Some(line) = lines.next() {
            let tool = line.trim();
            if tool.is_empty() || tool.starts_with(';') {
                continue;
            }

            let Some(signature_line) = lines.next() else {
                // input ended mid-record: the record is abandoned
                break;
            };
            let signature_line = signature_line.trim();
            if signature_line.is_empty() || signature_line.starts_with(';') {
                // abandons the whole in-progress record, tool name included
                continue;
            }
            let Some(pattern_text) = signature_line.strip_prefix(SIGNATURE_FIELD) else {
                return Err(Error::SignatureLoad(format!(
                    "expected '{}' after tool name {:?}",
                    SIGNATURE_FIELD.trim_end(),
                    tool
                )));
            };
            let (pattern, mask) = preprocess_pattern(pattern_text);

            let ep_only = match lines.next().map(str::trim).unwrap_or("") {
                EP_ONLY_TRUE => true,
                EP_ONLY_FALSE => false,
                other => {
                    return Err(Error::SignatureLoad(format!(
                        "invalid scan-location line {:?} for tool {:?}",
                        other, tool
                    )));
                }
            };

            signatures.push(Signature::new(tool, pattern, mask, ep_only));
        }

        log::debug!("loaded {} signatures", signatures.len());
        Ok(Self { signatures })
    }

    /// The signatures, in load order.
    pub fn signatures(&self) -> &[Signature] {
        &self.signatures
    }

    /// Number of loaded signatures.
    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    /// Whether the database holds no signatures.
    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }
}
