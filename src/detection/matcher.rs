//! Scan engine: window geometry and masked pattern matching.
//!
//! The scan windows are derived entirely from the parsed PE structure. The
//! entry-point window anchors a single-offset test; the non-anchored window
//! widens with the scan mode, from unused (Normal) through the entry-point
//! section (Deep) to the whole file (Hardcore). Entry-point-only signatures
//! ignore the mode and are always tested at the entry point alone.

use crate::core::types::ScanMode;
use crate::detection::database::SignatureDatabase;
use crate::detection::signature::Signature;
use crate::pe::PeImage;
use crate::utils::{round_down, round_up};
use std::ops::Range;
use std::sync::Arc;

/// Matches a shared signature database against parsed PE images.
pub struct ScanEngine {
    db: Arc<SignatureDatabase>,
}

impl ScanEngine {
    /// Create an engine over a loaded database.
    pub fn new(db: Arc<SignatureDatabase>) -> Self {
        Self { db }
    }

    /// The underlying database.
    pub fn database(&self) -> &SignatureDatabase {
        &self.db
    }

    /// Scan a PE image. Returns the first matching signature's tool name,
    /// in database order, or `None`.
    pub fn scan(&self, pe: &PeImage, mode: ScanMode) -> Option<&str> {
        let windows = ScanWindows::compute(pe, mode)?;
        let data = pe.data();
        let ep_window = &data[windows.entry_point..];
        let wide_window = &data[windows.wide.start..windows.wide.end];

        for signature in self.db.signatures() {
            // an anchored signature, or any signature under Normal mode,
            // sees only the entry point; everything else slides across the
            // mode's window
            let window = if signature.ep_only() || mode == ScanMode::Normal {
                &ep_window[..signature.len().min(ep_window.len())]
            } else {
                wide_window
            };

            if find_match(window, signature) {
                log::debug!("signature match: {}", signature.tool());
                return Some(signature.tool());
            }
        }

        None
    }
}

/// The two scan windows for one file, as in-bounds offsets into its data.
struct ScanWindows {
    /// Start of the entry-point window (runs to end of file; each test is
    /// truncated to the signature's own length)
    entry_point: usize,
    /// The non-anchored window for the current mode
    wide: Range<usize>,
}

impl ScanWindows {
    /// Compute the windows, or `None` when the geometry is impossible and
    /// the file cannot match at all.
    fn compute(pe: &PeImage, mode: ScanMode) -> Option<Self> {
        let file_size = pe.file_size() as u64;
        let entry_point = u64::from(pe.entry_point_rva());
        // a zero FileAlignment would be division by zero in the rounding;
        // degrade to byte granularity
        let alignment = u64::from(pe.file_alignment()).max(1);

        match pe.exec_section() {
            Some(section) => {
                let mut window_size = round_up(u64::from(section.size_of_raw_data), alignment);
                window_size = window_size.min(u64::from(section.virtual_size));
                let phys_start = round_down(u64::from(section.pointer_to_raw_data), alignment);
                let ep_in_section = entry_point - u64::from(section.virtual_address);

                if phys_start > file_size
                    || ep_in_section > window_size
                    || ep_in_section > file_size
                    || phys_start + ep_in_section > file_size
                {
                    return None;
                }
                if window_size > file_size || phys_start + window_size > file_size {
                    window_size = file_size - phys_start;
                }

                let wide = match mode {
                    ScanMode::Hardcore => 0..file_size as usize,
                    _ => phys_start as usize..(phys_start + window_size) as usize,
                };
                Some(Self {
                    entry_point: (phys_start + ep_in_section) as usize,
                    wide,
                })
            }
            None => {
                // entry point in the header region: the RVA is the offset
                if entry_point > file_size {
                    return None;
                }
                let headers = u64::from(pe.size_of_headers());
                let wide = if mode == ScanMode::Hardcore || headers > file_size {
                    0..file_size as usize
                } else {
                    0..headers as usize
                };
                Some(Self {
                    entry_point: entry_point as usize,
                    wide,
                })
            }
        }
    }
}

/// Slide `signature` across every start offset of `window`. A signature
/// longer than the window (or empty) never matches.
fn find_match(window: &[u8], signature: &Signature) -> bool {
    let n = signature.len();
    if n == 0 || n > window.len() {
        return false;
    }
    window
        .windows(n)
        .any(|candidate| matches_at(candidate, signature.pattern(), signature.mask()))
}

/// Masked comparison at one offset: every byte must satisfy
/// `(mask | byte) == pattern`.
fn matches_at(window: &[u8], pattern: &[u8], mask: &[u8]) -> bool {
    pattern
        .iter()
        .zip(mask)
        .zip(window)
        .all(|((&p, &m), &b)| (m | b) == p)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::TestPe;

    fn database(records: &str) -> Arc<SignatureDatabase> {
        Arc::new(SignatureDatabase::parse(records).unwrap())
    }

    /// PE32 whose entry point sits on `60 E8 00 00 00 00 58`, with a
    /// distinctive non-entry-point marker deeper in the section.
    fn sample_pe() -> PeImage {
        let mut spec = TestPe::pe32();
        let mut code = vec![0x90u8; 0x200];
        code[..7].copy_from_slice(&[0x60, 0xE8, 0x00, 0x00, 0x00, 0x00, 0x58]);
        code[0x40..0x44].copy_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
        spec.sections[0].data = code;
        PeImage::parse(spec.build()).unwrap()
    }

    #[test]
    fn test_ep_signature_matches_in_all_modes() {
        let engine = ScanEngine::new(database(
            "UPX v0.89\nsignature = 60 E8 ?? ?? ?? ?? 58\nep_only = true\n",
        ));
        let pe = sample_pe();

        for mode in [ScanMode::Normal, ScanMode::Deep, ScanMode::Hardcore] {
            assert_eq!(engine.scan(&pe, mode), Some("UPX v0.89"), "{mode}");
        }
    }

    #[test]
    fn test_pe64_scans_identically() {
        let mut spec = TestPe::pe64();
        let mut code = vec![0x90u8; 0x200];
        code[..7].copy_from_slice(&[0x60, 0xE8, 0x00, 0x00, 0x00, 0x00, 0x58]);
        spec.sections[0].data = code;
        let pe = PeImage::parse(spec.build()).unwrap();
        assert!(pe.is_pe64());

        let engine = ScanEngine::new(database(
            "UPX v0.89\nsignature = 60 E8 ?? ?? ?? ?? 58\nep_only = true\n",
        ));
        for mode in [ScanMode::Normal, ScanMode::Deep, ScanMode::Hardcore] {
            assert_eq!(engine.scan(&pe, mode), Some("UPX v0.89"), "{mode}");
        }
    }

    #[test]
    fn test_ep_signature_only_tested_at_entry_offset() {
        // the marker exists in the section but not at the entry point, so
        // an anchored signature must not see it in any mode
        let engine = ScanEngine::new(database(
            "Marker\nsignature = DE AD BE EF\nep_only = true\n",
        ));
        let pe = sample_pe();

        for mode in [ScanMode::Normal, ScanMode::Deep, ScanMode::Hardcore] {
            assert_eq!(engine.scan(&pe, mode), None, "{mode}");
        }
    }

    #[test]
    fn test_non_anchored_signature_needs_deep_mode() {
        let engine = ScanEngine::new(database(
            "Marker\nsignature = DE AD BE EF\nep_only = false\n",
        ));
        let pe = sample_pe();

        assert_eq!(engine.scan(&pe, ScanMode::Normal), None);
        assert_eq!(engine.scan(&pe, ScanMode::Deep), Some("Marker"));
        assert_eq!(engine.scan(&pe, ScanMode::Hardcore), Some("Marker"));
    }

    #[test]
    fn test_bytes_outside_section_need_hardcore_mode() {
        let mut spec = TestPe::pe32();
        spec.file_size = Some(0x600);
        let mut pe_bytes = spec.build();
        // marker in the overlay, past the .text raw extent
        pe_bytes[0x500..0x504].copy_from_slice(&[0xCA, 0xFE, 0xBA, 0xBE]);
        let pe = PeImage::parse(pe_bytes).unwrap();

        let engine = ScanEngine::new(database(
            "OverlayMarker\nsignature = CA FE BA BE\nep_only = false\n",
        ));
        assert_eq!(engine.scan(&pe, ScanMode::Deep), None);
        assert_eq!(engine.scan(&pe, ScanMode::Hardcore), Some("OverlayMarker"));
    }

    #[test]
    fn test_wildcard_fixed_bytes_must_match() {
        let engine = ScanEngine::new(database(
            "Strict\nsignature = 60 E8 ?? ?? ?? ?? 59\nep_only = true\n",
        ));
        // the trailing fixed byte is 0x58 in the file, not 0x59
        assert_eq!(engine.scan(&sample_pe(), ScanMode::Hardcore), None);
    }

    #[test]
    fn test_first_signature_in_file_order_wins() {
        let engine = ScanEngine::new(database(
            "First Tool\nsignature = 60 E8\nep_only = true\n\
             Second Tool\nsignature = 60 E8 00\nep_only = true\n",
        ));
        assert_eq!(
            engine.scan(&sample_pe(), ScanMode::Normal),
            Some("First Tool")
        );
    }

    #[test]
    fn test_signature_longer_than_window_is_skipped() {
        // longer than the whole file: skipped everywhere, no panic
        let long = "90 ".repeat(0x1000);
        let engine = ScanEngine::new(database(&format!(
            "Long\nsignature = {long}\nep_only = false\n"
        )));
        assert_eq!(engine.scan(&sample_pe(), ScanMode::Hardcore), None);
    }

    #[test]
    fn test_empty_signature_never_matches() {
        // the loader cannot produce an empty pattern (the bare field prefix
        // fails the load), but a constructed one must still never match
        let signature = Signature::from_pattern_text("Empty", "", false);
        assert!(!find_match(&[0x90, 0x90], &signature));
        assert!(!find_match(&[], &signature));
    }

    #[test]
    fn test_entry_point_in_header_region() {
        let mut spec = TestPe::pe32();
        spec.entry_point = 0x150;
        let mut pe_bytes = spec.build();
        pe_bytes[0x150..0x154].copy_from_slice(&[0x12, 0x34, 0x56, 0x78]);
        // deeper marker: inside the section, past SizeOfHeaders
        pe_bytes[0x250..0x254].copy_from_slice(&[0xCA, 0xFE, 0xBA, 0xBE]);
        let pe = PeImage::parse(pe_bytes).unwrap();
        assert!(pe.exec_section().is_none());

        let anchored = ScanEngine::new(database(
            "HeaderEp\nsignature = 12 34 56 78\nep_only = true\n",
        ));
        for mode in [ScanMode::Normal, ScanMode::Deep, ScanMode::Hardcore] {
            assert_eq!(anchored.scan(&pe, mode), Some("HeaderEp"), "{mode}");
        }

        // under Deep the non-anchored window is the header region only
        let deep_marker = ScanEngine::new(database(
            "PastHeaders\nsignature = CA FE BA BE\nep_only = false\n",
        ));
        assert_eq!(deep_marker.scan(&pe, ScanMode::Deep), None);
        assert_eq!(deep_marker.scan(&pe, ScanMode::Hardcore), Some("PastHeaders"));
    }

    #[test]
    fn test_entry_point_past_file_never_matches() {
        let mut spec = TestPe::pe32();
        // inside no section, beyond the end of the file
        spec.entry_point = 0x00F0_0000;
        let pe = PeImage::parse(spec.build()).unwrap();
        assert!(pe.exec_section().is_none());

        let engine = ScanEngine::new(database("Any\nsignature = ??\nep_only = true\n"));
        assert_eq!(engine.scan(&pe, ScanMode::Hardcore), None);
    }

    #[test]
    fn test_matches_at_masked_compare() {
        // AA ?? CC
        let pattern = [0xAA, 0xFF, 0xCC];
        let mask = [0x00, 0xFF, 0x00];
        assert!(matches_at(&[0xAA, 0x42, 0xCC], &pattern, &mask));
        assert!(matches_at(&[0xAA, 0x00, 0xCC], &pattern, &mask));
        assert!(!matches_at(&[0xAB, 0x42, 0xCC], &pattern, &mask));
        assert!(!matches_at(&[0xAA, 0x42, 0xCD], &pattern, &mask));
    }
}
