//! Shannon entropy over byte histograms.
//!
//! Packed or encrypted regions sit close to the 8.0 maximum; plain code is
//! typically in the 5.0–6.5 band. Out-of-band conditions are reported as
//! negative sentinels so a caller can distinguish "low entropy" from "could
//! not measure".

/// No buffer / empty region to measure.
pub const ENTROPY_NO_DATA: f64 = -1.0;
/// The section's raw-data range is outside the file.
pub const ENTROPY_OUT_OF_BOUNDS: f64 = -2.0;
/// The region's length is zero.
pub const ENTROPY_EMPTY: f64 = -3.0;

/// Shannon entropy, base 2, of `data`: `H = -Σ p(b)·log2(p(b))` over the
/// 256-symbol byte-frequency histogram. Ranges from 0.0 (uniform bytes) to
/// 8.0 (all byte values equally likely).
pub fn shannon_entropy(data: &[u8]) -> f64 {
    if data.is_empty() {
        return ENTROPY_NO_DATA;
    }

    let mut counts = [0u64; 256];
    for &byte in data {
        counts[byte as usize] += 1;
    }

    let len = data.len() as f64;
    let mut entropy = 0.0;
    for &count in &counts {
        if count > 0 {
            let p = count as f64 / len;
            entropy -= p * p.log2();
        }
    }

    entropy
}
