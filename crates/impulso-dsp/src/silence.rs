//! Amplitude threshold scanning.
//!
//! Both scans return `samples.len()` as the sentinel for "nothing found",
//! never an in-range index for a silent buffer.

use crate::math::db_to_linear;

/// Index of the first sample whose magnitude exceeds the threshold.
///
/// The threshold is given in dB and clamped to [-200, 200] before conversion
/// to linear gain; the comparison is `|sample| > 10^(db/20)`.
pub fn first_above_threshold(samples: &[f32], threshold_db: f32) -> usize {
    let threshold = db_to_linear(threshold_db.clamp(-200.0, 200.0));
    samples
        .iter()
        .position(|s| s.abs() > threshold)
        .unwrap_or(samples.len())
}

/// Index of the last sample whose magnitude exceeds the threshold.
///
/// Scans from the end backward. Returns `samples.len()` when no sample
/// qualifies.
pub fn last_above_threshold(samples: &[f32], threshold_db: f32) -> usize {
    let threshold = db_to_linear(threshold_db.clamp(-200.0, 200.0));
    samples
        .iter()
        .rposition(|s| s.abs() > threshold)
        .unwrap_or(samples.len())
}
