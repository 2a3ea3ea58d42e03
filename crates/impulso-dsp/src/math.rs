//! Numeric helpers shared across the pipeline.
//!
//! - [`db_to_linear`] / [`linear_to_db`] - Convert between dB and linear gain
//! - [`next_power_of_two`] - FFT size selection
//! - [`peak`] / [`peak_index`] - Absolute peak search
//! - [`shift_left`] - In-place left shift with zero fill (leading-silence trim)

/// Convert decibels to linear gain.
///
/// # Example
/// ```rust
/// use impulso_dsp::math::db_to_linear;
///
/// assert!((db_to_linear(0.0) - 1.0).abs() < 0.001);
/// assert!((db_to_linear(-6.02) - 0.5).abs() < 0.01);
/// ```
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    // 10^(dB/20) = e^(dB * ln(10)/20)
    const FACTOR: f32 = std::f32::consts::LN_10 / 20.0;
    (db * FACTOR).exp()
}

/// Convert linear gain to decibels.
///
/// Input is floored at 1e-10 to keep the result finite.
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    const FACTOR: f32 = 20.0 / std::f32::consts::LN_10;
    linear.max(1e-10).ln() * FACTOR
}

/// Smallest power of two that is >= `n`. Returns 1 for `n == 0`.
#[inline]
pub fn next_power_of_two(n: usize) -> usize {
    n.max(1).next_power_of_two()
}

/// Absolute peak value of a buffer (0.0 for an empty buffer).
#[inline]
pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max)
}

/// Index of the absolute peak sample (0 for an empty buffer).
pub fn peak_index(samples: &[f32]) -> usize {
    let mut best = 0;
    let mut best_mag = 0.0f32;
    for (i, &s) in samples.iter().enumerate() {
        if s.abs() > best_mag {
            best_mag = s.abs();
            best = i;
        }
    }
    best
}

/// Shift a buffer left by `cut` samples in place, zero-filling the tail.
///
/// The buffer length is unchanged. A `cut` of zero is a no-op; a `cut` at or
/// beyond the buffer length zeroes the whole buffer.
pub fn shift_left(samples: &mut [f32], cut: usize) {
    if cut == 0 {
        return;
    }
    if cut >= samples.len() {
        samples.fill(0.0);
        return;
    }
    samples.copy_within(cut.., 0);
    let tail = samples.len() - cut;
    samples[tail..].fill(0.0);
}
