//! Impulse response post-processing.
//!
//! Applied in order: spectral band-limiting, peak normalization, end-of-buffer
//! fade, leading-silence trim (generic or zero-peak), trailing-silence trim.
//! All steps mutate the channel buffers in place; a buffer whose content
//! collapses below the numeric noise floor becomes a single zero sample,
//! never an empty buffer.

use crate::buffer::SampleBuffer;
use crate::fft::RealFft;
use crate::math::{db_to_linear, next_power_of_two, peak, peak_index, shift_left};
use crate::silence::{first_above_threshold, last_above_threshold};

/// Zeros kept after the last non-silent sample by the trailing trim.
const TRAILING_PAD_SAMPLES: usize = 128;
/// Peaks below this are numerical noise; the buffer collapses to one zero.
const NOISE_FLOOR: f32 = 1e-12;
/// Width of the band-limit transition band as a fraction of the cutoff.
const TAPER_FRACTION: f32 = 0.15;

/// Parameters for IR post-processing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PostProcessConfig {
    /// Target peak amplitude, linear (< 1.0).
    pub target_peak: f32,
    /// Place the IR peak at `peak_offset` instead of trimming at the first
    /// sample above the start threshold.
    pub zero_peak: bool,
    /// Desired pre-peak headroom in samples (zero-peak mode), and the floor
    /// for the generic leading trim.
    pub peak_offset: usize,
    /// Leading-silence threshold in dB; a non-negative value disables the
    /// leading trim.
    pub start_threshold_db: f32,
    /// Trailing-silence threshold in dB; a non-negative value disables the
    /// trailing trim.
    pub end_threshold_db: f32,
    /// Fraction of the buffer faded to zero at the end (0..1).
    pub fade_fraction: f32,
    /// Low-pass cutoff in Hz.
    pub lowpass_hz: Option<f32>,
    /// High-pass cutoff in Hz.
    pub highpass_hz: Option<f32>,
}

impl Default for PostProcessConfig {
    fn default() -> Self {
        Self {
            target_peak: 0.9,
            zero_peak: true,
            peak_offset: 64,
            start_threshold_db: -72.0,
            end_threshold_db: -72.0,
            fade_fraction: 0.05,
            lowpass_hz: None,
            highpass_hz: None,
        }
    }
}

/// Post-process one or two IR channels in place.
pub fn process(left: &mut SampleBuffer, mut right: Option<&mut SampleBuffer>, cfg: &PostProcessConfig) {
    band_limit(left, cfg);
    if let Some(r) = right.as_deref_mut() {
        band_limit(r, cfg);
    }

    if !normalize(left, right.as_deref_mut(), cfg.target_peak) {
        return;
    }

    end_fade(left, right.as_deref_mut(), cfg.fade_fraction);

    if cfg.start_threshold_db < 0.0 {
        trim_leading(left, right.as_deref_mut(), cfg);
    }

    if cfg.end_threshold_db < 0.0 {
        trim_trailing(left, right.as_deref_mut(), cfg.end_threshold_db);
    }
}

/// Band-limit a channel with tapered spectral low-pass / high-pass cuts.
///
/// The taper is a Hann-style half cosine over a transition band of 15% of
/// the cutoff frequency (at least one bin) rather than a brick wall, to
/// avoid ringing. A no-op when neither cutoff is configured.
pub fn band_limit(buf: &mut SampleBuffer, cfg: &PostProcessConfig) {
    if cfg.lowpass_hz.is_none() && cfg.highpass_hz.is_none() {
        return;
    }
    if buf.is_empty() {
        return;
    }

    let n = next_power_of_two(buf.len());
    let fft = RealFft::new(n);
    let mut spectrum = fft.forward(&buf.samples);
    let half = n / 2;
    let bins_per_hz = n as f32 / buf.sample_rate as f32;

    if let Some(lp) = cfg.lowpass_hz {
        let cutoff = ((lp * bins_per_hz).round() as usize).min(half);
        let taper = (((lp * TAPER_FRACTION) * bins_per_hz).round() as usize).max(1);
        for (k, bin) in spectrum.iter_mut().enumerate() {
            if k <= cutoff {
                continue;
            }
            let d = k - cutoff;
            if d < taper {
                let t = d as f32 / taper as f32;
                *bin *= 0.5 * (1.0 + (std::f32::consts::PI * t).cos());
            } else {
                *bin *= 0.0;
            }
        }
    }

    if let Some(hp) = cfg.highpass_hz {
        let cutoff = ((hp * bins_per_hz).round() as usize).min(half);
        let taper = (((hp * TAPER_FRACTION) * bins_per_hz).round() as usize).max(1);
        for (k, bin) in spectrum.iter_mut().enumerate() {
            if k >= cutoff {
                break;
            }
            let d = cutoff - k;
            if d < taper {
                let t = d as f32 / taper as f32;
                *bin *= 0.5 * (1.0 + (std::f32::consts::PI * t).cos());
            } else {
                *bin *= 0.0;
            }
        }
    }

    let filtered = fft.inverse(&spectrum);
    let len = buf.len();
    buf.samples.copy_from_slice(&filtered[..len]);
}

/// Scale all channels so the global peak hits `target_peak`.
///
/// Returns `false` when the peak sits below the numeric noise floor; both
/// channels then collapse to a single zero sample and processing stops.
fn normalize(left: &mut SampleBuffer, right: Option<&mut SampleBuffer>, target_peak: f32) -> bool {
    let mut global = peak(&left.samples);
    if let Some(r) = &right {
        global = global.max(peak(&r.samples));
    }

    if global < NOISE_FLOOR {
        left.collapse_to_zero();
        if let Some(r) = right {
            r.collapse_to_zero();
        }
        return false;
    }

    let gain = target_peak / global;
    for s in &mut left.samples {
        *s *= gain;
    }
    if let Some(r) = right {
        for s in &mut r.samples {
            *s *= gain;
        }
    }
    true
}

/// Quadratic fade `(1 - t)^2` over the last `fraction` of the buffer.
///
/// Both channels use the longer channel's length as the fade reference so a
/// stereo pair fades identically.
fn end_fade(left: &mut SampleBuffer, right: Option<&mut SampleBuffer>, fraction: f32) {
    let ref_len = right
        .as_ref()
        .map_or(left.len(), |r| left.len().max(r.len()));
    let fade_len = (ref_len as f32 * fraction.clamp(0.0, 1.0)) as usize;
    if fade_len == 0 {
        return;
    }
    let fade_start = ref_len - fade_len;

    let apply = |samples: &mut [f32]| {
        for i in fade_start..samples.len() {
            let t = (i - fade_start) as f32 / fade_len as f32;
            samples[i] *= (1.0 - t) * (1.0 - t);
        }
    };
    apply(&mut left.samples);
    if let Some(r) = right {
        apply(&mut r.samples);
    }
}

/// Remove leading silence by shifting the channels left.
///
/// Generic mode cuts at the earliest above-threshold sample of either
/// channel, never earlier than the configured offset floor. Zero-peak mode
/// instead chooses the cut so the global peak lands at `peak_offset`,
/// trading a slightly later trim for a guaranteed pre-peak headroom.
fn trim_leading(left: &mut SampleBuffer, mut right: Option<&mut SampleBuffer>, cfg: &PostProcessConfig) {
    let cut = if cfg.zero_peak {
        zero_peak_cut(left, right.as_deref(), cfg)
    } else {
        let mut first = first_above_threshold(&left.samples, cfg.start_threshold_db);
        if let Some(r) = &right {
            first = first.min(first_above_threshold(&r.samples, cfg.start_threshold_db));
        }
        first.max(cfg.peak_offset)
    };

    if cut >= left.len() && right.as_ref().is_none_or(|r| cut >= r.len()) {
        left.collapse_to_zero();
        if let Some(r) = right {
            r.collapse_to_zero();
        }
        return;
    }

    shift_left(&mut left.samples, cut);
    if let Some(r) = right {
        shift_left(&mut r.samples, cut);
    }
}

/// Cut point that places the global peak at `cfg.peak_offset`.
fn zero_peak_cut(left: &SampleBuffer, right: Option<&SampleBuffer>, cfg: &PostProcessConfig) -> usize {
    let left_peak = peak(&left.samples);
    let right_peak = right.map_or(0.0, |r| peak(&r.samples));
    let (global_peak, peak_idx) = if right_peak > left_peak {
        (right_peak, peak_index(&right.unwrap().samples))
    } else {
        (left_peak, peak_index(&left.samples))
    };

    let threshold = global_peak * db_to_linear(cfg.start_threshold_db.clamp(-200.0, 200.0));
    let above = |i: usize| -> bool {
        let l = left.samples.get(i).copied().unwrap_or(0.0);
        let r = right.and_then(|r| r.samples.get(i)).copied().unwrap_or(0.0);
        l.abs() >= threshold || r.abs() >= threshold
    };

    // Search the window [peak - offset, peak) for the first sample at or
    // above the absolute threshold.
    let win_start = peak_idx.saturating_sub(cfg.peak_offset);
    for i in win_start..peak_idx {
        if above(i) {
            return i;
        }
    }

    // Nothing in the window: the last pre-peak index that stayed below.
    for i in (0..peak_idx).rev() {
        if !above(i) {
            return i;
        }
    }
    0
}

/// Drop trailing silence, keeping a fixed padding after the last audible
/// sample. Never shrinks a channel below one sample.
fn trim_trailing(left: &mut SampleBuffer, right: Option<&mut SampleBuffer>, threshold_db: f32) {
    let mut last = last_above_threshold(&left.samples, threshold_db);
    if let Some(r) = &right {
        last = last.max(last_above_threshold(&r.samples, threshold_db));
    }

    let mut new_len = last.saturating_add(1 + TRAILING_PAD_SAMPLES);
    new_len = new_len.min(left.len());
    if let Some(r) = &right {
        new_len = new_len.min(r.len());
    }
    new_len = new_len.max(1);

    left.samples.truncate(new_len);
    if let Some(r) = right {
        r.samples.truncate(new_len);
    }
}
