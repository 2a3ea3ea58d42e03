//! Start-of-sweep detection.
//!
//! Locates the sample offset at which the sweep begins inside a captured
//! buffer. Four strategies are available; the marker strategies carry a
//! layered fallback: marker tone -> first non-silent sample -> index 0.
//! Detection ambiguity is never an error.
//!
//! The dry-side marker detection caches the measured marker and gap lengths
//! in its [`AlignmentResult`]; the wet side of
//! [`AlignmentMethod::MarkerDryReuseOnWet`] reuses that cache instead of
//! re-running marker detection, so a live recording that clips or distorts
//! the marker tone still aligns correctly as long as its start-of-audio gap
//! matches the dry signal's. The cache is explicit data threaded between the
//! two calls, never ambient state.

use crate::buffer::SampleBuffer;
use crate::math::db_to_linear;
use crate::silence::first_above_threshold;
use crate::sweep::MARKER_FREQ_HZ;

/// Maximum stretch of signal inspected for the marker tone.
const MARKER_SCAN_SECS: f64 = 5.0;
/// Maximum auto-detected marker length.
const MARKER_MAX_SECS: f64 = 0.5;
/// Minimum silent run accepted as the marker/sweep gap when no hint is given.
const GAP_MIN_SECS: f64 = 0.050;
/// Minimum number of sign flips for a window to qualify as a square wave.
const MIN_FLIPS: usize = 4;
/// Relative tolerance between estimated and configured marker frequency.
const FREQ_TOLERANCE: f32 = 0.2;
/// Strong-signal gate as a fraction of the sweep amplitude.
const STRONG_GATE: f32 = 0.5;
/// Marker end is where the signal decays below this fraction of the gate.
const DECAY_FRACTION: f32 = 0.3;

/// Which alignment algorithm to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlignmentMethod {
    /// Marker detection on both the dry and the wet signal.
    #[default]
    MarkerBoth,
    /// Marker detection on the dry signal; the wet offset is its own first
    /// non-silent sample plus the dry marker and gap lengths.
    MarkerDryReuseOnWet,
    /// First sample above the silence threshold.
    SilenceThreshold,
    /// No alignment; offset 0.
    None,
}

/// Parameters for alignment detection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlignmentConfig {
    /// Silence threshold in dB (negative).
    pub silence_threshold_db: f32,
    /// Sweep amplitude in dB; the strong-signal gate derives from it.
    pub sweep_amplitude_db: f32,
    /// Marker tone frequency in Hz. `None` disables marker detection.
    pub marker_freq_hz: Option<f32>,
    /// Marker duration hint in seconds (0 = auto-detect).
    pub marker_hint_s: f64,
    /// Gap duration hint in seconds (0 = auto-detect).
    pub gap_hint_s: f64,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            silence_threshold_db: -60.0,
            sweep_amplitude_db: -1.0,
            marker_freq_hz: Some(MARKER_FREQ_HZ),
            marker_hint_s: 0.0,
            gap_hint_s: 0.0,
        }
    }
}

/// Outcome of one detection call.
///
/// `marker_len`/`gap_len` are populated only when marker detection confirmed
/// the tone; they form the explicit cache consumed by the wet side of
/// [`AlignmentMethod::MarkerDryReuseOnWet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AlignmentResult {
    /// First sample belonging to the actual sweep.
    pub sweep_start: usize,
    /// Detected marker length in samples (dry side, marker confirmed).
    pub marker_len: Option<usize>,
    /// Detected gap length in samples (dry side, marker confirmed).
    pub gap_len: Option<usize>,
}

impl AlignmentResult {
    fn plain(sweep_start: usize) -> Self {
        Self {
            sweep_start,
            marker_len: None,
            gap_len: None,
        }
    }
}

/// Detect the sweep start in the dry signal.
pub fn detect_dry(buf: &SampleBuffer, method: AlignmentMethod, cfg: &AlignmentConfig) -> AlignmentResult {
    match method {
        AlignmentMethod::None => AlignmentResult::plain(0),
        AlignmentMethod::SilenceThreshold => AlignmentResult::plain(first_above_threshold(
            &buf.samples,
            cfg.silence_threshold_db,
        )),
        AlignmentMethod::MarkerBoth | AlignmentMethod::MarkerDryReuseOnWet => {
            detect_sweep_start_with_marker(buf, cfg)
        }
    }
}

/// Detect the sweep start in the wet signal.
///
/// `dry` is the result of [`detect_dry`] on the matching dry signal; it is
/// only consulted under [`AlignmentMethod::MarkerDryReuseOnWet`].
pub fn detect_wet(
    buf: &SampleBuffer,
    method: AlignmentMethod,
    cfg: &AlignmentConfig,
    dry: &AlignmentResult,
) -> AlignmentResult {
    match method {
        AlignmentMethod::None => AlignmentResult::plain(0),
        AlignmentMethod::SilenceThreshold => AlignmentResult::plain(first_above_threshold(
            &buf.samples,
            cfg.silence_threshold_db,
        )),
        AlignmentMethod::MarkerBoth => detect_sweep_start_with_marker(buf, cfg),
        AlignmentMethod::MarkerDryReuseOnWet => {
            let first = first_above_threshold(&buf.samples, cfg.silence_threshold_db);
            let offset = first
                .saturating_add(dry.marker_len.unwrap_or(0))
                .saturating_add(dry.gap_len.unwrap_or(0));
            AlignmentResult::plain(offset)
        }
    }
}

/// Locate the sweep start via the square-wave marker tone.
///
/// Falls back to the first non-silent sample whenever the signal does not
/// look like the configured marker: too few strong samples, too few sign
/// flips, or an estimated tone frequency off by more than the tolerance.
pub fn detect_sweep_start_with_marker(buf: &SampleBuffer, cfg: &AlignmentConfig) -> AlignmentResult {
    let samples = &buf.samples;
    let n = samples.len();
    let rate = buf.sample_rate as f64;

    let i0 = first_above_threshold(samples, cfg.silence_threshold_db);
    let fallback = AlignmentResult::plain(i0);

    let Some(marker_freq) = cfg.marker_freq_hz else {
        return fallback;
    };
    if marker_freq <= 0.0 || i0 >= n {
        return fallback;
    }

    // Window of up to min(5 s, remaining samples), or the marker hint when
    // given, clamped the same way.
    let window = if cfg.marker_hint_s > 0.0 {
        ((cfg.marker_hint_s * rate).round() as usize).min(n - i0)
    } else {
        ((MARKER_SCAN_SECS * rate) as usize).min(n - i0)
    };
    if window < 8 {
        return fallback;
    }

    let silence = db_to_linear(cfg.silence_threshold_db.clamp(-200.0, 200.0));
    let strong = STRONG_GATE * db_to_linear(cfg.sweep_amplitude_db);
    let gap_min = gap_min_samples(cfg, rate);

    // Count sign flips among strong samples only; noise below half the sweep
    // amplitude cannot flip the state. The scan ends early at the first
    // sustained silent run so the sweep's own zero crossings never leak into
    // the frequency estimate.
    let mut flips = 0usize;
    let mut first_flip = 0usize;
    let mut last_flip = 0usize;
    let mut prev_sign = 0i32;
    let mut silent_run = 0usize;
    for (j, &s) in samples.iter().enumerate().skip(i0).take(window) {
        if s.abs() <= silence {
            silent_run += 1;
            if silent_run >= gap_min {
                break;
            }
        } else {
            silent_run = 0;
        }
        if s.abs() <= strong {
            continue;
        }
        let sign = if s >= 0.0 { 1 } else { -1 };
        if prev_sign != 0 && sign != prev_sign {
            if flips == 0 {
                first_flip = j;
            }
            flips += 1;
            last_flip = j;
        }
        prev_sign = sign;
    }

    if flips < MIN_FLIPS {
        return fallback;
    }

    // Two flips per period of a square wave.
    let period = 2.0 * (last_flip - first_flip) as f64 / flips as f64;
    if period <= 0.0 {
        return fallback;
    }
    let est_freq = (rate / period) as f32;
    if (est_freq - marker_freq).abs() / marker_freq > FREQ_TOLERANCE {
        tracing::debug!(est_freq, marker_freq, "tone frequency mismatch, not our marker");
        return fallback;
    }

    // Marker confirmed. Find its end: the hint wins; otherwise extend until
    // the signal decays below 30% of the strong gate, capped at 0.5 s.
    let marker_end = if cfg.marker_hint_s > 0.0 {
        (i0 + (cfg.marker_hint_s * rate).round() as usize).min(n)
    } else {
        let decay = DECAY_FRACTION * strong;
        let cap = (i0 + (MARKER_MAX_SECS * rate).round() as usize).min(n);
        let mut end = cap;
        for (j, &s) in samples.iter().enumerate().take(cap).skip(i0) {
            if s.abs() < decay {
                end = j;
                break;
            }
        }
        end
    };

    // Skip the gap: a contiguous run of at least `gap_min` silent samples,
    // then the first non-silent sample after it. Without such a run, settle
    // for the first non-silent sample after the marker.
    let sweep_start = match skip_gap(samples, marker_end, silence, gap_min) {
        Some(start) => start,
        None => marker_end + first_above_threshold(&samples[marker_end..], cfg.silence_threshold_db),
    };

    if sweep_start >= n {
        return fallback;
    }

    AlignmentResult {
        sweep_start,
        marker_len: Some(marker_end - i0),
        gap_len: Some(sweep_start - marker_end),
    }
}

fn gap_min_samples(cfg: &AlignmentConfig, rate: f64) -> usize {
    let secs = if cfg.gap_hint_s > 0.0 {
        cfg.gap_hint_s
    } else {
        GAP_MIN_SECS
    };
    ((secs * rate).round() as usize).max(1)
}

/// First non-silent sample after a silent run of at least `gap_min` samples
/// starting at or after `from`, or `None` when no such run exists.
fn skip_gap(samples: &[f32], from: usize, silence: f32, gap_min: usize) -> Option<usize> {
    let mut run = 0usize;
    for (j, &s) in samples.iter().enumerate().skip(from) {
        if s.abs() <= silence {
            run += 1;
        } else {
            if run >= gap_min {
                return Some(j);
            }
            run = 0;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sweep::SweepSpec;

    const RATE: u32 = 48000;

    /// Preroll, square marker at `freq`, gap, then a sine tail.
    fn marked_signal(freq: f32, preroll: usize, marker: usize, gap: usize) -> SampleBuffer {
        let amplitude = db_to_linear(-1.0);
        let mut samples = vec![0.0f32; preroll];
        for i in 0..marker {
            let t = i as f32 / RATE as f32;
            let s = (std::f32::consts::TAU * freq * t).sin();
            samples.push(if s >= 0.0 { amplitude } else { -amplitude });
        }
        samples.extend(std::iter::repeat_n(0.0, gap));
        // Cosine so the first tail sample is already non-silent.
        for i in 0..4800 {
            let t = i as f32 / RATE as f32;
            samples.push(amplitude * (std::f32::consts::TAU * 440.0 * t).cos());
        }
        SampleBuffer::new(samples, RATE)
    }

    #[test]
    fn test_marker_detected_at_exact_frequency() {
        let buf = marked_signal(MARKER_FREQ_HZ, 1000, 2400, 4800);
        let cfg = AlignmentConfig::default();
        let result = detect_sweep_start_with_marker(&buf, &cfg);

        assert_eq!(result.sweep_start, 1000 + 2400 + 4800);
        assert_eq!(result.marker_len, Some(2400));
        assert_eq!(result.gap_len, Some(4800));
    }

    #[test]
    fn test_mistuned_marker_falls_back_to_silence() {
        // 30% off the configured frequency: rejected, plain silence scan.
        let buf = marked_signal(MARKER_FREQ_HZ * 1.3, 1000, 2400, 4800);
        let cfg = AlignmentConfig::default();
        let result = detect_sweep_start_with_marker(&buf, &cfg);

        assert_eq!(result.sweep_start, 1000);
        assert_eq!(result.marker_len, None);
        assert_eq!(result.gap_len, None);
    }

    #[test]
    fn test_no_marker_frequency_configured() {
        let buf = marked_signal(MARKER_FREQ_HZ, 1000, 2400, 4800);
        let cfg = AlignmentConfig {
            marker_freq_hz: None,
            ..AlignmentConfig::default()
        };
        let result = detect_sweep_start_with_marker(&buf, &cfg);
        assert_eq!(result.sweep_start, 1000);
    }

    #[test]
    fn test_all_silent_buffer_returns_sentinel() {
        let buf = SampleBuffer::silence(1000, RATE);
        let cfg = AlignmentConfig::default();
        let result = detect_sweep_start_with_marker(&buf, &cfg);
        assert_eq!(result.sweep_start, 1000);
    }

    #[test]
    fn test_too_few_flips_falls_back() {
        // A single strong pulse has no square-wave structure.
        let mut samples = vec![0.0f32; 500];
        samples.push(0.9);
        samples.extend(std::iter::repeat_n(0.0, 500));
        let buf = SampleBuffer::new(samples, RATE);
        let result = detect_sweep_start_with_marker(&buf, &AlignmentConfig::default());
        assert_eq!(result.sweep_start, 500);
    }

    #[test]
    fn test_marker_hint_fixes_marker_end() {
        let buf = marked_signal(MARKER_FREQ_HZ, 1000, 2400, 4800);
        let cfg = AlignmentConfig {
            marker_hint_s: 0.05, // exactly 2400 samples at 48 kHz
            ..AlignmentConfig::default()
        };
        let result = detect_sweep_start_with_marker(&buf, &cfg);
        assert_eq!(result.marker_len, Some(2400));
        assert_eq!(result.sweep_start, 1000 + 2400 + 4800);
    }

    #[test]
    fn test_detect_on_generated_sweep() {
        let spec = SweepSpec {
            duration_s: 1.0,
            preroll_s: 0.2,
            marker_s: 0.1,
            gap_s: 0.5,
            sample_rate: RATE,
            amplitude_db: -1.0,
            start_freq: 20.0,
            end_freq: 20000.0,
        };
        let buf = spec.generate().unwrap();
        let result = detect_dry(&buf, AlignmentMethod::MarkerBoth, &AlignmentConfig::default());
        // The sweep's first samples sit below the silence threshold while the
        // 20 Hz sine phase ramps up, so detection may land a hair late.
        assert!(
            result.sweep_start >= spec.sweep_start()
                && result.sweep_start < spec.sweep_start() + 48,
            "sweep start {} not near {}",
            result.sweep_start,
            spec.sweep_start()
        );
    }

    #[test]
    fn test_method_none_and_silence() {
        let buf = marked_signal(MARKER_FREQ_HZ, 1000, 2400, 4800);
        let cfg = AlignmentConfig::default();

        let none = detect_dry(&buf, AlignmentMethod::None, &cfg);
        assert_eq!(none.sweep_start, 0);

        let silence = detect_dry(&buf, AlignmentMethod::SilenceThreshold, &cfg);
        assert_eq!(silence.sweep_start, 1000);
    }

    #[test]
    fn test_dry_reuse_on_wet() {
        let dry = AlignmentResult {
            sweep_start: 8200,
            marker_len: Some(2400),
            gap_len: Some(4800),
        };
        // Wet signal starts 300 samples in; marker is clipped beyond
        // recognition but the lengths come from the dry cache.
        let mut samples = vec![0.0f32; 300];
        samples.extend(std::iter::repeat_n(1.0, 10000));
        let buf = SampleBuffer::new(samples, RATE);

        let cfg = AlignmentConfig::default();
        let result = detect_wet(&buf, AlignmentMethod::MarkerDryReuseOnWet, &cfg, &dry);
        assert_eq!(result.sweep_start, 300 + 2400 + 4800);
    }
}
