//! Regularized frequency-domain deconvolution.
//!
//! Recovers the linear system's impulse response from an aligned dry/wet
//! pair via spectral division `H = Y*conj(X) / (|X|^2 + eps)` with a
//! tiny-energy cutoff and a hard cap on per-bin gain.

use crate::buffer::SampleBuffer;
use crate::fft::RealFft;
use crate::math::next_power_of_two;
use crate::{Error, Result};
use rustfft::num_complex::Complex;

/// Maximum linear gain permitted for any frequency bin (~ +30 dB).
///
/// The cap is what makes self-deconvolution produce a clean near-unit
/// impulse with no noise floor above the sweep's excited band; bins outside
/// that band would otherwise be amplified by up to 1/eps.
pub const MAX_SPECTRAL_GAIN: f32 = 32.0;

/// Parameters for the deconvolution stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeconvolutionConfig {
    /// Requested IR length in samples (0 = derive from the inputs).
    pub ir_length: usize,
    /// Hard cap on the IR duration in seconds.
    pub max_ir_seconds: f64,
    /// Leading silence prepended to the IR, in seconds (room for non-causal
    /// components and early reflections).
    pub headroom_seconds: f64,
    /// Per-bin gain cap, linear.
    pub max_gain: f32,
    /// Manual sample-accurate correction: positive delays the wet signal,
    /// negative delays the dry signal.
    pub offset_correction: i64,
}

impl Default for DeconvolutionConfig {
    fn default() -> Self {
        Self {
            ir_length: 0,
            max_ir_seconds: 10.0,
            headroom_seconds: 0.0,
            max_gain: MAX_SPECTRAL_GAIN,
            offset_correction: 0,
        }
    }
}

/// Recover the impulse response of the system that turned `dry` into `wet`.
///
/// `dry_offset`/`wet_offset` are the alignment results: the first sample of
/// the actual sweep in each buffer. Offsets are corrected by the configured
/// manual offset, then clamped into range; an empty input, a sample-rate
/// mismatch, or a zero-length usable window is an error.
pub fn deconvolve(
    wet: &SampleBuffer,
    dry: &SampleBuffer,
    dry_offset: usize,
    wet_offset: usize,
    cfg: &DeconvolutionConfig,
) -> Result<SampleBuffer> {
    if dry.is_empty() {
        return Err(Error::EmptyInput("dry"));
    }
    if wet.is_empty() {
        return Err(Error::EmptyInput("wet"));
    }
    if wet.sample_rate != dry.sample_rate {
        return Err(Error::SampleRateMismatch {
            expected: dry.sample_rate,
            got: wet.sample_rate,
        });
    }
    let rate = dry.sample_rate as f64;

    // Manual correction, then clamp both offsets into range.
    let mut dry_offset = dry_offset;
    let mut wet_offset = wet_offset;
    if cfg.offset_correction > 0 {
        wet_offset = wet_offset.saturating_add(cfg.offset_correction as usize);
    } else if cfg.offset_correction < 0 {
        dry_offset = dry_offset.saturating_add(cfg.offset_correction.unsigned_abs() as usize);
    }
    let dry_offset = dry_offset.min(dry.len());
    let wet_offset = wet_offset.min(wet.len());

    let usable_dry = dry.len() - dry_offset;
    let usable_wet = wet.len() - wet_offset;
    if usable_dry == 0 || usable_wet == 0 {
        return Err(Error::EmptyWindow);
    }

    let n = next_power_of_two(usable_dry.max(usable_wet));
    let fft = RealFft::new(n);

    let x = fft.forward(&dry.samples[dry_offset..]);
    let y = fft.forward(&wet.samples[wet_offset..]);

    let max_energy = x.iter().map(|c| c.norm_sqr()).fold(0.0f32, f32::max);
    // Bins below the tiny cutoff are not inverted at all; the epsilon
    // regularizes everything else. The fallbacks cover an all-silent dry
    // spectrum.
    let (tiny, eps) = if max_energy > 0.0 {
        (max_energy * 1e-16, max_energy * 1e-10)
    } else {
        (1e-30, 1e-14)
    };

    let h: Vec<Complex<f32>> = x
        .iter()
        .zip(y.iter())
        .map(|(&xi, &yi)| invert_bin(xi, yi, tiny, eps, cfg.max_gain))
        .collect();

    let ir = fft.inverse(&h);

    // Smallest constraint wins: transform size, usable input, duration cap,
    // and the caller's request when non-zero.
    let mut out_len = n.min(usable_dry.min(usable_wet));
    out_len = out_len.min((cfg.max_ir_seconds * rate) as usize);
    if cfg.ir_length > 0 {
        out_len = out_len.min(cfg.ir_length);
    }
    if out_len == 0 {
        return Err(Error::ZeroLengthIr);
    }

    let headroom = (cfg.headroom_seconds * rate).round() as usize;
    let mut samples = vec![0.0f32; headroom + out_len];
    samples[headroom..].copy_from_slice(&ir[..out_len]);

    Ok(SampleBuffer::new(samples, dry.sample_rate))
}

/// One bin of the regularized inverse filter.
///
/// A bin with dry energy below `tiny` is never inverted (returns zero);
/// otherwise `H = y*conj(x)/(|x|^2 + eps)`, with `|H|` scaled down to
/// `max_gain` when it exceeds it.
fn invert_bin(x: Complex<f32>, y: Complex<f32>, tiny: f32, eps: f32, max_gain: f32) -> Complex<f32> {
    let energy = x.norm_sqr();
    if energy < tiny {
        return Complex::new(0.0, 0.0);
    }
    let mut bin = y * x.conj() / (energy + eps);
    let mag = bin.norm();
    if mag > max_gain {
        bin *= max_gain / mag;
    }
    bin
}
