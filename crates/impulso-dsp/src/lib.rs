//! Impulso DSP - impulse response measurement core.
//!
//! This crate contains the measurement-and-recovery pipeline used to capture
//! the impulse response of a device under test:
//!
//! - [`sweep`] - Exponential sine sweep synthesis with marker tone and preroll
//! - [`silence`] - Amplitude threshold scanning (first/last non-silent sample)
//! - [`align`] - Start-of-sweep detection (marker tone, silence threshold)
//! - [`deconvolve`] - Regularized FFT deconvolution of wet against dry
//! - [`postprocess`] - Band-limiting, normalization and trimming of the raw IR
//! - [`buffer`] - Sample buffer and sample-rate consistency tracking
//! - [`fft`] - Real FFT transform context built on rustfft
//! - [`math`] - dB conversions and small numeric helpers
//!
//! ## Measurement Workflow
//!
//! ```rust,ignore
//! use impulso_dsp::{SweepSpec, AlignmentConfig, DeconvolutionConfig, PostProcessConfig};
//! use impulso_dsp::{align, deconvolve, postprocess};
//!
//! // 1. Synthesize the dry calibration signal
//! let dry = SweepSpec::default().generate()?;
//!
//! // 2. Capture the device response (file or live session, external)
//!
//! // 3. Locate the sweep start in both signals
//! let cfg = AlignmentConfig::default();
//! let dry_align = align::detect_dry(&dry, &cfg);
//! let wet_align = align::detect_wet(&wet, &cfg, &dry_align);
//!
//! // 4. Recover and polish the impulse response
//! let mut ir = deconvolve::deconvolve(
//!     &wet, &dry, dry_align.sweep_start, wet_align.sweep_start,
//!     &DeconvolutionConfig::default(),
//! )?;
//! postprocess::process(&mut ir, None, &PostProcessConfig::default());
//! ```

pub mod align;
pub mod buffer;
pub mod deconvolve;
pub mod fft;
pub mod math;
pub mod postprocess;
pub mod silence;
pub mod sweep;

pub use align::{AlignmentConfig, AlignmentMethod, AlignmentResult};
pub use buffer::{SampleBuffer, SampleRateGuard};
pub use deconvolve::{DeconvolutionConfig, MAX_SPECTRAL_GAIN, deconvolve};
pub use fft::RealFft;
pub use postprocess::{PostProcessConfig, process};
pub use sweep::{MARKER_FREQ_HZ, SweepSpec};

/// Error types for the measurement pipeline.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A sweep specification violates its invariants.
    #[error("invalid sweep specification: {0}")]
    InvalidSweep(String),

    /// A buffer arrived with a different sample rate than the session's.
    #[error("sample rate mismatch: session is {expected} Hz, buffer is {got} Hz")]
    SampleRateMismatch {
        /// Rate recorded when the session ingested its first buffer.
        expected: u32,
        /// Rate of the offending buffer.
        got: u32,
    },

    /// An input signal was empty.
    #[error("empty input signal: {0}")]
    EmptyInput(&'static str),

    /// After offset clamping, no usable samples remain in one of the inputs.
    #[error("no usable samples after applying offsets")]
    EmptyWindow,

    /// The configured length constraints left no room for the output IR.
    #[error("impulse response length collapsed to zero")]
    ZeroLengthIr,
}

/// Convenience result type for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;
