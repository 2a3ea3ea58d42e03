//! Calibration signal synthesis.
//!
//! The dry test signal is built in four sections: silence preroll, a short
//! square-wave marker tone, a silence gap, then the exponential sine sweep
//! itself (the Farina excitation signal), with a brief linear fade at the
//! sweep end to suppress near-Nyquist ringing.

use crate::buffer::SampleBuffer;
use crate::math::db_to_linear;
use crate::{Error, Result};

/// Frequency of the square-wave marker tone placed before the sweep.
pub const MARKER_FREQ_HZ: f32 = 1000.0;

/// Sweep synthesis parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepSpec {
    /// Sweep duration in seconds.
    pub duration_s: f64,
    /// Leading silence in seconds.
    pub preroll_s: f64,
    /// Marker tone duration in seconds (0 disables the marker).
    pub marker_s: f64,
    /// Silence between marker and sweep in seconds.
    pub gap_s: f64,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Signal amplitude in dB (negative; 0 dB = full scale).
    pub amplitude_db: f32,
    /// Sweep start frequency in Hz.
    pub start_freq: f64,
    /// Sweep end frequency in Hz.
    pub end_freq: f64,
}

impl Default for SweepSpec {
    fn default() -> Self {
        Self {
            duration_s: 30.0,
            preroll_s: 1.0,
            marker_s: 0.1,
            gap_s: 1.0,
            sample_rate: 48000,
            amplitude_db: -1.0,
            start_freq: 20.0,
            end_freq: 22000.0,
        }
    }
}

impl SweepSpec {
    /// Validate the sweep parameters.
    ///
    /// Fails fast on a zero/negative sample rate, a degenerate frequency
    /// range, an end frequency at or above Nyquist, or a negative duration.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(Error::InvalidSweep("sample rate must be positive".into()));
        }
        if self.start_freq <= 0.0 || self.end_freq <= self.start_freq {
            return Err(Error::InvalidSweep(format!(
                "frequency range must satisfy 0 < f1 < f2, got {} .. {}",
                self.start_freq, self.end_freq
            )));
        }
        let nyquist = self.sample_rate as f64 / 2.0;
        if self.end_freq >= nyquist {
            return Err(Error::InvalidSweep(format!(
                "end frequency {} Hz is not below Nyquist ({} Hz)",
                self.end_freq, nyquist
            )));
        }
        if self.duration_s < 0.0 || self.preroll_s < 0.0 || self.marker_s < 0.0 || self.gap_s < 0.0
        {
            return Err(Error::InvalidSweep("durations must be >= 0".into()));
        }
        Ok(())
    }

    /// Number of samples in one section: `round(duration * rate)`.
    fn section_len(&self, duration_s: f64) -> usize {
        (duration_s * self.sample_rate as f64).round() as usize
    }

    /// Sample offset of the first sweep sample inside the generated buffer
    /// (preroll + marker + gap).
    pub fn sweep_start(&self) -> usize {
        self.section_len(self.preroll_s)
            + self.section_len(self.marker_s)
            + self.section_len(self.gap_s)
    }

    /// Synthesize the full calibration signal.
    pub fn generate(&self) -> Result<SampleBuffer> {
        self.validate()?;

        let rate = self.sample_rate as f64;
        let n_pre = self.section_len(self.preroll_s);
        let n_marker = self.section_len(self.marker_s);
        let n_gap = self.section_len(self.gap_s);
        let n_sweep = self.section_len(self.duration_s);
        let amplitude = db_to_linear(self.amplitude_db) as f64;

        let mut samples = Vec::with_capacity(n_pre + n_marker + n_gap + n_sweep);

        samples.extend(std::iter::repeat_n(0.0f32, n_pre));

        // Symmetric square wave at the marker frequency.
        for i in 0..n_marker {
            let t = i as f64 / rate;
            let s = (std::f64::consts::TAU * MARKER_FREQ_HZ as f64 * t).sin();
            let v = if s >= 0.0 { amplitude } else { -amplitude };
            samples.push(v as f32);
        }

        samples.extend(std::iter::repeat_n(0.0f32, n_gap));

        // Exponential sweep: phase(t) = w1*T/L * (exp(t*L/T) - 1),
        // L = ln(w2/w1). Phase accumulates to millions of radians over a
        // long sweep, so it is computed in f64.
        let w1 = std::f64::consts::TAU * self.start_freq;
        let w2 = std::f64::consts::TAU * self.end_freq;
        let l = (w2 / w1).ln();
        let t_total = self.duration_s;

        // Linear fade over the final 1/100 s of the sweep.
        let fade_len = (rate / 100.0).round() as usize;
        let fade_start = n_sweep.saturating_sub(fade_len);

        for i in 0..n_sweep {
            let t = i as f64 / rate;
            let phase = w1 * t_total / l * ((t * l / t_total).exp() - 1.0);
            let mut v = amplitude * phase.sin();
            if i >= fade_start && fade_len > 0 {
                v *= (n_sweep - i) as f64 / fade_len as f64;
            }
            samples.push(v as f32);
        }

        Ok(SampleBuffer::new(samples, self.sample_rate))
    }
}
