//! Real FFT transform context built on rustfft.
//!
//! A [`RealFft`] owns the forward and inverse plans for one transform size.
//! Acquiring the context is scoped: plans live as long as the value and are
//! released on every exit path when it drops, so callers never manage raw
//! transform buffers across early returns.

use rustfft::{FftPlanner, num_complex::Complex};
use std::sync::Arc;

/// FFT processor for real signals at a fixed transform size.
pub struct RealFft {
    fft: Arc<dyn rustfft::Fft<f32>>,
    ifft: Arc<dyn rustfft::Fft<f32>>,
    size: usize,
}

impl RealFft {
    /// Plan forward and inverse transforms for the given size.
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(size);
        let ifft = planner.plan_fft_inverse(size);

        Self { fft, ifft, size }
    }

    /// Transform size.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of distinct frequency bins produced by [`forward`](Self::forward):
    /// `size/2 + 1` (DC through Nyquist).
    pub fn bins(&self) -> usize {
        self.size / 2 + 1
    }

    /// Forward transform of a real signal.
    ///
    /// Input is zero-padded (or truncated) to the transform size. Returns the
    /// positive-frequency half spectrum, `size/2 + 1` complex bins.
    pub fn forward(&self, input: &[f32]) -> Vec<Complex<f32>> {
        let mut buffer: Vec<Complex<f32>> =
            input.iter().map(|&x| Complex::new(x, 0.0)).collect();
        buffer.resize(self.size, Complex::new(0.0, 0.0));

        self.fft.process(&mut buffer);

        buffer.truncate(self.bins());
        buffer
    }

    /// Inverse transform of a positive-frequency half spectrum.
    ///
    /// The negative frequencies are reconstructed by conjugate symmetry, so
    /// the output is a real signal of `size` samples, normalized by `1/size`
    /// (rustfft uses the unnormalized-inverse convention).
    pub fn inverse(&self, spectrum: &[Complex<f32>]) -> Vec<f32> {
        let mut buffer = vec![Complex::new(0.0f32, 0.0); self.size];
        let half = self.bins().min(spectrum.len());
        buffer[..half].copy_from_slice(&spectrum[..half]);

        // Mirror for negative frequencies (conjugate symmetry)
        for i in 1..self.size.div_ceil(2) {
            if i < half {
                buffer[self.size - i] = spectrum[i].conj();
            }
        }

        self.ifft.process(&mut buffer);

        let scale = 1.0 / self.size as f32;
        buffer.iter().map(|c| c.re * scale).collect()
    }
}
