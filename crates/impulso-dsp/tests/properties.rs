//! Property-based tests for the measurement pipeline.
//!
//! Uses proptest to check numeric robustness across randomized inputs:
//! bounded sweep synthesis, scanner sentinel behavior, and finite
//! deconvolution output for arbitrary signals.

use impulso_dsp::math::db_to_linear;
use impulso_dsp::silence::{first_above_threshold, last_above_threshold};
use impulso_dsp::{DeconvolutionConfig, SampleBuffer, SweepSpec, deconvolve};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Generated sweeps never exceed the configured amplitude and have the
    /// exact section layout implied by the spec.
    #[test]
    fn sweep_is_bounded_and_sized(
        duration_ms in 50u32..500,
        preroll_ms in 0u32..200,
        amplitude_db in -20.0f32..-0.1,
        start_freq in 20.0f64..200.0,
        end_freq in 1000.0f64..20000.0,
    ) {
        let spec = SweepSpec {
            duration_s: duration_ms as f64 / 1000.0,
            preroll_s: preroll_ms as f64 / 1000.0,
            marker_s: 0.01,
            gap_s: 0.02,
            sample_rate: 48000,
            amplitude_db,
            start_freq,
            end_freq,
        };
        let buf = spec.generate().unwrap();

        let expected = (spec.duration_s * 48000.0).round() as usize
            + (spec.preroll_s * 48000.0).round() as usize
            + 480
            + 960;
        prop_assert_eq!(buf.len(), expected);

        let bound = db_to_linear(amplitude_db) + 1e-6;
        for &s in &buf.samples {
            prop_assert!(s.abs() <= bound, "sample {} above bound {}", s, bound);
        }
    }

    /// The first qualifying index truly is the first: everything before it
    /// sits at or below the threshold, and the sample there is above it.
    #[test]
    fn first_above_is_consistent(
        samples in prop::collection::vec(-1.0f32..=1.0, 1..512),
        threshold_db in -100.0f32..-10.0,
    ) {
        let first = first_above_threshold(&samples, threshold_db);
        let threshold = db_to_linear(threshold_db);

        if first == samples.len() {
            for &s in &samples {
                prop_assert!(s.abs() <= threshold);
            }
        } else {
            prop_assert!(samples[first].abs() > threshold);
            for &s in &samples[..first] {
                prop_assert!(s.abs() <= threshold);
            }
        }
    }

    /// `last_above_threshold` mirrors `first_above_threshold`: both hit the
    /// sentinel together, otherwise first <= last.
    #[test]
    fn scan_directions_agree(
        samples in prop::collection::vec(-1.0f32..=1.0, 1..512),
        threshold_db in -100.0f32..-10.0,
    ) {
        let first = first_above_threshold(&samples, threshold_db);
        let last = last_above_threshold(&samples, threshold_db);

        if first == samples.len() {
            prop_assert_eq!(last, samples.len());
        } else {
            prop_assert!(last >= first);
            prop_assert!(last < samples.len());
        }
    }

    /// Deconvolution of arbitrary finite signals either fails cleanly or
    /// produces only finite samples.
    #[test]
    fn deconvolution_output_is_finite(
        dry in prop::collection::vec(-1.0f32..=1.0, 32..256),
        wet in prop::collection::vec(-1.0f32..=1.0, 32..256),
    ) {
        let dry = SampleBuffer::new(dry, 48000);
        let wet = SampleBuffer::new(wet, 48000);

        if let Ok(ir) = deconvolve(&wet, &dry, 0, 0, &DeconvolutionConfig::default()) {
            prop_assert!(!ir.is_empty());
            for &s in &ir.samples {
                prop_assert!(s.is_finite(), "non-finite sample {}", s);
            }
        }
    }
}
