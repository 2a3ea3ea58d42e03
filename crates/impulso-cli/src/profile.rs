//! Measurement profile files.
//!
//! A profile is a TOML file bundling the settings of a repeatable
//! measurement setup (sweep shape, thresholds, devices) so a session can be
//! re-run with `impulso measure --profile studio.toml`. Every field is
//! optional; fields present in the profile override the command-line flags.
//!
//! # TOML Format
//!
//! ```toml
//! sweep_secs = 20.0
//! preroll_secs = 1.0
//! marker_secs = 0.1
//! gap_secs = 1.0
//! amplitude_db = -3.0
//! start_freq = 20.0
//! end_freq = 20000.0
//! sample_rate = 48000
//! alignment = "dry"
//! offset = 64
//! target_peak = 0.9
//! lowpass_hz = 20000.0
//! input_device = "Scarlett"
//! output_device = "Scarlett"
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Optional overrides for the measure command.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct MeasurementProfile {
    /// Sweep duration in seconds.
    pub sweep_secs: Option<f64>,
    /// Leading silence in seconds.
    pub preroll_secs: Option<f64>,
    /// Marker tone duration in seconds.
    pub marker_secs: Option<f64>,
    /// Marker/sweep gap in seconds.
    pub gap_secs: Option<f64>,
    /// Sweep amplitude in dB.
    pub amplitude_db: Option<f32>,
    /// Sweep start frequency in Hz.
    pub start_freq: Option<f64>,
    /// Sweep end frequency in Hz.
    pub end_freq: Option<f64>,
    /// Sample rate in Hz.
    pub sample_rate: Option<u32>,
    /// Alignment method: marker / dry / silence / none.
    pub alignment: Option<String>,
    /// Sweep silence threshold in dB.
    pub sweep_threshold_db: Option<f32>,
    /// IR leading-silence threshold in dB.
    pub start_threshold_db: Option<f32>,
    /// IR trailing-silence threshold in dB.
    pub end_threshold_db: Option<f32>,
    /// Manual sample offset.
    pub offset: Option<i64>,
    /// Peak normalization target.
    pub target_peak: Option<f32>,
    /// Low-pass cutoff in Hz.
    pub lowpass_hz: Option<f32>,
    /// High-pass cutoff in Hz.
    pub highpass_hz: Option<f32>,
    /// Capture margin after playback, in seconds.
    pub capture_margin_secs: Option<f64>,
    /// Input device name.
    pub input_device: Option<String>,
    /// Output device name.
    pub output_device: Option<String>,
}

impl MeasurementProfile {
    /// Load a profile from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let profile = toml::from_str(&text)?;
        Ok(profile)
    }
}
