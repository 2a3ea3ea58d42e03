//! Audio I/O layer for the impulso measurement tool.
//!
//! This crate provides:
//!
//! - **WAV file I/O**: [`read_audio`] and [`write_audio`] for loading and
//!   saving mono or stereo measurement signals
//! - **Live sessions**: [`MeasurementSession`] for blocking playback and
//!   play-while-record capture through the system's audio hardware
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use impulso_io::{read_audio, write_audio, MeasurementSession, SessionConfig};
//!
//! // Load the captured device response
//! let decoded = read_audio("wet.wav")?;
//!
//! // ... recover the impulse response (impulso-dsp) ...
//!
//! // Save the result
//! write_audio("ir.wav", &ir_left, Some(&ir_right), 48000)?;
//! ```

mod session;
mod wav;

pub use session::{
    AudioDevice, CaptureOutcome, LevelMeter, MeasurementSession, SessionConfig, default_device,
    list_devices,
};
pub use wav::{DecodedAudio, read_audio, write_audio};

/// Error types for audio I/O operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// WAV file read/write error.
    #[error("WAV file error: {0}")]
    Wav(#[from] hound::Error),

    /// Audio stream setup or runtime error.
    #[error("Audio stream error: {0}")]
    Stream(String),

    /// No audio device available on the system.
    #[error("No audio device available")]
    NoDevice,

    /// The requested audio device was not found.
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// The file has more channels than the pipeline supports.
    #[error("Unsupported channel count: {0} (only mono and stereo are supported)")]
    UnsupportedChannelCount(u16),

    /// The file decoded to zero samples.
    #[error("File decoded to an empty buffer: {0}")]
    EmptyFile(String),

    /// Standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type for audio I/O operations.
pub type Result<T> = std::result::Result<T, Error>;
