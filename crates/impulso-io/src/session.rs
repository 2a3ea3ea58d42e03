//! Live measurement sessions via cpal.
//!
//! A [`MeasurementSession`] plays the calibration signal through an output
//! device and, for [`MeasurementSession::play_and_record`], simultaneously
//! captures the device-under-test response. Both calls block until done.
//!
//! The realtime callbacks never block and never share mutable buffers with
//! the orchestrating thread: the output callback reads from an immutable
//! shared buffer behind an atomic frame counter, the input callback hands
//! chunks over a bounded channel, and the orchestrator polls completion and
//! abort flags at a coarse interval. Capture length is bounded up front
//! (playback length plus a trailing margin), so a session can never buffer
//! without bound.

use crate::{Error, Result};
use cpal::Device;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::time::Duration;

/// Poll interval of the orchestrating thread.
const POLL_INTERVAL: Duration = Duration::from_millis(30);

/// Extract device name via `description()` (cpal 0.17+).
fn device_name(device: &Device) -> std::result::Result<String, cpal::DeviceNameError> {
    device.description().map(|d| d.name().to_string())
}

/// Audio device information.
#[derive(Debug, Clone)]
pub struct AudioDevice {
    /// Human-readable device name.
    pub name: String,
    /// Whether the device supports audio input.
    pub is_input: bool,
    /// Whether the device supports audio output.
    pub is_output: bool,
    /// Default sample rate in Hz.
    pub default_sample_rate: u32,
}

/// List all available audio devices.
pub fn list_devices() -> Result<Vec<AudioDevice>> {
    let host = cpal::default_host();
    let mut devices = Vec::new();

    if let Ok(inputs) = host.input_devices() {
        for device in inputs {
            if let Ok(name) = device_name(&device) {
                let sample_rate = device
                    .default_input_config()
                    .map(|c| c.sample_rate())
                    .unwrap_or(48000);
                let is_output = device.default_output_config().is_ok();

                devices.push(AudioDevice {
                    name,
                    is_input: true,
                    is_output,
                    default_sample_rate: sample_rate,
                });
            }
        }
    }

    if let Ok(outputs) = host.output_devices() {
        for device in outputs {
            if let Ok(name) = device_name(&device) {
                if devices.iter().any(|d| d.name == name) {
                    continue;
                }
                let sample_rate = device
                    .default_output_config()
                    .map(|c| c.sample_rate())
                    .unwrap_or(48000);

                devices.push(AudioDevice {
                    name,
                    is_input: false,
                    is_output: true,
                    default_sample_rate: sample_rate,
                });
            }
        }
    }

    Ok(devices)
}

/// Get the default input and output device info.
pub fn default_device() -> Result<(Option<AudioDevice>, Option<AudioDevice>)> {
    let host = cpal::default_host();

    let input = host.default_input_device().and_then(|d| {
        device_name(&d).ok().map(|name| AudioDevice {
            name,
            is_input: true,
            is_output: false,
            default_sample_rate: d
                .default_input_config()
                .map(|c| c.sample_rate())
                .unwrap_or(48000),
        })
    });

    let output = host.default_output_device().and_then(|d| {
        device_name(&d).ok().map(|name| AudioDevice {
            name,
            is_input: false,
            is_output: true,
            default_sample_rate: d
                .default_output_config()
                .map(|c| c.sample_rate())
                .unwrap_or(48000),
        })
    });

    Ok((input, output))
}

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Sample rate the measurement expects, in Hz.
    pub sample_rate: u32,
    /// Input device name (default device if `None`).
    pub input_device: Option<String>,
    /// Output device name (default device if `None`).
    pub output_device: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            input_device: None,
            output_device: None,
        }
    }
}

/// Running input level indicators, written by the capture callback and read
/// by the orchestrator after (or during) a session. Reset on acknowledgment.
#[derive(Debug, Default)]
pub struct LevelMeter {
    peak_bits: AtomicU32,
    clips: AtomicU32,
    dropouts: AtomicU32,
}

impl LevelMeter {
    /// Fold one callback's worth of samples into the running meters.
    ///
    /// Only the capture callback writes; plain stores are sufficient.
    fn update_block(&self, samples: &[f32]) {
        let mut peak = f32::from_bits(self.peak_bits.load(Ordering::Relaxed));
        let mut clips = 0u32;
        for &s in samples {
            let a = s.abs();
            if a > peak {
                peak = a;
            }
            if a >= 1.0 {
                clips += 1;
            }
        }
        self.peak_bits.store(peak.to_bits(), Ordering::Relaxed);
        if clips > 0 {
            self.clips.fetch_add(clips, Ordering::Relaxed);
        }
    }

    fn note_dropout(&self) {
        self.dropouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Highest input magnitude seen since the last reset.
    pub fn peak(&self) -> f32 {
        f32::from_bits(self.peak_bits.load(Ordering::Relaxed))
    }

    /// Number of full-scale input samples since the last reset.
    pub fn clip_count(&self) -> u32 {
        self.clips.load(Ordering::Relaxed)
    }

    /// Number of capture chunks lost because the orchestrator fell behind.
    pub fn dropout_count(&self) -> u32 {
        self.dropouts.load(Ordering::Relaxed)
    }

    /// Clear all meters.
    pub fn reset(&self) {
        self.peak_bits.store(0, Ordering::Relaxed);
        self.clips.store(0, Ordering::Relaxed);
        self.dropouts.store(0, Ordering::Relaxed);
    }
}

/// Result of a play-and-record session.
#[derive(Debug)]
pub struct CaptureOutcome {
    /// Captured left channel.
    pub left: Vec<f32>,
    /// Captured right channel (duplicated from left for mono input devices).
    pub right: Vec<f32>,
    /// Whether the session ended on the user's abort flag rather than by
    /// exhausting the capture budget.
    pub aborted: bool,
}

/// A blocking playback/capture session against the system audio hardware.
pub struct MeasurementSession {
    output_device: Device,
    input_device: Option<Device>,
    config: SessionConfig,
    meter: Arc<LevelMeter>,
}

impl MeasurementSession {
    /// Open the configured devices. The input device is resolved eagerly so
    /// a missing microphone fails at session setup, not mid-measurement.
    pub fn new(config: SessionConfig, needs_input: bool) -> Result<Self> {
        let host = cpal::default_host();

        let output_device = match &config.output_device {
            Some(name) => find_device(host.output_devices().ok(), name, "output")?,
            None => host.default_output_device().ok_or(Error::NoDevice)?,
        };

        let input_device = if needs_input {
            Some(match &config.input_device {
                Some(name) => find_device(host.input_devices().ok(), name, "input")?,
                None => host.default_input_device().ok_or(Error::NoDevice)?,
            })
        } else {
            None
        };

        tracing::info!(
            output = device_name(&output_device).unwrap_or_default(),
            input = input_device
                .as_ref()
                .and_then(|d| device_name(d).ok())
                .unwrap_or_default(),
            "measurement session ready"
        );

        Ok(Self {
            output_device,
            input_device,
            config,
            meter: Arc::new(LevelMeter::default()),
        })
    }

    /// Input level meters for UI feedback.
    pub fn meter(&self) -> &LevelMeter {
        &self.meter
    }

    /// Play one or two channels, blocking until fully played or aborted.
    pub fn play(&self, left: &[f32], right: Option<&[f32]>, abort: &Arc<AtomicBool>) -> Result<()> {
        let frames_total = left.len().max(right.map_or(0, <[f32]>::len));
        let done = Arc::new(AtomicBool::new(false));

        let _output = self.build_output_stream(left, right, Arc::clone(&done))?;

        while !done.load(Ordering::Acquire) && !abort.load(Ordering::Relaxed) {
            std::thread::sleep(POLL_INTERVAL);
        }

        tracing::debug!(frames_total, aborted = abort.load(Ordering::Relaxed), "playback finished");
        Ok(())
    }

    /// Play while recording, blocking until the capture budget is exhausted.
    ///
    /// The budget is the playback length plus `capture_margin_s` of trailing
    /// room for the device's decay tail. Capture buffers are sized up front;
    /// the session never records open-ended.
    pub fn play_and_record(
        &self,
        left: &[f32],
        right: Option<&[f32]>,
        capture_margin_s: f64,
        abort: &Arc<AtomicBool>,
    ) -> Result<CaptureOutcome> {
        let input_device = self.input_device.as_ref().ok_or(Error::NoDevice)?;
        let input_config = input_device
            .default_input_config()
            .map_err(|e| Error::Stream(e.to_string()))?;
        let in_channels = input_config.channels() as usize;
        let in_rate = input_config.sample_rate();
        if in_rate != self.config.sample_rate {
            return Err(Error::Stream(format!(
                "input device runs at {} Hz, session needs {} Hz",
                in_rate, self.config.sample_rate
            )));
        }

        let frames_total = left.len().max(right.map_or(0, <[f32]>::len));
        let budget =
            frames_total + (capture_margin_s * self.config.sample_rate as f64).round() as usize;

        let mut captured_left: Vec<f32> = Vec::with_capacity(budget);
        let mut captured_right: Vec<f32> = Vec::with_capacity(budget);

        // Bounded handoff: the callback only try_sends, the orchestrator
        // drains. A full queue counts as a dropout instead of blocking the
        // realtime thread.
        let (tx, rx) = mpsc::sync_channel::<Vec<f32>>(64);
        let recording = Arc::new(AtomicBool::new(true));

        self.meter.reset();
        let meter = Arc::clone(&self.meter);
        let cb_recording = Arc::clone(&recording);
        let input_stream = input_device
            .build_input_stream(
                &input_config.into(),
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if !cb_recording.load(Ordering::Relaxed) {
                        return;
                    }
                    meter.update_block(data);
                    if tx.try_send(data.to_vec()).is_err() {
                        meter.note_dropout();
                    }
                },
                |err| tracing::warn!("input stream error: {}", err),
                None,
            )
            .map_err(|e| Error::Stream(e.to_string()))?;
        input_stream
            .play()
            .map_err(|e| Error::Stream(e.to_string()))?;

        let playback_done = Arc::new(AtomicBool::new(false));
        let _output = self.build_output_stream(left, right, Arc::clone(&playback_done))?;

        let mut aborted = false;
        while captured_left.len() < budget {
            if abort.load(Ordering::Relaxed) {
                aborted = true;
                break;
            }
            while let Ok(chunk) = rx.try_recv() {
                deinterleave_into(&chunk, in_channels, budget, &mut captured_left, &mut captured_right);
            }
            if captured_left.len() >= budget {
                break;
            }
            std::thread::sleep(POLL_INTERVAL);
        }

        recording.store(false, Ordering::Relaxed);
        drop(input_stream);

        tracing::info!(
            frames = captured_left.len(),
            peak = self.meter.peak(),
            clips = self.meter.clip_count(),
            dropouts = self.meter.dropout_count(),
            aborted,
            "capture finished"
        );

        Ok(CaptureOutcome {
            left: captured_left,
            right: captured_right,
            aborted,
        })
    }

    /// Build the output stream: mono sources go to every output channel,
    /// stereo sources to the first two. Flips `done` once the last frame has
    /// been handed to the hardware.
    fn build_output_stream(
        &self,
        left: &[f32],
        right: Option<&[f32]>,
        done: Arc<AtomicBool>,
    ) -> Result<cpal::Stream> {
        let output_config = self
            .output_device
            .default_output_config()
            .map_err(|e| Error::Stream(e.to_string()))?;
        let out_rate = output_config.sample_rate();
        if out_rate != self.config.sample_rate {
            return Err(Error::Stream(format!(
                "output device runs at {} Hz, session needs {} Hz",
                out_rate, self.config.sample_rate
            )));
        }
        let channels = output_config.channels() as usize;

        let left: Arc<Vec<f32>> = Arc::new(left.to_vec());
        let right: Option<Arc<Vec<f32>>> = right.map(|r| Arc::new(r.to_vec()));
        let frames_total = left.len().max(right.as_ref().map_or(0, |r| r.len()));
        let position = Arc::new(AtomicUsize::new(0));

        let stream = self
            .output_device
            .build_output_stream(
                &output_config.into(),
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut pos = position.load(Ordering::Relaxed);
                    for frame in data.chunks_mut(channels) {
                        if pos >= frames_total {
                            frame.fill(0.0);
                            continue;
                        }
                        let l = left.get(pos).copied().unwrap_or(0.0);
                        match &right {
                            None => frame.fill(l),
                            Some(r) => {
                                let r = r.get(pos).copied().unwrap_or(0.0);
                                frame[0] = l;
                                if channels > 1 {
                                    frame[1] = r;
                                    frame[2..].fill(0.0);
                                }
                            }
                        }
                        pos += 1;
                    }
                    position.store(pos, Ordering::Relaxed);
                    if pos >= frames_total {
                        done.store(true, Ordering::Release);
                    }
                },
                |err| tracing::warn!("output stream error: {}", err),
                None,
            )
            .map_err(|e| Error::Stream(e.to_string()))?;

        stream.play().map_err(|e| Error::Stream(e.to_string()))?;
        Ok(stream)
    }
}

/// Append deinterleaved frames, duplicating mono input to both channels and
/// never growing past the capture budget.
fn deinterleave_into(
    chunk: &[f32],
    channels: usize,
    budget: usize,
    left: &mut Vec<f32>,
    right: &mut Vec<f32>,
) {
    if channels == 0 {
        return;
    }
    for frame in chunk.chunks(channels) {
        if left.len() >= budget {
            return;
        }
        let l = frame[0];
        let r = frame.get(1).copied().unwrap_or(l);
        left.push(l);
        right.push(r);
    }
}

/// Find a device by case-insensitive substring match on its name.
fn find_device(
    devices: Option<impl Iterator<Item = Device>>,
    search: &str,
    kind: &str,
) -> Result<Device> {
    let search_lower = search.to_lowercase();
    if let Some(devices) = devices {
        for device in devices {
            if let Ok(name) = device_name(&device)
                && name.to_lowercase().contains(&search_lower)
            {
                return Ok(device);
            }
        }
    }
    Err(Error::DeviceNotFound(format!(
        "no {} device matching '{}'",
        kind, search
    )))
}
