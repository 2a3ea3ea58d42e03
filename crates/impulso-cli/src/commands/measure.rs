//! Impulse response measurement command.
//!
//! Runs the full pipeline: resolve the dry and wet sources, align, deconvolve,
//! post-process, and write the recovered impulse response.

use anyhow::{Context, bail};
use clap::{Args, ValueEnum};
use impulso_dsp::{
    AlignmentConfig, AlignmentMethod, DeconvolutionConfig, MARKER_FREQ_HZ, MAX_SPECTRAL_GAIN,
    PostProcessConfig, SampleBuffer, SampleRateGuard, SweepSpec, align, deconvolve,
    math::linear_to_db, postprocess,
};
use impulso_io::{MeasurementSession, SessionConfig, read_audio, write_audio};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Alignment strategies exposed on the command line.
#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum CliAlignment {
    /// Marker-tone detection on both signals
    #[default]
    Marker,
    /// Marker detection on the dry signal, reused for the wet signal
    Dry,
    /// First sample above the silence threshold
    Silence,
    /// No alignment
    None,
}

impl From<CliAlignment> for AlignmentMethod {
    fn from(a: CliAlignment) -> Self {
        match a {
            CliAlignment::Marker => AlignmentMethod::MarkerBoth,
            CliAlignment::Dry => AlignmentMethod::MarkerDryReuseOnWet,
            CliAlignment::Silence => AlignmentMethod::SilenceThreshold,
            CliAlignment::None => AlignmentMethod::None,
        }
    }
}

#[derive(Args)]
pub struct MeasureArgs {
    /// Recorded wet signal: a WAV path, or "live" to capture through the
    /// audio hardware
    #[arg(long, value_name = "PATH|live")]
    wet: String,

    /// Dry calibration WAV; omitted = synthesize from the sweep options
    #[arg(long, value_name = "PATH")]
    dry: Option<String>,

    /// Output impulse response WAV
    #[arg(short, long, default_value = "ir.wav")]
    out: PathBuf,

    /// Alignment method
    #[arg(long, value_enum, default_value = "marker")]
    align: CliAlignment,

    /// Sweep-silence threshold in dB
    #[arg(long, default_value = "-60.0")]
    sweep_threshold: f32,

    /// IR leading-silence threshold in dB (non-negative disables the trim)
    #[arg(long, default_value = "-72.0")]
    start_threshold: f32,

    /// IR trailing-silence threshold in dB (non-negative disables the trim)
    #[arg(long, default_value = "-72.0")]
    end_threshold: f32,

    /// Manual sample offset: positive delays the wet signal, negative the
    /// dry signal; also the zero-peak target offset
    #[arg(long, default_value = "64")]
    offset: i64,

    /// Peak normalization target (linear)
    #[arg(long, default_value = "0.9")]
    target_peak: f32,

    /// Trim at the first loud sample instead of placing the peak at the
    /// configured offset
    #[arg(long)]
    no_zero_peak: bool,

    /// End-of-buffer fade as a fraction of the IR length
    #[arg(long, default_value = "0.05")]
    fade: f32,

    /// Low-pass cutoff in Hz
    #[arg(long)]
    lowpass: Option<f32>,

    /// High-pass cutoff in Hz
    #[arg(long)]
    highpass: Option<f32>,

    /// Requested IR length in samples (0 = auto)
    #[arg(long, default_value = "0")]
    ir_length: usize,

    /// Hard cap on the IR duration in seconds
    #[arg(long, default_value = "10.0")]
    max_ir_secs: f64,

    /// Leading silence prepended to the raw IR, in seconds
    #[arg(long, default_value = "0.0")]
    headroom: f64,

    /// Sweep duration in seconds (synthesized dry only)
    #[arg(long, default_value = "30.0")]
    sweep_secs: f64,

    /// Preroll in seconds (synthesized dry only)
    #[arg(long, default_value = "1.0")]
    preroll: f64,

    /// Marker duration in seconds (synthesized dry only)
    #[arg(long, default_value = "0.1")]
    marker: f64,

    /// Marker/sweep gap in seconds (synthesized dry only)
    #[arg(long, default_value = "1.0")]
    gap: f64,

    /// Sweep amplitude in dB
    #[arg(long, default_value = "-1.0")]
    amplitude: f32,

    /// Sweep start frequency in Hz
    #[arg(long, default_value = "20.0")]
    start: f64,

    /// Sweep end frequency in Hz
    #[arg(long, default_value = "22000.0")]
    end: f64,

    /// Sample rate (synthesized dry and live sessions)
    #[arg(long, default_value = "48000")]
    sample_rate: u32,

    /// Extra capture time after playback ends, in seconds
    #[arg(long, default_value = "1.0")]
    capture_margin: f64,

    /// Input device for live capture (substring match)
    #[arg(long)]
    input_device: Option<String>,

    /// Output device for live playback (substring match)
    #[arg(long)]
    output_device: Option<String>,

    /// Measurement profile TOML; fields present in it override the flags
    #[arg(long)]
    profile: Option<PathBuf>,
}

/// Where one logical input comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SignalSource {
    /// Decode from a WAV file.
    File(PathBuf),
    /// Capture through the live audio session.
    Live,
    /// Synthesize from the sweep options.
    Synthesized,
}

#[derive(Debug)]
struct ResolvedSources {
    dry: SignalSource,
    wet: SignalSource,
}

fn resolve_sources(dry: Option<&str>, wet: &str) -> anyhow::Result<ResolvedSources> {
    let wet = if wet.eq_ignore_ascii_case("live") {
        SignalSource::Live
    } else {
        SignalSource::File(PathBuf::from(wet))
    };

    let dry = match dry {
        Option::None => SignalSource::Synthesized,
        Some(s) if s.eq_ignore_ascii_case("live") => {
            bail!("the dry signal is the reference; it cannot be captured live")
        }
        Some(s) => SignalSource::File(PathBuf::from(s)),
    };

    Ok(ResolvedSources { dry, wet })
}

pub fn run(mut args: MeasureArgs) -> anyhow::Result<()> {
    if let Some(path) = args.profile.clone() {
        let profile = crate::profile::MeasurementProfile::load(&path)
            .with_context(|| format!("loading profile {}", path.display()))?;
        apply_profile(&mut args, &profile)?;
    }

    let sources = resolve_sources(args.dry.as_deref(), &args.wet)?;
    let mut rate_guard = SampleRateGuard::new();

    // Dry signal.
    let dry = match &sources.dry {
        SignalSource::File(path) => {
            let decoded =
                read_audio(path).with_context(|| format!("reading dry signal {}", path.display()))?;
            if decoded.right.is_some() {
                tracing::warn!("dry file is stereo; using the left channel as reference");
            }
            rate_guard.check(decoded.sample_rate)?;
            SampleBuffer::new(decoded.left, decoded.sample_rate)
        }
        SignalSource::Synthesized => {
            println!(
                "Synthesizing sweep: {} Hz to {} Hz over {:.1}s",
                args.start, args.end, args.sweep_secs
            );
            let buf = sweep_spec(&args).generate()?;
            rate_guard.check(buf.sample_rate)?;
            buf
        }
        SignalSource::Live => unreachable!("rejected in resolve_sources"),
    };

    // Wet signal.
    let abort = Arc::new(AtomicBool::new(false));
    let (wet_left, wet_right) = match &sources.wet {
        SignalSource::File(path) => {
            let decoded =
                read_audio(path).with_context(|| format!("reading wet signal {}", path.display()))?;
            rate_guard.check(decoded.sample_rate)?;
            let rate = decoded.sample_rate;
            (
                SampleBuffer::new(decoded.left, rate),
                decoded.right.map(|r| SampleBuffer::new(r, rate)),
            )
        }
        SignalSource::Live => {
            let (l, r) = capture_live(&args, &dry, &abort)?;
            rate_guard.check(l.sample_rate)?;
            (l, Some(r))
        }
        SignalSource::Synthesized => unreachable!("wet is never synthesized"),
    };

    // Alignment.
    let align_cfg = AlignmentConfig {
        silence_threshold_db: args.sweep_threshold,
        sweep_amplitude_db: args.amplitude,
        marker_freq_hz: Some(MARKER_FREQ_HZ),
        marker_hint_s: 0.0,
        gap_hint_s: 0.0,
    };
    let method: AlignmentMethod = args.align.into();
    let dry_align = align::detect_dry(&dry, method, &align_cfg);
    let wet_align = align::detect_wet(&wet_left, method, &align_cfg, &dry_align);
    tracing::info!(
        dry_offset = dry_align.sweep_start,
        wet_offset = wet_align.sweep_start,
        marker_len = dry_align.marker_len,
        gap_len = dry_align.gap_len,
        "alignment"
    );

    // Deconvolution. Stereo wet channels share the left channel's alignment;
    // they were captured simultaneously.
    let decon_cfg = DeconvolutionConfig {
        ir_length: args.ir_length,
        max_ir_seconds: args.max_ir_secs,
        headroom_seconds: args.headroom,
        max_gain: MAX_SPECTRAL_GAIN,
        offset_correction: args.offset,
    };
    let mut ir_left = deconvolve(
        &wet_left,
        &dry,
        dry_align.sweep_start,
        wet_align.sweep_start,
        &decon_cfg,
    )
    .context("deconvolving left channel")?;
    let mut ir_right = wet_right
        .as_ref()
        .map(|wet| {
            deconvolve(
                wet,
                &dry,
                dry_align.sweep_start,
                wet_align.sweep_start,
                &decon_cfg,
            )
        })
        .transpose()
        .context("deconvolving right channel")?;

    // Post-processing.
    let pp_cfg = PostProcessConfig {
        target_peak: args.target_peak,
        zero_peak: !args.no_zero_peak,
        peak_offset: args.offset.max(0) as usize,
        start_threshold_db: args.start_threshold,
        end_threshold_db: args.end_threshold,
        fade_fraction: args.fade,
        lowpass_hz: args.lowpass,
        highpass_hz: args.highpass,
    };
    postprocess::process(&mut ir_left, ir_right.as_mut(), &pp_cfg);

    write_audio(
        &args.out,
        &ir_left.samples,
        ir_right.as_ref().map(|r| r.samples.as_slice()),
        dry.sample_rate,
    )
    .with_context(|| format!("writing {}", args.out.display()))?;

    let channels = if ir_right.is_some() { "stereo" } else { "mono" };
    println!(
        "Wrote {} IR: {} samples ({:.3}s) to {}",
        channels,
        ir_left.len(),
        ir_left.duration_secs(),
        args.out.display()
    );

    Ok(())
}

/// Play the dry signal while recording the device response, blocking until
/// the capture budget is exhausted or the user aborts with Ctrl-C.
fn capture_live(
    args: &MeasureArgs,
    dry: &SampleBuffer,
    abort: &Arc<AtomicBool>,
) -> anyhow::Result<(SampleBuffer, SampleBuffer)> {
    let session = MeasurementSession::new(
        SessionConfig {
            sample_rate: dry.sample_rate,
            input_device: args.input_device.clone(),
            output_device: args.output_device.clone(),
        },
        true,
    )?;

    let handler_abort = Arc::clone(abort);
    ctrlc::set_handler(move || {
        eprintln!("\nAborting measurement...");
        handler_abort.store(true, Ordering::SeqCst);
    })?;

    let total_secs = dry.duration_secs() + args.capture_margin;
    println!(
        "Recording {:.1}s through the audio hardware... Press Ctrl+C to abort.",
        total_secs
    );

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg} [{elapsed_precise}]")
            .unwrap(),
    );
    pb.set_message("playing sweep and recording response");
    pb.enable_steady_tick(Duration::from_millis(100));

    let outcome = session.play_and_record(&dry.samples, None, args.capture_margin, abort)?;
    pb.finish_and_clear();

    if outcome.aborted {
        bail!("measurement aborted by user");
    }

    let meter = session.meter();
    println!(
        "Captured {} samples, input peak {:.1} dBFS",
        outcome.left.len(),
        linear_to_db(meter.peak())
    );
    if meter.clip_count() > 0 {
        println!(
            "WARNING: {} clipped input samples; lower the playback level and re-measure",
            meter.clip_count()
        );
    }
    if meter.dropout_count() > 0 {
        println!("WARNING: {} capture chunks dropped", meter.dropout_count());
    }
    meter.reset();

    let rate = dry.sample_rate;
    Ok((
        SampleBuffer::new(outcome.left, rate),
        SampleBuffer::new(outcome.right, rate),
    ))
}

fn sweep_spec(args: &MeasureArgs) -> SweepSpec {
    SweepSpec {
        duration_s: args.sweep_secs,
        preroll_s: args.preroll,
        marker_s: args.marker,
        gap_s: args.gap,
        sample_rate: args.sample_rate,
        amplitude_db: args.amplitude,
        start_freq: args.start,
        end_freq: args.end,
    }
}

/// Overlay profile values onto the parsed arguments.
fn apply_profile(
    args: &mut MeasureArgs,
    profile: &crate::profile::MeasurementProfile,
) -> anyhow::Result<()> {
    if let Some(v) = profile.sweep_secs {
        args.sweep_secs = v;
    }
    if let Some(v) = profile.preroll_secs {
        args.preroll = v;
    }
    if let Some(v) = profile.marker_secs {
        args.marker = v;
    }
    if let Some(v) = profile.gap_secs {
        args.gap = v;
    }
    if let Some(v) = profile.amplitude_db {
        args.amplitude = v;
    }
    if let Some(v) = profile.start_freq {
        args.start = v;
    }
    if let Some(v) = profile.end_freq {
        args.end = v;
    }
    if let Some(v) = profile.sample_rate {
        args.sample_rate = v;
    }
    if let Some(name) = &profile.alignment {
        args.align = CliAlignment::from_str(name, true)
            .map_err(|e| anyhow::anyhow!("invalid alignment '{}' in profile: {}", name, e))?;
    }
    if let Some(v) = profile.sweep_threshold_db {
        args.sweep_threshold = v;
    }
    if let Some(v) = profile.start_threshold_db {
        args.start_threshold = v;
    }
    if let Some(v) = profile.end_threshold_db {
        args.end_threshold = v;
    }
    if let Some(v) = profile.offset {
        args.offset = v;
    }
    if let Some(v) = profile.target_peak {
        args.target_peak = v;
    }
    if let Some(v) = profile.lowpass_hz {
        args.lowpass = Some(v);
    }
    if let Some(v) = profile.highpass_hz {
        args.highpass = Some(v);
    }
    if let Some(v) = profile.capture_margin_secs {
        args.capture_margin = v;
    }
    if let Some(name) = &profile.input_device {
        args.input_device = Some(name.clone());
    }
    if let Some(name) = &profile.output_device {
        args.output_device = Some(name.clone());
    }
    Ok(())
}
