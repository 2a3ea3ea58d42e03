//! Calibration sweep generation command.

use clap::Args;
use impulso_io::write_audio;
use std::path::PathBuf;

#[derive(Args)]
pub struct SweepArgs {
    /// Output WAV file
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    /// Sweep duration in seconds
    #[arg(long, default_value = "30.0")]
    length: f64,

    /// Leading silence in seconds
    #[arg(long, default_value = "1.0")]
    preroll: f64,

    /// Marker tone duration in seconds (0 disables the marker)
    #[arg(long, default_value = "0.1")]
    marker: f64,

    /// Silence between marker and sweep in seconds
    #[arg(long, default_value = "1.0")]
    gap: f64,

    /// Amplitude in dB (0 = full scale)
    #[arg(long, default_value = "-1.0")]
    amplitude: f32,

    /// Start frequency in Hz
    #[arg(long, default_value = "20.0")]
    start: f64,

    /// End frequency in Hz
    #[arg(long, default_value = "22000.0")]
    end: f64,

    /// Sample rate
    #[arg(long, default_value = "48000")]
    sample_rate: u32,
}

impl SweepArgs {
    pub fn to_spec(&self) -> impulso_dsp::SweepSpec {
        impulso_dsp::SweepSpec {
            duration_s: self.length,
            preroll_s: self.preroll,
            marker_s: self.marker,
            gap_s: self.gap,
            sample_rate: self.sample_rate,
            amplitude_db: self.amplitude,
            start_freq: self.start,
            end_freq: self.end,
        }
    }
}

pub fn run(args: SweepArgs) -> anyhow::Result<()> {
    println!("Generating calibration sweep...");
    println!(
        "  {} Hz to {} Hz over {:.1}s (preroll {:.2}s, marker {:.2}s, gap {:.2}s)",
        args.start, args.end, args.length, args.preroll, args.marker, args.gap
    );

    let spec = args.to_spec();
    let sweep = spec.generate()?;

    write_audio(&args.output, &sweep.samples, None, sweep.sample_rate)?;
    println!(
        "Wrote {} samples ({:.2}s) to {}",
        sweep.len(),
        sweep.duration_secs(),
        args.output.display()
    );

    Ok(())
}
