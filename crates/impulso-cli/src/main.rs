//! Impulso CLI - impulse response measurement from the command line.

mod commands;
mod profile;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "impulso")]
#[command(author, version, about = "Impulse response measurement tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the dry calibration sweep and write it to a WAV file
    Sweep(commands::sweep::SweepArgs),

    /// Measure an impulse response from files or a live audio session
    Measure(commands::measure::MeasureArgs),

    /// List and manage audio devices
    Devices(commands::devices::DevicesArgs),
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Sweep(args) => commands::sweep::run(args),
        Commands::Measure(args) => commands::measure::run(args),
        Commands::Devices(args) => commands::devices::run(args),
    }
}
