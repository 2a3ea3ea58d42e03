//! Audio device management command.

use clap::{Args, Subcommand};
use impulso_io::{default_device, list_devices};

#[derive(Args)]
pub struct DevicesArgs {
    #[command(subcommand)]
    command: Option<DevicesCommand>,
}

#[derive(Subcommand)]
enum DevicesCommand {
    /// List all available audio devices
    List,

    /// Show default device information
    Info,
}

pub fn run(args: DevicesArgs) -> anyhow::Result<()> {
    match args.command.unwrap_or(DevicesCommand::List) {
        DevicesCommand::List => {
            let devices = list_devices()?;

            if devices.is_empty() {
                println!("No audio devices found.");
                return Ok(());
            }

            let inputs: Vec<_> = devices.iter().filter(|d| d.is_input).collect();
            if !inputs.is_empty() {
                println!("Input Devices:");
                for (idx, device) in inputs.iter().enumerate() {
                    let also_output = if device.is_output { " (also output)" } else { "" };
                    println!(
                        "  [{}] {} ({} Hz){}",
                        idx, device.name, device.default_sample_rate, also_output
                    );
                }
                println!();
            }

            let outputs: Vec<_> = devices.iter().filter(|d| d.is_output).collect();
            if !outputs.is_empty() {
                println!("Output Devices:");
                for (idx, device) in outputs.iter().enumerate() {
                    println!(
                        "  [{}] {} ({} Hz)",
                        idx, device.name, device.default_sample_rate
                    );
                }
            }
        }

        DevicesCommand::Info => {
            let (input, output) = default_device()?;

            match input {
                Some(d) => println!("Default input:  {} ({} Hz)", d.name, d.default_sample_rate),
                None => println!("Default input:  none"),
            }
            match output {
                Some(d) => println!("Default output: {} ({} Hz)", d.name, d.default_sample_rate),
                None => println!("Default output: none"),
            }
        }
    }

    Ok(())
}
