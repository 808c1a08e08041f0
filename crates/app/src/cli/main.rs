//! Bellcut CLI Application

mod args;
mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use args::Assignment;
use bellcut_infra::SignalKind;
use commands::{Context, PlayArgs, PresetAction, RenderArgs, ResponseArgs};

#[derive(Parser)]
#[command(name = "bellcut")]
#[command(about = "Stereo low-cut / bell / high-cut equalizer", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to the per-user config.toml)
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the magnitude response of the filter chain
    Response {
        /// Start from a stored preset instead of the saved settings
        #[arg(short, long)]
        preset: Option<String>,

        /// Override a parameter, e.g. --set "Peak Gain=6"
        #[arg(short, long = "set", value_name = "NAME=VALUE")]
        sets: Vec<Assignment>,

        /// Number of log-spaced points between 20 Hz and 20 kHz
        #[arg(long)]
        points: Option<usize>,

        #[arg(long)]
        sample_rate: Option<u32>,

        /// Also measure the impulse response with an FFT
        #[arg(long)]
        measured: bool,

        #[arg(long)]
        json: bool,
    },

    /// Filter a WAV file or a generated signal into a WAV file
    Render {
        /// Output WAV path
        output: PathBuf,

        /// Input WAV file; a test signal is generated when omitted
        #[arg(short, long)]
        input: Option<PathBuf>,

        #[arg(long, default_value_t = SignalKind::Noise)]
        signal: SignalKind,

        /// Sine frequency in Hz
        #[arg(long, default_value_t = 1000.0)]
        freq: f64,

        #[arg(long, default_value_t = 0.5)]
        amplitude: f32,

        #[arg(long, default_value_t = 5.0)]
        seconds: f64,

        #[arg(long)]
        sample_rate: Option<u32>,

        #[arg(short, long)]
        preset: Option<String>,

        #[arg(short, long = "set", value_name = "NAME=VALUE")]
        sets: Vec<Assignment>,

        /// Print the level summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Play a test signal through the equalizer, controlled from stdin
    Play {
        /// Output device name
        #[arg(short, long)]
        device: Option<String>,

        #[arg(long, default_value_t = SignalKind::Noise)]
        signal: SignalKind,

        #[arg(long, default_value_t = 1000.0)]
        freq: f64,

        #[arg(long, default_value_t = 0.25)]
        amplitude: f32,

        #[arg(short, long)]
        preset: Option<String>,

        #[arg(short, long = "set", value_name = "NAME=VALUE")]
        sets: Vec<Assignment>,
    },

    /// List output devices
    Devices {
        #[arg(long)]
        json: bool,
    },

    /// Manage presets
    Preset {
        #[command(subcommand)]
        action: PresetCommand,
    },
}

#[derive(Subcommand)]
enum PresetCommand {
    List,
    Show {
        name: String,
    },
    /// Save the stored settings, with overrides, as a preset
    Save {
        name: String,
        #[arg(short, long = "set", value_name = "NAME=VALUE")]
        sets: Vec<Assignment>,
    },
    Delete {
        name: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!("Bellcut starting");

    if let Commands::Devices { json } = cli.command {
        return commands::devices(json);
    }

    let ctx = Context::load(cli.config.as_deref()).await?;

    match cli.command {
        Commands::Response {
            preset,
            sets,
            points,
            sample_rate,
            measured,
            json,
        } => {
            commands::response(
                &ctx,
                ResponseArgs {
                    preset,
                    sets,
                    points,
                    sample_rate,
                    measured,
                    json,
                },
            )
            .await
        }
        Commands::Render {
            output,
            input,
            signal,
            freq,
            amplitude,
            seconds,
            sample_rate,
            preset,
            sets,
            json,
        } => {
            commands::render(
                &ctx,
                RenderArgs {
                    output,
                    input,
                    signal,
                    frequency: freq,
                    amplitude,
                    seconds,
                    sample_rate,
                    preset,
                    sets,
                    json,
                },
            )
            .await
        }
        Commands::Play {
            device,
            signal,
            freq,
            amplitude,
            preset,
            sets,
        } => {
            commands::play(
                ctx,
                PlayArgs {
                    device,
                    signal,
                    frequency: freq,
                    amplitude,
                    preset,
                    sets,
                },
            )
            .await
        }
        Commands::Preset { action } => {
            let action = match action {
                PresetCommand::List => PresetAction::List,
                PresetCommand::Show { name } => PresetAction::Show { name },
                PresetCommand::Save { name, sets } => PresetAction::Save { name, sets },
                PresetCommand::Delete { name } => PresetAction::Delete { name },
            };
            commands::preset(&ctx, action).await
        }
        Commands::Devices { .. } => Ok(()),
    }
}
