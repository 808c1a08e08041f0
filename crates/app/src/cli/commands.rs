//! Subcommand implementations

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context as _};
use bellcut_core::domain::audio::{AudioEnumerator, DeviceId, SampleRate};
use bellcut_core::domain::config::{
    BellcutConfig, Command, CommandExecutor, CommandResult, ConfigManager, ConfigWatcher,
    PresetManager,
};
use bellcut_core::domain::dsp::{gain_to_db, ResponseCurve, ResponseMonitor};
use bellcut_core::domain::params::{ChainSettings, ParameterStore};
use bellcut_infra::{
    process_wav_file, render_signal, CpalEnumerator, EqController, EqOutputStream, MeasuredResponse,
    RenderOptions, SignalKind, ToneGenerator,
};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::args::{apply_assignments, format_settings, Assignment, ControlLine};

/// Loaded configuration plus where it came from
pub struct Context {
    pub config: BellcutConfig,
    pub presets: PresetManager,
    /// Set when the config was found through [`ConfigManager`] and may be auto-saved
    pub manager: Option<ConfigManager>,
}

impl Context {
    /// Load `path`, or the per-user config when `path` is `None`
    pub async fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let (config, config_dir, manager) = match path {
            Some(path) => {
                let config = BellcutConfig::load_from_file(path)
                    .await
                    .with_context(|| format!("loading {}", path.display()))?;
                let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
                (config, dir, None)
            }
            None => {
                let dir = ConfigManager::default_config_dir()?;
                let manager = ConfigManager::new(dir.clone());
                (manager.load().await, dir, Some(manager))
            }
        };

        let preset_dir = if config.app.preset_dir.is_relative() {
            config_dir.join(&config.app.preset_dir)
        } else {
            config.app.preset_dir.clone()
        };
        debug!(preset_dir = %preset_dir.display(), "Configuration ready");

        Ok(Self {
            config,
            presets: PresetManager::new(preset_dir),
            manager,
        })
    }

    /// Stored settings, optionally replaced by a preset, then overridden by `sets`
    pub async fn settings(
        &self,
        preset: Option<&str>,
        sets: &[Assignment],
    ) -> anyhow::Result<ChainSettings> {
        let mut settings = match preset {
            Some(name) => self.presets.load_preset(name).await?,
            None => self.config.settings,
        };
        apply_assignments(&mut settings, sets);
        Ok(settings)
    }

    fn sample_rate(&self, override_hz: Option<u32>) -> u32 {
        override_hz.unwrap_or(self.config.app.sample_rate)
    }
}

#[derive(Debug, Serialize)]
struct CurvePoint {
    frequency_hz: f64,
    gain_db: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    measured_db: Option<f64>,
}

pub struct ResponseArgs {
    pub preset: Option<String>,
    pub sets: Vec<Assignment>,
    pub points: Option<usize>,
    pub sample_rate: Option<u32>,
    pub measured: bool,
    pub json: bool,
}

/// Print the magnitude response of the configured chain
pub async fn response(ctx: &Context, args: ResponseArgs) -> anyhow::Result<()> {
    let settings = ctx.settings(args.preset.as_deref(), &args.sets).await?;
    let sample_rate = ctx.sample_rate(args.sample_rate) as f64;
    let points = args.points.unwrap_or(ctx.config.app.response_points);
    if points < 2 {
        bail!("need at least 2 response points, got {points}");
    }

    let params = Arc::new(ParameterStore::from_settings(&settings));
    let monitor = ResponseMonitor::new(params, sample_rate, points);
    let measured = if args.measured {
        Some(MeasuredResponse::measure(&settings, sample_rate, 1 << 16)?)
    } else {
        None
    };

    let curve: Vec<CurvePoint> = monitor
        .curve()
        .points()
        .map(|(frequency_hz, gain_db)| CurvePoint {
            frequency_hz,
            gain_db,
            measured_db: measured
                .as_ref()
                .map(|m| gain_to_db(m.magnitude_at(frequency_hz))),
        })
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&curve)?);
        return Ok(());
    }

    for point in &curve {
        match point.measured_db {
            Some(m) => println!(
                "{:>10.1} Hz {:>8.2} dB {:>8.2} dB",
                point.frequency_hz, point.gain_db, m
            ),
            None => println!("{:>10.1} Hz {:>8.2} dB", point.frequency_hz, point.gain_db),
        }
    }
    print_peak(monitor.curve());
    Ok(())
}

fn print_peak(curve: &ResponseCurve) {
    if let Some((freq, db)) = curve.peak() {
        println!("peak {db:+.2} dB at {freq:.0} Hz");
    }
}

pub struct RenderArgs {
    pub output: PathBuf,
    pub input: Option<PathBuf>,
    pub signal: SignalKind,
    pub frequency: f64,
    pub amplitude: f32,
    pub seconds: f64,
    pub sample_rate: Option<u32>,
    pub preset: Option<String>,
    pub sets: Vec<Assignment>,
    pub json: bool,
}

/// Filter a WAV file, or a generated signal, into a new WAV file
pub async fn render(ctx: &Context, args: RenderArgs) -> anyhow::Result<()> {
    let settings = ctx.settings(args.preset.as_deref(), &args.sets).await?;
    let params = Arc::new(ParameterStore::from_settings(&settings));
    let block_size = ctx.config.app.block_size as usize;
    let sample_rate = ctx.sample_rate(args.sample_rate);

    let output = args.output.clone();
    let summary = match args.input {
        Some(input) => {
            tokio::task::spawn_blocking(move || {
                process_wav_file(&input, &output, params, block_size)
            })
            .await??
        }
        None => {
            if !(args.seconds > 0.0) {
                bail!("--seconds must be positive, got {}", args.seconds);
            }
            let source = ToneGenerator::new(
                args.signal,
                args.frequency,
                args.amplitude,
                sample_rate as f64,
            );
            let frames = (args.seconds * sample_rate as f64).round() as usize;
            let options = RenderOptions {
                sample_rate,
                block_size,
            };
            tokio::task::spawn_blocking(move || {
                render_signal(&output, params, source, frames, options)
            })
            .await??
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "wrote {} ({} frames, {} ch, {} Hz)",
            args.output.display(),
            summary.frames,
            summary.channels,
            summary.sample_rate
        );
        println!(
            "peak {:.2} -> {:.2} dBFS, rms {:.2} -> {:.2} dBFS",
            summary.input_peak_db,
            summary.output_peak_db,
            summary.input_rms_db,
            summary.output_rms_db
        );
    }
    Ok(())
}

pub struct PlayArgs {
    pub device: Option<String>,
    pub signal: SignalKind,
    pub frequency: f64,
    pub amplitude: f32,
    pub preset: Option<String>,
    pub sets: Vec<Assignment>,
}

async fn read_stdin(lines_tx: mpsc::Sender<String>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                if lines_tx.send(line).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Failed to read stdin");
                break;
            }
        }
    }
}

fn report(result: &CommandResult) {
    match result {
        CommandResult::Error(msg) => eprintln!("error: {msg}"),
        CommandResult::ParameterChanged { id, value } => println!("{id} = {value}"),
        other => println!("{other:?}"),
    }
}

/// Play a test signal through the equalizer and take commands from stdin
///
/// Lines are `NAME=VALUE`, `show`, `reset`, `save NAME`, `load NAME` or
/// `quit`. Edits to the active preset file are picked up while playing.
pub async fn play(mut ctx: Context, args: PlayArgs) -> anyhow::Result<()> {
    let params = Arc::new(ParameterStore::from_settings(&ctx.config.settings));

    let presets = PresetManager::new(ctx.presets.preset_dir().to_path_buf());
    let watcher = ConfigWatcher::new(presets.preset_dir().to_path_buf()).await?;
    let mut preset_events = watcher.subscribe();
    let controller = EqController::new(Arc::clone(&params), presets);

    // Going through the controller marks the preset active for hot reload
    if let Some(name) = args.preset {
        if let CommandResult::Error(msg) = controller.execute(Command::LoadPreset { name }).await {
            bail!(msg);
        }
    }
    for set in &args.sets {
        controller
            .execute(Command::SetParameter {
                id: set.id,
                value: set.value,
            })
            .await;
    }

    let app = ctx.config.app.clone();
    let mut stream_config = ctx.config.audio.stream_config.clone();
    stream_config.sample_rate = SampleRate::from_hz(app.sample_rate);
    stream_config.buffer_size = app.block_size;

    let device = args
        .device
        .or_else(|| Some(ctx.config.audio.output_device.clone()).filter(|d| !d.is_empty()))
        .map(DeviceId::new);

    let enumerator = CpalEnumerator::new();
    let source =
        ToneGenerator::new(args.signal, args.frequency, args.amplitude, app.sample_rate as f64);
    let stream = EqOutputStream::start(
        &enumerator,
        device.as_ref(),
        &stream_config,
        Arc::clone(&params),
        source,
    )?;
    println!("playing {} through {} (type `quit` to stop)", args.signal, stream.device_name());

    let mut monitor =
        ResponseMonitor::new(Arc::clone(&params), app.sample_rate as f64, app.response_points);
    let (lines_tx, mut lines) = mpsc::channel(16);
    tokio::spawn(read_stdin(lines_tx));

    let mut refresh = tokio::time::interval(Duration::from_millis(app.response_refresh_ms));
    let autosave_period = Duration::from_secs(app.auto_save_interval_secs.max(1));
    let mut autosave =
        tokio::time::interval_at(tokio::time::Instant::now() + autosave_period, autosave_period);
    let autosave_enabled = app.auto_save_interval_secs > 0 && ctx.manager.is_some();

    loop {
        tokio::select! {
            _ = refresh.tick() => {
                if monitor.poll() {
                    if let Some((freq, db)) = monitor.curve().peak() {
                        info!(peak_hz = freq, peak_db = db, "Response updated");
                    }
                }
                for e in stream.drain_errors() {
                    warn!(error = %e, "Stream reported an error");
                }
            }
            _ = autosave.tick(), if autosave_enabled => {
                auto_save(&mut ctx, params.snapshot()).await;
            }
            line = lines.recv() => {
                let Some(line) = line else { break };
                match line.parse::<ControlLine>() {
                    Ok(ControlLine::Quit) => break,
                    Ok(ControlLine::Show) => println!("{}", format_settings(&params.snapshot())),
                    Ok(other) => {
                        if let Some(command) = other.to_command() {
                            report(&controller.execute(command).await);
                        }
                    }
                    Err(e) => eprintln!("error: {e}"),
                }
            }
            event = preset_events.recv() => match event {
                Ok(path) => {
                    if let Some(result) = controller.on_preset_changed(&path).await {
                        report(&result);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "Preset events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    info!(frames = stream.frames_rendered(), "Playback stopped");
    if autosave_enabled {
        auto_save(&mut ctx, params.snapshot()).await;
    }
    Ok(())
}

async fn auto_save(ctx: &mut Context, settings: ChainSettings) {
    if ctx.config.settings == settings {
        return;
    }
    ctx.config.settings = settings;
    if let Some(manager) = &ctx.manager {
        match manager.save(&ctx.config).await {
            Ok(()) => debug!("Settings auto-saved"),
            Err(e) => warn!(error = %e, "Auto-save failed"),
        }
    }
}

/// List output devices
pub fn devices(json: bool) -> anyhow::Result<()> {
    let enumerator = CpalEnumerator::new();
    let devices = enumerator.output_devices()?;
    let default = enumerator.default_output_device().ok().map(|d| d.id);

    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }

    for device in &devices {
        let marker = if Some(&device.id) == default.as_ref() { "*" } else { " " };
        let rates: Vec<String> = device.sample_rates.iter().map(|r| r.hz().to_string()).collect();
        println!("{marker} {} [{} Hz]", device.name, rates.join(", "));
    }
    if devices.is_empty() {
        println!("no output devices found");
    }
    Ok(())
}

pub enum PresetAction {
    List,
    Show { name: String },
    Save { name: String, sets: Vec<Assignment> },
    Delete { name: String },
}

pub async fn preset(ctx: &Context, action: PresetAction) -> anyhow::Result<()> {
    match action {
        PresetAction::List => {
            let names = ctx.presets.list_presets().await?;
            if names.is_empty() {
                println!("no presets in {}", ctx.presets.preset_dir().display());
            }
            for name in names {
                println!("{name}");
            }
        }
        PresetAction::Show { name } => {
            let settings = ctx.presets.load_preset(&name).await?;
            println!("{}", format_settings(&settings));
        }
        PresetAction::Save { name, sets } => {
            let settings = ctx.settings(None, &sets).await?;
            ctx.presets.save_preset(&name, &settings).await?;
            println!("saved {name}");
        }
        PresetAction::Delete { name } => {
            ctx.presets.delete_preset(&name).await?;
            println!("deleted {name}");
        }
    }
    Ok(())
}
