//! Configuration management for Bellcut
//!
//! This module provides:
//! - Configuration structs for the application, output device and equalizer
//! - Preset system with TOML serialization
//! - State blob encoding for host persistence
//! - Command bus pattern for runtime state management
//! - Hot-reload support via file system watcher

use crate::domain::audio::{ProcessSpec, StreamConfig};
use crate::domain::params::{ChainSettings, ParameterError, ParameterId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur during configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("State blob error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("File watch error: {0}")]
    WatchError(#[from] notify::Error),

    #[error(transparent)]
    Parameter(#[from] ParameterError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Preset not found: {0}")]
    PresetNotFound(String),

    #[error("Command execution failed: {0}")]
    CommandFailed(String),
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Audio block size in frames
    pub block_size: u32,

    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Preset directory
    pub preset_dir: PathBuf,

    /// Number of points on the response curve
    pub response_points: usize,

    /// Response curve refresh period in milliseconds
    pub response_refresh_ms: u64,

    /// Auto-save interval in seconds (0 = disabled)
    pub auto_save_interval_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            block_size: 512,
            sample_rate: 48000,
            preset_dir: PathBuf::from("presets"),
            response_points: 512,
            response_refresh_ms: 16,
            auto_save_interval_secs: 30,
        }
    }
}

impl AppConfig {
    pub fn process_spec(&self) -> ProcessSpec {
        ProcessSpec {
            sample_rate: self.sample_rate as f64,
            max_block_size: self.block_size as usize,
        }
    }
}

/// Audio device configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AudioDeviceConfig {
    /// Output device ID (empty = use default)
    #[serde(default)]
    pub output_device: String,

    /// Stream configuration
    #[serde(default)]
    pub stream_config: StreamConfig,
}

/// Complete Bellcut configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BellcutConfig {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub audio: AudioDeviceConfig,
    #[serde(default)]
    pub settings: ChainSettings,
}

impl BellcutConfig {
    /// Load configuration from TOML file
    #[instrument(skip(path))]
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = fs::read_to_string(path).await?;
        let mut config: Self = toml::from_str(&contents)?;
        config.validate()?;
        config.settings = config.settings.clamped();

        debug!("Configuration loaded successfully");
        Ok(config)
    }

    /// Save configuration to TOML file
    #[instrument(skip(self, path))]
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        info!(path = %path.display(), "Saving configuration");

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let toml_str = toml::to_string_pretty(self)?;
        fs::write(path, toml_str).await?;

        debug!("Configuration saved successfully");
        Ok(())
    }

    /// Create factory default configuration
    pub fn factory_default() -> Self {
        Self::default()
    }

    /// Reject settings the processor could not be prepared with
    pub fn validate(&self) -> Result<()> {
        if self.app.sample_rate < 8000 {
            return Err(ConfigError::Invalid(format!(
                "sample_rate {} Hz is below 8000 Hz",
                self.app.sample_rate
            )));
        }
        if self.app.block_size == 0 {
            return Err(ConfigError::Invalid("block_size must be non-zero".to_string()));
        }
        if self.app.response_refresh_ms == 0 {
            return Err(ConfigError::Invalid(
                "response_refresh_ms must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Version written into every state blob
pub const STATE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StateBlob {
    version: u32,
    parameters: BTreeMap<String, f32>,
}

/// Encode parameter values as the host's state blob
///
/// The blob is a JSON object keyed by parameter name; slopes are stored as
/// their choice index.
pub fn encode_state(settings: &ChainSettings) -> Result<String> {
    let blob = StateBlob {
        version: STATE_VERSION,
        parameters: ParameterId::ALL
            .into_iter()
            .map(|id| (id.name().to_string(), settings.value(id)))
            .collect(),
    };
    Ok(serde_json::to_string(&blob)?)
}

/// Decode a state blob; missing parameters keep their defaults, values are clamped
pub fn decode_state(blob: &str) -> Result<ChainSettings> {
    let blob: StateBlob = serde_json::from_str(blob)?;
    if blob.version > STATE_VERSION {
        return Err(ConfigError::Invalid(format!(
            "state version {} is newer than supported version {STATE_VERSION}",
            blob.version
        )));
    }

    let mut settings = ChainSettings::default();
    for (name, value) in &blob.parameters {
        let id: ParameterId = name.parse()?;
        settings.set_value(id, *value);
    }
    debug!(parameters = blob.parameters.len(), "State blob decoded");
    Ok(settings)
}

/// Command types for runtime state management
#[derive(Debug, Clone)]
pub enum Command {
    SetParameter {
        id: ParameterId,
        value: f32,
    },
    ResetParameters,
    LoadPreset {
        name: String,
    },
    SavePreset {
        name: String,
    },
    RestoreState {
        blob: String,
    },
}

/// Result of command execution
#[derive(Debug, Clone, PartialEq)]
pub enum CommandResult {
    Ok,
    ParameterChanged {
        id: ParameterId,
        value: f32,
    },
    ParametersReset,
    PresetLoaded {
        name: String,
    },
    PresetSaved {
        name: String,
    },
    StateRestored,
    Error(String),
}

/// Trait for command execution
#[async_trait::async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, command: Command) -> CommandResult;
}

/// File system watcher for hot-reload
pub struct ConfigWatcher {
    _watcher: notify::RecommendedWatcher,
    config_tx: broadcast::Sender<PathBuf>,
}

impl ConfigWatcher {
    /// Create a new config watcher
    pub async fn new(preset_dir: PathBuf) -> Result<Self> {
        use notify::Watcher;

        let (config_tx, _config_rx) = broadcast::channel(32);

        // Create preset directory if it doesn't exist
        fs::create_dir_all(&preset_dir).await?;

        let tx_clone = config_tx.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => {
                    if !matches!(
                        event.kind,
                        notify::EventKind::Create(_) | notify::EventKind::Modify(_)
                    ) {
                        return;
                    }
                    for path in event.paths {
                        if path.extension().and_then(|e| e.to_str()) != Some("toml") {
                            continue;
                        }
                        // No subscribers is fine
                        if tx_clone.receiver_count() > 0 {
                            if let Err(e) = tx_clone.send(path) {
                                error!("Failed to send preset change event: {}", e);
                            }
                        }
                    }
                }
                Err(e) => warn!(error = %e, "Preset watch error"),
            }
        })?;

        watcher.watch(&preset_dir, notify::RecursiveMode::NonRecursive)?;

        info!(
            path = %preset_dir.display(),
            "Preset watcher started"
        );

        Ok(Self {
            _watcher: watcher,
            config_tx,
        })
    }

    /// Subscribe to preset change events
    pub fn subscribe(&self) -> broadcast::Receiver<PathBuf> {
        self.config_tx.subscribe()
    }
}

/// Named equalizer settings stored as TOML files
pub struct PresetManager {
    preset_dir: PathBuf,
}

impl PresetManager {
    /// Create a new preset manager
    pub fn new(preset_dir: PathBuf) -> Self {
        Self { preset_dir }
    }

    pub fn preset_dir(&self) -> &Path {
        &self.preset_dir
    }

    fn preset_path(&self, name: &str) -> Result<PathBuf> {
        let valid = !name.is_empty()
            && !name.starts_with('.')
            && !name.contains(['/', '\\'])
            && name != "..";
        if !valid {
            return Err(ConfigError::Invalid(format!("invalid preset name: {name:?}")));
        }
        Ok(self.preset_dir.join(format!("{}.toml", name)))
    }

    /// List all available presets
    #[instrument(skip(self))]
    pub async fn list_presets(&self) -> Result<Vec<String>> {
        let mut presets = Vec::new();

        if !self.preset_dir.exists() {
            return Ok(presets);
        }

        let mut entries = fs::read_dir(&self.preset_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map(|e| e == "toml").unwrap_or(false) {
                if let Some(name) = path.file_stem().and_then(|n| n.to_str()) {
                    presets.push(name.to_string());
                }
            }
        }

        presets.sort();
        debug!(count = presets.len(), "Listed presets");
        Ok(presets)
    }

    /// Load a preset by name, clamping every value into range
    #[instrument(skip(self))]
    pub async fn load_preset(&self, name: &str) -> Result<ChainSettings> {
        let path = self.preset_path(name)?;

        if !path.exists() {
            return Err(ConfigError::PresetNotFound(name.to_string()));
        }

        Self::load_file(&path).await
    }

    /// Load settings from any preset file, e.g. one reported by [`ConfigWatcher`]
    pub async fn load_file(path: &Path) -> Result<ChainSettings> {
        let contents = fs::read_to_string(path).await?;
        let settings: ChainSettings = toml::from_str(&contents)?;
        info!(path = %path.display(), "Preset loaded");
        Ok(settings.clamped())
    }

    /// Save a preset by name
    #[instrument(skip(self, settings))]
    pub async fn save_preset(&self, name: &str, settings: &ChainSettings) -> Result<()> {
        let path = self.preset_path(name)?;
        fs::create_dir_all(&self.preset_dir).await?;

        let toml_str = toml::to_string_pretty(settings)?;
        fs::write(&path, toml_str).await?;

        info!(name, "Preset saved");
        Ok(())
    }

    /// Delete a preset by name
    #[instrument(skip(self))]
    pub async fn delete_preset(&self, name: &str) -> Result<()> {
        let path = self.preset_path(name)?;

        if !path.exists() {
            return Err(ConfigError::PresetNotFound(name.to_string()));
        }

        fs::remove_file(&path).await?;
        info!(name, "Preset deleted");
        Ok(())
    }

    /// Check if a preset exists
    pub async fn preset_exists(&self, name: &str) -> bool {
        self.preset_path(name).map(|p| p.exists()).unwrap_or(false)
    }
}

/// Configuration manager for the main Bellcut config
///
/// Manages the main configuration file at `~/.config/bellcut/config.toml`.
pub struct ConfigManager {
    config_dir: PathBuf,
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager
    ///
    /// # Arguments
    /// * `config_dir` - Configuration directory path (e.g., `~/.config/bellcut`)
    pub fn new(config_dir: PathBuf) -> Self {
        let config_path = config_dir.join("config.toml");

        Self {
            config_dir,
            config_path,
        }
    }

    /// Get the default config directory path
    ///
    /// Returns `~/.config/bellcut` on Linux, the platform equivalent elsewhere.
    pub fn default_config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join("bellcut"))
            .ok_or_else(|| ConfigError::Invalid("Could not determine config directory".to_string()))
    }

    /// Get the config file path
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load configuration from file
    ///
    /// If the config file doesn't exist, returns factory default.
    /// If the config file is corrupt, logs an error, backs it up and returns
    /// factory default.
    #[instrument(skip(self))]
    pub async fn load(&self) -> BellcutConfig {
        if !self.config_path.exists() {
            info!(
                path = %self.config_path.display(),
                "Config file not found, creating factory default"
            );

            let config = BellcutConfig::factory_default();

            // Save the factory default for next time
            if let Err(e) = config.save_to_file(&self.config_path).await {
                error!(
                    path = %self.config_path.display(),
                    error = %e,
                    "Failed to save factory default config"
                );
            }

            return config;
        }

        match BellcutConfig::load_from_file(&self.config_path).await {
            Ok(config) => config,
            Err(e) => {
                error!(
                    path = %self.config_path.display(),
                    error = %e,
                    "Failed to load config, using factory default"
                );

                // Backup the corrupt config
                let backup_path = self.config_path.with_extension("toml.corrupt");
                if let Err(copy_err) = fs::copy(&self.config_path, &backup_path).await {
                    error!(
                        path = %backup_path.display(),
                        error = %copy_err,
                        "Failed to backup corrupt config"
                    );
                }

                BellcutConfig::factory_default()
            }
        }
    }

    /// Save configuration to file
    #[instrument(skip(self, config))]
    pub async fn save(&self, config: &BellcutConfig) -> Result<()> {
        fs::create_dir_all(&self.config_dir).await?;
        config.save_to_file(&self.config_path).await
    }

    /// Clear configuration (delete config file)
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<()> {
        if self.config_path.exists() {
            fs::remove_file(&self.config_path).await?;
            info!(
                path = %self.config_path.display(),
                "Configuration cleared"
            );
        }

        Ok(())
    }

    /// Check if config file exists
    pub fn exists(&self) -> bool {
        self.config_path.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::params::Slope;
    use tempfile::TempDir;

    fn sample_settings() -> ChainSettings {
        ChainSettings {
            low_cut_freq: 80.0,
            low_cut_slope: Slope::Db24,
            peak_freq: 2400.0,
            peak_gain_db: -6.5,
            peak_quality: 2.0,
            high_cut_freq: 14000.0,
            high_cut_slope: Slope::Db48,
        }
    }

    #[test]
    fn test_config_serialization() {
        let config = BellcutConfig {
            settings: sample_settings(),
            ..BellcutConfig::factory_default()
        };

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: BellcutConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(parsed.app, config.app);
        assert_eq!(parsed.settings, config.settings);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: BellcutConfig = toml::from_str("[app]\nblock_size = 256\n").unwrap();
        assert_eq!(parsed.app.block_size, 256);
        assert_eq!(parsed.app.sample_rate, 48000);
        assert_eq!(parsed.settings, ChainSettings::default());
        assert_eq!(parsed.app.process_spec().max_block_size, 256);
    }

    #[test]
    fn test_validate_rejects_zero_block() {
        let mut config = BellcutConfig::default();
        config.app.block_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_state_blob_round_trip() {
        let settings = sample_settings();
        let blob = encode_state(&settings).unwrap();
        assert!(blob.contains("\"Peak Gain\":-6.5"));
        assert_eq!(decode_state(&blob).unwrap(), settings);
    }

    #[test]
    fn test_state_blob_clamps_and_defaults() {
        let blob = r#"{"version":1,"parameters":{"Peak Gain":99.0,"HighCut Slope":7.0}}"#;
        let settings = decode_state(blob).unwrap();
        assert_eq!(settings.peak_gain_db, 24.0);
        assert_eq!(settings.high_cut_slope, Slope::Db48);
        assert_eq!(settings.peak_freq, 1000.0);
    }

    #[test]
    fn test_state_blob_rejects_bad_input() {
        let unknown = r#"{"version":1,"parameters":{"Wobble":1.0}}"#;
        assert!(matches!(
            decode_state(unknown),
            Err(ConfigError::Parameter(ParameterError::UnknownParameter(_)))
        ));

        let future = r#"{"version":9,"parameters":{}}"#;
        assert!(matches!(decode_state(future), Err(ConfigError::Invalid(_))));

        assert!(matches!(decode_state("not json"), Err(ConfigError::Json(_))));
    }

    #[tokio::test]
    async fn test_preset_manager() {
        let temp_dir = TempDir::new().unwrap();
        let preset_dir = temp_dir.path().join("presets");

        let manager = PresetManager::new(preset_dir.clone());
        assert!(manager.list_presets().await.unwrap().is_empty());

        let settings = sample_settings();

        // Save preset
        manager.save_preset("vocal", &settings).await.unwrap();

        // Check it exists
        assert!(manager.preset_exists("vocal").await);

        // List presets
        let presets = manager.list_presets().await.unwrap();
        assert_eq!(presets, vec!["vocal"]);

        // Load preset
        let loaded = manager.load_preset("vocal").await.unwrap();
        assert_eq!(loaded, settings);

        // Delete preset
        manager.delete_preset("vocal").await.unwrap();
        assert!(!manager.preset_exists("vocal").await);
        assert!(matches!(
            manager.load_preset("vocal").await,
            Err(ConfigError::PresetNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_preset_name_validation() {
        let temp_dir = TempDir::new().unwrap();
        let manager = PresetManager::new(temp_dir.path().to_path_buf());

        for name in ["", "../escape", "a/b", ".hidden"] {
            assert!(matches!(
                manager.save_preset(name, &ChainSettings::default()).await,
                Err(ConfigError::Invalid(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_preset_values_are_clamped() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("loud.toml");
        tokio::fs::write(&path, "peak_gain_db = 60.0\nlow_cut_slope = 48\n")
            .await
            .unwrap();

        let settings = PresetManager::load_file(&path).await.unwrap();
        assert_eq!(settings.peak_gain_db, 24.0);
        assert_eq!(settings.low_cut_slope, Slope::Db48);
    }

    #[tokio::test]
    async fn test_save_and_load_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        let config = BellcutConfig {
            settings: sample_settings(),
            ..Default::default()
        };
        config.save_to_file(&config_path).await.unwrap();

        assert!(config_path.exists());

        let loaded = BellcutConfig::load_from_file(&config_path).await.unwrap();
        assert_eq!(loaded.app, config.app);
        assert_eq!(loaded.settings, config.settings);
    }

    #[tokio::test]
    async fn test_config_manager_recovers_from_corrupt_file() {
        let temp_dir = TempDir::new().unwrap();
        let manager = ConfigManager::new(temp_dir.path().to_path_buf());

        // Missing file: factory default gets written
        let config = manager.load().await;
        assert_eq!(config.settings, ChainSettings::default());
        assert!(manager.exists());

        tokio::fs::write(manager.config_path(), "[app\nbroken")
            .await
            .unwrap();
        let config = manager.load().await;
        assert_eq!(config.app, AppConfig::default());
        assert!(manager.config_path().with_extension("toml.corrupt").exists());

        manager.clear().await.unwrap();
        assert!(!manager.exists());
    }
}
