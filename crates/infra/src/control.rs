//! Command execution against the live parameter store
//!
//! [`EqController`] is the control-thread side of the equalizer. It never
//! touches filter state; it writes parameters and lets the audio thread pick
//! them up on its next block.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use bellcut_core::domain::config::{
    decode_state, encode_state, Command, CommandExecutor, CommandResult, ConfigError, PresetManager,
    Result,
};
use bellcut_core::domain::params::ParameterStore;

/// Executes [`Command`]s for one equalizer instance
pub struct EqController {
    params: Arc<ParameterStore>,
    presets: PresetManager,
    active_preset: RwLock<Option<String>>,
}

impl EqController {
    pub fn new(params: Arc<ParameterStore>, presets: PresetManager) -> Self {
        Self {
            params,
            presets,
            active_preset: RwLock::new(None),
        }
    }

    pub fn params(&self) -> &Arc<ParameterStore> {
        &self.params
    }

    pub fn presets(&self) -> &PresetManager {
        &self.presets
    }

    /// Name of the last preset loaded or saved
    pub async fn active_preset(&self) -> Option<String> {
        self.active_preset.read().await.clone()
    }

    /// Current parameters as a host state blob
    pub fn state_blob(&self) -> Result<String> {
        encode_state(&self.params.snapshot())
    }

    /// Reload the active preset if `path` is its file
    ///
    /// Wire this to [`ConfigWatcher`](bellcut_core::domain::config::ConfigWatcher)
    /// events for hot reload. Returns `None` for unrelated files.
    pub async fn on_preset_changed(&self, path: &Path) -> Option<CommandResult> {
        let changed = path.file_stem()?.to_str()?;
        let active = self.active_preset().await?;
        if changed != active {
            debug!(changed, active = %active, "Ignoring change to inactive preset");
            return None;
        }

        info!(name = %active, "Active preset changed on disk, reloading");
        Some(self.execute(Command::LoadPreset { name: active }).await)
    }

    async fn try_execute(&self, command: Command) -> Result<CommandResult> {
        match command {
            Command::SetParameter { id, value } => {
                let value = self.params.set(id, value);
                Ok(CommandResult::ParameterChanged { id, value })
            }
            Command::ResetParameters => {
                self.params.reset_to_defaults();
                *self.active_preset.write().await = None;
                info!("Parameters reset to defaults");
                Ok(CommandResult::ParametersReset)
            }
            Command::LoadPreset { name } => {
                let settings = self.presets.load_preset(&name).await?;
                self.params.store_settings(&settings);
                *self.active_preset.write().await = Some(name.clone());
                Ok(CommandResult::PresetLoaded { name })
            }
            Command::SavePreset { name } => {
                self.presets.save_preset(&name, &self.params.snapshot()).await?;
                *self.active_preset.write().await = Some(name.clone());
                Ok(CommandResult::PresetSaved { name })
            }
            Command::RestoreState { blob } => {
                let settings = decode_state(&blob)?;
                self.params.store_settings(&settings);
                info!("State restored from blob");
                Ok(CommandResult::StateRestored)
            }
        }
    }
}

#[async_trait]
impl CommandExecutor for EqController {
    async fn execute(&self, command: Command) -> CommandResult {
        debug!(?command, "Executing command");
        match self.try_execute(command).await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "Command failed");
                CommandResult::Error(ConfigError::CommandFailed(e.to_string()).to_string())
            }
        }
    }
}
