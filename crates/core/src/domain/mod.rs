//! Domain entities and business rules

pub mod audio;
pub mod config;
pub mod dsp;
pub mod params;

// Re-export specific items to avoid ambiguous glob imports
pub use audio::{
    AudioEnumerator, AudioError, ChannelCount, DeviceId, DeviceInfo, DeviceType, ProcessSpec,
    SampleFormat, SampleRate, StreamConfig,
};
pub use config::*;
pub use dsp::*;
pub use params::{ChainSettings, ParameterError, ParameterId, ParameterRange, ParameterStore, Slope};
