//! CPAL-based output device discovery
//!
//! Provides a cross-platform view of playback devices using the CPAL library.

use cpal::traits::{DeviceTrait, HostTrait};
use std::fmt;
use tracing::{debug, info, warn};
use bellcut_core::domain::audio::{
    AudioEnumerator, AudioError, ChannelCount, DeviceId, DeviceInfo, DeviceType, Result,
    SampleFormat, SampleRate, StreamConfig,
};

fn channel_count(channels: u16) -> ChannelCount {
    match channels {
        1 => ChannelCount::Mono,
        2 => ChannelCount::Stereo,
        n => ChannelCount::Surround(n),
    }
}

#[allow(deprecated)]
fn device_name(device: &cpal::Device) -> String {
    device
        .name()
        .unwrap_or_else(|_| "Unknown Device".to_string())
}

/// CPAL-based output device wrapper
pub struct CpalDevice {
    info: DeviceInfo,
    cpal_device: cpal::Device,
}

impl CpalDevice {
    pub fn new(cpal_device: cpal::Device) -> Result<Self> {
        let name = device_name(&cpal_device);

        let configs = cpal_device
            .supported_output_configs()
            .map_err(|e| AudioError::UnsupportedConfiguration(e.to_string()))?;

        let mut sample_rates = Vec::new();
        let mut channel_counts = Vec::new();
        for config in configs {
            for rate in [config.min_sample_rate(), config.max_sample_rate()] {
                sample_rates.push(SampleRate::from_hz(rate));
            }
            channel_counts.push(channel_count(config.channels()));
        }

        // Remove duplicates
        sample_rates.sort_by_key(|sr| sr.hz());
        sample_rates.dedup_by_key(|sr| sr.hz());
        channel_counts.sort_by_key(|cc| cc.count());
        channel_counts.dedup_by_key(|cc| cc.count());

        let default_sample_rate = cpal_device
            .default_output_config()
            .ok()
            .map(|config| SampleRate::from_hz(config.sample_rate()));

        // Create DeviceId (use name as ID for simplicity)
        let info = DeviceInfo {
            id: DeviceId::new(name.clone()),
            name,
            device_type: DeviceType::Output,
            sample_rates,
            channel_counts,
            default_sample_rate,
        };

        debug!("Created device: {}", info.name);

        Ok(Self { info, cpal_device })
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn cpal_device(&self) -> &cpal::Device {
        &self.cpal_device
    }

    /// The device's preferred output stream configuration
    pub fn default_config(&self) -> Result<StreamConfig> {
        let cpal_config = self
            .cpal_device
            .default_output_config()
            .map_err(|e| AudioError::InvalidConfiguration(e.to_string()))?;

        let sample_format = match cpal_config.sample_format() {
            cpal::SampleFormat::I16 => SampleFormat::I16,
            cpal::SampleFormat::I32 => SampleFormat::I32,
            cpal::SampleFormat::F32 => SampleFormat::F32,
            cpal::SampleFormat::F64 => SampleFormat::F64,
            _ => SampleFormat::F32,
        };

        let buffer_size = match cpal_config.buffer_size() {
            cpal::SupportedBufferSize::Range { min, max } => 512u32.max(*min).min(*max),
            cpal::SupportedBufferSize::Unknown => 512,
        };

        Ok(StreamConfig {
            sample_rate: SampleRate::from_hz(cpal_config.sample_rate()),
            channels: channel_count(cpal_config.channels()),
            format: sample_format,
            buffer_size,
        })
    }
}

impl fmt::Debug for CpalDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CpalDevice")
            .field("info", &self.info)
            .finish()
    }
}

/// CPAL-based output enumerator
pub struct CpalEnumerator {
    host: cpal::Host,
}

impl Default for CpalEnumerator {
    fn default() -> Self {
        info!("Initializing CPAL enumerator");
        Self::new()
    }
}

impl CpalEnumerator {
    pub fn new() -> Self {
        let host = cpal::default_host();
        debug!("Using audio host: {:?}", host.id());
        Self { host }
    }

    /// Resolve a device for playback; `None` picks the host default
    pub fn open_output(&self, id: Option<&DeviceId>) -> Result<CpalDevice> {
        let cpal_device = match id {
            None => self
                .host
                .default_output_device()
                .ok_or_else(|| AudioError::DeviceNotFound("No default output device".to_string()))?,
            Some(id) => self
                .host
                .output_devices()
                .map_err(|e| AudioError::OsError(e.to_string()))?
                .find(|d| device_name(d) == id.as_str())
                .ok_or_else(|| AudioError::DeviceNotFound(id.as_str().to_string()))?,
        };
        CpalDevice::new(cpal_device)
    }
}

impl AudioEnumerator for CpalEnumerator {
    fn output_devices(&self) -> Result<Vec<DeviceInfo>> {
        info!("Enumerating output devices");

        let cpal_devices = self
            .host
            .output_devices()
            .map_err(|e| AudioError::OsError(e.to_string()))?;

        let mut devices = Vec::new();
        for device in cpal_devices {
            match CpalDevice::new(device) {
                Ok(cp_device) => {
                    debug!("Found device: {}", cp_device.info().name);
                    devices.push(cp_device.info);
                }
                Err(e) => {
                    warn!("Skipping device due to error: {}", e);
                }
            }
        }

        info!("Found {} output devices", devices.len());
        Ok(devices)
    }

    fn default_output_device(&self) -> Result<DeviceInfo> {
        self.open_output(None).map(|d| d.info)
    }
}
