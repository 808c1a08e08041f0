//! Live playback through the equalizer
//!
//! The output callback owns the [`StereoProcessor`] and a [`ToneGenerator`].
//! The control side keeps only the shared [`ParameterStore`]; the processor
//! picks up new values at the start of each block.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Stream, StreamConfig as CpalStreamConfig};
use crossbeam::channel::{bounded, Receiver, Sender};
use tracing::{error, info};

use bellcut_core::domain::audio::{AudioError, DeviceId, Result, StreamConfig};
use bellcut_core::domain::dsp::StereoProcessor;
use bellcut_core::domain::params::ParameterStore;

use super::cpal_backend::CpalEnumerator;
use crate::signal::ToneGenerator;

/// Everything the output callback needs, preallocated
struct CallbackState {
    processor: StereoProcessor,
    source: ToneGenerator,
    left: Vec<f32>,
    right: Vec<f32>,
    channels: usize,
    frames_rendered: Arc<AtomicU64>,
}

impl CallbackState {
    fn new(
        processor: StereoProcessor,
        source: ToneGenerator,
        channels: usize,
        frames_rendered: Arc<AtomicU64>,
    ) -> Self {
        let block = processor.spec().max_block_size;
        Self {
            processor,
            source,
            left: vec![0.0; block],
            right: vec![0.0; block],
            channels,
            frames_rendered,
        }
    }

    /// Fill an interleaved device buffer, one processor block at a time
    fn render(&mut self, data: &mut [f32]) {
        let block = self.left.len();
        for chunk in data.chunks_mut(block * self.channels) {
            let frames = chunk.len() / self.channels;
            let (left, right) = (&mut self.left[..frames], &mut self.right[..frames]);

            self.source.fill(left);
            right.copy_from_slice(left);
            self.processor.process_block(left, right);

            for (frame, (l, r)) in chunk
                .chunks_exact_mut(self.channels)
                .zip(left.iter().zip(right.iter()))
            {
                frame[0] = *l;
                if let Some(second) = frame.get_mut(1) {
                    *second = *r;
                }
                // Extra channels stay silent
                for extra in frame.iter_mut().skip(2) {
                    *extra = 0.0;
                }
            }
            self.frames_rendered.fetch_add(frames as u64, Ordering::Relaxed);
        }
    }
}

/// Running output stream playing a test signal through the equalizer
pub struct EqOutputStream {
    stream: Stream,
    config: StreamConfig,
    device_name: String,
    frames_rendered: Arc<AtomicU64>,
    errors: Receiver<AudioError>,
}

impl EqOutputStream {
    /// Open `device` (or the default output) and start playing
    pub fn start(
        enumerator: &CpalEnumerator,
        device: Option<&DeviceId>,
        config: &StreamConfig,
        params: Arc<ParameterStore>,
        mut source: ToneGenerator,
    ) -> Result<Self> {
        let device = enumerator.open_output(device)?;
        let device_name = device.info().name.clone();
        info!(
            "Creating output stream: device={}, config={:?}",
            device_name, config
        );

        let channels = config.channels.count() as usize;
        if channels == 0 {
            return Err(AudioError::InvalidConfiguration(
                "output needs at least one channel".to_string(),
            ));
        }

        let mut processor = StereoProcessor::new(params);
        processor.prepare(config.process_spec())?;
        source.set_sample_rate(config.sample_rate.hz() as f64);

        let frames_rendered = Arc::new(AtomicU64::new(0));
        let mut state =
            CallbackState::new(processor, source, channels, Arc::clone(&frames_rendered));

        let (error_tx, errors): (Sender<AudioError>, _) = bounded(16);

        let cpal_config = CpalStreamConfig {
            channels: config.channels.count(),
            sample_rate: config.sample_rate.hz(),
            buffer_size: cpal::BufferSize::Fixed(config.buffer_size),
        };

        let stream = device
            .cpal_device()
            .build_output_stream(
                &cpal_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| state.render(data),
                move |err| {
                    error!("Output stream error: {}", err);
                    let _ = error_tx.try_send(AudioError::StreamError(err.to_string()));
                },
                None,
            )
            .map_err(|e| AudioError::StreamError(format!("Failed to build stream: {}", e)))?;

        stream
            .play()
            .map_err(|e| AudioError::StreamError(format!("Failed to start stream: {}", e)))?;

        info!(device = %device_name, "Output stream started");

        Ok(Self {
            stream,
            config: config.clone(),
            device_name,
            frames_rendered,
            errors,
        })
    }

    pub fn pause(&self) -> Result<()> {
        self.stream
            .pause()
            .map_err(|e| AudioError::StreamError(format!("Failed to pause stream: {}", e)))
    }

    pub fn resume(&self) -> Result<()> {
        self.stream
            .play()
            .map_err(|e| AudioError::StreamError(format!("Failed to resume stream: {}", e)))
    }

    /// Stream errors reported since the last call
    pub fn drain_errors(&self) -> Vec<AudioError> {
        self.errors.try_iter().collect()
    }

    /// Frames delivered to the device so far
    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered.load(Ordering::Relaxed)
    }

    /// Get stream configuration
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bellcut_core::domain::params::ParameterId;
    use bellcut_core::domain::ProcessSpec;

    fn state(channels: usize, block: usize, params: Arc<ParameterStore>) -> CallbackState {
        let mut processor = StereoProcessor::new(params);
        processor
            .prepare(ProcessSpec {
                sample_rate: 48000.0,
                max_block_size: block,
            })
            .unwrap();
        CallbackState::new(
            processor,
            ToneGenerator::sine(1000.0, 0.5, 48000.0),
            channels,
            Arc::new(AtomicU64::new(0)),
        )
    }

    #[test]
    fn test_render_handles_odd_device_buffers() {
        let mut state = state(2, 64, Arc::new(ParameterStore::new()));
        // 150 frames: two full blocks and a partial one
        let mut data = vec![9.0; 300];
        state.render(&mut data);

        assert_eq!(state.frames_rendered.load(Ordering::Relaxed), 150);
        for frame in data.chunks_exact(2) {
            assert_eq!(frame[0], frame[1]);
            assert!(frame[0].abs() <= 0.6);
        }
    }

    #[test]
    fn test_render_silences_extra_channels() {
        let mut state = state(4, 32, Arc::new(ParameterStore::new()));
        let mut data = vec![9.0; 4 * 40];
        state.render(&mut data);
        for frame in data.chunks_exact(4) {
            assert_eq!(frame[2], 0.0);
            assert_eq!(frame[3], 0.0);
        }
    }

    #[test]
    fn test_render_follows_parameter_changes() {
        let params = Arc::new(ParameterStore::new());
        let mut state = state(1, 256, Arc::clone(&params));
        let mut data = vec![0.0; 4800];
        state.render(&mut data);
        let before = data[2400..].iter().fold(0.0f32, |m, s| m.max(s.abs()));

        params.set(ParameterId::PeakGain, -24.0);
        state.render(&mut data);
        let after = data[2400..].iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(after < before * 0.2, "before {before}, after {after}");
    }
}
