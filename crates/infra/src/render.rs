//! Offline rendering through the equalizer with WAV files
//!
//! Audio is pushed through [`StereoProcessor`] in fixed-size blocks, exactly
//! as a host would call it, so offline output matches live playback.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument};

use bellcut_core::domain::audio::{AudioError, ProcessSpec};
use bellcut_core::domain::dsp::{gain_to_db, StereoProcessor};
use bellcut_core::domain::params::ParameterStore;

use crate::signal::ToneGenerator;

pub type Result<T> = std::result::Result<T, RenderError>;

/// Errors raised while rendering to or from WAV files
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error("Unsupported input: {0}")]
    Unsupported(String),
}

/// Offline render settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderOptions {
    pub sample_rate: u32,
    pub block_size: usize,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            block_size: 512,
        }
    }
}

/// Levels measured during a render
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderSummary {
    pub frames: usize,
    pub channels: u16,
    pub sample_rate: u32,
    pub input_peak_db: f64,
    pub output_peak_db: f64,
    pub input_rms_db: f64,
    pub output_rms_db: f64,
}

#[derive(Default)]
struct Levels {
    peak: f32,
    sum_squares: f64,
    count: usize,
}

impl Levels {
    fn add(&mut self, samples: &[f32]) {
        for &s in samples {
            self.peak = self.peak.max(s.abs());
            self.sum_squares += (s as f64) * (s as f64);
        }
        self.count += samples.len();
    }

    fn peak_db(&self) -> f64 {
        gain_to_db(self.peak as f64)
    }

    fn rms_db(&self) -> f64 {
        if self.count == 0 {
            return gain_to_db(0.0);
        }
        gain_to_db((self.sum_squares / self.count as f64).sqrt())
    }
}

impl RenderSummary {
    fn new(
        frames: usize,
        channels: u16,
        sample_rate: u32,
        input: &Levels,
        output: &Levels,
    ) -> Self {
        Self {
            frames,
            channels,
            sample_rate,
            input_peak_db: input.peak_db(),
            output_peak_db: output.peak_db(),
            input_rms_db: input.rms_db(),
            output_rms_db: output.rms_db(),
        }
    }
}

/// Filter planar stereo audio in memory, block by block
fn process_planar(
    processor: &mut StereoProcessor,
    left: &mut [f32],
    right: &mut [f32],
    block_size: usize,
) -> (Levels, Levels) {
    debug_assert_eq!(left.len(), right.len());
    let (mut input, mut output) = (Levels::default(), Levels::default());

    for (l, r) in left.chunks_mut(block_size).zip(right.chunks_mut(block_size)) {
        input.add(l);
        input.add(r);
        processor.process_block(l, r);
        output.add(l);
        output.add(r);
    }

    (input, output)
}

fn prepared_processor(
    params: Arc<ParameterStore>,
    options: RenderOptions,
) -> Result<StereoProcessor> {
    let mut processor = StereoProcessor::new(params);
    processor.prepare(ProcessSpec {
        sample_rate: options.sample_rate as f64,
        max_block_size: options.block_size,
    })?;
    Ok(processor)
}

fn write_float_wav(
    path: &Path,
    channels: u16,
    sample_rate: u32,
    left: &[f32],
    right: &[f32],
) -> Result<()> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for (&l, &r) in left.iter().zip(right) {
        writer.write_sample(l)?;
        if channels == 2 {
            writer.write_sample(r)?;
        }
    }
    writer.finalize()?;
    Ok(())
}

/// Render `frames` of a generated signal through the equalizer into a stereo WAV file
#[instrument(skip(params, source))]
pub fn render_signal(
    path: &Path,
    params: Arc<ParameterStore>,
    mut source: ToneGenerator,
    frames: usize,
    options: RenderOptions,
) -> Result<RenderSummary> {
    let mut processor = prepared_processor(params, options)?;
    source.set_sample_rate(options.sample_rate as f64);

    let mut left = vec![0.0; frames];
    source.fill(&mut left);
    let mut right = left.clone();

    let (input, output) = process_planar(&mut processor, &mut left, &mut right, options.block_size);
    write_float_wav(path, 2, options.sample_rate, &left, &right)?;

    info!(path = %path.display(), frames, kind = %source.kind(), "Signal rendered");
    Ok(RenderSummary::new(frames, 2, options.sample_rate, &input, &output))
}

/// Run a mono or stereo WAV file through the equalizer
///
/// The output is 32-bit float at the input's rate and channel count. Mono
/// input is filtered by the left chain.
#[instrument(skip(params))]
pub fn process_wav_file(
    input: &Path,
    output: &Path,
    params: Arc<ParameterStore>,
    block_size: usize,
) -> Result<RenderSummary> {
    let mut reader = hound::WavReader::open(input)?;
    let spec = reader.spec();
    debug!(?spec, "Reading input");

    if !(1..=2).contains(&spec.channels) {
        return Err(RenderError::Unsupported(format!(
            "{} channels (expected mono or stereo)",
            spec.channels
        )));
    }

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => {
            reader.samples::<f32>().collect::<std::result::Result<_, _>>()?
        }
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1u64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|s| s as f32 * scale))
                .collect::<std::result::Result<_, _>>()?
        }
    };

    let channels = spec.channels as usize;
    let frames = samples.len() / channels;
    let mut left = Vec::with_capacity(frames);
    let mut right = Vec::with_capacity(frames);
    for frame in samples.chunks_exact(channels) {
        left.push(frame[0]);
        right.push(frame[channels - 1]);
    }

    let options = RenderOptions {
        sample_rate: spec.sample_rate,
        block_size,
    };
    let mut processor = prepared_processor(params, options)?;
    let (input_levels, output_levels) =
        process_planar(&mut processor, &mut left, &mut right, block_size);
    write_float_wav(output, spec.channels, spec.sample_rate, &left, &right)?;

    info!(
        input = %input.display(),
        output = %output.display(),
        frames,
        "WAV file processed"
    );
    Ok(RenderSummary::new(
        frames,
        spec.channels,
        spec.sample_rate,
        &input_levels,
        &output_levels,
    ))
}
