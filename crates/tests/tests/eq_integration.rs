//! Integration tests for the equalizer
//!
//! These drive the processor the way a host does: shared parameters written
//! from a control thread, audio pushed through in blocks.

use std::sync::Arc;

use bellcut_core::domain::config::{Command, CommandExecutor, CommandResult, PresetManager};
use bellcut_core::domain::dsp::{db_to_gain, gain_to_db, Effect, StereoProcessor};
use bellcut_core::domain::params::{ChainSettings, ParameterId, ParameterStore, Slope};
use bellcut_core::domain::ProcessSpec;
use bellcut_infra::{process_wav_file, EqController, MeasuredResponse};
use bellcut_tests::{generate_silence, generate_sine_wave, interleave, max_step, rms_db};
use proptest::prelude::*;
use tempfile::TempDir;

const SAMPLE_RATE: f64 = 48000.0;
const BLOCK: usize = 512;

fn prepared(settings: &ChainSettings) -> (Arc<ParameterStore>, StereoProcessor) {
    let params = Arc::new(ParameterStore::from_settings(settings));
    let mut processor = StereoProcessor::new(Arc::clone(&params));
    processor
        .prepare(ProcessSpec {
            sample_rate: SAMPLE_RATE,
            max_block_size: BLOCK,
        })
        .unwrap();
    (params, processor)
}

fn run_blocks(processor: &mut StereoProcessor, left: &mut [f32], right: &mut [f32], block: usize) {
    for (l, r) in left.chunks_mut(block).zip(right.chunks_mut(block)) {
        processor.process_block(l, r);
    }
}

/// Level change in dB of a steady sine at `freq` after settling
fn sine_gain_db(settings: &ChainSettings, freq: f64) -> f64 {
    let (_, mut processor) = prepared(settings);
    let input = generate_sine_wave(freq, SAMPLE_RATE, 48000, 0.25);
    let mut left = input.clone();
    let mut right = input.clone();
    run_blocks(&mut processor, &mut left, &mut right, BLOCK);
    rms_db(&left, 24000) - rms_db(&input, 24000)
}

// ============================================================================
// FILTERING
// ============================================================================

#[test]
fn test_default_settings_are_transparent_in_band() {
    let gain = sine_gain_db(&ChainSettings::default(), 1000.0);
    assert!(gain.abs() < 0.05, "{gain} dB");
}

#[test]
fn test_peak_boost_at_centre() {
    let settings = ChainSettings {
        peak_freq: 1000.0,
        peak_gain_db: 12.0,
        peak_quality: 1.0,
        ..Default::default()
    };
    let gain = sine_gain_db(&settings, 1000.0);
    assert!((gain - 12.0).abs() < 0.2, "{gain} dB");

    // Two octaves away the bell has mostly gone
    let off = sine_gain_db(&settings, 4000.0);
    assert!(off < 3.0, "{off} dB");
}

#[test]
fn test_low_cut_slopes_get_steeper() {
    let mut previous = 0.0;
    for slope in [Slope::Db12, Slope::Db24, Slope::Db36, Slope::Db48] {
        let settings = ChainSettings {
            low_cut_freq: 800.0,
            low_cut_slope: slope,
            ..Default::default()
        };
        let gain = sine_gain_db(&settings, 200.0);
        // Two octaves below the corner: about 12 dB/oct per section
        let expected = -(slope.db_per_octave() as f64) * 2.0;
        assert!((gain - expected).abs() < 2.0, "{slope}: {gain} dB, expected ~{expected}");
        assert!(gain < previous, "{slope} not steeper than the previous slope");
        previous = gain;
    }
}

#[test]
fn test_high_cut_half_power_at_cutoff() {
    for slope in [Slope::Db12, Slope::Db48] {
        let settings = ChainSettings {
            high_cut_freq: 3000.0,
            high_cut_slope: slope,
            ..Default::default()
        };
        let gain = sine_gain_db(&settings, 3000.0);
        assert!((gain + 3.01).abs() < 0.2, "{slope}: {gain} dB");
    }
}

#[test]
fn test_processor_matches_analytic_response() {
    let settings = ChainSettings {
        low_cut_freq: 120.0,
        low_cut_slope: Slope::Db24,
        peak_freq: 2500.0,
        peak_gain_db: -9.0,
        peak_quality: 2.0,
        high_cut_freq: 11000.0,
        high_cut_slope: Slope::Db36,
    };
    let (_, processor) = prepared(&settings);

    for freq in [250.0, 1000.0, 2500.0, 6000.0] {
        let expected = gain_to_db(processor.magnitude_response(freq));
        let got = sine_gain_db(&settings, freq);
        assert!((expected - got).abs() < 0.2, "{freq} Hz: analytic {expected}, measured {got}");
    }
}

#[test]
fn test_fft_measurement_agrees_with_analytic() {
    let settings = ChainSettings {
        low_cut_freq: 300.0,
        low_cut_slope: Slope::Db48,
        peak_freq: 900.0,
        peak_gain_db: 10.0,
        peak_quality: 0.7,
        ..Default::default()
    };
    let (_, processor) = prepared(&settings);
    let measured = MeasuredResponse::measure(&settings, SAMPLE_RATE, 1 << 15).unwrap();

    for freq in [400.0, 900.0, 3000.0, 10000.0] {
        let expected = gain_to_db(processor.magnitude_response(freq));
        let got = gain_to_db(measured.magnitude_at(freq));
        assert!((expected - got).abs() < 0.25, "{freq} Hz: analytic {expected}, FFT {got}");
    }
}

// ============================================================================
// STEREO AND BLOCKING
// ============================================================================

#[test]
fn test_channels_are_independent_and_identical() {
    let settings = ChainSettings {
        peak_gain_db: 6.0,
        high_cut_freq: 5000.0,
        ..Default::default()
    };
    let (_, mut processor) = prepared(&settings);

    let mut left = generate_sine_wave(700.0, SAMPLE_RATE, 4096, 0.5);
    let mut right = left.clone();
    run_blocks(&mut processor, &mut left, &mut right, BLOCK);
    assert_eq!(left, right);

    // Silence on one side stays silent regardless of the other
    let (_, mut processor) = prepared(&settings);
    let mut left = generate_sine_wave(700.0, SAMPLE_RATE, 4096, 0.5);
    let mut right = generate_silence(4096);
    run_blocks(&mut processor, &mut left, &mut right, BLOCK);
    assert!(right.iter().all(|&s| s == 0.0), "left leaked into right");
}

#[test]
fn test_interleaved_matches_planar() {
    let settings = ChainSettings {
        low_cut_freq: 90.0,
        low_cut_slope: Slope::Db36,
        peak_gain_db: -5.0,
        ..Default::default()
    };
    let (_, mut planar) = prepared(&settings);
    let (_, mut interleaved) = prepared(&settings);

    let mut left = generate_sine_wave(440.0, SAMPLE_RATE, 2048, 0.5);
    let mut right = generate_sine_wave(3300.0, SAMPLE_RATE, 2048, 0.3);
    let mut frames = interleave(&left, &right);

    run_blocks(&mut planar, &mut left, &mut right, 256);
    for chunk in frames.chunks_mut(256 * 2) {
        interleaved.process_interleaved(chunk);
    }
    assert_eq!(frames, interleave(&left, &right));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_block_size_does_not_change_output(block in 1usize..=700, slope in 0usize..4) {
        let settings = ChainSettings {
            low_cut_freq: 150.0,
            low_cut_slope: Slope::from_index(slope),
            peak_gain_db: 4.0,
            high_cut_freq: 8000.0,
            high_cut_slope: Slope::from_index(3 - slope),
            ..Default::default()
        };
        let input = generate_sine_wave(1234.0, SAMPLE_RATE, 3000, 0.5);

        let (_, mut reference) = prepared(&settings);
        let (mut ref_l, mut ref_r) = (input.clone(), input.clone());
        run_blocks(&mut reference, &mut ref_l, &mut ref_r, 3000);

        let (_, mut chunked) = prepared(&settings);
        let (mut l, mut r) = (input.clone(), input);
        run_blocks(&mut chunked, &mut l, &mut r, block);

        prop_assert_eq!(l, ref_l);
        prop_assert_eq!(r, ref_r);
    }
}

// ============================================================================
// LIVE PARAMETER CHANGES
// ============================================================================

#[test]
fn test_gain_sweep_does_not_click() {
    let (params, mut processor) = prepared(&ChainSettings {
        peak_freq: 1000.0,
        ..Default::default()
    });
    let amplitude = 0.5f32;
    let mut left = generate_sine_wave(1000.0, SAMPLE_RATE, 48 * BLOCK, amplitude);
    let mut right = left.clone();

    for (i, (l, r)) in left.chunks_mut(BLOCK).zip(right.chunks_mut(BLOCK)).enumerate() {
        // -6 dB to +6 dB and back over the run
        let gain = 6.0 * ((i as f32 / 47.0) * std::f32::consts::TAU).cos();
        params.set(ParameterId::PeakGain, -gain);
        processor.process_block(l, r);
    }

    let max_slope =
        amplitude as f64 * db_to_gain(6.0) * std::f64::consts::TAU * 1000.0 / SAMPLE_RATE;
    let step = max_step(&left) as f64;
    assert!(step <= 2.0 * max_slope, "step {step} vs bound {}", 2.0 * max_slope);
}

#[test]
fn test_slope_changes_settle_to_passband() {
    let (params, mut processor) = prepared(&ChainSettings {
        low_cut_freq: 60.0,
        ..Default::default()
    });
    let mut left = generate_sine_wave(1000.0, SAMPLE_RATE, 16 * BLOCK, 0.5);
    let mut right = left.clone();

    for (i, (l, r)) in left.chunks_mut(BLOCK).zip(right.chunks_mut(BLOCK)).enumerate() {
        if i < 8 {
            params.set(ParameterId::LowCutSlope, (i % 4) as f32);
        }
        processor.process_block(l, r);
    }

    assert!(left.iter().all(|s| s.is_finite() && s.abs() < 2.0));
    // Far above a 60 Hz corner every slope passes the tone untouched
    let settled = rms_db(&left, 12 * BLOCK);
    let expected = gain_to_db(0.5 / std::f64::consts::SQRT_2);
    assert!((settled - expected).abs() < 0.1, "{settled} dB vs {expected} dB");
    assert_eq!(right, left);
}

#[test]
fn test_effect_bypass_passes_audio_through() {
    let (_, mut processor) = prepared(&ChainSettings {
        peak_gain_db: 18.0,
        ..Default::default()
    });
    processor.set_bypass(true);
    assert!(processor.is_bypassed());

    let input = interleave(
        &generate_sine_wave(750.0, SAMPLE_RATE, 1024, 0.3),
        &generate_silence(1024),
    );
    let mut buffer = input.clone();
    processor.process(&mut buffer).unwrap();
    assert_eq!(buffer, input);

    processor.set_bypass(false);
    processor.process(&mut buffer).unwrap();
    assert_ne!(buffer, input);
}

// ============================================================================
// CONTROL AND PERSISTENCE
// ============================================================================

#[tokio::test]
async fn test_controller_drives_running_processor() {
    let dir = TempDir::new().unwrap();
    let (params, mut processor) = prepared(&ChainSettings::default());
    let controller =
        EqController::new(Arc::clone(&params), PresetManager::new(dir.path().to_path_buf()));

    let result = controller
        .execute(Command::SetParameter {
            id: ParameterId::HighCutFreq,
            value: 400.0,
        })
        .await;
    assert_eq!(
        result,
        CommandResult::ParameterChanged {
            id: ParameterId::HighCutFreq,
            value: 400.0
        }
    );

    let mut left = generate_sine_wave(6000.0, SAMPLE_RATE, 8 * BLOCK, 0.5);
    let mut right = left.clone();
    run_blocks(&mut processor, &mut left, &mut right, BLOCK);
    assert!(rms_db(&left, 4 * BLOCK) < gain_to_db(0.5) - 20.0);
    assert_eq!(processor.coordinator().last_applied().map(|s| s.high_cut_freq), Some(400.0));
}

#[tokio::test]
async fn test_preset_round_trip_changes_sound() {
    let dir = TempDir::new().unwrap();
    let (params, mut processor) = prepared(&ChainSettings::default());
    let controller =
        EqController::new(Arc::clone(&params), PresetManager::new(dir.path().to_path_buf()));

    params.set(ParameterId::PeakFreq, 2000.0);
    params.set(ParameterId::PeakGain, -12.0);
    controller
        .execute(Command::SavePreset {
            name: "scoop".to_string(),
        })
        .await;
    controller.execute(Command::ResetParameters).await;

    let loaded = controller
        .execute(Command::LoadPreset {
            name: "scoop".to_string(),
        })
        .await;
    assert_eq!(loaded, CommandResult::PresetLoaded { name: "scoop".to_string() });

    let mut left = generate_sine_wave(2000.0, SAMPLE_RATE, 16 * BLOCK, 0.5);
    let mut right = left.clone();
    run_blocks(&mut processor, &mut left, &mut right, BLOCK);
    let gain = rms_db(&left, 8 * BLOCK) - gain_to_db(0.5 / std::f64::consts::SQRT_2);
    assert!((gain + 12.0).abs() < 0.3, "{gain} dB");
}

#[tokio::test]
async fn test_state_blob_restores_identical_processing() {
    let dir = TempDir::new().unwrap();
    let settings = ChainSettings {
        low_cut_freq: 75.0,
        low_cut_slope: Slope::Db24,
        peak_freq: 3100.0,
        peak_gain_db: 3.5,
        peak_quality: 4.0,
        high_cut_freq: 14000.0,
        high_cut_slope: Slope::Db12,
    };
    let (params, mut original) = prepared(&settings);
    let blob = EqController::new(params, PresetManager::new(dir.path().to_path_buf()))
        .state_blob()
        .unwrap();

    let (fresh_params, mut restored) = prepared(&ChainSettings::default());
    let controller = EqController::new(fresh_params, PresetManager::new(dir.path().to_path_buf()));
    assert_eq!(
        controller.execute(Command::RestoreState { blob }).await,
        CommandResult::StateRestored
    );

    let input = generate_sine_wave(500.0, SAMPLE_RATE, 4 * BLOCK, 0.5);
    let (mut a_l, mut a_r) = (input.clone(), input.clone());
    let (mut b_l, mut b_r) = (input.clone(), input);
    run_blocks(&mut original, &mut a_l, &mut a_r, BLOCK);
    run_blocks(&mut restored, &mut b_l, &mut b_r, BLOCK);
    assert_eq!(a_l, b_l);
    assert_eq!(a_r, b_r);
}

#[test]
fn test_wav_file_low_cut_removes_rumble() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("rumble.wav");
    let output = dir.path().join("clean.wav");

    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: 48000,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(&input, spec).unwrap();
    let rumble = generate_sine_wave(40.0, SAMPLE_RATE, 48000, 0.5);
    for &s in &rumble {
        writer.write_sample(s).unwrap();
        writer.write_sample(s).unwrap();
    }
    writer.finalize().unwrap();

    let params = Arc::new(ParameterStore::from_settings(&ChainSettings {
        low_cut_freq: 300.0,
        low_cut_slope: Slope::Db48,
        ..Default::default()
    }));
    let summary = process_wav_file(&input, &output, params, BLOCK).unwrap();
    assert_eq!(summary.channels, 2);
    assert!(summary.output_rms_db < summary.input_rms_db - 30.0, "{summary:?}");
}
