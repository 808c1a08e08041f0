//! Shared helpers for the Bellcut integration tests

use bellcut_core::domain::dsp::gain_to_db;

pub fn generate_sine_wave(
    frequency: f64,
    sample_rate: f64,
    frames: usize,
    amplitude: f32,
) -> Vec<f32> {
    (0..frames)
        .map(|i| {
            let phase = std::f64::consts::TAU * frequency * i as f64 / sample_rate;
            amplitude * phase.sin() as f32
        })
        .collect()
}

pub fn generate_silence(frames: usize) -> Vec<f32> {
    vec![0.0; frames]
}

/// RMS level in dB of `samples[skip..]`
///
/// `skip` drops the filter's settling time from the measurement.
pub fn rms_db(samples: &[f32], skip: usize) -> f64 {
    let tail = &samples[skip.min(samples.len())..];
    if tail.is_empty() {
        return gain_to_db(0.0);
    }
    let sum: f64 = tail.iter().map(|&s| (s as f64) * (s as f64)).sum();
    gain_to_db((sum / tail.len() as f64).sqrt())
}

/// Largest absolute difference between neighbouring samples
pub fn max_step(samples: &[f32]) -> f32 {
    samples
        .windows(2)
        .map(|w| (w[1] - w[0]).abs())
        .fold(0.0, f32::max)
}

pub fn interleave(left: &[f32], right: &[f32]) -> Vec<f32> {
    left.iter().zip(right).flat_map(|(&l, &r)| [l, r]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rms_of_full_scale_sine() {
        let sine = generate_sine_wave(1000.0, 48000.0, 4800, 1.0);
        assert!((rms_db(&sine, 0) + 3.0103).abs() < 0.01);
    }

    #[test]
    fn test_silence_floors_at_min_db() {
        assert_eq!(rms_db(&generate_silence(64), 0), gain_to_db(0.0));
        assert_eq!(max_step(&generate_silence(64)), 0.0);
    }

    #[test]
    fn test_interleave_order() {
        assert_eq!(interleave(&[1.0, 2.0], &[3.0, 4.0]), vec![1.0, 3.0, 2.0, 4.0]);
    }
}
