//! Host-side plumbing for the Bellcut equalizer
//!
//! - `audio`: CPAL output enumeration and live playback through the processor
//! - `render`: offline WAV rendering
//! - `analysis`: FFT-measured frequency response
//! - `control`: command execution against the shared parameter store
//! - `signal`: test-signal generators

pub mod analysis;
pub mod audio;
pub mod control;
pub mod render;
pub mod signal;

pub use analysis::MeasuredResponse;
pub use audio::{CpalDevice, CpalEnumerator, EqOutputStream};
pub use control::EqController;
pub use render::{process_wav_file, render_signal, RenderError, RenderOptions, RenderSummary};
pub use signal::{SignalKind, ToneGenerator};
