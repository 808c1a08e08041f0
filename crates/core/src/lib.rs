//! Bellcut core: parameter model, filter design and the real-time filter chain
//!
//! Everything the audio thread touches lives in [`domain::dsp`]; the rest of
//! the crate (config, presets, state blobs) runs on the control side.

pub mod domain;
