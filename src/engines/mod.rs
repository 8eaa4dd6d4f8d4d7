//! Speech synthesis engines.
//!
//! This module contains implementations of [`crate::SynthesisEngine`].
//!
//! # Available Engines
//!
//! - `stub` - Deterministic placeholder audio, always available (tests, dry runs)
//!
//! Enable further engines via Cargo features:
//! - `piper` - Piper TTS + ffmpeg loudness normalization (external processes, on by default)

pub mod stub;

#[cfg(feature = "piper")]
pub mod piper;
