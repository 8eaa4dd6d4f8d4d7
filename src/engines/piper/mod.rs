//! Piper text-to-speech engine with ffmpeg post-processing.
//!
//! Each synthesis call runs two external processes:
//!
//! 1. `piper` reads the text on stdin and writes a WAV file using the voice
//!    model configured for the language.
//! 2. `ffmpeg` loudness-normalizes the WAV and encodes mono OGG Vorbis at the
//!    pack sample rate.
//!
//! # System Requirements
//!
//! - **piper**: <https://github.com/rhasspy/piper/releases> (`piper` or `piper-tts` on PATH)
//! - **ffmpeg** built with `libvorbis`
//! - One `.onnx` voice model per language, e.g. `de_DE-thorsten-high.onnx` and
//!   `en_US-lessac-medium.onnx`, each next to its `.onnx.json` config
//!
//! # Example
//!
//! ```rust,no_run
//! use vocab_pack::engines::piper::{PiperConfig, PiperFactory};
//! use vocab_pack::{EngineFactory, Language, SynthesisEngine};
//! use std::path::Path;
//!
//! let factory = PiperFactory::new(PiperConfig::default());
//! let mut engine = factory.create()?;
//! engine.synthesize_to_file("der Hund", Language::German, Path::new("hund.ogg"))?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod engine;
mod process;

pub use engine::{PiperConfig, PiperEngine, PiperFactory, VoiceParams};
