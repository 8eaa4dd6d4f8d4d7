//! # vocab-pack
//!
//! Turns a snapshot of vocabulary entries into a distributable, versioned offline
//! content pack: synthesized speech for every headword, example sentence and
//! translation, plus a manifest and a data file, zipped into a single archive.
//!
//! ## Pipeline
//!
//! - **Plan**: resolve every audio slot of every entry against the persistent
//!   [`cache::AudioCache`] and queue a [`scheduler::Task`] for each missing file.
//! - **Fill**: run the queued tasks on a bounded worker pool
//!   ([`scheduler::SynthesisScheduler`]). Failures are recorded, never fatal.
//! - **Assemble**: copy cached audio into a staging tree, write `vocabulary.json`
//!   and `manifest.json`, and zip it ([`pack::PackGenerator`]).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vocab_pack::engines::stub::StubEngine;
//! use vocab_pack::{PackConfigBuilder, PackGenerator, Snapshot, SynthesisError};
//!
//! let snapshot = Snapshot::from_json_file("data/vocabulary.json".as_ref())?;
//! let config = PackConfigBuilder::default()
//!     .output_dir("data/packs")
//!     .build()?;
//!
//! let factory = || Ok::<_, SynthesisError>(StubEngine::new());
//! let generator = PackGenerator::new(config, snapshot, factory);
//! let archive = generator.generate_pack("v3")?;
//! println!("Pack written to {}", archive.display());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod cache;
pub mod config;
pub mod engines;
pub mod error;
pub mod pack;
pub mod scheduler;
pub mod snapshot;

use std::fmt;
use std::path::Path;

pub use cache::{AudioCache, AudioSlot, SlotKind};
pub use config::{PackConfig, PackConfigBuilder};
pub use error::{PackError, SynthesisError};
pub use pack::{PackGenerator, PackManifest, PackReport};
pub use snapshot::{ExampleSentence, Snapshot, VocabularyEntry};

/// Spoken language of an audio slot.
///
/// German is the language being learned; English is used for translations.
/// Engines map the language to a voice model and its tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    German,
    English,
}

impl Language {
    pub fn code(self) -> &'static str {
        match self {
            Language::German => "de",
            Language::English => "en",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Common interface for text-to-speech synthesis engines.
///
/// An engine turns non-empty text into a finished, normalized audio file at
/// `output`. Implementations may block for a long time (external processes,
/// model inference); the scheduler gives each call its own worker.
pub trait SynthesisEngine {
    /// Synthesize `text` spoken in `language` and write the audio to `output`.
    ///
    /// `output` already exists as an empty file; implementations overwrite it.
    fn synthesize_to_file(
        &mut self,
        text: &str,
        language: Language,
        output: &Path,
    ) -> Result<(), SynthesisError>;
}

/// Creates a fresh [`SynthesisEngine`] for every task.
///
/// Engines are never shared between workers, so they are free to keep mutable
/// state. Any `Fn() -> Result<E, SynthesisError>` closure is a factory, which is
/// the usual way to plug in a stub engine in tests.
pub trait EngineFactory: Send + Sync {
    type Engine: SynthesisEngine;

    fn create(&self) -> Result<Self::Engine, SynthesisError>;
}

impl<F, E> EngineFactory for F
where
    F: Fn() -> Result<E, SynthesisError> + Send + Sync,
    E: SynthesisEngine,
{
    type Engine = E;

    fn create(&self) -> Result<E, SynthesisError> {
        self()
    }
}
