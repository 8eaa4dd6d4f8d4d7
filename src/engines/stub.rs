use std::path::Path;

use crate::{Language, SynthesisEngine, SynthesisError};

/// Bytes written by [`StubEngine::new`].
pub const STUB_AUDIO: &[u8] = b"DUMMY_AUDIO_CONTENT";

/// Engine that writes a fixed payload instead of real speech.
///
/// Used when no synthesizer is installed (`--dry-run`) and as the standard test
/// double. Like a real engine it refuses empty text.
#[derive(Debug, Clone)]
pub struct StubEngine {
    payload: Vec<u8>,
}

impl Default for StubEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StubEngine {
    pub fn new() -> Self {
        Self::with_payload(STUB_AUDIO)
    }

    pub fn with_payload(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: payload.into(),
        }
    }
}

impl SynthesisEngine for StubEngine {
    fn synthesize_to_file(
        &mut self,
        text: &str,
        language: Language,
        output: &Path,
    ) -> Result<(), SynthesisError> {
        if text.trim().is_empty() {
            return Err(SynthesisError::EmptyText);
        }
        log::debug!("Stub synthesis ({language}) of {text:?} into {}", output.display());
        std::fs::write(output, &self.payload)?;
        Ok(())
    }
}
