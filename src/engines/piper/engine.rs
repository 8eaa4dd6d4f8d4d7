use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use crate::{EngineFactory, Language, SynthesisEngine, SynthesisError};

use super::process;

/// Sample rate every pack audio file is resampled to.
pub const PACK_SAMPLE_RATE: u32 = 22050;

/// EBU R128 loudness normalization applied by ffmpeg (-14 LUFS).
pub const LOUDNESS_FILTER: &str = "loudnorm=I=-14:TP=-1.5:LRA=11";

/// Voice model and tuning used for one language.
#[derive(Debug, Clone)]
pub struct VoiceParams {
    /// Path to the `.onnx` voice model.
    pub model: PathBuf,
    /// Speaking-rate scale; values above 1.0 speak slower.
    pub length_scale: f32,
    /// Prosody variation of the generator.
    pub noise_scale: f32,
    /// Phoneme width variation.
    pub noise_w: f32,
    /// Seconds of silence after each sentence.
    pub sentence_silence: f32,
}

impl VoiceParams {
    pub fn german(model: impl Into<PathBuf>) -> Self {
        Self {
            model: model.into(),
            // Learners get a slightly slower, steadier German voice.
            length_scale: 1.1,
            noise_scale: 0.667,
            noise_w: 0.8,
            sentence_silence: 0.2,
        }
    }

    pub fn english(model: impl Into<PathBuf>) -> Self {
        Self {
            model: model.into(),
            length_scale: 1.0,
            noise_scale: 0.6,
            noise_w: 0.7,
            sentence_silence: 0.2,
        }
    }
}

/// Parameters for locating and driving piper and ffmpeg.
#[derive(Debug, Clone)]
pub struct PiperConfig {
    /// piper executable; `None` searches PATH for `piper`, then `piper-tts`.
    pub piper_binary: Option<PathBuf>,
    /// ffmpeg executable; `None` searches PATH.
    pub ffmpeg_binary: Option<PathBuf>,
    pub german: VoiceParams,
    pub english: VoiceParams,
    pub sample_rate: u32,
    pub loudness_filter: String,
    /// Upper bound for each external process. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl Default for PiperConfig {
    fn default() -> Self {
        Self {
            piper_binary: None,
            ffmpeg_binary: None,
            german: VoiceParams::german("piper-voices/de_DE-thorsten-high.onnx"),
            english: VoiceParams::english("piper-voices/en_US-lessac-medium.onnx"),
            sample_rate: PACK_SAMPLE_RATE,
            loudness_filter: LOUDNESS_FILTER.to_string(),
            timeout: Some(Duration::from_secs(120)),
        }
    }
}

impl PiperConfig {
    pub fn voice(&self, language: Language) -> &VoiceParams {
        match language {
            Language::German => &self.german,
            Language::English => &self.english,
        }
    }
}

/// Hands out [`PiperEngine`]s sharing one resolved configuration.
///
/// Binaries are looked up once. When one is missing, construction still
/// succeeds and every `create()` reports the engine as unavailable, so a pack
/// can still be built from whatever audio is already cached.
#[derive(Debug, Clone)]
pub struct PiperFactory {
    config: Arc<PiperConfig>,
    piper: Option<PathBuf>,
    ffmpeg: Option<PathBuf>,
}

impl PiperFactory {
    pub fn new(config: PiperConfig) -> Self {
        let piper = match &config.piper_binary {
            Some(binary) => which::which(binary).ok(),
            None => which::which("piper")
                .or_else(|_| which::which("piper-tts"))
                .ok(),
        };
        let ffmpeg = which::which(
            config
                .ffmpeg_binary
                .as_deref()
                .unwrap_or_else(|| Path::new("ffmpeg")),
        )
        .ok();

        if piper.is_none() {
            log::warn!("Piper executable not found. Install 'piper' or 'piper-tts'; synthesis will fail.");
        }
        if ffmpeg.is_none() {
            log::warn!("ffmpeg not found; synthesis will fail.");
        }
        for voice in [&config.german, &config.english] {
            if !voice.model.exists() {
                log::warn!("Piper model not found at {}", voice.model.display());
            }
        }

        Self {
            config: Arc::new(config),
            piper,
            ffmpeg,
        }
    }

    pub fn config(&self) -> &PiperConfig {
        &self.config
    }
}

impl EngineFactory for PiperFactory {
    type Engine = PiperEngine;

    fn create(&self) -> Result<PiperEngine, SynthesisError> {
        let piper = self.piper.clone().ok_or_else(|| {
            SynthesisError::EngineUnavailable("piper executable not found".to_string())
        })?;
        let ffmpeg = self.ffmpeg.clone().ok_or_else(|| {
            SynthesisError::EngineUnavailable("ffmpeg executable not found".to_string())
        })?;
        Ok(PiperEngine {
            piper,
            ffmpeg,
            config: Arc::clone(&self.config),
        })
    }
}

/// One synthesis worker driving piper and ffmpeg.
#[derive(Debug)]
pub struct PiperEngine {
    piper: PathBuf,
    ffmpeg: PathBuf,
    config: Arc<PiperConfig>,
}

impl SynthesisEngine for PiperEngine {
    fn synthesize_to_file(
        &mut self,
        text: &str,
        language: Language,
        output: &Path,
    ) -> Result<(), SynthesisError> {
        if text.trim().is_empty() {
            return Err(SynthesisError::EmptyText);
        }
        let voice = self.config.voice(language);
        if !voice.model.exists() {
            return Err(SynthesisError::EngineUnavailable(format!(
                "voice model not found at {}",
                voice.model.display()
            )));
        }

        let wav = tempfile::Builder::new()
            .prefix("piper-")
            .suffix(".wav")
            .tempfile()?;

        let mut piper = Command::new(&self.piper);
        piper.args(piper_args(voice, wav.path()));
        process::run(piper, Some(text), self.config.timeout)?;

        let samples = check_wav(wav.path())?;
        log::debug!("Piper produced {samples} samples for {text:?} ({language})");

        let mut ffmpeg = Command::new(&self.ffmpeg);
        ffmpeg.args(ffmpeg_args(&self.config, wav.path(), output));
        process::run(ffmpeg, None, self.config.timeout)
    }
}

fn piper_args(voice: &VoiceParams, wav: &Path) -> Vec<OsString> {
    vec![
        "--model".into(),
        voice.model.clone().into(),
        "--output_file".into(),
        wav.into(),
        "--length_scale".into(),
        voice.length_scale.to_string().into(),
        "--noise_scale".into(),
        voice.noise_scale.to_string().into(),
        "--noise_w".into(),
        voice.noise_w.to_string().into(),
        "--sentence_silence".into(),
        voice.sentence_silence.to_string().into(),
    ]
}

fn ffmpeg_args(config: &PiperConfig, wav: &Path, output: &Path) -> Vec<OsString> {
    // The output is a temp file without an .ogg extension, hence the explicit `-f`.
    vec![
        "-y".into(),
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-i".into(),
        wav.into(),
        "-af".into(),
        config.loudness_filter.clone().into(),
        "-ar".into(),
        config.sample_rate.to_string().into(),
        "-ac".into(),
        "1".into(),
        "-c:a".into(),
        "libvorbis".into(),
        "-q:a".into(),
        "4".into(),
        "-f".into(),
        "ogg".into(),
        output.into(),
    ]
}

/// Make sure piper wrote a readable WAV with at least one sample.
fn check_wav(path: &Path) -> Result<u32, SynthesisError> {
    let reader = hound::WavReader::open(path)
        .map_err(|e| SynthesisError::InvalidAudio(format!("unreadable WAV from piper: {e}")))?;
    let samples = reader.duration();
    if samples == 0 {
        return Err(SynthesisError::InvalidAudio(
            "piper produced no audio".to_string(),
        ));
    }
    Ok(samples)
}
