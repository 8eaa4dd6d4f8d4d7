use serde::{Deserialize, Serialize};

/// Contents of `manifest.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackManifest {
    pub version: String,
    /// Unix timestamp (seconds) taken when assembly started.
    pub generated_at: i64,
    /// Number of snapshot entries, whether or not all their audio exists.
    pub item_count: usize,
    pub format: String,
}

/// One element of `vocabulary.json`.
///
/// Lexical fields that are unknown are written as `null`; audio fields are
/// left out entirely when the audio is not in the pack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub id: String,
    pub word: String,
    pub article: Option<String>,
    pub gender: Option<String>,
    pub plural: Option<String>,
    pub pos: String,
    pub trans_en: String,
    pub sentences: Vec<SentenceRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_en: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentenceRecord {
    pub german: String,
    pub english: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_path: Option<String>,
}
