//! Read-only vocabulary snapshot consumed by the pack pipeline.
//!
//! The storage layer has historically kept example sentences either as a JSON
//! list or as a JSON-encoded string of that list. Both shapes (and garbage) are
//! normalized here, once, into `Vec<ExampleSentence>`; nothing downstream looks
//! at the raw shape again.

use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::PackError;

/// One example sentence of a vocabulary entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExampleSentence {
    pub german: String,
    pub english: String,
    /// Audio reference carried over from an import. Informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_path: Option<String>,
}

impl ExampleSentence {
    pub fn new(german: impl Into<String>, english: impl Into<String>) -> Self {
        Self {
            german: german.into(),
            english: english.into(),
            audio_path: None,
        }
    }
}

/// A vocabulary entry as stored, addressed by a stable id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct VocabularyEntry {
    pub id: String,
    pub word: String,
    #[serde(default)]
    pub article: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default, alias = "plural")]
    pub plural_form: Option<String>,
    #[serde(default, alias = "pos")]
    pub part_of_speech: String,
    #[serde(default, alias = "translation")]
    pub translation_en: String,
    #[serde(
        default,
        alias = "sentences",
        deserialize_with = "deserialize_sentences"
    )]
    pub example_sentences: Vec<ExampleSentence>,
}

impl VocabularyEntry {
    pub fn new(id: impl Into<String>, word: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            word: word.into(),
            ..Default::default()
        }
    }

    /// Text spoken for the headword: the word with its article, if any.
    pub fn headword_text(&self) -> String {
        match self.article.as_deref().map(str::trim) {
            Some(article) if !article.is_empty() => format!("{article} {}", self.word),
            _ => self.word.clone(),
        }
    }

    /// Whether the entry carries a translation worth speaking.
    pub fn has_translation(&self) -> bool {
        !self.translation_en.trim().is_empty()
    }
}

/// Ordered, immutable list of entries read once at pipeline start.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    entries: Vec<VocabularyEntry>,
}

impl Snapshot {
    pub fn new(entries: Vec<VocabularyEntry>) -> Self {
        Self { entries }
    }

    /// Parse a JSON array of entries.
    pub fn from_json_str(json: &str) -> Result<Self, PackError> {
        let entries: Vec<VocabularyEntry> = serde_json::from_str(json)
            .map_err(|e| PackError::Snapshot(format!("Failed to parse entries: {e}")))?;
        Ok(Self::new(entries))
    }

    pub fn from_json_file(path: &Path) -> Result<Self, PackError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PackError::Snapshot(format!("Failed to read {}: {e}", path.display()))
        })?;
        let snapshot = Self::from_json_str(&content)?;
        log::info!(
            "Loaded {} vocabulary entries from {}",
            snapshot.len(),
            path.display()
        );
        Ok(snapshot)
    }

    pub fn entries(&self) -> &[VocabularyEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, VocabularyEntry> {
        self.entries.iter()
    }

    pub fn find(&self, id: &str) -> Option<&VocabularyEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = &'a VocabularyEntry;
    type IntoIter = std::slice::Iter<'a, VocabularyEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

fn deserialize_sentences<'de, D>(deserializer: D) -> Result<Vec<ExampleSentence>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    Ok(normalize_sentences(&raw))
}

/// Best-effort conversion of any stored sentence field into a sentence list.
///
/// Never fails: unknown shapes yield an empty list.
pub fn normalize_sentences(raw: &Value) -> Vec<ExampleSentence> {
    match raw {
        Value::Array(items) => items.iter().filter_map(sentence_from_value).collect(),
        Value::String(encoded) => match serde_json::from_str::<Value>(encoded) {
            // Doubly encoded lists unwrap one level at a time.
            Ok(inner @ Value::Array(_)) => normalize_sentences(&inner),
            Ok(Value::String(inner)) => normalize_sentences(&Value::String(inner)),
            Ok(Value::Null) => Vec::new(),
            Ok(other) => {
                log::warn!("Ignoring encoded sentence field of unexpected shape: {other}");
                Vec::new()
            }
            Err(e) => {
                if !encoded.trim().is_empty() {
                    log::warn!("Ignoring undecodable sentence field: {e}");
                }
                Vec::new()
            }
        },
        Value::Null => Vec::new(),
        other => {
            log::warn!("Ignoring sentence field of unexpected shape: {other}");
            Vec::new()
        }
    }
}

fn sentence_from_value(value: &Value) -> Option<ExampleSentence> {
    let object = value.as_object()?;
    let text = |key: &str| {
        object
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    Some(ExampleSentence {
        german: text("german"),
        english: text("english"),
        audio_path: object
            .get("audio_path")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}
