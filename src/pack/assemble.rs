use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::cache::{AudioCache, AudioSlot};
use crate::error::PackError;
use crate::snapshot::{Snapshot, VocabularyEntry};

use super::records::{ContentRecord, SentenceRecord};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const VOCABULARY_FILE: &str = "vocabulary.json";

/// Copy every cached slot into `staging` and build one record per entry, in
/// snapshot order. Slots without a cache file simply have no audio reference.
pub fn stage_entries(
    snapshot: &Snapshot,
    cache: &AudioCache,
    staging: &Path,
) -> Result<Vec<ContentRecord>, PackError> {
    snapshot
        .iter()
        .map(|entry| stage_entry(entry, cache, staging))
        .collect()
}

fn stage_entry(
    entry: &VocabularyEntry,
    cache: &AudioCache,
    staging: &Path,
) -> Result<ContentRecord, PackError> {
    let audio = if entry.word.trim().is_empty() {
        None
    } else {
        stage_slot(&AudioSlot::headword(entry), cache, staging)?
    };

    let mut sentences = Vec::with_capacity(entry.example_sentences.len());
    for (idx, sentence) in entry.example_sentences.iter().enumerate() {
        if sentence.german.trim().is_empty() {
            continue;
        }
        let slot = AudioSlot::sentence(entry, idx + 1, &sentence.german);
        sentences.push(SentenceRecord {
            german: sentence.german.clone(),
            english: sentence.english.clone(),
            audio_path: stage_slot(&slot, cache, staging)?,
        });
    }

    let audio_en = if entry.has_translation() {
        stage_slot(&AudioSlot::translation(entry), cache, staging)?
    } else {
        None
    };

    Ok(ContentRecord {
        id: entry.id.clone(),
        word: entry.word.clone(),
        article: entry.article.clone(),
        gender: entry.gender.clone(),
        plural: entry.plural_form.clone(),
        pos: entry.part_of_speech.clone(),
        trans_en: entry.translation_en.clone(),
        sentences,
        audio,
        audio_en,
    })
}

/// Copy one slot's cache file into the staging tree, returning its pack path.
fn stage_slot(
    slot: &AudioSlot,
    cache: &AudioCache,
    staging: &Path,
) -> Result<Option<String>, PackError> {
    let cached = cache.resolve(slot);
    if !cache.exists(&cached) {
        return Ok(None);
    }

    let relative = slot.archive_path();
    let destination = staging.join(&relative);
    if let Some(dir) = destination.parent() {
        fs::create_dir_all(dir).map_err(PackError::staging(dir))?;
    }
    match fs::copy(&cached, &destination) {
        Ok(_) => Ok(Some(relative)),
        Err(e) if e.kind() == io::ErrorKind::NotFound && !cached.exists() => {
            log::warn!("{} vanished from the cache while packing", cached.display());
            Ok(None)
        }
        Err(e) => Err(PackError::CacheIo {
            path: cached,
            source: e,
        }),
    }
}

/// Write `value` as pretty-printed UTF-8 JSON.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), PackError> {
    let file = File::create(path).map_err(PackError::staging(path))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush().map_err(PackError::staging(path))?;
    Ok(())
}
