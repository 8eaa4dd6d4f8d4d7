//! Persistent audio cache.
//!
//! Every synthesizable slot of an entry maps to one fixed file name derived from
//! the entry id and the slot position, never from the text. A file's presence is
//! the only completion signal: there is no index, no hashing and no eviction.
//!
//! ```text
//! audio_cache/
//! ├── vocab/<id>.ogg              # headword
//! ├── sentences/<id>_sent_<n>.ogg # n-th example sentence (1-based)
//! └── english/<id>_en.ogg         # translation
//! ```
//!
//! The same layout is used under `audio/` inside a pack.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tempfile::NamedTempFile;

use crate::error::PackError;
use crate::snapshot::VocabularyEntry;
use crate::Language;

/// Extension of every cached audio file.
pub const AUDIO_EXTENSION: &str = "ogg";

const HEADWORD_DIR: &str = "vocab";
const SENTENCE_DIR: &str = "sentences";
const TRANSLATION_DIR: &str = "english";

/// Temporary files and directories older than this belong to runs that died
/// before cleaning up, and are swept when a cache or pack run starts.
pub const STALE_TEMP_AGE: Duration = Duration::from_secs(60 * 60);

const TEMP_SUFFIX: &str = ".partial";

/// Which part of an entry a slot speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotKind {
    Headword,
    /// Example sentence by 1-based position in the entry's sentence list.
    Sentence(usize),
    Translation,
}

impl SlotKind {
    /// Cache subarea (and pack directory under `audio/`) holding this kind.
    pub fn dir_name(self) -> &'static str {
        match self {
            SlotKind::Headword => HEADWORD_DIR,
            SlotKind::Sentence(_) => SENTENCE_DIR,
            SlotKind::Translation => TRANSLATION_DIR,
        }
    }

    pub fn language(self) -> Language {
        match self {
            SlotKind::Headword | SlotKind::Sentence(_) => Language::German,
            SlotKind::Translation => Language::English,
        }
    }
}

/// One synthesizable unit of audio belonging to an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSlot {
    pub kind: SlotKind,
    pub language: Language,
    /// Stable file name, e.g. `hund_sent_1.ogg`.
    pub file_name: String,
    /// Text to speak.
    pub text: String,
}

impl AudioSlot {
    pub fn headword(entry: &VocabularyEntry) -> Self {
        Self::new(entry, SlotKind::Headword, entry.headword_text())
    }

    /// Slot for the sentence at 1-based `index`.
    pub fn sentence(entry: &VocabularyEntry, index: usize, text: &str) -> Self {
        Self::new(entry, SlotKind::Sentence(index), text.to_string())
    }

    pub fn translation(entry: &VocabularyEntry) -> Self {
        Self::new(entry, SlotKind::Translation, entry.translation_en.clone())
    }

    fn new(entry: &VocabularyEntry, kind: SlotKind, text: String) -> Self {
        Self {
            kind,
            language: kind.language(),
            file_name: slot_file_name(&entry.id, kind),
            text,
        }
    }

    /// Every slot an entry has, in pack order: headword, sentences, translation.
    ///
    /// Sentences without German text have no slot but still occupy their index.
    pub fn for_entry(entry: &VocabularyEntry) -> Vec<AudioSlot> {
        let mut slots = Vec::with_capacity(entry.example_sentences.len() + 2);
        if !entry.word.trim().is_empty() {
            slots.push(Self::headword(entry));
        }
        for (idx, sentence) in entry.example_sentences.iter().enumerate() {
            if !sentence.german.trim().is_empty() {
                slots.push(Self::sentence(entry, idx + 1, &sentence.german));
            }
        }
        if entry.has_translation() {
            slots.push(Self::translation(entry));
        }
        slots
    }

    /// Path of this slot's audio inside a pack, always with `/` separators.
    pub fn archive_path(&self) -> String {
        format!("audio/{}/{}", self.kind.dir_name(), self.file_name)
    }
}

/// File name for a slot of the entry with the given id.
pub fn slot_file_name(entry_id: &str, kind: SlotKind) -> String {
    let stem = file_safe_id(entry_id);
    match kind {
        SlotKind::Headword => format!("{stem}.{AUDIO_EXTENSION}"),
        SlotKind::Sentence(n) => format!("{stem}_sent_{n}.{AUDIO_EXTENSION}"),
        SlotKind::Translation => format!("{stem}_en.{AUDIO_EXTENSION}"),
    }
}

/// Entry ids become file name stems.
///
/// Characters that are unsafe in file names are percent-escaped, and so is `%`
/// itself, which keeps distinct ids on distinct files. Everything else, spaces
/// and umlauts included, is kept verbatim.
fn file_safe_id(id: &str) -> String {
    let mut stem = String::with_capacity(id.len());
    for c in id.chars() {
        let unsafe_char = c.is_control()
            || matches!(c, '%' | '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|');
        if unsafe_char {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                stem.push_str(&format!("%{byte:02X}"));
            }
        } else {
            stem.push(c);
        }
    }
    stem
}

/// Number of cached files per subarea.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub headwords: usize,
    pub sentences: usize,
    pub translations: usize,
}

impl CacheStats {
    pub fn total(&self) -> usize {
        self.headwords + self.sentences + self.translations
    }
}

/// Directory-backed store of synthesized audio, keyed by slot file name.
#[derive(Debug, Clone)]
pub struct AudioCache {
    root: PathBuf,
}

impl AudioCache {
    /// Open (and create if needed) a cache rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, PackError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(PackError::cache_io(&root))?;
        let cache = Self { root };
        let swept = cache.sweep_partials(STALE_TEMP_AGE);
        if swept > 0 {
            log::info!("Removed {swept} abandoned partial files from {}", cache.root.display());
        }
        Ok(cache)
    }

    /// Delete temporary files at least `max_age` old from every subarea.
    pub fn sweep_partials(&self, max_age: Duration) -> usize {
        [HEADWORD_DIR, SENTENCE_DIR, TRANSLATION_DIR]
            .iter()
            .map(|dir| {
                remove_stale(&self.root.join(dir), max_age, |name| {
                    name.starts_with('.') && name.ends_with(TEMP_SUFFIX)
                })
            })
            .sum()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute cache location of a slot. Stable across runs.
    pub fn resolve(&self, slot: &AudioSlot) -> PathBuf {
        self.root.join(slot.kind.dir_name()).join(&slot.file_name)
    }

    pub fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    /// Create an empty temporary file next to `target`, to be filled and then
    /// handed to [`AudioCache::store`]. Creates the subarea on first use.
    pub fn temp_file_for(&self, target: &Path) -> io::Result<NamedTempFile> {
        let dir = target.parent().unwrap_or(&self.root);
        fs::create_dir_all(dir)?;
        tempfile::Builder::new()
            .prefix(".")
            .suffix(TEMP_SUFFIX)
            .tempfile_in(dir)
    }

    /// Move a finished temporary file onto `target` with a single rename.
    ///
    /// A concurrent run that wrote the same slot first is silently overwritten.
    pub fn store(&self, temp: NamedTempFile, target: &Path) -> io::Result<()> {
        if let Some(dir) = target.parent() {
            fs::create_dir_all(dir)?;
        }
        temp.persist(target).map_err(|e| e.error)?;
        Ok(())
    }

    /// Delete every cached slot of `entry`, including sentence slots beyond the
    /// entry's current sentence count. Returns the number of files removed.
    pub fn invalidate(&self, entry: &VocabularyEntry) -> Result<usize, PackError> {
        let mut removed = 0;
        for kind in [SlotKind::Headword, SlotKind::Translation] {
            let path = self.root.join(kind.dir_name()).join(slot_file_name(&entry.id, kind));
            removed += remove_if_present(&path)?;
        }

        let sentence_dir = self.root.join(SENTENCE_DIR);
        let prefix = format!("{}_sent_", file_safe_id(&entry.id));
        let suffix = format!(".{AUDIO_EXTENSION}");
        let listing = match fs::read_dir(&sentence_dir) {
            Ok(listing) => listing,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(removed),
            Err(e) => return Err(PackError::CacheIo { path: sentence_dir, source: e }),
        };
        for item in listing {
            let item = item.map_err(PackError::cache_io(&sentence_dir))?;
            let name = item.file_name();
            let Some(name) = name.to_str() else { continue };
            let is_slot = name
                .strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(&suffix))
                .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()));
            if is_slot {
                removed += remove_if_present(&item.path())?;
            }
        }

        log::info!("Invalidated {removed} cached audio files for entry {:?}", entry.id);
        Ok(removed)
    }

    pub fn stats(&self) -> Result<CacheStats, PackError> {
        Ok(CacheStats {
            headwords: self.count_audio(HEADWORD_DIR)?,
            sentences: self.count_audio(SENTENCE_DIR)?,
            translations: self.count_audio(TRANSLATION_DIR)?,
        })
    }

    fn count_audio(&self, dir_name: &str) -> Result<usize, PackError> {
        let dir = self.root.join(dir_name);
        let listing = match fs::read_dir(&dir) {
            Ok(listing) => listing,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(PackError::CacheIo { path: dir, source: e }),
        };
        let mut count = 0;
        for item in listing {
            let path = item.map_err(PackError::cache_io(&dir))?.path();
            if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(AUDIO_EXTENSION) {
                count += 1;
            }
        }
        Ok(count)
    }
}

/// Remove entries of `dir` selected by `is_leftover` whose modification time
/// is at least `max_age` ago. Failures are logged and skipped.
pub(crate) fn remove_stale(
    dir: &Path,
    max_age: Duration,
    is_leftover: impl Fn(&str) -> bool,
) -> usize {
    let Ok(listing) = fs::read_dir(dir) else {
        return 0;
    };
    let now = SystemTime::now();
    let mut removed = 0;
    for item in listing.flatten() {
        let name = item.file_name();
        if !name.to_str().is_some_and(&is_leftover) {
            continue;
        }
        let Ok(metadata) = item.metadata() else {
            continue;
        };
        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .unwrap_or_default();
        if age < max_age {
            continue;
        }
        let path = item.path();
        let result = if metadata.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        match result {
            Ok(()) => removed += 1,
            Err(e) => log::warn!("Failed to remove leftover {}: {e}", path.display()),
        }
    }
    removed
}

fn remove_if_present(path: &Path) -> Result<usize, PackError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(1),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(PackError::CacheIo {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::ExampleSentence;
    use std::io::Write;
    use tempfile::TempDir;

    fn hund() -> VocabularyEntry {
        VocabularyEntry {
            id: "hund".to_string(),
            word: "Hund".to_string(),
            article: Some("der".to_string()),
            translation_en: "dog".to_string(),
            example_sentences: vec![
                ExampleSentence::new("Der Hund bellt.", "The dog barks."),
                ExampleSentence::new("", "(missing)"),
                ExampleSentence::new("Mein Hund schläft.", "My dog sleeps."),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn slot_file_names_follow_entry_id_and_position() {
        assert_eq!(slot_file_name("hund", SlotKind::Headword), "hund.ogg");
        assert_eq!(slot_file_name("hund", SlotKind::Sentence(3)), "hund_sent_3.ogg");
        assert_eq!(slot_file_name("hund", SlotKind::Translation), "hund_en.ogg");
        assert_eq!(slot_file_name("a/b\\c", SlotKind::Headword), "a%2Fb%5Cc.ogg");
        assert_eq!(slot_file_name("guten tag", SlotKind::Headword), "guten tag.ogg");
        assert_eq!(slot_file_name("über", SlotKind::Translation), "über_en.ogg");
    }

    #[test]
    fn distinct_ids_never_share_a_file() {
        let ids = ["a/b", "a_b", "a%2Fb", "a:b", "a\\b", "a\nb", "a%b"];
        let names: std::collections::HashSet<String> = ids
            .iter()
            .map(|id| slot_file_name(id, SlotKind::Headword))
            .collect();
        assert_eq!(names.len(), ids.len(), "{names:?}");
        assert_eq!(slot_file_name("a%2Fb", SlotKind::Headword), "a%252Fb.ogg");
    }

    #[test]
    fn entry_slots_skip_empty_sentences_but_keep_positions() {
        let slots = AudioSlot::for_entry(&hund());
        let names: Vec<&str> = slots.iter().map(|s| s.file_name.as_str()).collect();
        assert_eq!(names, ["hund.ogg", "hund_sent_1.ogg", "hund_sent_3.ogg", "hund_en.ogg"]);
        assert_eq!(slots[0].text, "der Hund");
        assert_eq!(slots[3].language, Language::English);
        assert_eq!(slots[1].archive_path(), "audio/sentences/hund_sent_1.ogg");
    }

    #[test]
    fn entry_without_translation_has_no_translation_slot() {
        let mut entry = hund();
        entry.translation_en = " ".to_string();
        assert!(AudioSlot::for_entry(&entry)
            .iter()
            .all(|slot| slot.kind != SlotKind::Translation));
    }

    #[test]
    fn store_places_file_under_final_name() {
        let dir = TempDir::new().unwrap();
        let cache = AudioCache::open(dir.path()).unwrap();
        let slot = AudioSlot::headword(&hund());
        let target = cache.resolve(&slot);
        assert!(!cache.exists(&target));

        let mut temp = cache.temp_file_for(&target).unwrap();
        temp.write_all(b"ogg").unwrap();
        assert!(!cache.exists(&target), "partial file must not be visible");

        cache.store(temp, &target).unwrap();
        assert!(cache.exists(&target));
        assert_eq!(fs::read(&target).unwrap(), b"ogg");
        assert_eq!(cache.stats().unwrap().headwords, 1);
    }

    #[test]
    fn store_overwrites_existing_file() {
        let dir = TempDir::new().unwrap();
        let cache = AudioCache::open(dir.path()).unwrap();
        let target = cache.resolve(&AudioSlot::translation(&hund()));

        for payload in [b"first".as_slice(), b"second".as_slice()] {
            let mut temp = cache.temp_file_for(&target).unwrap();
            temp.write_all(payload).unwrap();
            cache.store(temp, &target).unwrap();
        }
        assert_eq!(fs::read(&target).unwrap(), b"second");
    }

    #[test]
    fn open_sweeps_only_old_partial_files() {
        let dir = TempDir::new().unwrap();
        let vocab = dir.path().join("vocab");
        fs::create_dir_all(&vocab).unwrap();
        let old = vocab.join(".abandoned.partial");
        let fresh = vocab.join(".in-flight.partial");
        let cached = vocab.join("hund.ogg");
        for path in [&old, &fresh, &cached] {
            fs::write(path, b"x").unwrap();
        }
        let past = SystemTime::now() - 2 * STALE_TEMP_AGE;
        fs::File::options()
            .write(true)
            .open(&old)
            .unwrap()
            .set_modified(past)
            .unwrap();
        fs::File::options()
            .write(true)
            .open(&cached)
            .unwrap()
            .set_modified(past)
            .unwrap();

        AudioCache::open(dir.path()).unwrap();
        assert!(!old.exists());
        assert!(fresh.exists());
        assert!(cached.exists());
    }

    #[test]
    fn invalidate_removes_all_slots_of_one_entry() {
        let dir = TempDir::new().unwrap();
        let cache = AudioCache::open(dir.path()).unwrap();
        let entry = hund();
        let mut katze = VocabularyEntry::new("katze", "Katze");
        katze.translation_en = "cat".to_string();

        let mut slots = AudioSlot::for_entry(&entry);
        slots.extend(AudioSlot::for_entry(&katze));
        // Left over from an older, longer sentence list.
        slots.push(AudioSlot::sentence(&entry, 7, "Alt."));
        for slot in &slots {
            let target = cache.resolve(slot);
            let temp = cache.temp_file_for(&target).unwrap();
            cache.store(temp, &target).unwrap();
        }
        // Different entry sharing the prefix.
        let hundert = cache.resolve(&AudioSlot::sentence(&VocabularyEntry::new("hund_sent_x", "x"), 1, "x"));
        let temp = cache.temp_file_for(&hundert).unwrap();
        cache.store(temp, &hundert).unwrap();

        assert_eq!(cache.invalidate(&entry).unwrap(), 5);
        assert!(cache.exists(&hundert));
        let stats = cache.stats().unwrap();
        assert_eq!(stats.headwords, 1);
        assert_eq!(stats.translations, 1);
        assert_eq!(stats.sentences, 1);
        assert_eq!(cache.invalidate(&entry).unwrap(), 0);
    }
}
