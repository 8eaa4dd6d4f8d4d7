use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::Value;
use tempfile::TempDir;
use zip::ZipArchive;

use vocab_pack::engines::stub::StubEngine;
use vocab_pack::{
    Language, PackConfig, PackConfigBuilder, PackError, PackGenerator, Snapshot, SynthesisEngine,
    SynthesisError,
};

const SNAPSHOT: &str = r#"[
    {
        "id": "hund",
        "word": "Hund",
        "article": "der",
        "gender": "masculine",
        "plural_form": "Hunde",
        "part_of_speech": "noun",
        "translation_en": "dog",
        "example_sentences": [{"german": "Der Hund bellt.", "english": "The dog barks."}]
    },
    {
        "id": "zebra",
        "word": "Zebra",
        "article": "das",
        "part_of_speech": "noun",
        "translation_en": "zebra",
        "example_sentences": "[{\"german\": \"Das Zebra ist gestreift.\", \"english\": \"The zebra is striped.\"}]"
    },
    {
        "id": "apfel",
        "word": "Apfel",
        "article": "der",
        "part_of_speech": "noun",
        "translation_en": "",
        "example_sentences": null
    }
]"#;

fn config(root: &Path) -> PackConfig {
    PackConfigBuilder::default()
        .output_dir(root.join("packs"))
        .cache_dir(root.join("audio_cache"))
        .workers(2usize)
        .build()
        .unwrap()
}

fn snapshot() -> Snapshot {
    Snapshot::from_json_str(SNAPSHOT).unwrap()
}

fn read_entry(archive: &Path, name: &str) -> Vec<u8> {
    let mut zip = ZipArchive::new(File::open(archive).unwrap()).unwrap();
    let mut body = Vec::new();
    zip.by_name(name).unwrap().read_to_end(&mut body).unwrap();
    body
}

fn read_json(archive: &Path, name: &str) -> Value {
    serde_json::from_slice(&read_entry(archive, name)).unwrap()
}

fn entry_names(archive: &Path) -> Vec<String> {
    let zip = ZipArchive::new(File::open(archive).unwrap()).unwrap();
    let mut names: Vec<String> = zip.file_names().map(str::to_string).collect();
    names.sort();
    names
}

/// Writes the text it was asked to speak, so tests can check what was spoken.
struct EchoEngine;

impl SynthesisEngine for EchoEngine {
    fn synthesize_to_file(
        &mut self,
        text: &str,
        language: Language,
        output: &Path,
    ) -> Result<(), SynthesisError> {
        fs::write(output, format!("{language}:{text}"))?;
        Ok(())
    }
}

/// Fails every German headword; everything else succeeds.
struct NoHeadwordsEngine;

impl SynthesisEngine for NoHeadwordsEngine {
    fn synthesize_to_file(
        &mut self,
        text: &str,
        _language: Language,
        output: &Path,
    ) -> Result<(), SynthesisError> {
        if !text.ends_with('.') && text.contains(' ') && text.split(' ').count() == 2 {
            return Err(SynthesisError::ProcessFailed("voice model crashed".to_string()));
        }
        fs::write(output, b"ok")?;
        Ok(())
    }
}

#[test]
fn single_entry_pack_contains_audio_and_records() {
    let root = TempDir::new().unwrap();
    let mut entries = snapshot().entries().to_vec();
    entries.truncate(1);
    let generator = PackGenerator::new(
        config(root.path()),
        Snapshot::new(entries),
        || Ok::<_, SynthesisError>(StubEngine::with_payload([0u8])),
    );

    let archive = generator.generate_pack("v1").unwrap();
    assert_eq!(archive, root.path().join("packs/deutschstart_v1.zip"));

    assert_eq!(
        entry_names(&archive),
        [
            "audio/english/hund_en.ogg",
            "audio/sentences/hund_sent_1.ogg",
            "audio/vocab/hund.ogg",
            "manifest.json",
            "vocabulary.json",
        ]
    );
    assert_eq!(read_entry(&archive, "audio/vocab/hund.ogg"), [0u8]);

    let manifest = read_json(&archive, "manifest.json");
    assert_eq!(manifest["version"], "v1");
    assert_eq!(manifest["item_count"], 1);
    assert_eq!(manifest["format"], "1.0");
    assert!(manifest["generated_at"].as_i64().unwrap() > 1_600_000_000);

    let records = read_json(&archive, "vocabulary.json");
    let hund = &records[0];
    assert_eq!(hund["id"], "hund");
    assert_eq!(hund["plural"], "Hunde");
    assert_eq!(hund["pos"], "noun");
    assert_eq!(hund["trans_en"], "dog");
    assert_eq!(hund["audio"], "audio/vocab/hund.ogg");
    assert_eq!(hund["audio_en"], "audio/english/hund_en.ogg");
    assert_eq!(hund["sentences"][0]["german"], "Der Hund bellt.");
    assert_eq!(
        hund["sentences"][0]["audio_path"],
        "audio/sentences/hund_sent_1.ogg"
    );

    // The cache outlives the run.
    assert!(root.path().join("audio_cache/vocab/hund.ogg").is_file());
}

#[test]
fn headwords_are_spoken_with_their_article() {
    let root = TempDir::new().unwrap();
    let generator =
        PackGenerator::new(config(root.path()), snapshot(), || Ok::<_, SynthesisError>(EchoEngine));
    let archive = generator.generate_pack("v1").unwrap();

    assert_eq!(read_entry(&archive, "audio/vocab/hund.ogg"), b"de:der Hund");
    assert_eq!(
        read_entry(&archive, "audio/sentences/zebra_sent_1.ogg"),
        "de:Das Zebra ist gestreift.".as_bytes()
    );
    assert_eq!(read_entry(&archive, "audio/english/hund_en.ogg"), b"en:dog");
}

#[test]
fn second_run_reuses_the_cache_without_synthesis() {
    let root = TempDir::new().unwrap();
    let calls = AtomicUsize::new(0);
    let counting = || {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok::<_, SynthesisError>(StubEngine::new())
    };

    let first = PackGenerator::new(config(root.path()), snapshot(), &counting)
        .generate_pack_with_report("v1")
        .unwrap();
    // hund: 3 slots, zebra: 3 slots, apfel: headword only.
    assert_eq!(first.planned, 7);
    assert_eq!(first.synthesized, 7);
    assert_eq!(calls.load(Ordering::SeqCst), 7);

    let unavailable = || -> Result<StubEngine, SynthesisError> {
        Err(SynthesisError::EngineUnavailable(
            "cache should have satisfied every slot".to_string(),
        ))
    };
    let second = PackGenerator::new(config(root.path()), snapshot(), unavailable)
        .generate_pack_with_report("v2")
        .unwrap();
    assert_eq!(second.planned, 0);
    assert!(second.is_complete());
    assert_eq!(second.manifest.version, "v2");

    let v1 = read_json(&first.archive_path, "vocabulary.json");
    let v2 = read_json(&second.archive_path, "vocabulary.json");
    assert_eq!(v1, v2);
    assert_eq!(
        entry_names(&first.archive_path),
        entry_names(&second.archive_path)
    );
}

#[test]
fn failed_audio_is_left_out_but_the_pack_is_still_written() {
    let root = TempDir::new().unwrap();
    let generator = PackGenerator::new(config(root.path()), snapshot(), || {
        Ok::<_, SynthesisError>(NoHeadwordsEngine)
    });

    let report = generator.generate_pack_with_report("v1").unwrap();
    assert_eq!(report.failed.len(), 3);
    assert!(!report.is_complete());
    assert!(report.archive_path.is_file());
    assert_eq!(report.manifest.item_count, 3);

    let records = read_json(&report.archive_path, "vocabulary.json");
    let hund = records[0].as_object().unwrap();
    assert!(!hund.contains_key("audio"));
    assert_eq!(hund["audio_en"], "audio/english/hund_en.ogg");
    assert_eq!(
        hund["sentences"][0]["audio_path"],
        "audio/sentences/hund_sent_1.ogg"
    );
    assert!(!entry_names(&report.archive_path).contains(&"audio/vocab/hund.ogg".to_string()));
}

#[test]
fn panicking_engine_does_not_abort_the_run() {
    let root = TempDir::new().unwrap();
    let crashing = || -> Result<EchoEngine, SynthesisError> { panic!("engine library aborted") };
    let generator = PackGenerator::new(config(root.path()), snapshot(), crashing);

    let report = generator.generate_pack_with_report("v1").unwrap();
    assert_eq!(report.failed.len(), report.planned);
    assert!(report.failed[0].detail.contains("engine library aborted"));

    assert_eq!(
        entry_names(&report.archive_path),
        ["manifest.json", "vocabulary.json"]
    );
    let manifest = read_json(&report.archive_path, "manifest.json");
    assert_eq!(manifest["item_count"], 3);
}

#[test]
fn records_follow_snapshot_order_and_shape() {
    let root = TempDir::new().unwrap();
    let generator = PackGenerator::new(config(root.path()), snapshot(), || {
        Ok::<_, SynthesisError>(StubEngine::new())
    });
    let archive = generator.generate_pack("v1").unwrap();
    let records = read_json(&archive, "vocabulary.json");

    let ids: Vec<&str> = records
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, ["hund", "zebra", "apfel"]);

    // String-encoded sentence lists are normalized.
    assert_eq!(records[1]["sentences"][0]["english"], "The zebra is striped.");
    assert_eq!(records[1]["gender"], Value::Null);

    // No sentences and no translation: empty list, no translation audio.
    let apfel = records[2].as_object().unwrap();
    assert_eq!(apfel["sentences"], serde_json::json!([]));
    assert!(!apfel.contains_key("audio_en"));
    assert_eq!(apfel["audio"], "audio/vocab/apfel.ogg");
}

#[test]
fn output_directory_holds_only_finished_archives() {
    let root = TempDir::new().unwrap();
    let generator = PackGenerator::new(config(root.path()), snapshot(), || {
        Ok::<_, SynthesisError>(StubEngine::new())
    });
    generator.generate_pack("v1").unwrap();
    generator.generate_pack("v2").unwrap();

    let mut names: Vec<PathBuf> = fs::read_dir(root.path().join("packs"))
        .unwrap()
        .map(|e| PathBuf::from(e.unwrap().file_name()))
        .collect();
    names.sort();
    assert_eq!(
        names,
        [
            PathBuf::from("deutschstart_v1.zip"),
            PathBuf::from("deutschstart_v2.zip")
        ]
    );

    let latest = vocab_pack::pack::latest_pack(&root.path().join("packs"))
        .unwrap()
        .unwrap();
    assert!(latest.filename.starts_with("deutschstart_v"));
}

#[test]
fn rejects_version_tags_that_escape_the_output_directory() {
    let root = TempDir::new().unwrap();
    let generator = PackGenerator::new(config(root.path()), snapshot(), || {
        Ok::<_, SynthesisError>(StubEngine::new())
    });

    let err = generator.generate_pack("../v1").unwrap_err();
    assert!(matches!(err, PackError::InvalidVersionTag(_)));
    assert!(!root.path().join("packs").exists());
}

#[test]
fn manifest_can_be_read_back_from_the_archive() {
    let root = TempDir::new().unwrap();
    let generator = PackGenerator::new(config(root.path()), snapshot(), || {
        Ok::<_, SynthesisError>(StubEngine::new())
    });
    let archive = generator.generate_pack("2026.10").unwrap();

    let manifest = vocab_pack::pack::read_manifest(&archive).unwrap();
    assert_eq!(manifest.version, "2026.10");
    assert_eq!(manifest.item_count, 3);
}

#[test]
fn invalidated_entries_are_synthesized_again() {
    let root = TempDir::new().unwrap();
    let cfg = config(root.path());
    let snapshot = snapshot();
    PackGenerator::new(cfg.clone(), snapshot.clone(), || {
        Ok::<_, SynthesisError>(StubEngine::new())
    })
    .generate_pack("v1")
    .unwrap();

    let cache = vocab_pack::AudioCache::open(cfg.cache_dir()).unwrap();
    let removed = cache.invalidate(snapshot.find("hund").unwrap()).unwrap();
    assert_eq!(removed, 3);

    let report = PackGenerator::new(cfg, snapshot, || Ok::<_, SynthesisError>(EchoEngine))
        .generate_pack_with_report("v2")
        .unwrap();
    assert_eq!(report.planned, 3);
    assert_eq!(
        read_entry(&report.archive_path, "audio/vocab/hund.ogg"),
        b"de:der Hund"
    );
}

#[test]
fn ids_differing_only_in_separators_keep_their_own_audio() {
    let root = TempDir::new().unwrap();
    let snapshot = Snapshot::from_json_str(
        r#"[
            {"id": "a/b", "word": "Haus", "article": "das"},
            {"id": "a_b", "word": "Maus", "article": "die"}
        ]"#,
    )
    .unwrap();
    let report = PackGenerator::new(config(root.path()), snapshot, || {
        Ok::<_, SynthesisError>(EchoEngine)
    })
    .generate_pack_with_report("v1")
    .unwrap();
    assert_eq!(report.planned, 2);

    let records = read_json(&report.archive_path, "vocabulary.json");
    let haus = records[0]["audio"].as_str().unwrap();
    let maus = records[1]["audio"].as_str().unwrap();
    assert_ne!(haus, maus);
    assert_eq!(read_entry(&report.archive_path, haus), b"de:das Haus");
    assert_eq!(read_entry(&report.archive_path, maus), b"de:die Maus");
}

#[cfg(target_os = "linux")]
#[test]
fn unreadable_cached_audio_aborts_without_an_archive() {
    let root = TempDir::new().unwrap();
    let cfg = config(root.path());
    let vocab_dir = cfg.cache_dir().join("vocab");
    fs::create_dir_all(&vocab_dir).unwrap();
    // Looks like a cached file to planning, fails with EIO when copied.
    std::os::unix::fs::symlink("/proc/self/mem", vocab_dir.join("hund.ogg")).unwrap();

    let mut entries = snapshot().entries().to_vec();
    entries.truncate(1);
    let generator = PackGenerator::new(cfg, Snapshot::new(entries), || {
        Ok::<_, SynthesisError>(StubEngine::new())
    });

    let err = generator.generate_pack_with_report("v1").unwrap_err();
    match err {
        PackError::CacheIo { path, .. } => assert_eq!(path, vocab_dir.join("hund.ogg")),
        other => panic!("unexpected error: {other}"),
    }
    let leftovers: Vec<PathBuf> = fs::read_dir(root.path().join("packs"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert!(leftovers.is_empty(), "{leftovers:?}");
}
