//! Pack generation: Plan → Fill → Assemble.
//!
//! # Archive Layout
//!
//! ```text
//! deutschstart_<version>.zip
//! ├── manifest.json                    # {version, generated_at, item_count, format}
//! ├── vocabulary.json                  # one record per snapshot entry, snapshot order
//! └── audio/
//!     ├── vocab/<id>.ogg
//!     ├── sentences/<id>_sent_<n>.ogg
//!     └── english/<id>_en.ogg
//! ```
//!
//! A run never fails because of synthesis: missing audio is just left out of
//! the records. Cache, staging and archive I/O failures abort the run, and no
//! archive appears under its final name.

pub mod archive;
pub mod assemble;
pub mod plan;
pub mod records;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;

use crate::cache::{self, AudioCache, STALE_TEMP_AGE};
use crate::config::PackConfig;
use crate::error::PackError;
use crate::scheduler::{SynthesisScheduler, TaskOutcome};
use crate::snapshot::Snapshot;
use crate::EngineFactory;

pub use archive::{latest_pack, read_manifest, PackInfo};
pub use assemble::{MANIFEST_FILE, VOCABULARY_FILE};
pub use records::{ContentRecord, PackManifest, SentenceRecord};

const STAGING_PREFIX: &str = "staging-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Planning,
    Filling,
    Assembling,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Planning => "planning",
            Phase::Filling => "filling",
            Phase::Assembling => "assembling",
            Phase::Done => "done",
        })
    }
}

/// What a pack run did, including the audio that could not be produced.
#[derive(Debug, Clone)]
pub struct PackReport {
    pub archive_path: PathBuf,
    pub archive_size: u64,
    pub manifest: PackManifest,
    /// Tasks queued by the plan.
    pub planned: usize,
    pub synthesized: usize,
    /// Planned tasks whose file appeared before they ran.
    pub reused: usize,
    pub failed: Vec<TaskOutcome>,
}

impl PackReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Builds packs from a snapshot, a persistent audio cache and a synthesis engine.
pub struct PackGenerator<F> {
    config: PackConfig,
    snapshot: Snapshot,
    factory: F,
}

impl<F: EngineFactory> PackGenerator<F> {
    pub fn new(config: PackConfig, snapshot: Snapshot, factory: F) -> Self {
        Self {
            config,
            snapshot,
            factory,
        }
    }

    pub fn config(&self) -> &PackConfig {
        &self.config
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Generate the pack for `version_tag` and return the archive path.
    ///
    /// Succeeds even when some audio failed to synthesize; use
    /// [`PackGenerator::generate_pack_with_report`] to see which.
    pub fn generate_pack(&self, version_tag: &str) -> Result<PathBuf, PackError> {
        Ok(self.generate_pack_with_report(version_tag)?.archive_path)
    }

    pub fn generate_pack_with_report(&self, version_tag: &str) -> Result<PackReport, PackError> {
        validate_version_tag(version_tag)?;
        let output_dir = self.config.output_dir();
        fs::create_dir_all(output_dir).map_err(PackError::archive_write(output_dir))?;
        let swept = sweep_output_dir(output_dir, STALE_TEMP_AGE);
        if swept > 0 {
            log::info!("Removed {swept} abandoned staging trees and partial archives");
        }
        let cache = AudioCache::open(self.config.cache_dir())?;

        enter(version_tag, Phase::Planning);
        let tasks = plan::plan(&self.snapshot, &cache);
        log::info!(
            "Planned {} synthesis tasks for {} entries",
            tasks.len(),
            self.snapshot.len()
        );

        let outcomes = if tasks.is_empty() {
            log::info!("Audio cache is complete; skipping synthesis");
            Vec::new()
        } else {
            enter(version_tag, Phase::Filling);
            SynthesisScheduler::new(&cache, &self.factory, self.config.workers()).run(&tasks)?
        };

        let mut failed = Vec::new();
        let (mut synthesized, mut reused) = (0, 0);
        for outcome in outcomes {
            if !outcome.success {
                log::error!(
                    "Audio generation failed for {}: {}",
                    outcome.target.display(),
                    outcome.detail
                );
                failed.push(outcome);
            } else if outcome.reused {
                reused += 1;
            } else {
                synthesized += 1;
            }
        }
        if !tasks.is_empty() {
            log::info!(
                "Synthesis finished: {synthesized} synthesized, {reused} reused, {} failed",
                failed.len()
            );
        }

        enter(version_tag, Phase::Assembling);
        let manifest = PackManifest {
            version: version_tag.to_string(),
            generated_at: Utc::now().timestamp(),
            item_count: self.snapshot.len(),
            format: self.config.format_version().to_string(),
        };
        let archive_path = self.config.archive_path(version_tag);
        let archive_size = self.assemble(&cache, &manifest, &archive_path)?;
        log::info!(
            "Pack {} written ({archive_size} bytes, {} entries)",
            archive_path.display(),
            manifest.item_count
        );

        enter(version_tag, Phase::Done);
        Ok(PackReport {
            archive_path,
            archive_size,
            manifest,
            planned: tasks.len(),
            synthesized,
            reused,
            failed,
        })
    }

    fn assemble(
        &self,
        cache: &AudioCache,
        manifest: &PackManifest,
        archive_path: &Path,
    ) -> Result<u64, PackError> {
        let output_dir = self.config.output_dir();
        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(output_dir)
            .map_err(PackError::staging(output_dir))?;

        let records = assemble::stage_entries(&self.snapshot, cache, staging.path())?;
        assemble::write_json(&staging.path().join(VOCABULARY_FILE), &records)?;
        assemble::write_json(&staging.path().join(MANIFEST_FILE), manifest)?;
        let size = archive::write_archive(staging.path(), archive_path)?;

        let staging_path = staging.path().to_path_buf();
        if let Err(e) = staging.close() {
            log::warn!("Failed to remove staging tree {}: {e}", staging_path.display());
        }
        Ok(size)
    }
}

/// Staging trees and partial archives left in `dir` by runs that died.
fn sweep_output_dir(dir: &Path, max_age: Duration) -> usize {
    cache::remove_stale(dir, max_age, |name| {
        name.starts_with(STAGING_PREFIX)
            || (name.starts_with('.') && name.ends_with(archive::PARTIAL_SUFFIX))
    })
}

fn enter(version_tag: &str, phase: Phase) {
    log::info!("Pack {version_tag}: {phase}");
}

/// Version tags become part of the archive file name; keep them boring.
pub fn validate_version_tag(tag: &str) -> Result<(), PackError> {
    let mut chars = tag.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphanumeric())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(PackError::InvalidVersionTag(tag.to_string()))
    }
}
