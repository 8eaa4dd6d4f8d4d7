//! Command-line front end for building and inspecting vocabulary packs.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand};

use vocab_pack::engines::piper::{PiperConfig, PiperFactory, VoiceParams};
use vocab_pack::engines::stub::StubEngine;
use vocab_pack::{
    pack, AudioCache, EngineFactory, PackConfig, PackConfigBuilder, PackError, PackGenerator,
    PackReport, Snapshot, SynthesisError,
};

/// Build offline vocabulary packs with cached speech audio
#[derive(Parser)]
#[command(name = "vocab-pack", version, arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Synthesize missing audio and write a new pack archive
    Generate {
        /// Vocabulary snapshot (JSON array of entries)
        #[arg(long, env = "VOCAB_PACK_SNAPSHOT")]
        snapshot: PathBuf,

        /// Version tag written to the manifest and the archive name
        #[arg(long, default_value = "v1")]
        version_tag: String,

        #[command(flatten)]
        dirs: DirArgs,

        /// Number of parallel synthesis workers (default: available CPUs)
        #[arg(long, env = "VOCAB_PACK_WORKERS")]
        workers: Option<usize>,

        /// Write placeholder audio instead of running piper
        #[arg(long)]
        dry_run: bool,

        #[command(flatten)]
        piper: PiperArgs,
    },

    /// Show the newest pack in the output directory
    Latest {
        #[command(flatten)]
        dirs: DirArgs,
    },

    /// Print the manifest of a pack archive
    Manifest {
        archive: PathBuf,
    },

    /// Delete cached audio of entries so the next run re-synthesizes it
    Invalidate {
        #[arg(long, env = "VOCAB_PACK_SNAPSHOT")]
        snapshot: PathBuf,

        #[command(flatten)]
        dirs: DirArgs,

        /// Entry ids to invalidate
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Count cached audio files per kind
    Stats {
        #[command(flatten)]
        dirs: DirArgs,
    },
}

#[derive(Args)]
struct DirArgs {
    /// Directory receiving pack archives
    #[arg(long, env = "VOCAB_PACK_OUTPUT_DIR", default_value = "data/processed/packs")]
    output_dir: PathBuf,

    /// Persistent audio cache (default: <output-dir>/../audio_cache)
    #[arg(long, env = "VOCAB_PACK_CACHE_DIR")]
    cache_dir: Option<PathBuf>,
}

impl DirArgs {
    fn config(&self, workers: Option<usize>) -> Result<PackConfig, PackError> {
        let mut builder = PackConfigBuilder::default();
        builder.output_dir(&self.output_dir);
        if let Some(cache_dir) = &self.cache_dir {
            builder.cache_dir(cache_dir);
        }
        if let Some(workers) = workers {
            builder.workers(workers);
        }
        Ok(builder.build()?)
    }
}

#[derive(Args)]
struct PiperArgs {
    /// piper executable (default: `piper` or `piper-tts` on PATH)
    #[arg(long, env = "PIPER_BINARY")]
    piper_binary: Option<PathBuf>,

    /// ffmpeg executable (default: `ffmpeg` on PATH)
    #[arg(long, env = "FFMPEG_BINARY")]
    ffmpeg_binary: Option<PathBuf>,

    /// German voice model
    #[arg(long, env = "PIPER_GERMAN_MODEL", default_value = "piper-voices/de_DE-thorsten-high.onnx")]
    german_model: PathBuf,

    /// English voice model
    #[arg(long, env = "PIPER_ENGLISH_MODEL", default_value = "piper-voices/en_US-lessac-medium.onnx")]
    english_model: PathBuf,

    /// Per-process timeout in seconds (0 disables it)
    #[arg(long, default_value = "120")]
    synthesis_timeout: u64,
}

impl PiperArgs {
    fn config(&self) -> PiperConfig {
        PiperConfig {
            piper_binary: self.piper_binary.clone(),
            ffmpeg_binary: self.ffmpeg_binary.clone(),
            german: VoiceParams::german(&self.german_model),
            english: VoiceParams::english(&self.english_model),
            timeout: (self.synthesis_timeout > 0)
                .then(|| Duration::from_secs(self.synthesis_timeout)),
            ..Default::default()
        }
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Generate {
            snapshot,
            version_tag,
            dirs,
            workers,
            dry_run,
            piper,
        } => {
            let snapshot = Snapshot::from_json_file(&snapshot)?;
            let config = dirs.config(workers)?;
            let report = if dry_run {
                generate(config, snapshot, || Ok::<_, SynthesisError>(StubEngine::new()), &version_tag)?
            } else {
                generate(config, snapshot, PiperFactory::new(piper.config()), &version_tag)?
            };
            print_report(&report);
        }
        Command::Latest { dirs } => match pack::latest_pack(&dirs.output_dir)? {
            Some(info) => println!("{}", serde_json::to_string_pretty(&info)?),
            None => return Err(format!("no packs found in {}", dirs.output_dir.display()).into()),
        },
        Command::Manifest { archive } => {
            let manifest = pack::read_manifest(&archive)?;
            println!("{}", serde_json::to_string_pretty(&manifest)?);
        }
        Command::Invalidate {
            snapshot,
            dirs,
            ids,
        } => {
            let snapshot = Snapshot::from_json_file(&snapshot)?;
            let cache = AudioCache::open(dirs.config(None)?.cache_dir())?;
            let mut removed = 0;
            for id in &ids {
                match snapshot.find(id) {
                    Some(entry) => removed += cache.invalidate(entry)?,
                    None => log::warn!("No entry with id {id:?} in snapshot"),
                }
            }
            println!("Removed {removed} cached audio files");
        }
        Command::Stats { dirs } => {
            let cache_dir = dirs.config(None)?.cache_dir();
            let stats = AudioCache::open(&cache_dir)?.stats()?;
            println!("Audio cache {}", cache_dir.display());
            println!("  headwords:    {}", stats.headwords);
            println!("  sentences:    {}", stats.sentences);
            println!("  translations: {}", stats.translations);
            println!("  total:        {}", stats.total());
        }
    }
    Ok(())
}

fn generate<F: EngineFactory>(
    config: PackConfig,
    snapshot: Snapshot,
    factory: F,
    version_tag: &str,
) -> Result<PackReport, Box<dyn std::error::Error>> {
    let started = Instant::now();
    let report = PackGenerator::new(config, snapshot, factory).generate_pack_with_report(version_tag)?;
    log::info!("Pack generation took {:.2?}", started.elapsed());
    Ok(report)
}

fn print_report(report: &PackReport) {
    println!("{}", report.archive_path.display());
    println!(
        "{} entries, {} planned, {} synthesized, {} already present, {} failed",
        report.manifest.item_count,
        report.planned,
        report.synthesized,
        report.reused,
        report.failed.len()
    );
    for failure in &report.failed {
        println!("  failed: {} ({})", failure.target.display(), failure.detail);
    }
}
