use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use derive_builder::Builder;

use crate::error::PackError;

/// File name prefix of generated archives (`<prefix>_<version>.zip`).
pub const DEFAULT_ARCHIVE_PREFIX: &str = "deutschstart";

/// Value of `manifest.format`; bumped when the archive layout changes.
pub const PACK_FORMAT_VERSION: &str = "1.0";

/// Where and how a pack is generated.
///
/// ```rust
/// use vocab_pack::PackConfigBuilder;
///
/// let config = PackConfigBuilder::default()
///     .output_dir("/srv/packs")
///     .workers(4usize)
///     .build()?;
/// assert_eq!(config.cache_dir(), std::path::Path::new("/srv/audio_cache"));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, Builder)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct PackConfig {
    /// Directory receiving finished archives. Created on demand.
    #[builder(setter(into))]
    output_dir: PathBuf,
    /// Persistent audio cache. Defaults to `audio_cache` next to `output_dir`.
    #[builder(default, setter(into, strip_option))]
    cache_dir: Option<PathBuf>,
    /// Synthesis worker count. Defaults to the available parallelism.
    #[builder(default, setter(into, strip_option))]
    workers: Option<usize>,
    #[builder(default = "DEFAULT_ARCHIVE_PREFIX.to_string()", setter(into))]
    archive_prefix: String,
    #[builder(default = "PACK_FORMAT_VERSION.to_string()", setter(into))]
    format_version: String,
}

impl PackConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(Some(0)) = self.workers {
            return Err("workers must be at least 1".to_string());
        }
        if let Some(prefix) = &self.archive_prefix {
            if prefix.is_empty() || prefix.contains(['/', '\\']) {
                return Err(format!("invalid archive prefix {prefix:?}"));
            }
        }
        Ok(())
    }
}

impl PackConfig {
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn cache_dir(&self) -> PathBuf {
        match &self.cache_dir {
            Some(dir) => dir.clone(),
            None => self
                .output_dir
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join("audio_cache"),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers.unwrap_or_else(default_workers)
    }

    pub fn archive_prefix(&self) -> &str {
        &self.archive_prefix
    }

    pub fn format_version(&self) -> &str {
        &self.format_version
    }

    /// Final archive location for a version tag.
    pub fn archive_path(&self, version_tag: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}_{}.zip", self.archive_prefix, version_tag))
    }
}

impl From<PackConfigBuilderError> for PackError {
    fn from(e: PackConfigBuilderError) -> Self {
        PackError::Config(e.to_string())
    }
}

/// Worker count matching the machine's processing capacity.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}
