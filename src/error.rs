use std::path::PathBuf;
use std::time::Duration;

/// Failure of a single synthesis call.
///
/// These never abort a pack run: the scheduler records them and the affected
/// audio reference is left out of the pack.
#[derive(thiserror::Error, Debug)]
pub enum SynthesisError {
    #[error("Text cannot be empty")]
    EmptyText,
    #[error("Synthesis engine unavailable: {0}")]
    EngineUnavailable(String),
    #[error("Synthesis process failed: {0}")]
    ProcessFailed(String),
    #[error("Synthesis timed out after {0:?}")]
    Timeout(Duration),
    #[error("Invalid audio output: {0}")]
    InvalidAudio(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fatal failure of a pack run. No archive is produced when one of these is returned.
#[derive(thiserror::Error, Debug)]
pub enum PackError {
    #[error("Invalid version tag {0:?}: use letters, digits, '.', '_' or '-'")]
    InvalidVersionTag(String),
    #[error("Audio cache I/O failed at {}: {source}", .path.display())]
    CacheIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Staging I/O failed at {}: {source}", .path.display())]
    Staging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to write archive {}: {source}", .path.display())]
    ArchiveWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to read archive {}: {source}", .path.display())]
    ArchiveRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Failed to start synthesis workers: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
    #[error("Invalid vocabulary snapshot: {0}")]
    Snapshot(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl PackError {
    pub(crate) fn cache_io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| PackError::CacheIo { path, source }
    }

    pub(crate) fn staging(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| PackError::Staging { path, source }
    }

    pub(crate) fn archive_write(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| PackError::ArchiveWrite { path, source }
    }

    pub(crate) fn archive_read(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| PackError::ArchiveRead { path, source }
    }
}
