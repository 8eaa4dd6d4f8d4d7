//! Zip archive creation and inspection.

use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::time::UNIX_EPOCH;

use serde::Serialize;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::cache::AUDIO_EXTENSION;
use crate::error::PackError;

use super::assemble::MANIFEST_FILE;
use super::records::PackManifest;

/// Suffix of archives still being written.
pub(crate) const PARTIAL_SUFFIX: &str = ".zip.partial";

/// Zip the staging tree at `root` into `destination`.
///
/// The archive is written under a temporary name in the destination directory
/// and renamed into place only after it is complete, so `destination` never
/// holds a partial archive. Returns the archive size in bytes.
pub fn write_archive(root: &Path, destination: &Path) -> Result<u64, PackError> {
    let dir = destination.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = tempfile::Builder::new()
        .prefix(".")
        .suffix(PARTIAL_SUFFIX)
        .tempfile_in(dir)
        .map_err(PackError::archive_write(destination))?;

    let names = archive_entries(root)?;
    {
        let mut zip = ZipWriter::new(temp.as_file_mut());
        for name in &names {
            let method = if name.ends_with(&format!(".{AUDIO_EXTENSION}")) {
                // Vorbis does not compress further.
                CompressionMethod::Stored
            } else {
                CompressionMethod::Deflated
            };
            let options = SimpleFileOptions::default()
                .compression_method(method)
                .unix_permissions(0o644);
            zip.start_file(name.as_str(), options)?;

            let source = root.join(name);
            let mut file = File::open(&source).map_err(PackError::staging(&source))?;
            io::copy(&mut file, &mut zip).map_err(PackError::archive_write(destination))?;
        }
        zip.finish()?;
    }

    temp.as_file()
        .sync_all()
        .map_err(PackError::archive_write(destination))?;
    let size = temp
        .as_file()
        .metadata()
        .map_err(PackError::archive_write(destination))?
        .len();
    temp.persist(destination)
        .map_err(|e| PackError::ArchiveWrite {
            path: destination.to_path_buf(),
            source: e.error,
        })?;

    log::debug!("Wrote {} entries to {}", names.len(), destination.display());
    Ok(size)
}

/// Relative, `/`-separated names of every file under `root`: top-level files
/// (manifest, data) first, then the audio tree, each group sorted by name.
fn archive_entries(root: &Path) -> Result<Vec<String>, PackError> {
    let mut names = Vec::new();
    for item in WalkDir::new(root).sort_by_file_name() {
        let item = item.map_err(|e| PackError::Staging {
            path: e.path().unwrap_or(root).to_path_buf(),
            source: e.into(),
        })?;
        if !item.file_type().is_file() {
            continue;
        }
        let relative = item.path().strip_prefix(root).unwrap_or(item.path());
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        names.push(name);
    }
    names.sort_by(|a, b| (a.contains('/'), a).cmp(&(b.contains('/'), b)));
    Ok(names)
}

/// Read `manifest.json` back out of a finished pack.
pub fn read_manifest(archive: &Path) -> Result<PackManifest, PackError> {
    let file = File::open(archive).map_err(PackError::archive_read(archive))?;
    let mut zip = ZipArchive::new(file)?;
    let entry = zip.by_name(MANIFEST_FILE)?;
    Ok(serde_json::from_reader(entry)?)
}

/// Metadata of a pack file on disk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PackInfo {
    pub filename: String,
    pub size: u64,
    /// Modification time, seconds since the Unix epoch.
    pub created_at: f64,
}

/// The most recently modified `*.zip` in `dir`, if any.
pub fn latest_pack(dir: &Path) -> Result<Option<PackInfo>, PackError> {
    let listing = match fs::read_dir(dir) {
        Ok(listing) => listing,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(PackError::ArchiveRead { path: dir.to_path_buf(), source: e }),
    };

    let mut latest: Option<PackInfo> = None;
    for item in listing {
        let item = item.map_err(PackError::archive_read(dir))?;
        let path = item.path();
        if path.extension().and_then(|e| e.to_str()) != Some("zip") {
            continue;
        }
        let metadata = item.metadata().map_err(PackError::archive_read(&path))?;
        if !metadata.is_file() {
            continue;
        }
        let created_at = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();
        if latest.as_ref().is_some_and(|l| l.created_at >= created_at) {
            continue;
        }
        latest = Some(PackInfo {
            filename: item.file_name().to_string_lossy().into_owned(),
            size: metadata.len(),
            created_at,
        });
    }
    Ok(latest)
}
