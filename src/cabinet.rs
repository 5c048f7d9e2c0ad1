// src/cabinet.rs

//! Cabinet and container archives
//!
//! Cabinets and bundle containers are gzip-compressed tar archives with one
//! flat entry per file, named by file id or embedded payload id. Entry
//! timestamps are normalized so identical inputs produce identical archives.

use crate::config::CompressionLevel;
use crate::error::{Error, Result};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fs::{self, File};
use std::io::{BufWriter, Read};
use std::path::{Path, PathBuf};
use tar::{Archive, Builder, EntryType, Header};
use tracing::debug;

/// Timestamp written into every entry unless `SOURCE_DATE_EPOCH` is set
const DEFAULT_MTIME: u64 = 1704067200;

/// One file to place in a cabinet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CabinetEntry {
    /// Name inside the cabinet
    pub name: String,
    pub source: PathBuf,
}

impl CabinetEntry {
    pub fn new(name: impl Into<String>, source: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
        }
    }
}

fn check_entry_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
    {
        return Err(Error::InvalidPath(format!("Invalid cabinet entry name: {name:?}")));
    }
    Ok(())
}

fn entry_mtime() -> u64 {
    std::env::var("SOURCE_DATE_EPOCH")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(DEFAULT_MTIME)
}

/// Write a cabinet and return its size in bytes
pub fn create_cabinet(path: &Path, entries: &[CabinetEntry], level: CompressionLevel) -> Result<u64> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let output = BufWriter::new(File::create(path)?);
    let encoder = GzEncoder::new(output, Compression::new(level.gzip_level()));
    let mut archive = Builder::new(encoder);
    let mtime = entry_mtime();

    for entry in entries {
        check_entry_name(&entry.name)?;
        let mut file = File::open(&entry.source).map_err(|e| {
            Error::IoError(format!("Failed to open {}: {}", entry.source.display(), e))
        })?;
        let size = file.metadata()?.len();

        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_mode(0o644);
        header.set_size(size);
        header.set_mtime(mtime);
        header.set_cksum();
        archive.append_data(&mut header, &entry.name, &mut file)?;
    }

    let encoder = archive.into_inner()?;
    encoder.finish()?.into_inner().map_err(|e| Error::IoError(e.to_string()))?;

    let size = fs::metadata(path)?.len();
    debug!("Created cabinet {} ({} files, {} bytes)", path.display(), entries.len(), size);
    Ok(size)
}

/// Extract every entry of a cabinet read from `reader` into `folder`
pub fn extract_from_reader<R: Read>(reader: R, folder: &Path) -> Result<Vec<String>> {
    fs::create_dir_all(folder)?;
    let mut archive = Archive::new(GzDecoder::new(reader));
    let mut names = Vec::new();

    for entry in archive.entries()? {
        let mut entry = entry?;
        if entry.header().entry_type() != EntryType::Regular {
            continue;
        }
        let name = entry.path()?.to_string_lossy().into_owned();
        check_entry_name(&name)?;
        let mut output = File::create(folder.join(&name))?;
        std::io::copy(&mut entry, &mut output)?;
        names.push(name);
    }
    Ok(names)
}

/// Extract a cabinet file into `folder`, returning the entry names
pub fn extract_cabinet(cabinet: &Path, folder: &Path) -> Result<Vec<String>> {
    let file = File::open(cabinet)
        .map_err(|e| Error::IoError(format!("Failed to open {}: {}", cabinet.display(), e)))?;
    let names = extract_from_reader(file, folder)?;
    debug!("Extracted {} files from {}", names.len(), cabinet.display());
    Ok(names)
}

/// Names and sizes of the entries in a cabinet
pub fn list_cabinet(cabinet: &Path) -> Result<Vec<(String, u64)>> {
    let file = File::open(cabinet)?;
    let mut archive = Archive::new(GzDecoder::new(file));
    let mut entries = Vec::new();
    for entry in archive.entries()? {
        let entry = entry?;
        let name = entry.path()?.to_string_lossy().into_owned();
        entries.push((name, entry.header().size()?));
    }
    Ok(entries)
}
