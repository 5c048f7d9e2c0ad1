// src/bundle/wixout.rs

//! Structured bind output
//!
//! A wixout is a plain tar archive holding the bound intermediate as
//! `wix-ir.json` plus one entry per named data stream (the manifests).

use crate::data::Intermediate;
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Read};
use std::path::Path;
use tar::{Archive, Builder, EntryType, Header};
use tracing::debug;

pub const INTERMEDIATE_ENTRY: &str = "wix-ir.json";

/// Contents of a wixout read back from disk
#[derive(Debug, Clone)]
pub struct WixOutput {
    pub intermediate: Intermediate,
    /// Data streams by entry name
    pub streams: BTreeMap<String, String>,
}

fn append(archive: &mut Builder<BufWriter<File>>, name: &str, data: &[u8]) -> Result<()> {
    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Regular);
    header.set_mode(0o644);
    header.set_size(data.len() as u64);
    header.set_mtime(0);
    header.set_cksum();
    archive.append_data(&mut header, name, data)?;
    Ok(())
}

/// Write the intermediate and the named streams to `path`
pub fn write_wixout(path: &Path, intermediate: &Intermediate, streams: &[(&str, &str)]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut archive = Builder::new(BufWriter::new(File::create(path)?));
    append(&mut archive, INTERMEDIATE_ENTRY, intermediate.to_json()?.as_bytes())?;
    for (name, data) in streams {
        append(&mut archive, name, data.as_bytes())?;
    }
    archive
        .into_inner()?
        .into_inner()
        .map_err(|e| Error::IoError(e.to_string()))?;
    debug!("Wrote wixout {} ({} streams)", path.display(), streams.len());
    Ok(())
}

pub fn read_wixout(path: &Path) -> Result<WixOutput> {
    let file = File::open(path)
        .map_err(|e| Error::IoError(format!("Failed to open {}: {}", path.display(), e)))?;
    let mut archive = Archive::new(file);
    let mut intermediate = None;
    let mut streams = BTreeMap::new();

    for entry in archive.entries()? {
        let mut entry = entry?;
        let name = entry.path()?.to_string_lossy().into_owned();
        let mut content = String::new();
        entry.read_to_string(&mut content)?;
        if name == INTERMEDIATE_ENTRY {
            intermediate = Some(Intermediate::parse(&content)?);
        } else {
            streams.insert(name, content);
        }
    }

    let intermediate = intermediate.ok_or_else(|| {
        Error::ParseError(format!("{} has no {}", path.display(), INTERMEDIATE_ENTRY))
    })?;
    Ok(WixOutput {
        intermediate,
        streams,
    })
}

/// Write the debug symbol file: the bound intermediate with source lines
pub fn write_pdb(path: &Path, intermediate: &Intermediate) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, intermediate.to_json()?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{IntermediateSection, SectionType};
    use tempfile::TempDir;

    #[test]
    fn test_wixout_keeps_streams() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out").join("bundle.wixout");
        let intermediate = Intermediate::new(
            "bundle",
            vec![IntermediateSection::new("b", SectionType::Bundle)],
        );

        write_wixout(
            &path,
            &intermediate,
            &[("burn-manifest.xml", "<BurnManifest/>"), ("ba-manifest.xml", "<BA/>")],
        )
        .unwrap();

        let output = read_wixout(&path).unwrap();
        assert_eq!(output.intermediate.id, "bundle");
        assert_eq!(output.intermediate.sections.len(), 1);
        assert_eq!(output.streams["burn-manifest.xml"], "<BurnManifest/>");
        assert_eq!(output.streams.len(), 2);
    }

    #[test]
    fn test_archive_without_intermediate_is_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("empty.wixout");
        let mut archive = Builder::new(BufWriter::new(File::create(&path).unwrap()));
        append(&mut archive, "burn-manifest.xml", b"<x/>").unwrap();
        archive.into_inner().unwrap().into_inner().unwrap();

        assert!(matches!(read_wixout(&path), Err(Error::ParseError(_))));
    }
}
