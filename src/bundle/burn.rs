// src/bundle/burn.rs

//! Bundle executable layout
//!
//! A bundle is the engine stub followed by the UX container, the attached
//! containers and a trailer (the burn section) describing them:
//!
//! ```text
//! magic[8] version:u32 stub_size:u64 code_len:u16 code[code_len]
//! count:u32 size:u64*count trailer_len:u32
//! ```
//!
//! All integers are little-endian. `trailer_len` covers the whole trailer
//! including itself, so a reader can find the section from the file end.

use crate::error::{Error, Result};
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const BURN_SECTION_MAGIC: [u8; 8] = *b"WIXBURN\0";
pub const BURN_SECTION_VERSION: u32 = 2;

/// Largest trailer a reader accepts
const MAX_TRAILER_LEN: u32 = 1 << 20;

/// Parsed burn section of a bundle executable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BurnSection {
    pub format_version: u32,
    pub stub_size: u64,
    pub bundle_code: String,
    /// UX container first, then attached containers by index
    pub container_sizes: Vec<u64>,
}

impl BurnSection {
    fn to_bytes(&self) -> Result<Vec<u8>> {
        let code = self.bundle_code.as_bytes();
        let code_len = u16::try_from(code.len())
            .map_err(|_| Error::ParseError("Bundle code too long".to_string()))?;
        let count = u32::try_from(self.container_sizes.len())
            .map_err(|_| Error::ParseError("Too many containers".to_string()))?;

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&BURN_SECTION_MAGIC);
        bytes.extend_from_slice(&self.format_version.to_le_bytes());
        bytes.extend_from_slice(&self.stub_size.to_le_bytes());
        bytes.extend_from_slice(&code_len.to_le_bytes());
        bytes.extend_from_slice(code);
        bytes.extend_from_slice(&count.to_le_bytes());
        for size in &self.container_sizes {
            bytes.extend_from_slice(&size.to_le_bytes());
        }
        let total = u32::try_from(bytes.len() + 4)
            .map_err(|_| Error::ParseError("Burn section too large".to_string()))?;
        bytes.extend_from_slice(&total.to_le_bytes());
        Ok(bytes)
    }

    fn parse(bytes: &[u8]) -> Result<Self> {
        let mut cursor = Cursor { bytes, pos: 0 };
        if cursor.take(8)? != BURN_SECTION_MAGIC {
            return Err(Error::ParseError("Not a bundle: burn section magic missing".into()));
        }
        let format_version = u32::from_le_bytes(cursor.array()?);
        let stub_size = u64::from_le_bytes(cursor.array()?);
        let code_len = u16::from_le_bytes(cursor.array()?) as usize;
        let bundle_code = String::from_utf8(cursor.take(code_len)?.to_vec())
            .map_err(|e| Error::ParseError(format!("Bundle code: {e}")))?;
        let count = u32::from_le_bytes(cursor.array()?) as usize;
        let mut container_sizes = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            container_sizes.push(u64::from_le_bytes(cursor.array()?));
        }
        Ok(Self {
            format_version,
            stub_size,
            bundle_code,
            container_sizes,
        })
    }

    /// Read the burn section from the end of a bundle
    pub fn read(path: &Path) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| Error::IoError(format!("Failed to open {}: {}", path.display(), e)))?;
        let length = file.metadata()?.len();
        if length < 4 {
            return Err(Error::ParseError(format!("{} is not a bundle", path.display())));
        }

        file.seek(SeekFrom::End(-4))?;
        let mut word = [0u8; 4];
        file.read_exact(&mut word)?;
        let trailer_len = u32::from_le_bytes(word);
        if trailer_len > MAX_TRAILER_LEN || u64::from(trailer_len) > length {
            return Err(Error::ParseError(format!(
                "{} has an invalid burn section length {}",
                path.display(),
                trailer_len
            )));
        }

        file.seek(SeekFrom::End(-i64::from(trailer_len)))?;
        let mut trailer = vec![0u8; trailer_len as usize];
        file.read_exact(&mut trailer)?;
        Self::parse(&trailer)
    }

    /// Byte offset of a container inside the bundle
    pub fn container_offset(&self, index: usize) -> Option<u64> {
        (index < self.container_sizes.len())
            .then(|| self.stub_size + self.container_sizes[..index].iter().sum::<u64>())
    }

    /// Copy one container out of the bundle
    pub fn read_container(&self, path: &Path, index: usize) -> Result<Vec<u8>> {
        let offset = self
            .container_offset(index)
            .ok_or_else(|| Error::NotFound(format!("Container {} in {}", index, path.display())))?;
        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut data = Vec::new();
        file.take(self.container_sizes[index]).read_to_end(&mut data)?;
        Ok(data)
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| Error::ParseError("Truncated burn section".to_string()))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }
}

/// Compose stub, UX container and attached containers into a bundle
pub fn write_bundle(
    output: &Path,
    stub: Option<&Path>,
    bundle_code: &str,
    containers: &[PathBuf],
) -> Result<BurnSection> {
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(output)?);

    let stub_size = match stub {
        Some(stub) => {
            let mut input = File::open(stub).map_err(|e| {
                Error::IoError(format!("Failed to open engine stub {}: {}", stub.display(), e))
            })?;
            io::copy(&mut input, &mut writer)?
        }
        None => {
            warn!("No engine stub configured; {} will not be executable", output.display());
            0
        }
    };

    let mut container_sizes = Vec::with_capacity(containers.len());
    for container in containers {
        let mut input = File::open(container)?;
        let size = io::copy(&mut input, &mut writer)?;
        debug!("Attached {} ({} bytes)", container.display(), size);
        container_sizes.push(size);
    }

    let section = BurnSection {
        format_version: BURN_SECTION_VERSION,
        stub_size,
        bundle_code: bundle_code.to_string(),
        container_sizes,
    };
    writer.write_all(&section.to_bytes()?)?;
    writer.flush()?;

    info!(
        "Wrote bundle {} ({} containers)",
        output.display(),
        section.container_sizes.len()
    );
    Ok(section)
}
