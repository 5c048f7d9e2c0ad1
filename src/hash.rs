// src/hash.rs

//! Hashing for payloads, containers and cache ids
//!
//! - **SHA-512**: payload and container integrity, written into the burn
//!   manifest as upper-case hex
//! - **SHA-256**: short content identifiers (cache ids of EXE/MSU packages)

use crate::error::{Error, Result};
use sha2::{Digest, Sha256, Sha512};
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use std::str::FromStr;

/// Hash algorithm selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HashAlgorithm {
    Sha256,
    /// Algorithm of every hash the bundle engine verifies
    #[default]
    Sha512,
}

impl HashAlgorithm {
    /// Hash output length in bytes
    #[inline]
    pub const fn output_len(&self) -> usize {
        match self {
            Self::Sha256 => 32,
            Self::Sha512 => 64,
        }
    }

    #[inline]
    pub const fn hex_len(&self) -> usize {
        self.output_len() * 2
    }

    #[inline]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(Self::Sha256),
            "sha512" | "sha-512" => Ok(Self::Sha512),
            _ => Err(Error::ParseError(format!("unknown hash algorithm: {s}"))),
        }
    }
}

/// A hash value with its algorithm
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileHash {
    pub algorithm: HashAlgorithm,
    /// Lower-case hex digest
    pub value: String,
}

impl FileHash {
    /// Validate and wrap a hex digest
    pub fn new(algorithm: HashAlgorithm, value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.len() != algorithm.hex_len() {
            return Err(Error::ParseError(format!(
                "invalid {} length: expected {}, got {}",
                algorithm,
                algorithm.hex_len(),
                value.len()
            )));
        }
        if !value.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::ParseError(format!("invalid hex in hash: {value}")));
        }
        Ok(Self {
            algorithm,
            value: value.to_lowercase(),
        })
    }

    /// Upper-case form used in manifests
    pub fn to_manifest_string(&self) -> String {
        self.value.to_uppercase()
    }
}

impl fmt::Display for FileHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// Incremental hasher over any supported algorithm
pub struct Hasher {
    algorithm: HashAlgorithm,
    state: HasherState,
}

enum HasherState {
    Sha256(Sha256),
    Sha512(Sha512),
}

impl Hasher {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        let state = match algorithm {
            HashAlgorithm::Sha256 => HasherState::Sha256(Sha256::new()),
            HashAlgorithm::Sha512 => HasherState::Sha512(Sha512::new()),
        };
        Self { algorithm, state }
    }

    pub fn update(&mut self, data: &[u8]) {
        match &mut self.state {
            HasherState::Sha256(hasher) => hasher.update(data),
            HasherState::Sha512(hasher) => hasher.update(data),
        }
    }

    pub fn finalize(self) -> FileHash {
        let value = match self.state {
            HasherState::Sha256(hasher) => hex::encode(hasher.finalize()),
            HasherState::Sha512(hasher) => hex::encode(hasher.finalize()),
        };
        FileHash {
            algorithm: self.algorithm,
            value,
        }
    }
}

/// Hash a byte slice
pub fn hash_bytes(algorithm: HashAlgorithm, data: &[u8]) -> FileHash {
    let mut hasher = Hasher::new(algorithm);
    hasher.update(data);
    hasher.finalize()
}

/// Hash everything a reader yields, returning the digest and byte count
pub fn hash_reader<R: Read>(algorithm: HashAlgorithm, reader: &mut R) -> io::Result<(FileHash, u64)> {
    let mut hasher = Hasher::new(algorithm);
    let mut buffer = [0u8; 8192];
    let mut total = 0u64;

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        total += n as u64;
        hasher.update(&buffer[..n]);
    }

    Ok((hasher.finalize(), total))
}

/// Hash a file without loading it into memory, returning digest and size
pub fn hash_file(algorithm: HashAlgorithm, path: &Path) -> Result<(FileHash, u64)> {
    let file = File::open(path)
        .map_err(|e| Error::IoError(format!("Failed to open {}: {}", path.display(), e)))?;
    let mut reader = BufReader::new(file);
    Ok(hash_reader(algorithm, &mut reader)?)
}

/// SHA-256 of a byte slice as lower-case hex
#[inline]
pub fn sha256(data: &[u8]) -> String {
    hash_bytes(HashAlgorithm::Sha256, data).value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_value() {
        assert_eq!(
            sha256(b"Hello, World!"),
            "dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f"
        );
    }

    #[test]
    fn test_sha512_length_and_manifest_form() {
        let hash = hash_bytes(HashAlgorithm::Sha512, b"payload");
        assert_eq!(hash.value.len(), 128);
        let manifest = hash.to_manifest_string();
        assert!(manifest.chars().all(|c| !c.is_ascii_lowercase()));
    }

    #[test]
    fn test_incremental_matches_one_shot() {
        let mut hasher = Hasher::new(HashAlgorithm::Sha512);
        hasher.update(b"Hello, ");
        hasher.update(b"World!");
        assert_eq!(
            hasher.finalize(),
            hash_bytes(HashAlgorithm::Sha512, b"Hello, World!")
        );
    }

    #[test]
    fn test_hash_file_reports_size() {
        let temp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(temp.path(), b"hello world").unwrap();
        let (hash, size) = hash_file(HashAlgorithm::Sha256, temp.path()).unwrap();
        assert_eq!(size, 11);
        assert_eq!(
            hash.value,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_validation() {
        assert!(FileHash::new(HashAlgorithm::Sha256, "abc").is_err());
        assert!(FileHash::new(HashAlgorithm::Sha256, "g".repeat(64)).is_err());
        assert!("sha512".parse::<HashAlgorithm>().is_ok());
        assert!("md5".parse::<HashAlgorithm>().is_err());
    }
}
