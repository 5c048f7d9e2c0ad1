// src/config.rs

//! Bind configuration
//!
//! Options are read from a `wixbind.toml` file; every field has a default so
//! an empty file (or no file) is valid. Command-line flags override the file.

use crate::error::{Error, Result};
use crate::msi::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Conventional configuration file name
pub const CONFIG_FILE_NAME: &str = "wixbind.toml";

/// Compression applied to cabinets and containers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompressionLevel {
    None,
    Low,
    #[default]
    Medium,
    High,
}

impl CompressionLevel {
    /// Equivalent gzip level
    pub fn gzip_level(&self) -> u32 {
        match self {
            Self::None => 0,
            Self::Low => 1,
            Self::Medium => 6,
            Self::High => 9,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "none" => Some(Self::None),
            "low" => Some(Self::Low),
            "medium" | "mszip" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

impl std::fmt::Display for CompressionLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Options shared by the binders and unbinders
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindOptions {
    /// Scratch folder for extracted files, manifests and containers
    #[serde(default = "default_intermediate_folder")]
    pub intermediate_folder: PathBuf,

    /// Worker threads used when packing containers
    #[serde(default = "default_thread_count")]
    pub thread_count: usize,

    #[serde(default)]
    pub default_compression: CompressionLevel,

    #[serde(default)]
    pub commit_retry: RetryPolicy,

    /// Skip `_Validation` generation and column checks
    #[serde(default)]
    pub suppress_validation: bool,

    /// Bundle engine stub the output executable starts with
    #[serde(default)]
    pub stub_path: Option<PathBuf>,

    /// Where to write debug symbols next to the wixout
    #[serde(default)]
    pub pdb_output: Option<PathBuf>,

    /// Codepage for databases that do not set one
    #[serde(default)]
    pub default_codepage: i32,

    #[serde(default)]
    pub suppress_demodularization: bool,

    /// Extract cabinets when unbinding
    #[serde(default = "default_true")]
    pub extract_cabinets: bool,

    /// Unbind assuming an administrative image layout
    #[serde(default)]
    pub admin_image: bool,

    #[serde(default)]
    pub warnings_as_errors: bool,
}

impl Default for BindOptions {
    fn default() -> Self {
        Self {
            intermediate_folder: default_intermediate_folder(),
            thread_count: default_thread_count(),
            default_compression: CompressionLevel::default(),
            commit_retry: RetryPolicy::default(),
            suppress_validation: false,
            stub_path: None,
            pdb_output: None,
            default_codepage: 0,
            suppress_demodularization: false,
            extract_cabinets: true,
            admin_image: false,
            warnings_as_errors: false,
        }
    }
}

fn default_intermediate_folder() -> PathBuf {
    PathBuf::from("obj")
}

fn default_thread_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn default_true() -> bool {
    true
}

impl BindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load options from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::ConfigError(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let options: BindOptions = toml::from_str(&content)?;
        options.validate()?;
        debug!("Loaded bind options from {}", path.display());
        Ok(options)
    }

    /// Load `wixbind.toml` from `dir` when present, else defaults
    pub fn discover(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE_NAME);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.thread_count == 0 {
            return Err(Error::ConfigError("thread_count must be at least 1".into()));
        }
        if self.commit_retry.attempts == 0 {
            return Err(Error::ConfigError(
                "commit_retry.attempts must be at least 1".into(),
            ));
        }
        if !(0..=65535).contains(&self.default_codepage) {
            return Err(Error::ConfigError(format!(
                "default_codepage {} is out of range",
                self.default_codepage
            )));
        }
        Ok(())
    }
}
