// src/bundle/version.rs

//! Bundle version parsing
//!
//! Bundle versions have one to four numeric parts, each fitting in 32 bits,
//! optionally followed by `-prerelease` and `+metadata` labels validated
//! with semver's identifier rules. A leading `v` or `V` is accepted and
//! dropped.

use semver::{BuildMetadata, Prerelease};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur when parsing a bundle version
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VersionError {
    #[error("Version is empty")]
    Empty,

    #[error("Version '{0}' has more than four parts")]
    TooManyParts(String),

    #[error("Version part '{part}' of '{version}' is not a 32-bit number")]
    InvalidPart { version: String, part: String },

    #[error("Invalid label in version '{version}': {message}")]
    InvalidLabel { version: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleVersion {
    pub parts: Vec<u32>,
    pub prerelease: Prerelease,
    pub build: BuildMetadata,
}

impl FromStr for BundleVersion {
    type Err = VersionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let stripped = trimmed
            .strip_prefix(['v', 'V'])
            .unwrap_or(trimmed);
        if stripped.is_empty() {
            return Err(VersionError::Empty);
        }

        let (rest, build) = match stripped.split_once('+') {
            Some((rest, build)) => (rest, build),
            None => (stripped, ""),
        };
        let (numbers, prerelease) = match rest.split_once('-') {
            Some((numbers, prerelease)) => (numbers, prerelease),
            None => (rest, ""),
        };

        let parts = numbers
            .split('.')
            .map(|part| {
                part.parse::<u32>().map_err(|_| VersionError::InvalidPart {
                    version: value.to_string(),
                    part: part.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        if parts.len() > 4 {
            return Err(VersionError::TooManyParts(value.to_string()));
        }

        let label_error = |e: semver::Error| VersionError::InvalidLabel {
            version: value.to_string(),
            message: e.to_string(),
        };
        let prerelease = Prerelease::new(prerelease).map_err(label_error)?;
        let build = BuildMetadata::new(build).map_err(label_error)?;

        Ok(Self {
            parts,
            prerelease,
            build,
        })
    }
}

impl fmt::Display for BundleVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let numbers: Vec<String> = self.parts.iter().map(u32::to_string).collect();
        write!(f, "{}", numbers.join("."))?;
        if !self.prerelease.is_empty() {
            write!(f, "-{}", self.prerelease)?;
        }
        if !self.build.is_empty() {
            write!(f, "+{}", self.build)?;
        }
        Ok(())
    }
}

/// Normalize a bundle version string
pub fn normalize_version(value: &str) -> Result<String, VersionError> {
    value.parse::<BundleVersion>().map(|v| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_is_stripped() {
        assert_eq!(normalize_version("v1.2.3.4").unwrap(), "1.2.3.4");
        assert_eq!(normalize_version("V2.0").unwrap(), "2.0");
        assert_eq!(normalize_version("3").unwrap(), "3");
    }

    #[test]
    fn test_labels() {
        let version: BundleVersion = "1.0.0-beta.1+build.7".parse().unwrap();
        assert_eq!(version.parts, vec![1, 0, 0]);
        assert_eq!(version.prerelease.as_str(), "beta.1");
        assert_eq!(version.to_string(), "1.0.0-beta.1+build.7");
    }

    #[test]
    fn test_invalid_versions() {
        assert_eq!(normalize_version(""), Err(VersionError::Empty));
        assert_eq!(normalize_version("v"), Err(VersionError::Empty));
        assert!(matches!(
            normalize_version("1.2.3.4.5"),
            Err(VersionError::TooManyParts(_))
        ));
        assert!(matches!(
            normalize_version("1.x"),
            Err(VersionError::InvalidPart { .. })
        ));
        assert!(matches!(
            normalize_version("4294967296"),
            Err(VersionError::InvalidPart { .. })
        ));
        assert!(matches!(
            normalize_version("1.0-beta..1"),
            Err(VersionError::InvalidLabel { .. })
        ));
    }
}
