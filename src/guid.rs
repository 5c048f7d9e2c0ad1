// src/guid.rs

//! GUID normalization
//!
//! Installer GUIDs are written upper case with braces:
//! `{8F1E2D3C-4B5A-6978-8A9B-0C1D2E3F4A5B}`.

use crate::error::Result;
use uuid::Uuid;

/// Canonicalize any accepted GUID form (braced, hyphenated, simple, urn)
pub fn normalize(value: &str) -> Result<String> {
    let uuid = Uuid::try_parse(value.trim())?;
    Ok(format_braced(&uuid))
}

/// Fresh random GUID in canonical form
pub fn new_guid() -> String {
    format_braced(&Uuid::new_v4())
}

pub fn is_guid(value: &str) -> bool {
    Uuid::try_parse(value.trim()).is_ok()
}

fn format_braced(uuid: &Uuid) -> String {
    format!("{{{}}}", uuid.hyphenated().to_string().to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_forms() {
        let expected = "{8F1E2D3C-4B5A-6978-8A9B-0C1D2E3F4A5B}";
        assert_eq!(normalize("8f1e2d3c-4b5a-6978-8a9b-0c1d2e3f4a5b").unwrap(), expected);
        assert_eq!(normalize("{8f1e2d3c-4b5a-6978-8a9b-0c1d2e3f4a5b}").unwrap(), expected);
        assert_eq!(normalize("8f1e2d3c4b5a69788a9b0c1d2e3f4a5b").unwrap(), expected);
    }

    #[test]
    fn test_invalid_guid() {
        assert!(normalize("not-a-guid").is_err());
        assert!(!is_guid("{1234}"));
    }

    #[test]
    fn test_new_guid_is_canonical() {
        let guid = new_guid();
        assert_eq!(normalize(&guid).unwrap(), guid);
    }
}
