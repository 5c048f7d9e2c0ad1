// src/msi/summary.rs

//! Summary information stream
//!
//! Properties are addressed by their well-known identifiers (1 through 19).
//! Dates are stored as `YYYY/MM/DD hh:mm:ss` text.

use crate::error::{Error, Result};
use bitflags::bitflags;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const PID_CODEPAGE: u32 = 1;
pub const PID_TITLE: u32 = 2;
pub const PID_SUBJECT: u32 = 3;
pub const PID_AUTHOR: u32 = 4;
pub const PID_KEYWORDS: u32 = 5;
pub const PID_COMMENTS: u32 = 6;
/// Platform and languages (`x64;1033`); target product codes for patches
pub const PID_TEMPLATE: u32 = 7;
pub const PID_LASTAUTHOR: u32 = 8;
/// Package code; for transforms, the product codes and versions involved
pub const PID_REVNUMBER: u32 = 9;
pub const PID_EDITTIME: u32 = 10;
pub const PID_LASTPRINTED: u32 = 11;
pub const PID_CREATE_DTM: u32 = 12;
pub const PID_LASTSAVE_DTM: u32 = 13;
/// Minimum installer schema version
pub const PID_PAGECOUNT: u32 = 14;
/// Source image flags, see [`WordCount`]
pub const PID_WORDCOUNT: u32 = 15;
/// Transform validation and error-condition flags
pub const PID_CHARCOUNT: u32 = 16;
pub const PID_THUMBNAIL: u32 = 17;
pub const PID_APPNAME: u32 = 18;
pub const PID_SECURITY: u32 = 19;

/// Highest summary property identifier
pub const PID_MAX: u32 = 19;

const FILETIME_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

bitflags! {
    /// Source image flags stored in the word count property
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct WordCount: i32 {
        /// Short file names only (long file names are supported when clear)
        const SHORT_NAMES = 0x1;
        /// Files are stored in cabinets
        const COMPRESSED = 0x2;
        /// Administrative installation image
        const ADMIN_IMAGE = 0x4;
        const NO_ELEVATION = 0x8;
    }
}

impl WordCount {
    pub fn long_filenames(&self) -> bool {
        !self.contains(WordCount::SHORT_NAMES)
    }

    pub fn compressed(&self) -> bool {
        self.contains(WordCount::COMPRESSED)
    }

    pub fn admin_image(&self) -> bool {
        self.contains(WordCount::ADMIN_IMAGE)
    }
}

/// One summary property value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SummaryValue {
    Integer(i32),
    String(String),
    FileTime(NaiveDateTime),
}

impl SummaryValue {
    pub fn to_display_string(&self) -> String {
        match self {
            SummaryValue::Integer(n) => n.to_string(),
            SummaryValue::String(s) => s.clone(),
            SummaryValue::FileTime(t) => t.format(FILETIME_FORMAT).to_string(),
        }
    }
}

/// Whether a property holds a date
pub fn is_filetime_property(id: u32) -> bool {
    matches!(
        id,
        PID_EDITTIME | PID_LASTPRINTED | PID_CREATE_DTM | PID_LASTSAVE_DTM
    )
}

/// Whether a property holds an integer
pub fn is_integer_property(id: u32) -> bool {
    matches!(
        id,
        PID_CODEPAGE | PID_PAGECOUNT | PID_WORDCOUNT | PID_CHARCOUNT | PID_SECURITY
    )
}

/// Parse a stored text value into the type the property carries
pub fn parse_value(id: u32, text: &str) -> Result<SummaryValue> {
    if is_filetime_property(id) {
        NaiveDateTime::parse_from_str(text, FILETIME_FORMAT)
            .map(SummaryValue::FileTime)
            .map_err(|e| Error::ParseError(format!("Summary property {id}: {e}")))
    } else if is_integer_property(id) {
        text.trim()
            .parse()
            .map(SummaryValue::Integer)
            .map_err(|e| Error::ParseError(format!("Summary property {id}: {e}")))
    } else {
        Ok(SummaryValue::String(text.to_string()))
    }
}

/// Summary information of one database or transform
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryInformation {
    properties: BTreeMap<u32, SummaryValue>,
}

impl SummaryInformation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: u32) -> Option<&SummaryValue> {
        self.properties.get(&id)
    }

    pub fn set(&mut self, id: u32, value: SummaryValue) -> Result<()> {
        if id == 0 || id > PID_MAX {
            return Err(Error::NotFound(format!("Summary property {id}")));
        }
        self.properties.insert(id, value);
        Ok(())
    }

    pub fn set_string(&mut self, id: u32, value: impl Into<String>) -> Result<()> {
        self.set(id, SummaryValue::String(value.into()))
    }

    pub fn set_integer(&mut self, id: u32, value: i32) -> Result<()> {
        self.set(id, SummaryValue::Integer(value))
    }

    pub fn remove(&mut self, id: u32) -> Option<SummaryValue> {
        self.properties.remove(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &SummaryValue)> {
        self.properties.iter().map(|(k, v)| (*k, v))
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn string(&self, id: u32) -> Option<&str> {
        match self.properties.get(&id) {
            Some(SummaryValue::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn integer(&self, id: u32) -> Option<i32> {
        match self.properties.get(&id) {
            Some(SummaryValue::Integer(n)) => Some(*n),
            Some(SummaryValue::String(s)) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn codepage(&self) -> Option<i32> {
        self.integer(PID_CODEPAGE)
    }

    pub fn revision_number(&self) -> Option<&str> {
        self.string(PID_REVNUMBER)
    }

    pub fn template(&self) -> Option<&str> {
        self.string(PID_TEMPLATE)
    }

    pub fn word_count(&self) -> WordCount {
        self.integer(PID_WORDCOUNT)
            .map(WordCount::from_bits_retain)
            .unwrap_or_default()
    }
}
