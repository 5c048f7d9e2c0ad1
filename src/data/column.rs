// src/data/column.rs

//! Column definitions for installer tables
//!
//! A column carries its storage type, width, nullability and the validation
//! metadata (category, key reference, bounds) that the `_Validation` table
//! records for it.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Storage type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    String,
    Localized,
    Number,
    Object,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::String => "string",
            ColumnType::Localized => "localized",
            ColumnType::Number => "number",
            ColumnType::Object => "object",
        }
    }
}

/// Validation category as recorded in `_Validation.Category`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColumnCategory {
    #[default]
    Unknown,
    Text,
    UpperCase,
    LowerCase,
    Integer,
    DoubleInteger,
    TimeDate,
    Identifier,
    Property,
    Filename,
    WildCardFilename,
    Path,
    Paths,
    AnyPath,
    DefaultDir,
    RegPath,
    Formatted,
    FormattedSddl,
    Template,
    Condition,
    Guid,
    Version,
    Language,
    Binary,
    CustomSource,
    Cabinet,
    Shortcut,
    KeyFormatted,
}

impl ColumnCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnCategory::Unknown => "",
            ColumnCategory::Text => "Text",
            ColumnCategory::UpperCase => "UpperCase",
            ColumnCategory::LowerCase => "LowerCase",
            ColumnCategory::Integer => "Integer",
            ColumnCategory::DoubleInteger => "DoubleInteger",
            ColumnCategory::TimeDate => "TimeDate",
            ColumnCategory::Identifier => "Identifier",
            ColumnCategory::Property => "Property",
            ColumnCategory::Filename => "Filename",
            ColumnCategory::WildCardFilename => "WildCardFilename",
            ColumnCategory::Path => "Path",
            ColumnCategory::Paths => "Paths",
            ColumnCategory::AnyPath => "AnyPath",
            ColumnCategory::DefaultDir => "DefaultDir",
            ColumnCategory::RegPath => "RegPath",
            ColumnCategory::Formatted => "Formatted",
            ColumnCategory::FormattedSddl => "FormattedSDDLText",
            ColumnCategory::Template => "Template",
            ColumnCategory::Condition => "Condition",
            ColumnCategory::Guid => "Guid",
            ColumnCategory::Version => "Version",
            ColumnCategory::Language => "Language",
            ColumnCategory::Binary => "Binary",
            ColumnCategory::CustomSource => "CustomSource",
            ColumnCategory::Cabinet => "Cabinet",
            ColumnCategory::Shortcut => "Shortcut",
            ColumnCategory::KeyFormatted => "KeyFormatted",
        }
    }
}

impl FromStr for ColumnCategory {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let category = match s {
            "" => ColumnCategory::Unknown,
            "Text" => ColumnCategory::Text,
            "UpperCase" => ColumnCategory::UpperCase,
            "LowerCase" => ColumnCategory::LowerCase,
            "Integer" => ColumnCategory::Integer,
            "DoubleInteger" => ColumnCategory::DoubleInteger,
            "TimeDate" => ColumnCategory::TimeDate,
            "Identifier" => ColumnCategory::Identifier,
            "Property" => ColumnCategory::Property,
            "Filename" => ColumnCategory::Filename,
            "WildCardFilename" => ColumnCategory::WildCardFilename,
            "Path" => ColumnCategory::Path,
            "Paths" => ColumnCategory::Paths,
            "AnyPath" => ColumnCategory::AnyPath,
            "DefaultDir" => ColumnCategory::DefaultDir,
            "RegPath" => ColumnCategory::RegPath,
            "Formatted" => ColumnCategory::Formatted,
            "FormattedSDDLText" => ColumnCategory::FormattedSddl,
            "Template" => ColumnCategory::Template,
            "Condition" => ColumnCategory::Condition,
            "Guid" => ColumnCategory::Guid,
            "Version" => ColumnCategory::Version,
            "Language" => ColumnCategory::Language,
            "Binary" => ColumnCategory::Binary,
            "CustomSource" => ColumnCategory::CustomSource,
            "Cabinet" => ColumnCategory::Cabinet,
            "Shortcut" => ColumnCategory::Shortcut,
            "KeyFormatted" => ColumnCategory::KeyFormatted,
            _ => return Err(format!("Invalid column category: {s}")),
        };
        Ok(category)
    }
}

/// How a column's values are rewritten when merge-module content is
/// modularized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColumnModularizeType {
    #[default]
    None,
    /// The whole value is an identifier
    Column,
    /// Identifier keyed into the Icon table (extension preserved)
    Icon,
    CompanionFile,
    /// Property references inside a condition expression
    Condition,
    ControlEventArgument,
    ControlText,
    /// `[Property]` references inside formatted text
    Property,
    SemicolonDelimited,
}

impl ColumnModularizeType {
    /// Guess the modularization of a column that has no authoritative
    /// definition, from its validation metadata
    pub fn guess(category: ColumnCategory, key_table: Option<&str>) -> Self {
        match category {
            ColumnCategory::Identifier if key_table == Some("Icon") => ColumnModularizeType::Icon,
            ColumnCategory::Identifier => ColumnModularizeType::Column,
            ColumnCategory::Condition => ColumnModularizeType::Condition,
            ColumnCategory::Formatted
            | ColumnCategory::FormattedSddl
            | ColumnCategory::KeyFormatted
            | ColumnCategory::Property => ColumnModularizeType::Property,
            _ => ColumnModularizeType::None,
        }
    }
}

/// Definition of one column in a table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    pub column_type: ColumnType,
    /// Fixed width; 0 means unbounded text or object
    pub length: u32,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub category: ColumnCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_table: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_column: Option<u32>,
    /// Enumerated value set (`_Validation.Set`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub possibilities: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub modularize: ColumnModularizeType,
}

impl ColumnDefinition {
    fn new(name: &str, column_type: ColumnType, length: u32) -> Self {
        Self {
            name: name.to_string(),
            column_type,
            length,
            primary_key: false,
            nullable: false,
            category: ColumnCategory::Unknown,
            min_value: None,
            max_value: None,
            key_table: None,
            key_column: None,
            possibilities: None,
            description: None,
            modularize: ColumnModularizeType::None,
        }
    }

    pub fn string(name: &str, length: u32) -> Self {
        Self::new(name, ColumnType::String, length).category(ColumnCategory::Text)
    }

    pub fn localized(name: &str, length: u32) -> Self {
        Self::new(name, ColumnType::Localized, length).category(ColumnCategory::Text)
    }

    /// Integer column; `length` is 2 or 4 bytes
    pub fn number(name: &str, length: u32) -> Self {
        let category = if length == 2 {
            ColumnCategory::Integer
        } else {
            ColumnCategory::DoubleInteger
        };
        Self::new(name, ColumnType::Number, length).category(category)
    }

    pub fn object(name: &str) -> Self {
        Self::new(name, ColumnType::Object, 0).category(ColumnCategory::Binary)
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn category(mut self, category: ColumnCategory) -> Self {
        self.category = category;
        self
    }

    pub fn key(mut self, table: &str, column: u32) -> Self {
        self.key_table = Some(table.to_string());
        self.key_column = Some(column);
        self
    }

    pub fn range(mut self, min: i64, max: i64) -> Self {
        self.min_value = Some(min);
        self.max_value = Some(max);
        self
    }

    pub fn set(mut self, possibilities: &str) -> Self {
        self.possibilities = Some(possibilities.to_string());
        self
    }

    pub fn modularize(mut self, modularize: ColumnModularizeType) -> Self {
        self.modularize = modularize;
        self
    }

    pub fn describe(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn is_localizable(&self) -> bool {
        self.column_type == ColumnType::Localized
    }

    /// Column type string as understood by the installer database
    /// (`s72`, `L0`, `i2`, `V0`, ...). Upper case marks a nullable column.
    pub fn msi_type(&self) -> String {
        let prefix = match self.column_type {
            ColumnType::String => 's',
            ColumnType::Localized => 'l',
            ColumnType::Number => 'i',
            ColumnType::Object => 'v',
        };
        let prefix = if self.nullable {
            prefix.to_ascii_uppercase()
        } else {
            prefix
        };
        format!("{}{}", prefix, self.length)
    }

    /// Build a definition from a column name and an installer type string
    pub fn from_msi_type(name: &str, msi_type: &str) -> Result<Self> {
        let mut chars = msi_type.chars();
        let prefix = chars
            .next()
            .ok_or_else(|| Error::ParseError(format!("Empty column type for column {name}")))?;
        let length: u32 = chars.as_str().parse().map_err(|_| {
            Error::ParseError(format!("Invalid column type '{msi_type}' for column {name}"))
        })?;

        let column = match prefix.to_ascii_lowercase() {
            's' | 'g' => ColumnDefinition::string(name, length),
            'l' | 'j' => ColumnDefinition::localized(name, length),
            'i' => ColumnDefinition::number(name, length),
            'v' => ColumnDefinition::object(name),
            _ => {
                return Err(Error::ParseError(format!(
                    "Unknown column type '{msi_type}' for column {name}"
                )));
            }
        };

        Ok(if prefix.is_ascii_uppercase() {
            column.nullable()
        } else {
            column
        })
    }
}
