// src/data/table.rs

//! Relational table model shared by the MSI binder and unbinder

use super::column::{ColumnDefinition, ColumnType};
use super::source::SourceLineNumber;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Value stored in one field
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldValue {
    #[default]
    Null,
    String(String),
    Number(i32),
    /// Path of the file backing an Object column
    Object(PathBuf),
}

impl FieldValue {
    pub fn kind(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::String(_) => "string",
            FieldValue::Number(_) => "number",
            FieldValue::Object(_) => "object",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Canonical text used when building primary keys and diffs
    pub fn to_key_string(&self) -> String {
        match self {
            FieldValue::Null => String::new(),
            FieldValue::String(s) => s.clone(),
            FieldValue::Number(n) => n.to_string(),
            FieldValue::Object(p) => p.display().to_string(),
        }
    }

    fn conforms_to(&self, column: &ColumnDefinition) -> bool {
        match (self, column.column_type) {
            (FieldValue::Null, _) => true,
            (FieldValue::String(_), ColumnType::String | ColumnType::Localized) => true,
            (FieldValue::Number(_), ColumnType::Number) => true,
            (FieldValue::Object(_), ColumnType::Object) => true,
            _ => false,
        }
    }
}

/// One field of a row with its optional previous value for diffs
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Field {
    pub value: FieldValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<FieldValue>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub modified: bool,
}

/// Row-level operation recorded by transform reconstruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RowOperation {
    #[default]
    None,
    Add,
    Delete,
    Modify,
}

/// Table-level operation recorded by transform reconstruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TableOperation {
    #[default]
    None,
    Add,
    Drop,
}

/// Name, columns and flags of a table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDefinition {
    pub name: String,
    /// Symbol type the table is produced from, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol_name: Option<String>,
    pub columns: Vec<ColumnDefinition>,
    /// Unreal tables are never created as real tables in a database
    #[serde(default)]
    pub unreal: bool,
}

impl TableDefinition {
    pub fn new(name: &str, columns: Vec<ColumnDefinition>) -> Self {
        Self {
            name: name.to_string(),
            symbol_name: None,
            columns,
            unreal: false,
        }
    }

    pub fn unreal(mut self) -> Self {
        self.unreal = true;
        self
    }

    pub fn with_symbol(mut self, symbol_name: &str) -> Self {
        self.symbol_name = Some(symbol_name.to_string());
        self
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn primary_key_indexes(&self) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.primary_key)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn primary_key_names(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }
}

/// One instantiation of a table definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_line: Option<SourceLineNumber>,
    #[serde(default)]
    pub operation: RowOperation,
    pub fields: Vec<Field>,
}

impl Row {
    /// Create a row of nulls shaped like the definition
    pub fn new(definition: &TableDefinition, source_line: Option<SourceLineNumber>) -> Self {
        Self {
            source_line,
            operation: RowOperation::None,
            fields: vec![Field::default(); definition.columns.len()],
        }
    }

    pub fn value(&self, index: usize) -> &FieldValue {
        self.fields
            .get(index)
            .map(|f| &f.value)
            .unwrap_or(&FieldValue::Null)
    }

    /// Set a field, checking the value kind against the column
    pub fn set(
        &mut self,
        definition: &TableDefinition,
        index: usize,
        value: FieldValue,
    ) -> Result<()> {
        let column = definition.columns.get(index).ok_or_else(|| {
            Error::NotFound(format!("Column {} in table {}", index, definition.name))
        })?;
        if !value.conforms_to(column) {
            return Err(Error::TypeMismatch {
                column: column.name.clone(),
                expected: column.column_type.as_str(),
                actual: value.kind(),
            });
        }
        self.fields[index].value = value;
        Ok(())
    }

    /// Set a field by column name
    pub fn set_named(
        &mut self,
        definition: &TableDefinition,
        column: &str,
        value: FieldValue,
    ) -> Result<()> {
        let index = definition.column_index(column).ok_or_else(|| {
            Error::NotFound(format!("Column {} in table {}", column, definition.name))
        })?;
        self.set(definition, index, value)
    }

    pub fn string(&self, definition: &TableDefinition, column: &str) -> Result<Option<&str>> {
        match self.named(definition, column)? {
            FieldValue::Null => Ok(None),
            FieldValue::String(s) => Ok(Some(s.as_str())),
            other => Err(Error::TypeMismatch {
                column: column.to_string(),
                expected: "string",
                actual: other.kind(),
            }),
        }
    }

    pub fn number(&self, definition: &TableDefinition, column: &str) -> Result<Option<i32>> {
        match self.named(definition, column)? {
            FieldValue::Null => Ok(None),
            FieldValue::Number(n) => Ok(Some(*n)),
            other => Err(Error::TypeMismatch {
                column: column.to_string(),
                expected: "number",
                actual: other.kind(),
            }),
        }
    }

    pub fn object(&self, definition: &TableDefinition, column: &str) -> Result<Option<&PathBuf>> {
        match self.named(definition, column)? {
            FieldValue::Null => Ok(None),
            FieldValue::Object(p) => Ok(Some(p)),
            other => Err(Error::TypeMismatch {
                column: column.to_string(),
                expected: "object",
                actual: other.kind(),
            }),
        }
    }

    fn named(&self, definition: &TableDefinition, column: &str) -> Result<&FieldValue> {
        let index = definition.column_index(column).ok_or_else(|| {
            Error::NotFound(format!("Column {} in table {}", column, definition.name))
        })?;
        Ok(self.value(index))
    }

    /// Primary key: the key fields joined with `/`
    pub fn primary_key(&self, definition: &TableDefinition) -> String {
        self.key_with_separator(definition, "/")
    }

    /// Primary key in the tab-joined form the installer uses in `_TransformView`
    pub fn transform_key(&self, definition: &TableDefinition) -> String {
        self.key_with_separator(definition, "\t")
    }

    fn key_with_separator(&self, definition: &TableDefinition, separator: &str) -> String {
        definition
            .primary_key_indexes()
            .into_iter()
            .map(|i| self.value(i).to_key_string())
            .collect::<Vec<_>>()
            .join(separator)
    }
}

/// A table definition with its rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub definition: TableDefinition,
    #[serde(default)]
    pub operation: TableOperation,
    #[serde(default)]
    pub rows: Vec<Row>,
}

impl Table {
    pub fn new(definition: TableDefinition) -> Self {
        Self {
            definition,
            operation: TableOperation::None,
            rows: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    /// Append a new empty row and return it for filling in
    pub fn create_row(&mut self, source_line: Option<SourceLineNumber>) -> &mut Row {
        let row = Row::new(&self.definition, source_line);
        self.rows.push(row);
        let last = self.rows.len() - 1;
        &mut self.rows[last]
    }

    /// Append a row built from values in column order
    pub fn add_row(
        &mut self,
        source_line: Option<SourceLineNumber>,
        values: Vec<FieldValue>,
    ) -> Result<()> {
        if values.len() != self.definition.columns.len() {
            return Err(Error::ParseError(format!(
                "Table {} has {} columns but {} values were supplied",
                self.definition.name,
                self.definition.columns.len(),
                values.len()
            )));
        }
        let mut row = Row::new(&self.definition, source_line);
        for (i, value) in values.into_iter().enumerate() {
            row.set(&self.definition, i, value)?;
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn find(&self, primary_key: &str) -> Option<&Row> {
        self.rows
            .iter()
            .find(|r| r.primary_key(&self.definition) == primary_key)
    }
}

/// Kind of installer output a table collection represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputType {
    #[default]
    Product,
    Module,
    Patch,
    PatchCreation,
    Transform,
}

impl OutputType {
    pub fn as_str(&self) -> &str {
        match self {
            OutputType::Product => "Product",
            OutputType::Module => "Module",
            OutputType::Patch => "Patch",
            OutputType::PatchCreation => "PatchCreation",
            OutputType::Transform => "Transform",
        }
    }
}

/// Complete table model of one installer database
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowsInstallerData {
    pub output_type: OutputType,
    pub codepage: i32,
    pub tables: BTreeMap<String, Table>,
}

impl WindowsInstallerData {
    pub fn new(output_type: OutputType) -> Self {
        Self {
            output_type,
            codepage: 0,
            tables: BTreeMap::new(),
        }
    }

    /// Get the table for a definition, creating it when absent
    pub fn ensure_table(&mut self, definition: &TableDefinition) -> &mut Table {
        self.tables
            .entry(definition.name.clone())
            .or_insert_with(|| Table::new(definition.clone()))
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    pub fn table_mut(&mut self, name: &str) -> Option<&mut Table> {
        self.tables.get_mut(name)
    }

    /// Load a table model from its JSON form
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &std::path::Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::column::ColumnDefinition;

    fn file_definition() -> TableDefinition {
        TableDefinition::new(
            "File",
            vec![
                ColumnDefinition::string("File", 72).primary_key(),
                ColumnDefinition::string("FileName", 255),
                ColumnDefinition::number("Sequence", 2),
            ],
        )
    }

    #[test]
    fn test_row_field_count_matches_columns() {
        let definition = file_definition();
        let row = Row::new(&definition, None);
        assert_eq!(row.fields.len(), 3);
        assert!(row.fields.iter().all(|f| f.value.is_null()));
    }

    #[test]
    fn test_typed_set_rejects_mismatch() {
        let definition = file_definition();
        let mut row = Row::new(&definition, None);
        row.set_named(&definition, "Sequence", FieldValue::Number(4)).unwrap();
        let err = row
            .set_named(&definition, "Sequence", FieldValue::String("four".into()))
            .unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
        assert_eq!(row.number(&definition, "Sequence").unwrap(), Some(4));
        assert!(row.string(&definition, "Sequence").is_err());
    }

    #[test]
    fn test_add_row_checks_width() {
        let mut table = Table::new(file_definition());
        assert!(table
            .add_row(None, vec![FieldValue::String("a".into())])
            .is_err());
        table
            .add_row(
                None,
                vec![
                    FieldValue::String("a".into()),
                    FieldValue::String("a.txt".into()),
                    FieldValue::Number(1),
                ],
            )
            .unwrap();
        assert!(table.find("a").is_some());
    }

    #[test]
    fn test_composite_primary_key() {
        let definition = TableDefinition::new(
            "FeatureComponents",
            vec![
                ColumnDefinition::string("Feature_", 38).primary_key(),
                ColumnDefinition::string("Component_", 72).primary_key(),
            ],
        );
        let mut table = Table::new(definition);
        table
            .add_row(
                None,
                vec![
                    FieldValue::String("Main".into()),
                    FieldValue::String("Core".into()),
                ],
            )
            .unwrap();
        let row = &table.rows[0];
        assert_eq!(row.primary_key(&table.definition), "Main/Core");
        assert_eq!(row.transform_key(&table.definition), "Main\tCore");
    }
}
