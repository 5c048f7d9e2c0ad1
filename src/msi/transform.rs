// src/msi/transform.rs

//! Database transforms
//!
//! A transform is the difference between a reference database and a newer
//! one, stored as a CBOR document: tables created or dropped, columns
//! appended, rows inserted, deleted or updated, and a codepage change.
//! Applying it replays those operations; the error-condition flags decide
//! which mismatches against the target are tolerated.

use super::database::{Database, ERROR_DATATYPE_MISMATCH, ERROR_INSTALL_TRANSFORM_FAILURE};
use super::record::{Record, RecordField};
use super::summary::{self, SummaryInformation};
use super::quote;
use crate::data::{ColumnDefinition, TableDefinition};
use crate::error::{Error, Result};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::{debug, info};

/// Name of the diagnostic table materialised by [`TransformErrorConditions::VIEW_TRANSFORM`]
pub const TRANSFORM_VIEW_TABLE: &str = "_TransformView";

const TRANSFORM_MAGIC: &str = "wixbind-transform";
const TRANSFORM_FORMAT: u32 = 1;

bitflags! {
    /// Error conditions suppressed while applying a transform
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TransformErrorConditions: u32 {
        const ADD_EXISTING_ROW = 0x0001;
        const DELETE_MISSING_ROW = 0x0002;
        const ADD_EXISTING_TABLE = 0x0004;
        const DELETE_MISSING_TABLE = 0x0008;
        const UPDATE_MISSING_ROW = 0x0010;
        const CHANGE_CODEPAGE = 0x0020;
        /// Describe the transform in `_TransformView` instead of applying it
        const VIEW_TRANSFORM = 0x0100;
        const ALL = 0x003F;
    }
}

/// Column as recorded in a transform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformColumn {
    pub name: String,
    pub msi_type: String,
    pub primary_key: bool,
}

impl TransformColumn {
    fn from_definition(column: &ColumnDefinition) -> Self {
        Self {
            name: column.name.clone(),
            msi_type: column.msi_type(),
            primary_key: column.primary_key,
        }
    }

    fn to_definition(&self) -> Result<ColumnDefinition> {
        let column = ColumnDefinition::from_msi_type(&self.name, &self.msi_type)?;
        Ok(if self.primary_key {
            column.primary_key()
        } else {
            column
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableChange {
    Modify,
    Create,
    Drop,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowChange {
    /// Full row in column order
    Insert {
        key: Vec<RecordField>,
        values: Vec<RecordField>,
    },
    Delete {
        key: Vec<RecordField>,
    },
    /// Changed columns with their new values
    Update {
        key: Vec<RecordField>,
        changes: Vec<(String, RecordField)>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableTransform {
    pub name: String,
    pub change: TableChange,
    /// Full column list of the table after the transform
    pub columns: Vec<TransformColumn>,
    /// Number of leading columns that exist before the transform
    pub base_columns: usize,
    pub rows: Vec<RowChange>,
}

/// Serialized transform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformDocument {
    magic: String,
    format: u32,
    pub summary: SummaryInformation,
    /// Codepage of the transformed database when it differs
    pub codepage: Option<i32>,
    pub tables: Vec<TableTransform>,
}

impl TransformDocument {
    fn new() -> Self {
        Self {
            magic: TRANSFORM_MAGIC.to_string(),
            format: TRANSFORM_FORMAT,
            summary: SummaryInformation::new(),
            codepage: None,
            tables: Vec::new(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let document: TransformDocument = ciborium::de::from_reader(BufReader::new(file))?;
        if document.magic != TRANSFORM_MAGIC {
            return Err(Error::Database {
                code: ERROR_INSTALL_TRANSFORM_FAILURE,
                message: format!("Not a transform: {}", path.display()),
            });
        }
        if document.format > TRANSFORM_FORMAT {
            return Err(Error::Database {
                code: ERROR_INSTALL_TRANSFORM_FAILURE,
                message: format!(
                    "Unsupported transform format {} in {}",
                    document.format,
                    path.display()
                ),
            });
        }
        Ok(document)
    }

    fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        ciborium::ser::into_writer(self, BufWriter::new(file))?;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.codepage.is_none() && self.tables.is_empty()
    }
}

/// Summary information carried by a transform file
pub fn transform_summary(path: &Path) -> Result<SummaryInformation> {
    Ok(TransformDocument::load(path)?.summary)
}

fn key_string(key: &[RecordField]) -> String {
    key.iter()
        .map(|f| f.to_display_string())
        .collect::<Vec<_>>()
        .join("\t")
}

fn key_of(record: &Record, key_indexes: &[usize]) -> Vec<RecordField> {
    key_indexes.iter().map(|i| record.get(*i).clone()).collect()
}

fn key_indexes(columns: &[ColumnDefinition]) -> Vec<usize> {
    columns
        .iter()
        .enumerate()
        .filter(|(_, c)| c.primary_key)
        .map(|(i, _)| i)
        .collect()
}

fn failure(message: String) -> Error {
    Error::Database {
        code: ERROR_INSTALL_TRANSFORM_FAILURE,
        message,
    }
}

/// Values compare equal when both are null, treating empty strings as null
fn same_value(a: &RecordField, b: &RecordField) -> bool {
    (a.is_null() && b.is_null()) || a == b
}

fn property(db: &Database, name: &str) -> Result<Option<String>> {
    if !db.table_exists("Property")? {
        return Ok(None);
    }
    Ok(db
        .find_record("Property", &[RecordField::from(name)])?
        .and_then(|r| r.get_string(1)))
}

fn transform_summary_for(new: &Database, reference: &Database) -> Result<SummaryInformation> {
    let reference_summary = reference.summary_information()?;
    let new_summary = new.summary_information()?;

    let mut info = SummaryInformation::new();
    info.set_integer(summary::PID_CODEPAGE, new.codepage()?)?;
    info.set_string(summary::PID_TITLE, "Transform")?;
    if let Some(template) = reference_summary.template() {
        info.set_string(summary::PID_TEMPLATE, template)?;
    }
    if let Some(template) = new_summary.template() {
        info.set_string(summary::PID_LASTAUTHOR, template)?;
    }

    let product = |db: &Database| -> Result<String> {
        Ok(format!(
            "{}{}",
            property(db, "ProductCode")?.unwrap_or_default(),
            property(db, "ProductVersion")?.unwrap_or_default()
        ))
    };
    let upgrade_code = property(new, "UpgradeCode")?.unwrap_or_default();
    info.set_string(
        summary::PID_REVNUMBER,
        format!("{};{};{}", product(reference)?, product(new)?, upgrade_code),
    )?;
    info.set_integer(summary::PID_PAGECOUNT, 200)?;
    info.set_integer(summary::PID_CHARCOUNT, 0)?;
    Ok(info)
}

/// Diff `new` against `reference` and write the transform to `output`.
/// Returns false, writing nothing, when the databases are identical.
pub fn generate(new: &Database, reference: &Database, output: &Path) -> Result<bool> {
    let mut document = TransformDocument::new();

    let new_codepage = new.codepage()?;
    if new_codepage != reference.codepage()? {
        document.codepage = Some(new_codepage);
    }

    let new_tables = new.tables()?;
    for table in &new_tables {
        let columns = new.columns(table)?;
        let keys = key_indexes(&columns);
        let schema: Vec<TransformColumn> =
            columns.iter().map(TransformColumn::from_definition).collect();

        if !reference.table_exists(table)? {
            let rows = new
                .records(table)?
                .into_iter()
                .map(|record| RowChange::Insert {
                    key: key_of(&record, &keys),
                    values: record.into_fields(),
                })
                .collect();
            document.tables.push(TableTransform {
                name: table.clone(),
                change: TableChange::Create,
                columns: schema,
                base_columns: 0,
                rows,
            });
            continue;
        }

        let reference_columns = reference.columns(table)?;
        let prefix_matches = reference_columns.len() <= columns.len()
            && reference_columns
                .iter()
                .zip(&columns)
                .all(|(a, b)| a.name == b.name && a.column_type == b.column_type);
        if !prefix_matches {
            return Err(Error::Database {
                code: ERROR_DATATYPE_MISMATCH,
                message: format!("Table {table} cannot be transformed: column definitions differ"),
            });
        }

        let mut reference_rows: BTreeMap<String, Record> = reference
            .records(table)?
            .into_iter()
            .map(|r| (key_string(&key_of(&r, &keys)), r))
            .collect();

        let mut rows = Vec::new();
        for record in new.records(table)? {
            let key = key_of(&record, &keys);
            match reference_rows.remove(&key_string(&key)) {
                None => rows.push(RowChange::Insert {
                    key,
                    values: record.into_fields(),
                }),
                Some(old) => {
                    let changes: Vec<(String, RecordField)> = columns
                        .iter()
                        .enumerate()
                        .filter(|(i, _)| !same_value(record.get(*i), old.get(*i)))
                        .map(|(i, c)| (c.name.clone(), record.get(i).clone()))
                        .collect();
                    if !changes.is_empty() {
                        rows.push(RowChange::Update { key, changes });
                    }
                }
            }
        }
        for old in reference_rows.into_values() {
            rows.push(RowChange::Delete {
                key: key_of(&old, &keys),
            });
        }

        if !rows.is_empty() || columns.len() > reference_columns.len() {
            document.tables.push(TableTransform {
                name: table.clone(),
                change: TableChange::Modify,
                columns: schema,
                base_columns: reference_columns.len(),
                rows,
            });
        }
    }

    for table in reference.tables()? {
        if !new_tables.contains(&table) {
            let columns = reference.columns(&table)?;
            document.tables.push(TableTransform {
                name: table,
                change: TableChange::Drop,
                columns: columns.iter().map(TransformColumn::from_definition).collect(),
                base_columns: columns.len(),
                rows: Vec::new(),
            });
        }
    }

    if document.is_empty() {
        debug!("Databases are identical, no transform generated");
        return Ok(false);
    }

    document.summary = transform_summary_for(new, reference)?;
    document.save(output)?;
    info!(
        "Generated transform {} ({} tables changed)",
        output.display(),
        document.tables.len()
    );
    Ok(true)
}

/// Apply the transform at `path` to `db`
pub fn apply(db: &Database, path: &Path, conditions: TransformErrorConditions) -> Result<()> {
    let document = TransformDocument::load(path)?;

    if conditions.contains(TransformErrorConditions::VIEW_TRANSFORM) {
        return populate_view(db, &document);
    }

    if let Some(codepage) = document.codepage {
        let current = db.codepage()?;
        if current != 0
            && current != codepage
            && !conditions.contains(TransformErrorConditions::CHANGE_CODEPAGE)
        {
            return Err(failure(format!(
                "Transform changes codepage {current} to {codepage}"
            )));
        }
        db.set_codepage(codepage)?;
    }

    for table in &document.tables {
        match table.change {
            TableChange::Drop => {
                if db.table_exists(&table.name)? {
                    db.drop_table(&table.name)?;
                } else if !conditions.contains(TransformErrorConditions::DELETE_MISSING_TABLE) {
                    return Err(failure(format!("Table {} does not exist", table.name)));
                }
                continue;
            }
            TableChange::Create => {
                if db.table_exists(&table.name)? {
                    if !conditions.contains(TransformErrorConditions::ADD_EXISTING_TABLE) {
                        return Err(failure(format!("Table {} already exists", table.name)));
                    }
                } else {
                    let columns = table
                        .columns
                        .iter()
                        .map(TransformColumn::to_definition)
                        .collect::<Result<Vec<_>>>()?;
                    db.create_table(&TableDefinition::new(&table.name, columns))?;
                }
            }
            TableChange::Modify => {
                if !db.table_exists(&table.name)? {
                    return Err(failure(format!("Table {} does not exist", table.name)));
                }
            }
        }

        let existing: HashSet<String> = db
            .columns(&table.name)?
            .into_iter()
            .map(|c| c.name)
            .collect();
        for column in table.columns.iter().skip(table.base_columns) {
            if !existing.contains(&column.name) {
                db.add_column(&table.name, &column.to_definition()?)?;
            }
        }

        apply_rows(db, table, conditions)?;
    }

    info!("Applied transform {} to {}", path.display(), db.path().display());
    Ok(())
}

fn apply_rows(
    db: &Database,
    table: &TableTransform,
    conditions: TransformErrorConditions,
) -> Result<()> {
    let columns = db.columns(&table.name)?;

    for row in &table.rows {
        match row {
            RowChange::Insert { key, values } => {
                if db.find_record(&table.name, key)?.is_some() {
                    if !conditions.contains(TransformErrorConditions::ADD_EXISTING_ROW) {
                        return Err(failure(format!(
                            "Row {} already exists in {}",
                            key_string(key),
                            table.name
                        )));
                    }
                    continue;
                }
                let mut record = Record::new(columns.len());
                for (i, column) in table.columns.iter().enumerate() {
                    if let Some(target) = columns.iter().position(|c| c.name == column.name) {
                        record.set(target, values.get(i).cloned().unwrap_or_default());
                    }
                }
                db.insert_record(&table.name, &record)?;
            }
            RowChange::Delete { key } => {
                if !db.delete_record(&table.name, key)?
                    && !conditions.contains(TransformErrorConditions::DELETE_MISSING_ROW)
                {
                    return Err(failure(format!(
                        "Row {} does not exist in {}",
                        key_string(key),
                        table.name
                    )));
                }
            }
            RowChange::Update { key, changes } => {
                let Some(mut record) = db.find_record(&table.name, key)? else {
                    if !conditions.contains(TransformErrorConditions::UPDATE_MISSING_ROW) {
                        return Err(failure(format!(
                            "Row {} to update does not exist in {}",
                            key_string(key),
                            table.name
                        )));
                    }
                    continue;
                };
                for (name, value) in changes {
                    if let Some(index) = columns.iter().position(|c| &c.name == name) {
                        record.set(index, value.clone());
                    }
                }
                db.replace_record(&table.name, &record)?;
            }
        }
    }
    Ok(())
}

/// Describe the transform in `_TransformView(Table, Column, Row, Data, Current)`
///
/// `Column` is `CREATE`, `DROP`, `INSERT`, `DELETE` or a column name. Column
/// definitions have a null `Row`; row entries carry the tab-joined primary key.
fn populate_view(db: &Database, document: &TransformDocument) -> Result<()> {
    let conn = db.connection();
    conn.execute_batch(&format!(
        "CREATE TEMP TABLE IF NOT EXISTS {} (`Table` TEXT, `Column` TEXT, `Row` TEXT, `Data` TEXT, `Current` TEXT)",
        quote(TRANSFORM_VIEW_TABLE)
    ))?;
    let insert = format!(
        "INSERT INTO {} (`Table`, `Column`, `Row`, `Data`, `Current`) VALUES (?1, ?2, ?3, ?4, ?5)",
        quote(TRANSFORM_VIEW_TABLE)
    );
    let mut stmt = conn.prepare(&insert)?;
    let mut add = |table: &str,
                   column: &str,
                   row: Option<&str>,
                   data: Option<String>,
                   current: Option<String>|
     -> Result<()> {
        stmt.execute(rusqlite::params![table, column, row, data, current])?;
        Ok(())
    };

    for table in &document.tables {
        let name = table.name.as_str();
        match table.change {
            TableChange::Create => add(name, "CREATE", None, None, None)?,
            TableChange::Drop => {
                add(name, "DROP", None, None, None)?;
                continue;
            }
            TableChange::Modify => {}
        }

        for (i, column) in table.columns.iter().enumerate().skip(table.base_columns) {
            add(
                name,
                &column.name,
                None,
                Some(column.msi_type.clone()),
                Some((i + 1).to_string()),
            )?;
        }

        let current_columns = if db.table_exists(name)? {
            db.columns(name)?
        } else {
            Vec::new()
        };

        for row in &table.rows {
            match row {
                RowChange::Insert { key, values } => {
                    let key = key_string(key);
                    add(name, "INSERT", Some(&key), None, None)?;
                    for (column, value) in table.columns.iter().zip(values) {
                        if !value.is_null() {
                            add(name, &column.name, Some(&key), Some(value.to_display_string()), None)?;
                        }
                    }
                }
                RowChange::Delete { key } => {
                    add(name, "DELETE", Some(&key_string(key)), None, None)?;
                }
                RowChange::Update { key, changes } => {
                    let current = if current_columns.is_empty() {
                        None
                    } else {
                        db.find_record(name, key)?
                    };
                    let key = key_string(key);
                    for (column, value) in changes {
                        let previous = current.as_ref().and_then(|record| {
                            current_columns
                                .iter()
                                .position(|c| &c.name == column)
                                .and_then(|i| record.get_string(i))
                        });
                        let data = (!value.is_null()).then(|| value.to_display_string());
                        add(name, column, Some(&key), data, previous)?;
                    }
                }
            }
        }
    }

    debug!("Populated {} from transform", TRANSFORM_VIEW_TABLE);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn database(temp: &TempDir, name: &str, properties: &[(&str, &str)]) -> Database {
        let db = Database::create(&temp.path().join(name)).unwrap();
        db.create_table(&TableDefinition::new(
            "Property",
            vec![
                ColumnDefinition::string("Property", 72).primary_key(),
                ColumnDefinition::localized("Value", 0),
            ],
        ))
        .unwrap();
        for (k, v) in properties {
            db.insert_record("Property", &Record::from_fields(vec![(*k).into(), (*v).into()]))
                .unwrap();
        }
        db
    }

    #[test]
    fn test_identical_databases_generate_nothing() {
        let temp = TempDir::new().unwrap();
        let a = database(&temp, "a.msi", &[("ProductName", "Test")]);
        let b = database(&temp, "b.msi", &[("ProductName", "Test")]);
        let output = temp.path().join("diff.mst");
        assert!(!a.generate_transform(&b, &output).unwrap());
        assert!(!output.exists());
    }

    #[test]
    fn test_generate_and_apply() {
        let temp = TempDir::new().unwrap();
        let reference = database(&temp, "ref.msi", &[("A", "1"), ("B", "2"), ("C", "3")]);
        let new = database(&temp, "new.msi", &[("A", "1"), ("B", "changed"), ("D", "4")]);
        let output = temp.path().join("diff.mst");
        assert!(new.generate_transform(&reference, &output).unwrap());

        let target = database(&temp, "target.msi", &[("A", "1"), ("B", "2"), ("C", "3")]);
        target
            .apply_transform(&output, TransformErrorConditions::empty())
            .unwrap();
        let values: Vec<(String, String)> = target
            .records("Property")
            .unwrap()
            .into_iter()
            .map(|r| (r.get_string(0).unwrap(), r.get_string(1).unwrap()))
            .collect();
        assert_eq!(values.len(), 3);
        assert!(values.contains(&("B".to_string(), "changed".to_string())));
        assert!(values.contains(&("D".to_string(), "4".to_string())));
        assert!(!values.iter().any(|(k, _)| k == "C"));
    }

    #[test]
    fn test_suppressed_conditions() {
        let temp = TempDir::new().unwrap();
        let reference = database(&temp, "ref.msi", &[("A", "1")]);
        let new = database(&temp, "new.msi", &[("A", "2")]);
        let output = temp.path().join("diff.mst");
        assert!(new.generate_transform(&reference, &output).unwrap());

        let empty = database(&temp, "empty.msi", &[]);
        let err = empty
            .apply_transform(&output, TransformErrorConditions::empty())
            .unwrap_err();
        assert!(matches!(err, Error::Database { .. }));
        empty
            .apply_transform(&output, TransformErrorConditions::ALL)
            .unwrap();
        assert!(empty.records("Property").unwrap().is_empty());
    }

    #[test]
    fn test_view_transform_describes_changes() {
        let temp = TempDir::new().unwrap();
        let reference = database(&temp, "ref.msi", &[("A", "1")]);
        let new = database(&temp, "new.msi", &[("A", "2"), ("B", "3")]);
        let output = temp.path().join("diff.mst");
        assert!(new.generate_transform(&reference, &output).unwrap());

        let target = database(&temp, "target.msi", &[("A", "1")]);
        target
            .apply_transform(
                &output,
                TransformErrorConditions::ALL | TransformErrorConditions::VIEW_TRANSFORM,
            )
            .unwrap();
        assert!(target.table_exists(TRANSFORM_VIEW_TABLE).unwrap());

        let rows: Vec<Record> = target
            .open_execute_view("SELECT `Table`, `Column`, `Row`, `Data`, `Current` FROM `_TransformView`", None)
            .unwrap()
            .collect();
        assert!(rows.iter().any(|r| r.get_string(1).as_deref() == Some("INSERT")
            && r.get_string(2).as_deref() == Some("B")));
        assert!(rows.iter().any(|r| r.get_string(1).as_deref() == Some("Value")
            && r.get_string(2).as_deref() == Some("A")
            && r.get_string(3).as_deref() == Some("2")
            && r.get_string(4).as_deref() == Some("1")));

        // Viewing does not change the data
        let a = target.find_record("Property", &["A".into()]).unwrap().unwrap();
        assert_eq!(a.get_string(1).as_deref(), Some("1"));
    }

    #[test]
    fn test_table_create_and_drop() {
        let temp = TempDir::new().unwrap();
        let reference = database(&temp, "ref.msi", &[]);
        reference
            .create_table(&TableDefinition::new(
                "Obsolete",
                vec![ColumnDefinition::string("Id", 72).primary_key()],
            ))
            .unwrap();
        let new = database(&temp, "new.msi", &[]);
        new.create_table(&TableDefinition::new(
            "Fresh",
            vec![ColumnDefinition::string("Id", 72).primary_key()],
        ))
        .unwrap();

        let output = temp.path().join("diff.mst");
        assert!(new.generate_transform(&reference, &output).unwrap());
        let document = TransformDocument::load(&output).unwrap();
        assert!(document
            .tables
            .iter()
            .any(|t| t.name == "Fresh" && t.change == TableChange::Create));
        assert!(document
            .tables
            .iter()
            .any(|t| t.name == "Obsolete" && t.change == TableChange::Drop));

        reference
            .apply_transform(&output, TransformErrorConditions::empty())
            .unwrap();
        assert!(reference.table_exists("Fresh").unwrap());
        assert!(!reference.table_exists("Obsolete").unwrap());
    }
}
