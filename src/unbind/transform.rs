// src/unbind/transform.rs

//! Recover the table model of a transform
//!
//! A schema database holding every registered table is built, then the
//! transform is applied to it twice. The first pass only describes the
//! changes in `_TransformView`; placeholder rows are then inserted for every
//! updated key so the second, real pass leaves the new values behind. The
//! two passes are correlated by primary key.

use super::database::matching_definition;
use crate::config::BindOptions;
use crate::context::CancellationToken;
use crate::data::{
    ColumnDefinition, ColumnType, Field, FieldValue, OutputType, Row, RowOperation, Table,
    TableDefinition, TableDefinitionCollection, TableOperation, WindowsInstallerData,
};
use crate::error::{Error, Result};
use crate::msi::transform::transform_summary;
use crate::msi::{
    Database, Record, RecordField, TRANSFORM_VIEW_TABLE, TransformDocument,
    TransformErrorConditions,
};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const SUMMARY_TABLE: &str = "_SummaryInformation";
/// Tables left out of the schema database
const EXCLUDED_TABLES: &[&str] = &["Patch"];
/// Empty file standing in for Object columns of placeholder rows
const EMPTY_FILE_NAME: &str = "wixbind-empty-file";
const PLACEHOLDER_TEXT: &str = "_";

/// Everything `_TransformView` says about one table
#[derive(Debug, Default)]
struct TableChanges {
    created: bool,
    dropped: bool,
    /// Columns defined by the transform (all of them for created tables)
    columns: Vec<String>,
    inserted: BTreeSet<String>,
    deleted: BTreeSet<String>,
    /// Updated key -> changed columns
    modified: BTreeMap<String, BTreeSet<String>>,
}

/// The recovered transform
#[derive(Debug, Default)]
pub struct UnboundTransform {
    pub data: WindowsInstallerData,
    /// Columns the transform appends to existing tables
    pub added_columns: BTreeMap<String, Vec<String>>,
}

pub struct UnbindTransformCommand<'a> {
    transform_path: PathBuf,
    export_folder: PathBuf,
    registry: &'a TableDefinitionCollection,
    options: &'a BindOptions,
    cancellation: CancellationToken,
}

impl<'a> UnbindTransformCommand<'a> {
    pub fn new(
        transform_path: &Path,
        export_folder: &Path,
        registry: &'a TableDefinitionCollection,
        options: &'a BindOptions,
    ) -> Self {
        Self {
            transform_path: transform_path.to_path_buf(),
            export_folder: export_folder.to_path_buf(),
            registry,
            options,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn execute(&self) -> Result<UnboundTransform> {
        self.cancellation.check()?;
        info!("Unbinding transform {}", self.transform_path.display());

        let folder = &self.options.intermediate_folder;
        fs::create_dir_all(folder)?;
        let empty_file = folder.join(EMPTY_FILE_NAME);
        fs::write(&empty_file, b"")?;

        let schema_path = folder.join("transform-schema.msi");
        let db = self.create_schema_database(&schema_path)?;

        db.apply_transform(
            &self.transform_path,
            TransformErrorConditions::ALL | TransformErrorConditions::VIEW_TRANSFORM,
        )?;
        let changes = read_transform_view(&db)?;
        debug!("Transform touches {} tables", changes.len());

        self.cancellation.check()?;
        self.prepare_for_apply(&db, &changes, &fs::read(&empty_file)?)?;
        db.apply_transform(&self.transform_path, TransformErrorConditions::ALL)?;

        let mut output = UnboundTransform {
            data: WindowsInstallerData::new(OutputType::Transform),
            ..UnboundTransform::default()
        };
        let document = TransformDocument::load(&self.transform_path)?;
        output.data.codepage = document.codepage.unwrap_or(0);

        for (name, change) in &changes {
            self.cancellation.check()?;
            let table = self.unbind_table(&db, &document, name, change)?;
            if !change.created && !change.dropped {
                // Column count before the transform, as recorded by the transform itself
                let base = document
                    .tables
                    .iter()
                    .find(|t| &t.name == name)
                    .map(|t| t.base_columns)
                    .or_else(|| self.registry.get(name).map(|d| d.columns.len()))
                    .unwrap_or(table.definition.columns.len());
                let added: Vec<String> = table
                    .definition
                    .columns
                    .iter()
                    .skip(base)
                    .filter(|c| change.columns.contains(&c.name))
                    .map(|c| c.name.clone())
                    .collect();
                if !added.is_empty() {
                    output.added_columns.insert(name.clone(), added);
                }
            }
            output.data.tables.insert(name.clone(), table);
        }

        let summary = transform_summary(&self.transform_path)?;
        if let Some(definition) = self.registry.get(SUMMARY_TABLE) {
            let table = output.data.ensure_table(definition);
            for (id, value) in summary.iter() {
                table.add_row(
                    None,
                    vec![FieldValue::Number(id as i32), FieldValue::String(value.to_display_string())],
                )?;
            }
        }

        info!("Recovered {} changed tables", changes.len());
        Ok(output)
    }

    /// Database with an empty copy of every registered real table
    fn create_schema_database(&self, path: &Path) -> Result<Database> {
        let db = Database::create(path)?.with_retry_policy(self.options.commit_retry);
        for definition in self.registry.iter() {
            if definition.unreal || EXCLUDED_TABLES.contains(&definition.name.as_str()) {
                continue;
            }
            db.create_table(definition)?;
        }
        db.commit()?;
        Ok(db)
    }

    /// Create tables the transform modifies but the schema lacks, and insert
    /// a placeholder row for every updated key
    fn prepare_for_apply(
        &self,
        db: &Database,
        changes: &BTreeMap<String, TableChanges>,
        empty: &[u8],
    ) -> Result<()> {
        let document = TransformDocument::load(&self.transform_path)?;

        for (name, change) in changes {
            if change.created || change.dropped || db.table_exists(name)? {
                continue;
            }
            let Some(table) = document.tables.iter().find(|t| &t.name == name) else {
                continue;
            };
            let columns = table
                .columns
                .iter()
                .take(table.base_columns)
                .map(|c| {
                    let column = ColumnDefinition::from_msi_type(&c.name, &c.msi_type)?;
                    Ok(if c.primary_key { column.primary_key() } else { column })
                })
                .collect::<Result<Vec<_>>>()?;
            if columns.is_empty() {
                return Err(Error::Toolchain(format!(
                    "Transform modifies table {name} whose schema is unknown"
                )));
            }
            debug!("Creating table {} missing from the schema", name);
            db.create_table(&TableDefinition::new(name, columns))?;
        }

        for (name, change) in changes {
            if change.modified.is_empty() || !db.table_exists(name)? {
                continue;
            }
            let columns = db.columns(name)?;
            for key in change.modified.keys() {
                let key_fields = typed_key(&columns, key)?;
                if db.find_record(name, &key_fields)?.is_some() {
                    continue;
                }
                db.insert_record(name, &placeholder(&columns, key_fields, empty))?;
            }
        }
        Ok(())
    }

    fn unbind_table(
        &self,
        db: &Database,
        document: &TransformDocument,
        name: &str,
        change: &TableChanges,
    ) -> Result<Table> {
        let definition = if change.dropped {
            match self.registry.get(name) {
                Some(definition) => definition.clone(),
                None => {
                    let columns = document
                        .tables
                        .iter()
                        .find(|t| t.name == name)
                        .map(|t| {
                            t.columns
                                .iter()
                                .map(|c| ColumnDefinition::from_msi_type(&c.name, &c.msi_type))
                                .collect::<Result<Vec<_>>>()
                        })
                        .transpose()?
                        .unwrap_or_default();
                    TableDefinition::new(name, columns)
                }
            }
        } else {
            let live = db.columns(name).map_err(|_| {
                Error::Toolchain(format!("Table {name} is missing after applying the transform"))
            })?;
            matching_definition(self.registry, name, &live)
                .unwrap_or_else(|| TableDefinition::new(name, live))
        };

        let mut table = Table::new(definition);
        if change.dropped {
            table.operation = TableOperation::Drop;
            return Ok(table);
        }
        if change.created {
            table.operation = TableOperation::Add;
        }

        let current: BTreeMap<String, Record> = db
            .records(name)?
            .into_iter()
            .map(|record| (record_key(&table.definition, &record), record))
            .collect();

        for key in &change.inserted {
            let Some(record) = current.get(key) else {
                return Err(Error::Toolchain(format!(
                    "Row {key} of {name} is missing after applying the transform"
                )));
            };
            let mut row = Row::new(&table.definition, None);
            row.operation = RowOperation::Add;
            for (i, column) in table.definition.columns.iter().enumerate() {
                row.fields[i].value = self.field_value(name, key, column, record.get(i))?;
            }
            table.rows.push(row);
        }

        for (key, columns) in &change.modified {
            if change.inserted.contains(key) {
                continue;
            }
            let Some(record) = current.get(key) else {
                continue;
            };
            let mut row = Row::new(&table.definition, None);
            row.operation = RowOperation::Modify;
            for (i, column) in table.definition.columns.iter().enumerate() {
                if column.primary_key {
                    row.fields[i].value = self.field_value(name, key, column, record.get(i))?;
                } else if columns.contains(&column.name) {
                    row.fields[i] = Field {
                        value: self.field_value(name, key, column, record.get(i))?,
                        previous: None,
                        modified: true,
                    };
                }
            }
            table.rows.push(row);
        }

        for key in &change.deleted {
            let mut row = Row::new(&table.definition, None);
            row.operation = RowOperation::Delete;
            let key_fields = typed_key(&table.definition.columns, key)?;
            for (index, field) in table.definition.primary_key_indexes().into_iter().zip(key_fields) {
                row.fields[index].value = match field {
                    RecordField::Integer(n) => FieldValue::Number(n),
                    RecordField::String(s) => FieldValue::String(s),
                    _ => FieldValue::Null,
                };
            }
            table.rows.push(row);
        }

        Ok(table)
    }

    fn field_value(
        &self,
        table: &str,
        key: &str,
        column: &ColumnDefinition,
        field: &RecordField,
    ) -> Result<FieldValue> {
        Ok(match field {
            f if f.is_null() => FieldValue::Null,
            RecordField::Integer(n) if column.column_type == ColumnType::Number => FieldValue::Number(*n),
            RecordField::Integer(n) => FieldValue::String(n.to_string()),
            RecordField::String(s) if column.column_type == ColumnType::Number => {
                s.parse().map(FieldValue::Number).map_err(|_| Error::TypeMismatch {
                    column: column.name.clone(),
                    expected: "number",
                    actual: "string",
                })?
            }
            RecordField::String(s) => FieldValue::String(s.clone()),
            RecordField::Stream(data) => {
                let folder = self.export_folder.join(table);
                fs::create_dir_all(&folder)?;
                let path = folder.join(key.replace('\t', "."));
                fs::write(&path, data)?;
                FieldValue::Object(path)
            }
            RecordField::Null => FieldValue::Null,
        })
    }
}

/// Group the rows of `_TransformView` by table
fn read_transform_view(db: &Database) -> Result<BTreeMap<String, TableChanges>> {
    let mut changes: BTreeMap<String, TableChanges> = BTreeMap::new();
    let sql = format!(
        "SELECT `Table`, `Column`, `Row`, `Data`, `Current` FROM `{TRANSFORM_VIEW_TABLE}`"
    );
    let mut view = db.open_execute_view(&sql, None)?;

    while let Some(record) = view.fetch() {
        let (Some(table), Some(column)) = (record.get_string(0), record.get_string(1)) else {
            continue;
        };
        let row = record.get_string(2);
        let change = changes.entry(table).or_default();
        match (column.as_str(), row) {
            ("CREATE", None) => change.created = true,
            ("DROP", None) => change.dropped = true,
            ("INSERT", Some(key)) => {
                change.inserted.insert(key);
            }
            ("DELETE", Some(key)) => {
                change.deleted.insert(key);
            }
            (_, None) => change.columns.push(column),
            (_, Some(key)) => {
                change.modified.entry(key).or_default().insert(column);
            }
        }
    }

    // Column values of inserted rows are not modifications
    for change in changes.values_mut() {
        let inserted = &change.inserted;
        change.modified.retain(|key, _| !inserted.contains(key));
    }
    Ok(changes)
}

fn record_key(definition: &TableDefinition, record: &Record) -> String {
    definition
        .primary_key_indexes()
        .into_iter()
        .map(|i| record.get(i).to_display_string())
        .collect::<Vec<_>>()
        .join("\t")
}

/// Split a tab-joined key into fields typed by the key columns
fn typed_key(columns: &[ColumnDefinition], key: &str) -> Result<Vec<RecordField>> {
    let keys: Vec<&ColumnDefinition> = columns.iter().filter(|c| c.primary_key).collect();
    let parts: Vec<&str> = key.split('\t').collect();
    if parts.len() != keys.len() {
        return Err(Error::Toolchain(format!(
            "Key '{}' does not match the {} key columns",
            key.replace('\t', "/"),
            keys.len()
        )));
    }
    keys.iter()
        .zip(parts)
        .map(|(column, part)| match column.column_type {
            ColumnType::Number => part.parse().map(RecordField::Integer).map_err(|_| {
                Error::TypeMismatch {
                    column: column.name.clone(),
                    expected: "number",
                    actual: "string",
                }
            }),
            _ => Ok(RecordField::from(part)),
        })
        .collect()
}

/// Row with the given key and a dummy value in every required column
fn placeholder(columns: &[ColumnDefinition], key: Vec<RecordField>, empty: &[u8]) -> Record {
    let mut key = key.into_iter();
    let fields = columns
        .iter()
        .map(|column| {
            if column.primary_key {
                key.next().unwrap_or_default()
            } else if column.nullable {
                RecordField::Null
            } else {
                match column.column_type {
                    ColumnType::Number => RecordField::Integer(0),
                    ColumnType::Object => RecordField::Stream(empty.to_vec()),
                    ColumnType::String | ColumnType::Localized => RecordField::from(PLACEHOLDER_TEXT),
                }
            }
        })
        .collect();
    Record::from_fields(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msi::retry::RetryPolicy;
    use tempfile::TempDir;

    #[test]
    fn test_placeholder_fills_required_columns() {
        let registry = TableDefinitionCollection::builtin();
        let columns = &registry.get("Media").unwrap().columns;
        let record = placeholder(columns, vec![RecordField::Integer(2)], &[]);
        assert_eq!(record.get(0), &RecordField::Integer(2));
        assert_eq!(record.get(1), &RecordField::Integer(0));
        assert!(record.get(3).is_null());
    }

    #[test]
    fn test_typed_key_checks_width() {
        let registry = TableDefinitionCollection::builtin();
        let columns = &registry.get("FeatureComponents").unwrap().columns;
        let key = typed_key(columns, "Main\tCore").unwrap();
        assert_eq!(key, vec![RecordField::from("Main"), RecordField::from("Core")]);
        assert!(typed_key(columns, "Main").is_err());
    }

    #[test]
    fn test_created_table_rows_are_added() {
        let temp = TempDir::new().unwrap();
        let options = BindOptions {
            intermediate_folder: temp.path().join("obj"),
            commit_retry: RetryPolicy::immediate(),
            ..BindOptions::default()
        };
        let registry = TableDefinitionCollection::builtin();
        let reference = Database::create(&temp.path().join("old.msi")).unwrap();
        let target = Database::create(&temp.path().join("new.msi")).unwrap();
        let definition = TableDefinition::new(
            "WixNewTable",
            vec![
                ColumnDefinition::string("Id", 72).primary_key(),
                ColumnDefinition::number("Value", 2),
            ],
        );
        target.create_table(&definition).unwrap();
        target
            .insert_record(
                "WixNewTable",
                &Record::from_fields(vec![RecordField::from("A"), RecordField::Integer(7)]),
            )
            .unwrap();
        let transform = temp.path().join("new.mst");
        assert!(target.generate_transform(&reference, &transform).unwrap());

        let output =
            UnbindTransformCommand::new(&transform, &temp.path().join("export"), &registry, &options)
                .execute()
                .unwrap();
        let table = output.data.table("WixNewTable").unwrap();
        assert_eq!(table.operation, TableOperation::Add);
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].operation, RowOperation::Add);
        assert_eq!(table.rows[0].value(1), &FieldValue::Number(7));
    }

    #[test]
    fn test_added_column_on_unregistered_table() {
        let temp = TempDir::new().unwrap();
        let options = BindOptions {
            intermediate_folder: temp.path().join("obj"),
            commit_retry: RetryPolicy::immediate(),
            ..BindOptions::default()
        };
        let registry = TableDefinitionCollection::builtin();
        let reference = Database::create(&temp.path().join("old.msi")).unwrap();
        let target = Database::create(&temp.path().join("new.msi")).unwrap();
        reference
            .create_table(&TableDefinition::new(
                "WixExtTable",
                vec![
                    ColumnDefinition::string("Id", 72).primary_key(),
                    ColumnDefinition::number("A", 2),
                ],
            ))
            .unwrap();
        target
            .create_table(&TableDefinition::new(
                "WixExtTable",
                vec![
                    ColumnDefinition::string("Id", 72).primary_key(),
                    ColumnDefinition::number("A", 2),
                    ColumnDefinition::number("B", 2),
                ],
            ))
            .unwrap();
        target
            .insert_record(
                "WixExtTable",
                &Record::from_fields(vec![
                    RecordField::from("Row1"),
                    RecordField::Integer(1),
                    RecordField::Integer(2),
                ]),
            )
            .unwrap();
        let transform = temp.path().join("ext.mst");
        assert!(target.generate_transform(&reference, &transform).unwrap());

        let output =
            UnbindTransformCommand::new(&transform, &temp.path().join("export"), &registry, &options)
                .execute()
                .unwrap();
        assert!(registry.get("WixExtTable").is_none());
        assert_eq!(
            output.added_columns.get("WixExtTable"),
            Some(&vec!["B".to_string()])
        );
    }
}
