// src/unbind/database.rs

//! Read an installer database back into a table model

use super::demodularize::Demodularizer;
use super::directories::{DirectoryLayout, DirectoryResolver, NamePair};
use super::extract::ExtractCabinetsCommand;
use crate::bind::VALIDATION_TABLE;
use crate::config::BindOptions;
use crate::context::CancellationToken;
use crate::data::{
    ColumnCategory, ColumnDefinition, ColumnModularizeType, ColumnType, FieldValue, OutputType,
    Table, TableDefinition, TableDefinitionCollection, WindowsInstallerData,
};
use crate::error::{Error, Result};
use crate::messaging::{MessageId, Messaging};
use crate::msi::idt::FORCE_CODEPAGE_TABLE;
use crate::msi::summary::PID_REVNUMBER;
use crate::msi::{Database, OpenMode, Record, RecordField};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const STREAMS_TABLE: &str = "_Streams";
const SUMMARY_TABLE: &str = "_SummaryInformation";

/// File attribute: stored uncompressed regardless of the package default
const FILE_NONCOMPRESSED: i32 = 0x2000;
/// File attribute: stored compressed regardless of the package default
const FILE_COMPRESSED: i32 = 0x4000;

/// A File row with its disk and reconstructed source path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnboundFile {
    pub id: String,
    pub sequence: i32,
    pub disk_id: i32,
    pub source: PathBuf,
}

/// Everything recovered from one database
#[derive(Debug, Default)]
pub struct UnbindOutput {
    pub data: WindowsInstallerData,
    pub files: Vec<UnboundFile>,
    /// GUID stripped from modularized identifiers
    pub modularization_guid: Option<String>,
    /// Custom actions owned by registered extensions, removed from the model
    pub extension_custom_actions: Vec<String>,
    /// Extracted cabinets by disk id
    pub cabinets: BTreeMap<i32, PathBuf>,
}

pub struct UnbindDatabaseCommand<'a> {
    database_path: PathBuf,
    output_type: OutputType,
    export_folder: PathBuf,
    extract_folder: Option<PathBuf>,
    registry: &'a TableDefinitionCollection,
    options: &'a BindOptions,
    cancellation: CancellationToken,
}

impl<'a> UnbindDatabaseCommand<'a> {
    /// `export_folder` receives Object column contents and streams
    pub fn new(
        database_path: &Path,
        output_type: OutputType,
        export_folder: &Path,
        registry: &'a TableDefinitionCollection,
        options: &'a BindOptions,
    ) -> Self {
        Self {
            database_path: database_path.to_path_buf(),
            output_type,
            export_folder: export_folder.to_path_buf(),
            extract_folder: None,
            registry,
            options,
            cancellation: CancellationToken::new(),
        }
    }

    /// Extract cabinets into `folder` and point File sources at it
    pub fn with_extract_folder(mut self, folder: &Path) -> Self {
        self.extract_folder = Some(folder.to_path_buf());
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn execute(&self, messaging: &mut Messaging) -> Result<UnbindOutput> {
        self.cancellation.check()?;
        info!("Unbinding {}", self.database_path.display());
        let db = Database::open(&self.database_path, OpenMode::ReadOnly)?;

        let mut output = UnbindOutput {
            data: WindowsInstallerData::new(self.output_type),
            ..UnbindOutput::default()
        };
        output.data.codepage = self.read_codepage(&db)?;

        let validation = read_validation(&db)?;
        let mut demodularizer = Demodularizer::new();

        for name in db.tables()? {
            self.cancellation.check()?;
            if name == VALIDATION_TABLE {
                continue;
            }
            let definition = self.table_definition(&db, &name, &validation, messaging)?;
            let table = self.unbind_table(&db, definition, &mut demodularizer, &mut output)?;
            output.data.tables.insert(name, table);
        }

        self.unbind_streams(&db, &mut output.data)?;

        output.modularization_guid = demodularizer.modularization_guid().map(str::to_string);
        let summary = db.summary_information()?;
        let summary_definition = self.definition(SUMMARY_TABLE)?;
        let summary_table = output.data.ensure_table(&summary_definition);
        for (id, value) in summary.iter() {
            let text = match (&output.modularization_guid, self.output_type) {
                (Some(guid), OutputType::Module) if id == PID_REVNUMBER => guid.clone(),
                _ => value.to_display_string(),
            };
            summary_table.add_row(None, vec![FieldValue::Number(id as i32), FieldValue::String(text)])?;
        }

        let word_count = summary.word_count();
        let long_names = word_count.long_filenames();
        let compressed = word_count.compressed();
        let admin_image = word_count.admin_image() || self.options.admin_image;
        debug!(
            "Source image: long names {}, compressed {}, admin image {}",
            long_names, compressed, admin_image
        );

        let extract_folder = match &self.extract_folder {
            Some(folder) if compressed && self.options.extract_cabinets => {
                output.cabinets = ExtractCabinetsCommand::new(&db, &self.options.intermediate_folder, folder)
                    .with_cancellation(self.cancellation.clone())
                    .execute()?;
                Some(folder.as_path())
            }
            _ => None,
        };

        output.files = self.unbind_files(&output.data, long_names, compressed, admin_image, extract_folder)?;
        check_foreign_keys(&output.data, messaging);

        info!(
            "Unbound {} tables and {} files from {}",
            output.data.tables.len(),
            output.files.len(),
            self.database_path.display()
        );
        Ok(output)
    }

    fn definition(&self, name: &str) -> Result<TableDefinition> {
        self.registry
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Table definition {name}")))
    }

    /// Codepage from the `_ForceCodepage` export
    fn read_codepage(&self, db: &Database) -> Result<i32> {
        let folder = &self.options.intermediate_folder;
        let file_name = format!("{FORCE_CODEPAGE_TABLE}.idt");
        db.export(FORCE_CODEPAGE_TABLE, folder, &file_name)?;
        let content = fs::read_to_string(folder.join(&file_name))?;
        let codepage = content
            .lines()
            .nth(2)
            .and_then(|line| line.split('\t').next())
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(0);
        Ok(codepage)
    }

    /// Registered definition when it matches the live table, otherwise the
    /// live columns enriched from `_Validation`
    fn table_definition(
        &self,
        db: &Database,
        name: &str,
        validation: &HashMap<(String, String), Record>,
        messaging: &mut Messaging,
    ) -> Result<TableDefinition> {
        let live = db.columns(name)?;

        if let Some(known) = matching_definition(self.registry, name, &live) {
            return Ok(known);
        }
        if self.registry.contains(name) {
            messaging.warning(
                MessageId::TableDefinitionMismatch,
                None,
                format!("Table {name} does not match its registered definition; using the database schema."),
            );
        }

        let columns = live
            .into_iter()
            .map(|column| match validation.get(&(name.to_string(), column.name.clone())) {
                Some(record) => apply_validation(column, record),
                None => column,
            })
            .collect();
        Ok(TableDefinition::new(name, columns))
    }

    fn unbind_table(
        &self,
        db: &Database,
        definition: TableDefinition,
        demodularizer: &mut Demodularizer,
        output: &mut UnbindOutput,
    ) -> Result<Table> {
        let key_indexes = definition.primary_key_indexes();
        let object_columns = definition
            .columns
            .iter()
            .filter(|c| c.column_type == ColumnType::Object)
            .count();
        let mut table = Table::new(definition);
        let records = db.records(table.name())?;

        for record in records {
            let mut values = Vec::with_capacity(table.definition.columns.len());
            let mut streams = Vec::new();

            for (i, column) in table.definition.columns.iter().enumerate() {
                let field = record.get(i);
                let value = match (column.column_type, field) {
                    (_, f) if f.is_null() => FieldValue::Null,
                    (ColumnType::Number, RecordField::Integer(n)) => FieldValue::Number(*n),
                    (ColumnType::Number, RecordField::String(s)) => {
                        FieldValue::Number(s.trim().parse().map_err(|_| Error::TypeMismatch {
                            column: column.name.clone(),
                            expected: "number",
                            actual: "string",
                        })?)
                    }
                    (ColumnType::String | ColumnType::Localized, RecordField::Integer(n)) => {
                        FieldValue::String(n.to_string())
                    }
                    (ColumnType::String | ColumnType::Localized, RecordField::String(s)) => {
                        let demodularized = if column.modularize != ColumnModularizeType::None
                            && !self.options.suppress_demodularization
                        {
                            demodularizer.demodularize(s)
                        } else {
                            None
                        };
                        FieldValue::String(demodularized.unwrap_or_else(|| s.clone()))
                    }
                    (ColumnType::Object, RecordField::Stream(data)) => {
                        streams.push((i, data.clone()));
                        FieldValue::Null
                    }
                    (_, other) => {
                        return Err(Error::TypeMismatch {
                            column: column.name.clone(),
                            expected: column.column_type.as_str(),
                            actual: match other {
                                RecordField::Stream(_) => "object",
                                RecordField::Integer(_) => "number",
                                _ => "string",
                            },
                        });
                    }
                };
                values.push(value);
            }

            let key = key_indexes
                .iter()
                .map(|i| values[*i].to_key_string())
                .collect::<Vec<_>>()
                .join(".");

            if table.name() == "CustomAction" && self.registry.is_extension_custom_action(&key) {
                debug!("Custom action {} belongs to an extension", key);
                output.extension_custom_actions.push(key);
                continue;
            }

            for (i, data) in streams {
                let file_name = if object_columns > 1 {
                    format!("{}.{}", key, table.definition.columns[i].name)
                } else {
                    key.clone()
                };
                let folder = self.export_folder.join(table.name());
                fs::create_dir_all(&folder)?;
                let path = folder.join(file_name);
                fs::write(&path, data)?;
                values[i] = FieldValue::Object(path);
            }

            table.add_row(None, values)?;
        }

        debug!("Read {} rows from {}", table.rows.len(), table.name());
        Ok(table)
    }

    /// Streams other than embedded cabinets become `_Streams` rows
    fn unbind_streams(&self, db: &Database, data: &mut WindowsInstallerData) -> Result<()> {
        let cabinets: HashSet<String> = data
            .table("Media")
            .map(|media| {
                let index = media.definition.column_index("Cabinet");
                media
                    .rows
                    .iter()
                    .filter_map(|row| match index.map(|i| row.value(i)) {
                        Some(FieldValue::String(name)) => name.strip_prefix('#').map(str::to_string),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default();

        let names: Vec<String> = db
            .stream_names()?
            .into_iter()
            .filter(|name| !cabinets.contains(name))
            .collect();
        if names.is_empty() {
            return Ok(());
        }

        let folder = self.export_folder.join(STREAMS_TABLE);
        fs::create_dir_all(&folder)?;
        let definition = self.definition(STREAMS_TABLE)?;
        let table = data.ensure_table(&definition);
        for name in names {
            let bytes = db.stream(&name)?.unwrap_or_default();
            let path = folder.join(&name);
            fs::write(&path, bytes)?;
            table.add_row(None, vec![FieldValue::String(name), FieldValue::Object(path)])?;
        }
        Ok(())
    }

    /// Assign disk ids and rebuild the source path of every File row
    fn unbind_files(
        &self,
        data: &WindowsInstallerData,
        long_names: bool,
        compressed: bool,
        admin_image: bool,
        extract_folder: Option<&Path>,
    ) -> Result<Vec<UnboundFile>> {
        let Some(file_table) = data.table("File") else {
            return Ok(Vec::new());
        };
        let definition = &file_table.definition;

        let component_directories: HashMap<&str, &str> = data
            .table("Component")
            .map(|components| {
                components
                    .rows
                    .iter()
                    .filter_map(|row| {
                        let id = row.string(&components.definition, "Component").ok()??;
                        let directory = row.string(&components.definition, "Directory_").ok()??;
                        Some((id, directory))
                    })
                    .collect()
            })
            .unwrap_or_default();

        let mut media: Vec<(i32, i32)> = data
            .table("Media")
            .map(|media| {
                media
                    .rows
                    .iter()
                    .filter_map(|row| {
                        let disk = row.number(&media.definition, "DiskId").ok()??;
                        let last = row.number(&media.definition, "LastSequence").ok()??;
                        Some((disk, last))
                    })
                    .collect()
            })
            .unwrap_or_default();
        media.sort_by_key(|(_, last)| *last);

        let mut rows: Vec<_> = file_table.rows.iter().collect();
        rows.sort_by_key(|row| row.number(definition, "Sequence").ok().flatten().unwrap_or(0));

        let directories = DirectoryResolver::new(data, long_names);
        let database_folder = self
            .database_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let mut files = Vec::with_capacity(rows.len());
        let mut cursor = 0;
        for row in rows {
            self.cancellation.check()?;
            let id = row.string(definition, "File")?.unwrap_or_default().to_string();
            let sequence = row.number(definition, "Sequence")?.unwrap_or(0);
            let attributes = row.number(definition, "Attributes")?.unwrap_or(0);

            while cursor + 1 < media.len() && sequence > media[cursor].1 {
                cursor += 1;
            }
            let disk_id = media.get(cursor).map(|(disk, _)| *disk).unwrap_or(1);

            let name = NamePair::parse(row.string(definition, "FileName")?.unwrap_or_default())
                .pick(long_names)
                .to_string();
            let directory = row
                .string(definition, "Component_")?
                .and_then(|component| component_directories.get(component).copied());
            let file_compressed = (compressed && attributes & FILE_NONCOMPRESSED == 0)
                || attributes & FILE_COMPRESSED != 0;

            let source = if admin_image {
                let folder = directory
                    .and_then(|d| directories.path(d, DirectoryLayout::Target))
                    .unwrap_or_default();
                database_folder.join(folder).join(&name)
            } else if let (true, Some(extracted)) = (file_compressed, extract_folder) {
                extracted.join(&id)
            } else {
                let folder = directory
                    .and_then(|d| directories.path(d, DirectoryLayout::Source))
                    .unwrap_or_default();
                database_folder.join(folder).join(&name)
            };

            files.push(UnboundFile {
                id,
                sequence,
                disk_id,
                source,
            });
        }
        Ok(files)
    }
}

/// The registered definition of `name` when it describes the live columns
pub(crate) fn matching_definition(
    registry: &TableDefinitionCollection,
    name: &str,
    live: &[ColumnDefinition],
) -> Option<TableDefinition> {
    let known = registry.get(name)?;
    let matches = known.columns.len() == live.len()
        && known
            .columns
            .iter()
            .zip(live)
            .all(|(a, b)| a.name == b.name && a.column_type == b.column_type);
    matches.then(|| known.clone())
}

/// `_Validation` rows keyed by (table, column)
fn read_validation(db: &Database) -> Result<HashMap<(String, String), Record>> {
    let mut rows = HashMap::new();
    if !db.table_exists(VALIDATION_TABLE)? {
        return Ok(rows);
    }
    for record in db.records(VALIDATION_TABLE)? {
        if let (Some(table), Some(column)) = (record.get_string(0), record.get_string(1)) {
            rows.insert((table, column), record);
        }
    }
    Ok(rows)
}

fn apply_validation(mut column: ColumnDefinition, record: &Record) -> ColumnDefinition {
    if let Some(nullable) = record.get_string(2) {
        column.nullable = nullable == "Y";
    }
    column.min_value = record.get_integer(3).map(i64::from);
    column.max_value = record.get_integer(4).map(i64::from);
    column.key_table = record.get_string(5);
    column.key_column = record.get_integer(6).and_then(|k| u32::try_from(k).ok());
    if let Some(category) = record.get_string(7).and_then(|c| c.parse::<ColumnCategory>().ok()) {
        column.category = category;
    }
    column.possibilities = record.get_string(8);
    column.description = record.get_string(9);
    column.modularize = ColumnModularizeType::guess(column.category, column.key_table.as_deref());
    column
}

/// Warn about identifier references to rows that do not exist
fn check_foreign_keys(data: &WindowsInstallerData, messaging: &mut Messaging) {
    for table in data.tables.values() {
        for (index, column) in table.definition.columns.iter().enumerate() {
            let (Some(key_table), Some(1)) = (column.key_table.as_deref(), column.key_column) else {
                continue;
            };
            if column.category != ColumnCategory::Identifier {
                continue;
            }
            let Some(target) = data.table(key_table) else {
                continue;
            };
            if target.definition.primary_key_indexes().len() != 1 {
                continue;
            }
            let keys: HashSet<String> = target
                .rows
                .iter()
                .map(|row| row.primary_key(&target.definition))
                .collect();

            for row in &table.rows {
                let FieldValue::String(value) = row.value(index) else {
                    continue;
                };
                if !keys.contains(value) {
                    messaging.warning(
                        MessageId::ForeignKeyRowNotFound,
                        row.source_line.as_ref(),
                        format!(
                            "{}/{} references {} row '{}' which does not exist.",
                            table.name(),
                            column.name,
                            key_table,
                            value
                        ),
                    );
                }
            }
        }
    }
}
