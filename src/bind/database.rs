// src/bind/database.rs

//! Write a table model into a new installer database

use super::validate::{self, VALIDATION_TABLE};
use crate::cabinet::{self, CabinetEntry};
use crate::config::BindOptions;
use crate::context::{BindOutputs, CancellationToken, TrackedFileType};
use crate::data::{
    FieldValue, RowOperation, Table, TableDefinition, TableDefinitionCollection,
    WindowsInstallerData,
};
use crate::error::{Error, Result};
use crate::guid;
use crate::messaging::Messaging;
use crate::msi::summary::{
    self, PID_APPNAME, PID_CODEPAGE, PID_CREATE_DTM, PID_LASTSAVE_DTM, PID_PAGECOUNT,
    PID_REVNUMBER, PID_TEMPLATE, PID_TITLE, PID_WORDCOUNT,
};
use crate::msi::{Database, Record, RecordField, SummaryInformation, SummaryValue, WordCount};
use chrono::{DateTime, NaiveDateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Table the `_Streams` rows of the model are written to
const STREAMS_TABLE: &str = "_Streams";
const SUMMARY_TABLE: &str = "_SummaryInformation";

/// Installer schema written when the model does not set one
const DEFAULT_PAGE_COUNT: i32 = 500;

/// A cabinet to build during the bind
///
/// Names starting with `#` are embedded as streams of the database; other
/// cabinets are written next to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CabinetRequest {
    pub name: String,
    pub entries: Vec<CabinetEntry>,
}

/// Binds one [`WindowsInstallerData`] into an installer database file
pub struct BindDatabaseCommand<'a> {
    data: &'a WindowsInstallerData,
    output_path: PathBuf,
    options: &'a BindOptions,
    cabinets: Vec<CabinetRequest>,
    cancellation: CancellationToken,
}

impl<'a> BindDatabaseCommand<'a> {
    pub fn new(data: &'a WindowsInstallerData, output_path: &Path, options: &'a BindOptions) -> Self {
        Self {
            data,
            output_path: output_path.to_path_buf(),
            options,
            cabinets: Vec::new(),
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn with_cabinets(mut self, cabinets: Vec<CabinetRequest>) -> Self {
        self.cabinets = cabinets;
        self
    }

    /// Validate the model and write the database
    ///
    /// Authoring problems are reported on `messaging`; when any is recorded
    /// no database is created and the returned outputs are empty.
    pub fn execute(&self, messaging: &mut Messaging) -> Result<BindOutputs> {
        let mut outputs = BindOutputs::new();
        self.cancellation.check()?;

        validate::validate_rows(self.data, !self.options.suppress_validation, messaging);
        if messaging.encountered_error() {
            return Ok(outputs);
        }

        info!("Binding {} tables into {}", self.data.tables.len(), self.output_path.display());
        let db = Database::create(&self.output_path)?.with_retry_policy(self.options.commit_retry);
        outputs.track(&self.output_path, TrackedFileType::BuiltTargetOutput, None);

        let codepage = if self.data.codepage != 0 {
            self.data.codepage
        } else {
            self.options.default_codepage
        };
        db.set_codepage(codepage)?;

        let mut written = Vec::new();
        for table in self.data.tables.values() {
            self.cancellation.check()?;
            if table.definition.unreal {
                if table.name() == STREAMS_TABLE {
                    write_streams(&db, table)?;
                }
                continue;
            }
            write_table(&db, table)?;
            written.push(&table.definition);
        }

        let has_validation = self
            .data
            .table(VALIDATION_TABLE)
            .is_some_and(|t| !t.rows.is_empty());
        if !self.options.suppress_validation && !has_validation {
            if !db.table_exists(VALIDATION_TABLE)? {
                db.create_table(&validation_definition()?)?;
            }
            let records = validate::validation_records(written.iter().copied());
            debug!("Writing {} _Validation rows", records.len());
            for record in records {
                db.replace_record(VALIDATION_TABLE, &record)?;
            }
        }

        for request in &self.cabinets {
            self.cancellation.check()?;
            self.build_cabinet(&db, request, &mut outputs)?;
        }

        let summary = self.summary_information(codepage)?;
        db.set_summary_information(&summary)?;

        db.commit()?;
        info!("Bound {}", self.output_path.display());
        Ok(outputs)
    }

    fn build_cabinet(&self, db: &Database, request: &CabinetRequest, outputs: &mut BindOutputs) -> Result<()> {
        match request.name.strip_prefix('#') {
            Some(stream) => {
                let path = self.options.intermediate_folder.join(stream);
                cabinet::create_cabinet(&path, &request.entries, self.options.default_compression)?;
                outputs.track(&path, TrackedFileType::Temporary, None);
                db.set_stream(stream, &std::fs::read(&path)?)?;
            }
            None => {
                let folder = self.output_path.parent().unwrap_or(Path::new("."));
                let path = folder.join(&request.name);
                cabinet::create_cabinet(&path, &request.entries, self.options.default_compression)?;
                outputs.track(&path, TrackedFileType::BuiltTargetOutput, None);
            }
        }
        Ok(())
    }

    /// Summary stream from the model's `_SummaryInformation` rows, with
    /// defaults for whatever the model leaves out
    fn summary_information(&self, codepage: i32) -> Result<SummaryInformation> {
        let mut info = SummaryInformation::new();

        if let Some(table) = self.data.table(SUMMARY_TABLE) {
            for row in &table.rows {
                let (FieldValue::Number(id), value) = (row.value(0), row.value(1)) else {
                    continue;
                };
                let text = value.to_key_string();
                if text.is_empty() {
                    continue;
                }
                let id = u32::try_from(*id)
                    .map_err(|_| Error::ParseError(format!("Summary property {id} is out of range")))?;
                info.set(id, summary::parse_value(id, &text)?)?;
            }
        }

        if info.get(PID_CODEPAGE).is_none() && codepage != 0 {
            info.set_integer(PID_CODEPAGE, codepage)?;
        }
        if info.get(PID_TITLE).is_none() {
            info.set_string(PID_TITLE, "Installation Database")?;
        }
        if info.get(PID_TEMPLATE).is_none() {
            info.set_string(PID_TEMPLATE, "Intel;1033")?;
        }
        if info.get(PID_REVNUMBER).is_none() {
            info.set_string(PID_REVNUMBER, guid::new_guid())?;
        }
        if info.get(PID_PAGECOUNT).is_none() {
            info.set_integer(PID_PAGECOUNT, DEFAULT_PAGE_COUNT)?;
        }
        if info.get(PID_WORDCOUNT).is_none() {
            let mut flags = WordCount::empty();
            if self.has_cabinets() {
                flags |= WordCount::COMPRESSED;
            }
            if self.options.admin_image {
                flags |= WordCount::ADMIN_IMAGE;
            }
            info.set_integer(PID_WORDCOUNT, flags.bits())?;
        }
        let now = build_time();
        for id in [PID_CREATE_DTM, PID_LASTSAVE_DTM] {
            if info.get(id).is_none() {
                info.set(id, SummaryValue::FileTime(now))?;
            }
        }
        if info.get(PID_APPNAME).is_none() {
            info.set_string(PID_APPNAME, concat!("wixbind ", env!("CARGO_PKG_VERSION")))?;
        }
        Ok(info)
    }

    fn has_cabinets(&self) -> bool {
        !self.cabinets.is_empty()
            || self.data.table("Media").is_some_and(|media| {
                let index = media.definition.column_index("Cabinet");
                media
                    .rows
                    .iter()
                    .any(|row| index.is_some_and(|i| !row.value(i).is_null()))
            })
    }
}

/// Time stamped into the summary stream, pinned by `SOURCE_DATE_EPOCH`
fn build_time() -> NaiveDateTime {
    std::env::var("SOURCE_DATE_EPOCH")
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or_else(Utc::now)
        .naive_utc()
}

fn write_table(db: &Database, table: &Table) -> Result<()> {
    let definition = &table.definition;
    if !db.table_exists(&definition.name)? {
        db.create_table(definition)?;
    }

    let mut count = 0;
    for row in &table.rows {
        if row.operation == RowOperation::Delete {
            continue;
        }
        let mut record = Record::new(definition.columns.len());
        for (i, field) in row.fields.iter().enumerate() {
            record.set(i, field_to_record(&field.value)?);
        }
        db.insert_record(&definition.name, &record).map_err(|e| match e {
            Error::Database { code, message } => Error::Database {
                code,
                message: format!(
                    "{} (table {}, row '{}'{})",
                    message,
                    definition.name,
                    row.primary_key(definition),
                    row.source_line
                        .as_ref()
                        .map(|s| format!(", {s}"))
                        .unwrap_or_default()
                ),
            },
            other => other,
        })?;
        count += 1;
    }
    debug!("Wrote {} rows to {}", count, definition.name);
    Ok(())
}

fn write_streams(db: &Database, table: &Table) -> Result<()> {
    for row in &table.rows {
        let FieldValue::String(name) = row.value(0) else {
            continue;
        };
        match row.value(1) {
            FieldValue::Object(path) => db.set_stream(name, &read_object(path)?)?,
            FieldValue::Null => db.set_stream(name, &[])?,
            other => {
                return Err(Error::TypeMismatch {
                    column: "Data".to_string(),
                    expected: "object",
                    actual: other.kind(),
                });
            }
        }
    }
    Ok(())
}

fn field_to_record(value: &FieldValue) -> Result<RecordField> {
    Ok(match value {
        FieldValue::Null => RecordField::Null,
        FieldValue::String(s) => RecordField::String(s.clone()),
        FieldValue::Number(n) => RecordField::Integer(*n),
        FieldValue::Object(path) => RecordField::Stream(read_object(path)?),
    })
}

fn read_object(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| Error::IoError(format!("Failed to read {}: {}", path.display(), e)))
}

fn validation_definition() -> Result<TableDefinition> {
    TableDefinitionCollection::builtin()
        .get(VALIDATION_TABLE)
        .cloned()
        .ok_or_else(|| Error::NotFound(format!("Table definition {VALIDATION_TABLE}")))
}
