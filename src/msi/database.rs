// src/msi/database.rs

//! Installer database handle
//!
//! An installer database is a SQLite file with a small catalog describing
//! the user tables:
//!
//! - `_Tables(Name)` lists every persistent table
//! - `_Columns(Table, Number, Name, Type, PrimaryKey)` holds the column
//!   definitions with installer type strings (`s72`, `I2`, `V0`, ...)
//! - `_Streams(Name, Data)` holds named binary streams (embedded cabinets)
//! - `_SummaryInformation(PropertyId, Value)` holds the summary stream
//! - `_Meta(Key, Value)` holds the codepage
//!
//! Transacted handles keep an open transaction that [`Database::commit`]
//! persists; dropping the handle without committing rolls it back.

use super::record::{Record, RecordField};
use super::retry::{RetryPolicy, commit_with_retry};
use super::summary::{self, SummaryInformation, SummaryValue};
use super::view::View;
use super::{TransformErrorConditions, idt, quote, transform};
use crate::data::{ColumnDefinition, ColumnType, TableDefinition};
use crate::error::{Error, Result};
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Native status returned when a database cannot be opened
pub const ERROR_OPEN_FAILED: i32 = 110;
/// Native status for a table or column definition that does not match
pub const ERROR_DATATYPE_MISMATCH: i32 = 1629;
/// Native status for a generic failure inside the service
pub const ERROR_FUNCTION_FAILED: i32 = 1627;
/// Native status for a transform that cannot be applied
pub const ERROR_INSTALL_TRANSFORM_FAILURE: i32 = 1624;

const CATALOG_SCHEMA: &str = "
    CREATE TABLE _Tables (
        Name TEXT PRIMARY KEY NOT NULL
    );
    CREATE TABLE _Columns (
        `Table` TEXT NOT NULL,
        Number INTEGER NOT NULL,
        Name TEXT NOT NULL,
        Type TEXT NOT NULL,
        PrimaryKey INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (`Table`, Number)
    );
    CREATE TABLE _Streams (
        Name TEXT PRIMARY KEY NOT NULL,
        Data BLOB
    );
    CREATE TABLE _SummaryInformation (
        PropertyId INTEGER PRIMARY KEY,
        Value
    );
    CREATE TABLE _Meta (
        Key TEXT PRIMARY KEY NOT NULL,
        Value TEXT
    );
";

/// How a database is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    ReadOnly,
    /// Changes are held in a transaction until commit
    Transact,
    /// Changes are written immediately
    Direct,
    /// Create a new database (replacing any existing file), transacted
    Create,
    /// Create a new database, direct
    CreateDirect,
    /// Open a patch package read-only
    OpenPatchFile,
}

impl OpenMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpenMode::ReadOnly => "readonly",
            OpenMode::Transact => "transact",
            OpenMode::Direct => "direct",
            OpenMode::Create => "create",
            OpenMode::CreateDirect => "createdirect",
            OpenMode::OpenPatchFile => "patchfile",
        }
    }

    fn is_read_only(&self) -> bool {
        matches!(self, OpenMode::ReadOnly | OpenMode::OpenPatchFile)
    }

    fn is_create(&self) -> bool {
        matches!(self, OpenMode::Create | OpenMode::CreateDirect)
    }

    fn is_transacted(&self) -> bool {
        matches!(self, OpenMode::Transact | OpenMode::Create)
    }
}

/// Persistence of a table as reported by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableCondition {
    Persistent,
    Temporary,
    Unknown,
}

/// Handle to one installer database
pub struct Database {
    conn: Connection,
    path: PathBuf,
    mode: OpenMode,
    retry: RetryPolicy,
}

impl Database {
    /// Open a database in the given mode
    pub fn open(path: &Path, mode: OpenMode) -> Result<Self> {
        debug!("Opening installer database {} ({})", path.display(), mode.as_str());

        if mode.is_create() {
            if path.exists() {
                std::fs::remove_file(path)?;
            }
        } else if !path.exists() {
            return Err(Error::Database {
                code: ERROR_OPEN_FAILED,
                message: format!("Database not found: {}", path.display()),
            });
        }

        let flags = if mode.is_read_only() {
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX
        } else if mode.is_create() {
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX
        };

        let conn = Connection::open_with_flags(path, flags).map_err(|e| Error::Database {
            code: ERROR_OPEN_FAILED,
            message: format!("{}: {}", path.display(), e),
        })?;
        // Lock contention surfaces immediately; commit retries handle it
        conn.busy_timeout(Duration::ZERO)?;

        if mode.is_create() {
            conn.execute_batch(CATALOG_SCHEMA)?;
        } else {
            let has_catalog: bool = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = '_Tables'",
                    [],
                    |row| row.get::<_, i64>(0),
                )
                .map(|n| n > 0)
                .map_err(|e| Error::Database {
                    code: ERROR_OPEN_FAILED,
                    message: format!("{}: {}", path.display(), e),
                })?;
            if !has_catalog {
                return Err(Error::Database {
                    code: ERROR_OPEN_FAILED,
                    message: format!("Not an installer database: {}", path.display()),
                });
            }
        }

        if mode.is_transacted() {
            conn.execute_batch("BEGIN")?;
        }

        Ok(Self {
            conn,
            path: path.to_path_buf(),
            mode,
            retry: RetryPolicy::default(),
        })
    }

    /// Create a new transacted database, replacing any existing file
    pub fn create(path: &Path) -> Result<Self> {
        Self::open(path, OpenMode::Create)
    }

    /// Override the commit retry policy
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Persist pending changes, retrying lock violations
    pub fn commit(&self) -> Result<()> {
        if !self.mode.is_transacted() {
            return Ok(());
        }

        commit_with_retry(&self.retry, || {
            self.conn.execute_batch("COMMIT")?;
            Ok(())
        })?;
        self.conn.execute_batch("BEGIN")?;

        info!("Committed installer database {}", self.path.display());
        Ok(())
    }

    /// Codepage of the database (0 is neutral)
    pub fn codepage(&self) -> Result<i32> {
        let value: Option<String> = self
            .conn
            .query_row("SELECT Value FROM _Meta WHERE Key = 'codepage'", [], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value.and_then(|v| v.parse().ok()).unwrap_or(0))
    }

    pub fn set_codepage(&self, codepage: i32) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO _Meta (Key, Value) VALUES ('codepage', ?1)",
            params![codepage.to_string()],
        )?;
        Ok(())
    }

    /// Persistence condition of a table
    pub fn table_condition(&self, name: &str) -> Result<TableCondition> {
        let persistent: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM _Tables WHERE Name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        if persistent > 0 {
            return Ok(TableCondition::Persistent);
        }

        let temporary: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_temp_master WHERE type = 'table' AND name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(if temporary > 0 {
            TableCondition::Temporary
        } else {
            TableCondition::Unknown
        })
    }

    /// True for both persistent and temporary tables
    pub fn table_exists(&self, name: &str) -> Result<bool> {
        Ok(self.table_condition(name)? != TableCondition::Unknown)
    }

    /// Names of all persistent tables in creation order
    pub fn tables(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT Name FROM _Tables ORDER BY rowid")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }

    /// Column definitions of a table, in column order
    pub fn columns(&self, table: &str) -> Result<Vec<ColumnDefinition>> {
        let mut stmt = self.conn.prepare(
            "SELECT Name, Type, PrimaryKey FROM _Columns WHERE `Table` = ?1 ORDER BY Number",
        )?;
        let rows = stmt
            .query_map(params![table], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)? != 0,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        if rows.is_empty() {
            return Err(Error::NotFound(format!("Table {table}")));
        }

        rows.into_iter()
            .map(|(name, msi_type, primary_key)| {
                let column = ColumnDefinition::from_msi_type(&name, &msi_type)?;
                Ok(if primary_key { column.primary_key() } else { column })
            })
            .collect()
    }

    /// Ordered primary key column names of a table
    pub fn primary_keys(&self, table: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT Name FROM _Columns WHERE `Table` = ?1 AND PrimaryKey = 1 ORDER BY Number",
        )?;
        let keys = stmt
            .query_map(params![table], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        if keys.is_empty() && !self.table_exists(table)? {
            return Err(Error::NotFound(format!("Table {table}")));
        }
        Ok(keys)
    }

    /// Installer type string of a column, including catalog pseudo-tables
    pub(crate) fn column_type(&self, table: &str, column: &str) -> Result<Option<String>> {
        if let Some(t) = catalog_column_type(table, column) {
            return Ok(Some(t.to_string()));
        }
        Ok(self
            .conn
            .query_row(
                "SELECT Type FROM _Columns WHERE `Table` = ?1 AND Name = ?2",
                params![table, column],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Create a persistent table from its definition
    pub fn create_table(&self, definition: &TableDefinition) -> Result<()> {
        if self.table_exists(&definition.name)? {
            return Err(Error::Database {
                code: ERROR_FUNCTION_FAILED,
                message: format!("Table {} already exists", definition.name),
            });
        }
        if definition.columns.is_empty() {
            return Err(Error::Database {
                code: ERROR_FUNCTION_FAILED,
                message: format!("Table {} has no columns", definition.name),
            });
        }

        let mut parts: Vec<String> = definition
            .columns
            .iter()
            .map(|c| {
                let mut column = format!("{} {}", quote(&c.name), sql_type(c.column_type));
                if !c.nullable {
                    column.push_str(" NOT NULL");
                }
                column
            })
            .collect();
        let keys = definition.primary_key_names();
        if !keys.is_empty() {
            let keys: Vec<String> = keys.into_iter().map(quote).collect();
            parts.push(format!("PRIMARY KEY ({})", keys.join(", ")));
        }

        let sql = format!("CREATE TABLE {} ({})", quote(&definition.name), parts.join(", "));
        debug!("{}", sql);
        self.conn.execute(&sql, [])?;

        self.conn.execute(
            "INSERT INTO _Tables (Name) VALUES (?1)",
            params![definition.name],
        )?;
        for (i, column) in definition.columns.iter().enumerate() {
            self.conn.execute(
                "INSERT INTO _Columns (`Table`, Number, Name, Type, PrimaryKey) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    definition.name,
                    i as i64 + 1,
                    column.name,
                    column.msi_type(),
                    column.primary_key as i64
                ],
            )?;
        }
        Ok(())
    }

    /// Drop a persistent table and its catalog entries
    pub fn drop_table(&self, name: &str) -> Result<()> {
        self.conn
            .execute(&format!("DROP TABLE IF EXISTS {}", quote(name)), [])?;
        self.conn
            .execute("DELETE FROM _Tables WHERE Name = ?1", params![name])?;
        self.conn
            .execute("DELETE FROM _Columns WHERE `Table` = ?1", params![name])?;
        Ok(())
    }

    /// Append a column to an existing table
    pub fn add_column(&self, table: &str, column: &ColumnDefinition) -> Result<()> {
        let number: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(Number), 0) + 1 FROM _Columns WHERE `Table` = ?1",
            params![table],
            |row| row.get(0),
        )?;
        self.conn.execute(
            &format!(
                "ALTER TABLE {} ADD COLUMN {} {}",
                quote(table),
                quote(&column.name),
                sql_type(column.column_type)
            ),
            [],
        )?;
        // Appended columns cannot be enforced on existing rows
        let msi_type = ColumnDefinition {
            nullable: true,
            ..column.clone()
        }
        .msi_type();
        self.conn.execute(
            "INSERT INTO _Columns (`Table`, Number, Name, Type, PrimaryKey) VALUES (?1, ?2, ?3, ?4, 0)",
            params![table, number, column.name, msi_type],
        )?;
        Ok(())
    }

    /// Prepare a view over a query without running it
    pub fn open_view(&self, sql: &str) -> Result<View<'_>> {
        View::new(self, sql)
    }

    /// Prepare and execute a view in one step
    pub fn open_execute_view(&self, sql: &str, params: Option<&Record>) -> Result<View<'_>> {
        let mut view = View::new(self, sql)?;
        view.execute(params)?;
        Ok(view)
    }

    /// Insert a record whose fields follow the table's column order
    pub fn insert_record(&self, table: &str, record: &Record) -> Result<()> {
        self.write_record("INSERT", table, record)
    }

    /// Insert a record, replacing any row with the same primary key
    pub fn replace_record(&self, table: &str, record: &Record) -> Result<()> {
        self.write_record("INSERT OR REPLACE", table, record)
    }

    fn write_record(&self, verb: &str, table: &str, record: &Record) -> Result<()> {
        let columns = self.columns(table)?;
        if record.len() != columns.len() {
            return Err(Error::Database {
                code: ERROR_FUNCTION_FAILED,
                message: format!(
                    "Record has {} fields but table {} has {} columns",
                    record.len(),
                    table,
                    columns.len()
                ),
            });
        }
        let names: Vec<String> = columns.iter().map(|c| quote(&c.name)).collect();
        let placeholders: Vec<&str> = vec!["?"; columns.len()];
        let sql = format!(
            "{} INTO {} ({}) VALUES ({})",
            verb,
            quote(table),
            names.join(", "),
            placeholders.join(", ")
        );
        self.conn
            .execute(&sql, rusqlite::params_from_iter(record.fields()))?;
        Ok(())
    }

    /// Every row of a table in insertion order
    pub fn records(&self, table: &str) -> Result<Vec<Record>> {
        let columns = self.columns(table)?;
        let names: Vec<String> = columns.iter().map(|c| quote(&c.name)).collect();
        let sql = format!(
            "SELECT {} FROM {} ORDER BY rowid",
            names.join(", "),
            quote(table)
        );
        let view = self.open_execute_view(&sql, None)?;
        Ok(view.collect())
    }

    /// Find the row with the given primary key values
    pub fn find_record(&self, table: &str, key: &[RecordField]) -> Result<Option<Record>> {
        let columns = self.columns(table)?;
        let keys: Vec<&ColumnDefinition> = columns.iter().filter(|c| c.primary_key).collect();
        if keys.is_empty() || keys.len() != key.len() {
            return Ok(None);
        }
        let names: Vec<String> = columns.iter().map(|c| quote(&c.name)).collect();
        let predicate: Vec<String> = keys
            .iter()
            .map(|c| format!("{} IS ?", quote(&c.name)))
            .collect();
        let sql = format!(
            "SELECT {} FROM {} WHERE {}",
            names.join(", "),
            quote(table),
            predicate.join(" AND ")
        );
        let mut view = self.open_view(&sql)?;
        view.execute(Some(&Record::from_fields(key.to_vec())))?;
        Ok(view.fetch())
    }

    /// Delete the row with the given primary key values
    pub fn delete_record(&self, table: &str, key: &[RecordField]) -> Result<bool> {
        let keys = self.primary_keys(table)?;
        let predicate: Vec<String> = keys.iter().map(|k| format!("{} IS ?", quote(k))).collect();
        let sql = format!("DELETE FROM {} WHERE {}", quote(table), predicate.join(" AND "));
        let deleted = self
            .conn
            .execute(&sql, rusqlite::params_from_iter(key.iter()))?;
        Ok(deleted > 0)
    }

    /// Store a named binary stream
    pub fn set_stream(&self, name: &str, data: &[u8]) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO _Streams (Name, Data) VALUES (?1, ?2)",
            params![name, data],
        )?;
        Ok(())
    }

    /// Read a named binary stream
    pub fn stream(&self, name: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .conn
            .query_row(
                "SELECT Data FROM _Streams WHERE Name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn stream_names(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT Name FROM _Streams ORDER BY Name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }

    /// Read the summary information stream
    pub fn summary_information(&self) -> Result<SummaryInformation> {
        let mut stmt = self
            .conn
            .prepare("SELECT PropertyId, Value FROM _SummaryInformation ORDER BY PropertyId")?;
        let rows = stmt
            .query_map([], |row| {
                let id: i64 = row.get(0)?;
                let value = RecordField::from_value_ref(row.get_ref(1)?);
                Ok((id as u32, value))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut info = SummaryInformation::new();
        for (id, value) in rows {
            let value = match value {
                RecordField::Integer(n) => SummaryValue::Integer(n),
                RecordField::Null => continue,
                other => summary::parse_value(id, &other.to_display_string())?,
            };
            info.set(id, value)?;
        }
        Ok(info)
    }

    /// Replace the summary information stream
    pub fn set_summary_information(&self, info: &SummaryInformation) -> Result<()> {
        self.conn.execute("DELETE FROM _SummaryInformation", [])?;
        for (id, value) in info.iter() {
            let field = match value {
                SummaryValue::Integer(n) => RecordField::Integer(*n),
                other => RecordField::String(other.to_display_string()),
            };
            self.conn.execute(
                "INSERT INTO _SummaryInformation (PropertyId, Value) VALUES (?1, ?2)",
                params![id, field],
            )?;
        }
        Ok(())
    }

    /// Import one IDT archive file from `folder`
    pub fn import(&self, folder: &Path, file_name: &str) -> Result<()> {
        idt::import(self, folder, file_name)
    }

    /// Export one table as an IDT archive file into `folder`
    pub fn export(&self, table: &str, folder: &Path, file_name: &str) -> Result<()> {
        idt::export(self, table, folder, file_name)
    }

    /// Apply a transform file, suppressing the given error conditions
    pub fn apply_transform(
        &self,
        transform_file: &Path,
        conditions: TransformErrorConditions,
    ) -> Result<()> {
        transform::apply(self, transform_file, conditions)
    }

    /// Write the differences from `reference` to this database as a
    /// transform. Returns false, writing nothing, when there are none.
    pub fn generate_transform(&self, reference: &Database, output: &Path) -> Result<bool> {
        transform::generate(self, reference, output)
    }

    /// Merge the tables of `other` into this database
    ///
    /// Rows whose key already exists with different data are conflicts; they
    /// are counted per table into `error_table` when given. Returns false if
    /// any conflict occurred.
    pub fn merge(&self, other: &Database, error_table: Option<&str>) -> Result<bool> {
        let mut conflicts: Vec<(String, i32)> = Vec::new();

        for table in other.tables()? {
            let columns = other.columns(&table)?;

            if !self.table_exists(&table)? {
                self.create_table(&TableDefinition::new(&table, columns))?;
                for record in other.records(&table)? {
                    self.insert_record(&table, &record)?;
                }
                continue;
            }

            let existing = self.columns(&table)?;
            let compatible = existing.len() == columns.len()
                && existing
                    .iter()
                    .zip(&columns)
                    .all(|(a, b)| a.name == b.name && a.column_type == b.column_type);
            if !compatible {
                return Err(Error::Database {
                    code: ERROR_DATATYPE_MISMATCH,
                    message: format!("Table {table} has a different definition in the merged database"),
                });
            }

            let key_indexes: Vec<usize> = columns
                .iter()
                .enumerate()
                .filter(|(_, c)| c.primary_key)
                .map(|(i, _)| i)
                .collect();

            let mut table_conflicts = 0;
            for record in other.records(&table)? {
                let key: Vec<RecordField> =
                    key_indexes.iter().map(|i| record.get(*i).clone()).collect();
                match self.find_record(&table, &key)? {
                    None => self.insert_record(&table, &record)?,
                    Some(current) if current == record => {}
                    Some(_) => table_conflicts += 1,
                }
            }
            if table_conflicts > 0 {
                warn!("{} merge conflicts in table {}", table_conflicts, table);
                conflicts.push((table, table_conflicts));
            }
        }

        if let Some(error_table) = error_table
            && !conflicts.is_empty()
        {
            if !self.table_exists(error_table)? {
                self.create_table(&TableDefinition::new(
                    error_table,
                    vec![
                        ColumnDefinition::string("Table", 255).primary_key(),
                        ColumnDefinition::number("NumRowMergeConflicts", 2),
                    ],
                ))?;
            }
            for (table, count) in &conflicts {
                self.replace_record(
                    error_table,
                    &Record::from_fields(vec![
                        RecordField::String(table.clone()),
                        RecordField::Integer(*count),
                    ]),
                )?;
            }
        }

        Ok(conflicts.is_empty())
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if self.mode.is_transacted() && !self.conn.is_autocommit() {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                warn!("Failed to roll back {}: {}", self.path.display(), e);
            }
        }
    }
}

fn sql_type(column_type: ColumnType) -> &'static str {
    match column_type {
        ColumnType::Number => "INTEGER",
        ColumnType::Object => "BLOB",
        ColumnType::String | ColumnType::Localized => "TEXT",
    }
}

/// Column types of the catalog and diagnostic pseudo-tables
fn catalog_column_type(table: &str, column: &str) -> Option<&'static str> {
    match (table, column) {
        ("_Tables", "Name") => Some("s64"),
        ("_Columns", "Table") | ("_Columns", "Name") => Some("s64"),
        ("_Columns", "Number") => Some("i2"),
        ("_Columns", "Type") => Some("s32"),
        ("_Streams", "Name") => Some("s62"),
        ("_Streams", "Data") => Some("V0"),
        ("_TransformView", "Table" | "Column" | "Row" | "Data" | "Current") => Some("S0"),
        _ => None,
    }
}
