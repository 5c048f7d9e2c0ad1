// src/msi/view.rs

//! Query cursors over an installer database

use super::database::Database;
use super::record::{Record, RecordField};
use crate::error::{Error, Result};
use regex::Regex;
use std::collections::VecDeque;
use std::sync::LazyLock;

/// Which column metadata [`View::column_info`] returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnInfo {
    Names,
    Types,
}

static TABLE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:FROM|INTO|UPDATE)\s+`?([A-Za-z_][A-Za-z0-9_.]*)`?").unwrap()
});

/// A prepared query; executing it buffers the result rows for fetching
pub struct View<'db> {
    db: &'db Database,
    sql: String,
    table: Option<String>,
    columns: Vec<String>,
    pending: VecDeque<Record>,
}

impl<'db> View<'db> {
    pub(crate) fn new(db: &'db Database, sql: &str) -> Result<Self> {
        let table = TABLE_PATTERN
            .captures(sql)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string());

        let columns = {
            let stmt = db.connection().prepare(sql)?;
            stmt.column_names().into_iter().map(String::from).collect()
        };

        Ok(Self {
            db,
            sql: sql.to_string(),
            table,
            columns,
            pending: VecDeque::new(),
        })
    }

    /// Run the query, binding `params` to its `?` placeholders in order
    pub fn execute(&mut self, params: Option<&Record>) -> Result<()> {
        let conn = self.db.connection();
        let mut stmt = conn.prepare(&self.sql)?;
        let fields: &[RecordField] = params.map(|r| r.fields()).unwrap_or(&[]);

        self.pending.clear();
        if stmt.column_count() == 0 {
            stmt.execute(rusqlite::params_from_iter(fields))?;
            return Ok(());
        }

        let width = stmt.column_count();
        let mut rows = stmt.query(rusqlite::params_from_iter(fields))?;
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(RecordField::from_value_ref(row.get_ref(i)?));
            }
            self.pending.push_back(Record::from_fields(values));
        }
        Ok(())
    }

    /// Next buffered row, or `None` once the result set is exhausted
    pub fn fetch(&mut self) -> Option<Record> {
        self.pending.pop_front()
    }

    /// Table the query reads from or writes to, if one could be determined
    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    /// Column names or installer type strings of the result columns
    pub fn column_info(&self, info: ColumnInfo) -> Result<Record> {
        match info {
            ColumnInfo::Names => Ok(Record::from_fields(
                self.columns.iter().map(|c| RecordField::from(c.as_str())).collect(),
            )),
            ColumnInfo::Types => {
                let table = self.table.as_deref().ok_or_else(|| {
                    Error::Database {
                        code: super::database::ERROR_FUNCTION_FAILED,
                        message: format!("Cannot determine table of query: {}", self.sql),
                    }
                })?;
                let mut types = Vec::with_capacity(self.columns.len());
                for column in &self.columns {
                    let msi_type = self.db.column_type(table, column)?.ok_or_else(|| {
                        Error::NotFound(format!("Column {column} in table {table}"))
                    })?;
                    types.push(RecordField::String(msi_type));
                }
                Ok(Record::from_fields(types))
            }
        }
    }
}

impl Iterator for View<'_> {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        self.fetch()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ColumnDefinition, TableDefinition};
    use tempfile::TempDir;

    fn media_database(temp: &TempDir) -> Database {
        let db = Database::create(&temp.path().join("test.msi")).unwrap();
        db.create_table(&TableDefinition::new(
            "Media",
            vec![
                ColumnDefinition::number("DiskId", 2).primary_key(),
                ColumnDefinition::number("LastSequence", 4),
                ColumnDefinition::string("Cabinet", 255).nullable(),
            ],
        ))
        .unwrap();
        db
    }

    #[test]
    fn test_execute_with_parameters_and_fetch() {
        let temp = TempDir::new().unwrap();
        let db = media_database(&temp);

        let mut insert = db
            .open_view("INSERT INTO `Media` (`DiskId`, `LastSequence`, `Cabinet`) VALUES (?, ?, ?)")
            .unwrap();
        for (disk, last) in [(1, 5), (2, 10)] {
            let record = Record::from_fields(vec![
                RecordField::Integer(disk),
                RecordField::Integer(last),
                RecordField::String(format!("#cab{disk}.cab")),
            ]);
            insert.execute(Some(&record)).unwrap();
        }

        let mut view = db
            .open_execute_view("SELECT `DiskId`, `LastSequence` FROM `Media` ORDER BY `DiskId`", None)
            .unwrap();
        assert_eq!(view.fetch().unwrap().get_integer(1), Some(5));
        assert_eq!(view.fetch().unwrap().get_integer(1), Some(10));
        assert!(view.fetch().is_none());
    }

    #[test]
    fn test_column_info() {
        let temp = TempDir::new().unwrap();
        let db = media_database(&temp);
        let view = db.open_view("SELECT * FROM `Media`").unwrap();
        assert_eq!(view.table(), Some("Media"));

        let names = view.column_info(ColumnInfo::Names).unwrap();
        assert_eq!(names.get_string(0).as_deref(), Some("DiskId"));
        let types = view.column_info(ColumnInfo::Types).unwrap();
        assert_eq!(types.get_string(0).as_deref(), Some("i2"));
        assert_eq!(types.get_string(2).as_deref(), Some("S255"));
    }
}
