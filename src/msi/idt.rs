// src/msi/idt.rs

//! IDT archive import and export
//!
//! An IDT file is one table as tab-delimited text:
//!
//! ```text
//! Property<TAB>Value            column names
//! s72<TAB>l0                    column types
//! Property<TAB>Property         table name followed by its key columns
//! ProductName<TAB>Example       one line per row
//! ```
//!
//! Tabs, carriage returns and line feeds inside values are replaced by
//! control characters. Object cells name a file in a sub-folder named after
//! the table.

use super::database::Database;
use super::record::{Record, RecordField};
use crate::data::{ColumnDefinition, ColumnType, TableDefinition};
use crate::error::{Error, Result};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Pseudo-table whose export carries only the database codepage
pub const FORCE_CODEPAGE_TABLE: &str = "_ForceCodepage";

const TAB_ESCAPE: char = '\u{15}';
const CR_ESCAPE: char = '\u{11}';
const LF_ESCAPE: char = '\u{19}';

fn escape(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            '\t' => TAB_ESCAPE,
            '\r' => CR_ESCAPE,
            '\n' => LF_ESCAPE,
            other => other,
        })
        .collect()
}

fn unescape(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            TAB_ESCAPE => '\t',
            CR_ESCAPE => '\r',
            LF_ESCAPE => '\n',
            other => other,
        })
        .collect()
}

fn invalid(path: &Path, message: impl Into<String>) -> Error {
    Error::InvalidIdt {
        path: path.to_path_buf(),
        message: message.into(),
    }
}

/// Write `table` to `folder/file_name`
pub fn export(db: &Database, table: &str, folder: &Path, file_name: &str) -> Result<()> {
    fs::create_dir_all(folder)?;
    let path = folder.join(file_name);

    if table == FORCE_CODEPAGE_TABLE {
        let content = format!("\r\n\r\n{}\t{}\r\n", db.codepage()?, FORCE_CODEPAGE_TABLE);
        fs::write(&path, content)?;
        return Ok(());
    }

    let columns = db.columns(table)?;
    let key_indexes: Vec<usize> = columns
        .iter()
        .enumerate()
        .filter(|(_, c)| c.primary_key)
        .map(|(i, _)| i)
        .collect();

    let mut out = String::new();
    let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
    let types: Vec<String> = columns.iter().map(|c| c.msi_type()).collect();
    let mut header = vec![table.to_string()];
    header.extend(key_indexes.iter().map(|i| columns[*i].name.clone()));
    out.push_str(&names.join("\t"));
    out.push_str("\r\n");
    out.push_str(&types.join("\t"));
    out.push_str("\r\n");
    out.push_str(&header.join("\t"));
    out.push_str("\r\n");

    let records = db.records(table)?;
    debug!("Exporting {} rows of {} to {}", records.len(), table, path.display());
    for record in &records {
        let mut cells = Vec::with_capacity(columns.len());
        for field in record.fields() {
            let cell = match field {
                RecordField::Stream(data) => {
                    let key: Vec<String> = key_indexes
                        .iter()
                        .map(|k| record.get(*k).to_display_string())
                        .collect();
                    let stream_name = format!("{}.ibd", key.join("."));
                    let stream_folder = folder.join(table);
                    fs::create_dir_all(&stream_folder)?;
                    fs::write(stream_folder.join(&stream_name), data)?;
                    stream_name
                }
                RecordField::Null => String::new(),
                other => escape(&other.to_display_string()),
            };
            cells.push(cell);
        }
        out.push_str(&cells.join("\t"));
        out.push_str("\r\n");
    }

    fs::write(&path, out)?;
    Ok(())
}

/// Read `folder/file_name` into the database, creating the table if needed
pub fn import(db: &Database, folder: &Path, file_name: &str) -> Result<()> {
    let path = folder.join(file_name);
    let bytes = fs::read(&path)?;
    let content = String::from_utf8_lossy(&bytes);

    let mut lines: Vec<&str> = content
        .split('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .collect();
    while lines.last().is_some_and(|l| l.is_empty()) && lines.len() > 3 {
        lines.pop();
    }
    if lines.len() < 3 {
        return Err(invalid(&path, "missing header lines"));
    }

    let mut header: Vec<&str> = lines[2].split('\t').collect();
    if header.last() == Some(&FORCE_CODEPAGE_TABLE) {
        let codepage = header
            .first()
            .and_then(|c| c.trim().parse::<i32>().ok())
            .ok_or_else(|| invalid(&path, "invalid codepage"))?;
        db.set_codepage(codepage)?;
        return Ok(());
    }

    // A leading number on the third line is the codepage of the text
    if header.len() > 1 && header[0].parse::<i32>().is_ok() {
        let codepage = header.remove(0).parse::<i32>().unwrap_or_default();
        db.set_codepage(codepage)?;
    }
    let table = header[0];
    if table.is_empty() {
        return Err(invalid(&path, "missing table name"));
    }
    let keys = &header[1..];

    let names: Vec<&str> = lines[0].split('\t').collect();
    let types: Vec<&str> = lines[1].split('\t').collect();
    if names.len() != types.len() {
        return Err(invalid(
            &path,
            format!("{} column names but {} column types", names.len(), types.len()),
        ));
    }
    if names.iter().any(|n| n.is_empty()) {
        return Err(invalid(&path, "empty column name"));
    }
    for key in keys {
        if !names.contains(key) {
            return Err(invalid(&path, format!("key column {key} is not a column")));
        }
    }

    let mut columns = Vec::with_capacity(names.len());
    for (name, msi_type) in names.iter().zip(&types) {
        let column = ColumnDefinition::from_msi_type(name, msi_type)
            .map_err(|e| invalid(&path, e.to_string()))?;
        columns.push(if keys.contains(name) {
            column.primary_key()
        } else {
            column
        });
    }

    if !db.table_exists(table)? {
        db.create_table(&TableDefinition::new(table, columns.clone()))?;
    } else {
        let existing = db.columns(table)?;
        let same = existing.len() == columns.len()
            && existing.iter().zip(&columns).all(|(a, b)| a.name == b.name);
        if !same {
            return Err(invalid(&path, format!("columns do not match table {table}")));
        }
    }

    let mut imported = 0;
    for (n, line) in lines.iter().enumerate().skip(3) {
        if line.is_empty() {
            continue;
        }
        let cells: Vec<&str> = line.split('\t').collect();
        if cells.len() != columns.len() {
            return Err(invalid(
                &path,
                format!(
                    "line {} has {} fields, expected {}",
                    n + 1,
                    cells.len(),
                    columns.len()
                ),
            ));
        }

        let mut fields = Vec::with_capacity(columns.len());
        for (column, cell) in columns.iter().zip(cells) {
            let field = if cell.is_empty() {
                RecordField::Null
            } else {
                match column.column_type {
                    ColumnType::Number => RecordField::Integer(cell.parse().map_err(|_| {
                        invalid(
                            &path,
                            format!("line {}: '{}' is not a number for {}", n + 1, cell, column.name),
                        )
                    })?),
                    ColumnType::Object => {
                        let stream_path = folder.join(table).join(cell);
                        RecordField::Stream(fs::read(&stream_path).map_err(|e| {
                            invalid(&path, format!("{}: {}", stream_path.display(), e))
                        })?)
                    }
                    ColumnType::String | ColumnType::Localized => {
                        RecordField::String(unescape(cell))
                    }
                }
            };
            fields.push(field);
        }
        db.replace_record(table, &Record::from_fields(fields))?;
        imported += 1;
    }

    debug!("Imported {} rows into {} from {}", imported, table, path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_escape_round_trip() {
        let value = "line one\r\nline\ttwo";
        let escaped = escape(value);
        assert!(!escaped.contains('\t'));
        assert!(!escaped.contains('\n'));
        assert_eq!(unescape(&escaped), value);
    }

    #[test]
    fn test_export_import_with_streams() {
        let temp = TempDir::new().unwrap();
        let source = Database::create(&temp.path().join("source.msi")).unwrap();
        source
            .create_table(&TableDefinition::new(
                "Binary",
                vec![
                    ColumnDefinition::string("Name", 72).primary_key(),
                    ColumnDefinition::object("Data"),
                ],
            ))
            .unwrap();
        source
            .insert_record(
                "Binary",
                &Record::from_fields(vec![
                    "Logo".into(),
                    RecordField::Stream(vec![1, 2, 3]),
                ]),
            )
            .unwrap();

        let folder = temp.path().join("idt");
        source.export("Binary", &folder, "Binary.idt").unwrap();
        assert!(folder.join("Binary").join("Logo.ibd").exists());

        let target = Database::create(&temp.path().join("target.msi")).unwrap();
        target.import(&folder, "Binary.idt").unwrap();
        let records = target.records("Binary").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get(1), &RecordField::Stream(vec![1, 2, 3]));
    }

    #[test]
    fn test_force_codepage_export() {
        let temp = TempDir::new().unwrap();
        let db = Database::create(&temp.path().join("test.msi")).unwrap();
        db.set_codepage(1252).unwrap();
        db.export(FORCE_CODEPAGE_TABLE, temp.path(), "codepage.idt").unwrap();
        let content = fs::read_to_string(temp.path().join("codepage.idt")).unwrap();
        assert_eq!(content, "\r\n\r\n1252\t_ForceCodepage\r\n");

        let other = Database::create(&temp.path().join("other.msi")).unwrap();
        other.import(temp.path(), "codepage.idt").unwrap();
        assert_eq!(other.codepage().unwrap(), 1252);
    }

    #[test]
    fn test_malformed_idt_is_distinct_error() {
        let temp = TempDir::new().unwrap();
        let db = Database::create(&temp.path().join("test.msi")).unwrap();

        fs::write(temp.path().join("short.idt"), "Property\r\ns72\r\n").unwrap();
        let err = db.import(temp.path(), "short.idt").unwrap_err();
        assert!(matches!(err, Error::InvalidIdt { .. }));

        fs::write(
            temp.path().join("width.idt"),
            "Property\tValue\r\ns72\tl0\r\nProperty\tProperty\r\nOnlyOneField\r\n",
        )
        .unwrap();
        let err = db.import(temp.path(), "width.idt").unwrap_err();
        assert!(matches!(err, Error::InvalidIdt { .. }));

        fs::write(
            temp.path().join("type.idt"),
            "Property\tValue\r\ns72\tq0\r\nProperty\tProperty\r\n",
        )
        .unwrap();
        let err = db.import(temp.path(), "type.idt").unwrap_err();
        assert!(matches!(err, Error::InvalidIdt { .. }));
    }
}
