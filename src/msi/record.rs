// src/msi/record.rs

//! Records exchanged with the installer database service

use rusqlite::types::{ToSql, ToSqlOutput, Value, ValueRef};
use serde::{Deserialize, Serialize};

/// One value in a record
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RecordField {
    #[default]
    Null,
    Integer(i32),
    String(String),
    Stream(Vec<u8>),
}

impl RecordField {
    pub fn is_null(&self) -> bool {
        match self {
            RecordField::Null => true,
            // The installer engine stores empty strings as null
            RecordField::String(s) => s.is_empty(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            RecordField::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i32> {
        match self {
            RecordField::Integer(n) => Some(*n),
            RecordField::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Text form used for primary keys and `_TransformView` data
    pub fn to_display_string(&self) -> String {
        match self {
            RecordField::Null => String::new(),
            RecordField::Integer(n) => n.to_string(),
            RecordField::String(s) => s.clone(),
            RecordField::Stream(_) => "[Binary Data]".to_string(),
        }
    }

    pub(crate) fn from_value_ref(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => RecordField::Null,
            ValueRef::Integer(n) => RecordField::Integer(n as i32),
            ValueRef::Real(f) => RecordField::Integer(f as i32),
            ValueRef::Text(t) => RecordField::String(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => RecordField::Stream(b.to_vec()),
        }
    }
}

impl ToSql for RecordField {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            RecordField::Null => ToSqlOutput::Owned(Value::Null),
            RecordField::Integer(n) => ToSqlOutput::Owned(Value::Integer(*n as i64)),
            RecordField::String(s) if s.is_empty() => ToSqlOutput::Owned(Value::Null),
            RecordField::String(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            RecordField::Stream(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

impl From<&str> for RecordField {
    fn from(s: &str) -> Self {
        RecordField::String(s.to_string())
    }
}

impl From<String> for RecordField {
    fn from(s: String) -> Self {
        RecordField::String(s)
    }
}

impl From<i32> for RecordField {
    fn from(n: i32) -> Self {
        RecordField::Integer(n)
    }
}

impl From<Option<&str>> for RecordField {
    fn from(s: Option<&str>) -> Self {
        s.map(RecordField::from).unwrap_or(RecordField::Null)
    }
}

/// Ordered list of fields; indexes are zero-based
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Record {
    fields: Vec<RecordField>,
}

impl Record {
    pub fn new(field_count: usize) -> Self {
        Self {
            fields: vec![RecordField::Null; field_count],
        }
    }

    pub fn from_fields(fields: Vec<RecordField>) -> Self {
        Self { fields }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, index: usize) -> &RecordField {
        static NULL: RecordField = RecordField::Null;
        self.fields.get(index).unwrap_or(&NULL)
    }

    pub fn set(&mut self, index: usize, value: impl Into<RecordField>) {
        if index >= self.fields.len() {
            self.fields.resize(index + 1, RecordField::Null);
        }
        self.fields[index] = value.into();
    }

    pub fn get_string(&self, index: usize) -> Option<String> {
        match self.get(index) {
            RecordField::Null => None,
            RecordField::String(s) if s.is_empty() => None,
            other => Some(other.to_display_string()),
        }
    }

    pub fn get_integer(&self, index: usize) -> Option<i32> {
        self.get(index).as_integer()
    }

    pub fn fields(&self) -> &[RecordField] {
        &self.fields
    }

    pub fn into_fields(self) -> Vec<RecordField> {
        self.fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_string_is_null() {
        assert!(RecordField::String(String::new()).is_null());
        assert!(!RecordField::Integer(0).is_null());

        let mut record = Record::new(1);
        record.set(0, "");
        assert_eq!(record.get_string(0), None);
    }

    #[test]
    fn test_set_grows_record() {
        let mut record = Record::new(0);
        record.set(2, 7);
        assert_eq!(record.len(), 3);
        assert_eq!(record.get_integer(2), Some(7));
        assert!(record.get(10).is_null());
    }
}
