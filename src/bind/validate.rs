// src/bind/validate.rs

//! Row checks run before a database is written, and `_Validation` rows
//! describing the tables that were written

use crate::data::{FieldValue, RowOperation, TableDefinition, WindowsInstallerData};
use crate::messaging::{MessageId, Messaging};
use crate::msi::{Record, RecordField};

/// Table holding per-column validation metadata
pub const VALIDATION_TABLE: &str = "_Validation";

/// Report rows that the database would reject or that violate column
/// metadata. Problems are recorded on `messaging`; nothing is returned.
pub fn validate_rows(data: &WindowsInstallerData, check_ranges: bool, messaging: &mut Messaging) {
    for table in data.tables.values() {
        let definition = &table.definition;
        for row in &table.rows {
            if row.operation == RowOperation::Delete {
                continue;
            }
            if row.fields.len() != definition.columns.len() {
                messaging.error(
                    MessageId::InvalidRowFieldCount,
                    row.source_line.as_ref(),
                    format!(
                        "A row in table {} has {} fields but the table has {} columns.",
                        definition.name,
                        row.fields.len(),
                        definition.columns.len()
                    ),
                );
                continue;
            }

            for (column, field) in definition.columns.iter().zip(&row.fields) {
                let is_null = match &field.value {
                    FieldValue::Null => true,
                    FieldValue::String(s) => s.is_empty(),
                    _ => false,
                };
                if is_null {
                    if !column.nullable {
                        messaging.error(
                            MessageId::NullInNonNullableColumn,
                            row.source_line.as_ref(),
                            format!(
                                "The {}/{} column is not nullable, but row '{}' has no value for it.",
                                definition.name,
                                column.name,
                                row.primary_key(definition)
                            ),
                        );
                    }
                    continue;
                }

                match &field.value {
                    FieldValue::Number(n) if check_ranges => {
                        let n = *n as i64;
                        let below = column.min_value.is_some_and(|min| n < min);
                        let above = column.max_value.is_some_and(|max| n > max);
                        if below || above {
                            messaging.error(
                                MessageId::ValueOutOfRange,
                                row.source_line.as_ref(),
                                format!(
                                    "The value {} of {}/{} is outside the range {}..{}.",
                                    n,
                                    definition.name,
                                    column.name,
                                    column.min_value.unwrap_or(i64::MIN),
                                    column.max_value.unwrap_or(i64::MAX)
                                ),
                            );
                        }
                    }
                    FieldValue::Object(path) if !path.exists() => {
                        messaging.error(
                            MessageId::MissingObjectSource,
                            row.source_line.as_ref(),
                            format!(
                                "The file '{}' for {}/{} could not be found.",
                                path.display(),
                                definition.name,
                                column.name
                            ),
                        );
                    }
                    _ => {}
                }
            }
        }
    }
}

/// One `_Validation` row per column of each definition
pub fn validation_records<'a>(
    definitions: impl IntoIterator<Item = &'a TableDefinition>,
) -> Vec<Record> {
    let mut records = Vec::new();
    for definition in definitions {
        for column in &definition.columns {
            let clamp = |v: i64| v.clamp(i32::MIN as i64, i32::MAX as i64) as i32;
            let category = column.category.as_str();
            records.push(Record::from_fields(vec![
                RecordField::from(definition.name.as_str()),
                RecordField::from(column.name.as_str()),
                RecordField::from(if column.nullable { "Y" } else { "N" }),
                column.min_value.map(clamp).map(RecordField::Integer).unwrap_or_default(),
                column.max_value.map(clamp).map(RecordField::Integer).unwrap_or_default(),
                RecordField::from(column.key_table.as_deref()),
                column
                    .key_column
                    .map(|k| RecordField::Integer(k as i32))
                    .unwrap_or_default(),
                RecordField::from((!category.is_empty()).then_some(category)),
                RecordField::from(column.possibilities.as_deref()),
                RecordField::from(column.description.as_deref()),
            ]));
        }
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ColumnDefinition, SourceLineNumber, Table};

    fn media_data(last_sequence: FieldValue, cabinet: FieldValue) -> WindowsInstallerData {
        let mut data = WindowsInstallerData::default();
        let definition = TableDefinition::new(
            "Media",
            vec![
                ColumnDefinition::number("DiskId", 2).primary_key().range(1, 32767),
                ColumnDefinition::number("LastSequence", 4).range(0, 100),
                ColumnDefinition::string("Cabinet", 255).nullable(),
            ],
        );
        let mut table = Table::new(definition);
        table
            .add_row(
                Some(SourceLineNumber::new("product.wxs", 12)),
                vec![FieldValue::Number(1), last_sequence, cabinet],
            )
            .unwrap();
        data.tables.insert("Media".into(), table);
        data
    }

    #[test]
    fn test_null_in_required_column_reported_with_source() {
        let data = media_data(FieldValue::Null, FieldValue::Null);
        let mut messaging = Messaging::new();
        validate_rows(&data, true, &mut messaging);
        assert_eq!(messaging.count(MessageId::NullInNonNullableColumn), 1);
        let message = messaging.errors().next().unwrap();
        assert_eq!(message.source_line.as_ref().unwrap().line, Some(12));
    }

    #[test]
    fn test_range_checks_can_be_suppressed() {
        let data = media_data(FieldValue::Number(500), FieldValue::Null);
        let mut messaging = Messaging::new();
        validate_rows(&data, true, &mut messaging);
        assert_eq!(messaging.count(MessageId::ValueOutOfRange), 1);

        let mut messaging = Messaging::new();
        validate_rows(&data, false, &mut messaging);
        assert!(!messaging.encountered_error());
    }

    #[test]
    fn test_validation_records_cover_every_column() {
        let data = media_data(FieldValue::Number(1), FieldValue::Null);
        let records = validation_records(data.tables.values().map(|t| &t.definition));
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].get_string(2).as_deref(), Some("N"));
        assert_eq!(records[0].get_integer(3), Some(1));
        assert_eq!(records[2].get_string(2).as_deref(), Some("Y"));
    }
}
