// src/msi/mod.rs

//! Installer database service
//!
//! Installer databases are stored as SQLite files. This module provides the
//! handle ([`Database`]), query cursors ([`View`]), records, the summary
//! information stream, IDT archives and transforms on top of that storage.

mod database;
pub mod idt;
mod record;
pub mod retry;
pub mod summary;
pub mod transform;
mod view;

pub use database::{
    Database, ERROR_DATATYPE_MISMATCH, ERROR_FUNCTION_FAILED, ERROR_INSTALL_TRANSFORM_FAILURE,
    ERROR_OPEN_FAILED, OpenMode, TableCondition,
};
pub use record::{Record, RecordField};
pub use retry::{RetryPolicy, commit_with_retry};
pub use summary::{SummaryInformation, SummaryValue, WordCount};
pub use transform::{TRANSFORM_VIEW_TABLE, TransformDocument, TransformErrorConditions};
pub use view::{ColumnInfo, View};

/// Quote a table or column name for use in SQL
pub(crate) fn quote(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}
