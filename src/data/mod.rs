// src/data/mod.rs

//! Symbol and table model shared by the binders
//!
//! - [`table`]: relational tables of typed rows (MSI side)
//! - [`symbols`] / [`section`]: typed symbol arena (bundle side)
//! - [`registry`]: built-in table definitions plus extension tables

pub mod column;
pub mod registry;
pub mod section;
mod source;
pub mod symbols;
pub mod table;

pub use column::{ColumnCategory, ColumnDefinition, ColumnModularizeType, ColumnType};
pub use registry::{ExtensionTables, TableDefinitionCollection};
pub use section::{
    DelayedField, Intermediate, IntermediateSection, SectionType, Symbol, SymbolData, SymbolKind,
};
pub use source::SourceLineNumber;
pub use table::{
    Field, FieldValue, OutputType, Row, RowOperation, Table, TableDefinition, TableOperation,
    WindowsInstallerData,
};
