// src/unbind/mod.rs

//! MSI unbind engine
//!
//! Reads installer databases and transforms back into the table model.
//! Object columns and streams are exported to files, merge-module
//! identifiers are demodularized, cabinets are extracted on request, and
//! every File row gets its disk id and a reconstructed source path.

mod database;
pub mod demodularize;
pub mod directories;
mod extract;
mod transform;

pub use database::{UnbindDatabaseCommand, UnbindOutput, UnboundFile};
pub use extract::ExtractCabinetsCommand;
pub use transform::{UnbindTransformCommand, UnboundTransform};
