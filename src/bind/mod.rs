// src/bind/mod.rs

//! MSI bind engine
//!
//! Turns a resolved [`WindowsInstallerData`](crate::data::WindowsInstallerData)
//! into an installer database: rows are checked first, then every real table
//! is created and filled, Object columns are copied in as streams, and the
//! summary stream and `_Validation` rows are written before the commit.

mod database;
pub mod validate;

pub use database::{BindDatabaseCommand, CabinetRequest};
pub use validate::VALIDATION_TABLE;
