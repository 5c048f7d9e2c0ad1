// src/lib.rs

//! wixbind
//!
//! Binder for Windows Installer databases and chained bootstrapper bundles.
//!
//! # Architecture
//!
//! - [`data`]: typed symbol arena (bundles) and relational table model (MSI)
//! - [`msi`]: installer database service on SQLite, IDT archives, transforms
//! - [`bind`] / [`unbind`]: table model to database and back
//! - [`bundle`]: the staged bundle binder producing a bundle executable
//! - [`messaging`]: diagnostics collected across every stage

pub mod bind;
pub mod bundle;
pub mod cabinet;
pub mod config;
pub mod context;
pub mod data;
mod error;
pub mod guid;
pub mod hash;
pub mod messaging;
pub mod msi;
pub mod unbind;

pub use bind::BindDatabaseCommand;
pub use bundle::{BindBundleCommand, BundleOutput};
pub use config::{BindOptions, CompressionLevel};
pub use context::{BindOutputs, CancellationToken, FileTransfer, TrackedFile, TrackedFileType};
pub use error::{Error, Result};
pub use hash::{FileHash, HashAlgorithm};
pub use messaging::{Message, MessageId, MessageLevel, Messaging};
pub use unbind::{UnbindDatabaseCommand, UnbindTransformCommand};
