// src/cli.rs
//! CLI definitions for wixbind
//!
//! This module contains all command-line interface definitions using clap.
//! The actual command implementations are in the `commands` module.

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "wixbind")]
#[command(author = "wixbind Contributors")]
#[command(version)]
#[command(about = "Bind and unbind Windows Installer databases and bootstrapper bundles", long_about = None)]
pub struct Cli {
    /// Options file (default: wixbind.toml in the current directory, if present)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Option overrides shared by the bind and unbind commands
#[derive(Args, Debug, Clone, Default)]
pub struct OptionOverrides {
    /// Scratch folder for extracted files and containers
    #[arg(long)]
    pub intermediate_folder: Option<String>,

    /// Worker threads for container packing
    #[arg(long)]
    pub threads: Option<usize>,

    /// Compression level: none, low, medium, high
    #[arg(long)]
    pub compression: Option<String>,

    /// Skip _Validation generation and column checks
    #[arg(long)]
    pub suppress_validation: bool,

    /// Treat warnings as errors
    #[arg(long)]
    pub warnings_as_errors: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Bind a linked bundle intermediate into a bundle executable
    BindBundle {
        /// Intermediate JSON file holding the bundle section
        intermediate: String,

        /// Output bundle path
        #[arg(short, long)]
        output: String,

        /// Folder relative payload sources resolve against
        #[arg(short, long)]
        base_folder: Option<String>,

        /// Engine stub the bundle starts with
        #[arg(long)]
        stub: Option<String>,

        /// Write debug symbols to this path
        #[arg(long)]
        pdb: Option<String>,

        #[command(flatten)]
        overrides: OptionOverrides,
    },

    /// Bind a table model into an installer database
    BindMsi {
        /// Table model JSON file
        data: String,

        /// Output database path
        #[arg(short, long)]
        output: String,

        #[command(flatten)]
        overrides: OptionOverrides,
    },

    /// Unbind an installer database into a table model
    Unbind {
        /// Database to read
        database: String,

        /// Output table model JSON file
        #[arg(short, long)]
        output: String,

        /// Folder receiving Object column contents and streams
        #[arg(short, long, default_value = "unbound")]
        export_folder: String,

        /// Extract cabinets into this folder
        #[arg(long)]
        extract_folder: Option<String>,

        /// Output type: product, module, patch, patchcreation
        #[arg(long, default_value = "product")]
        output_type: String,

        /// Assume an administrative image layout
        #[arg(long)]
        admin_image: bool,

        /// Keep merge module identifiers as they are
        #[arg(long)]
        suppress_demodularization: bool,

        #[command(flatten)]
        overrides: OptionOverrides,
    },

    /// Unbind a transform into a table model with row operations
    UnbindTransform {
        /// Transform to read
        transform: String,

        /// Output table model JSON file
        #[arg(short, long)]
        output: String,

        /// Folder receiving Object column contents
        #[arg(short, long, default_value = "unbound")]
        export_folder: String,

        #[command(flatten)]
        overrides: OptionOverrides,
    },

    /// Generate a transform from the differences between two databases
    Diff {
        /// Reference (original) database
        reference: String,

        /// Updated database
        updated: String,

        /// Output transform path
        #[arg(short, long)]
        output: String,
    },

    /// Export tables of a database as IDT archive files
    ExportIdt {
        /// Database to read
        database: String,

        /// Output folder
        #[arg(short, long, default_value = ".")]
        output: String,

        /// Tables to export (default: all)
        #[arg(short, long)]
        table: Vec<String>,
    },
}
