// src/main.rs

use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

use cli::{Cli, Commands};

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.config.as_deref();

    match cli.command {
        Some(Commands::BindBundle {
            intermediate,
            output,
            base_folder,
            stub,
            pdb,
            overrides,
        }) => {
            let options = commands::load_options(config, &overrides)?;
            commands::cmd_bind_bundle(
                &intermediate,
                &output,
                base_folder.as_deref(),
                stub.as_deref(),
                pdb.as_deref(),
                options,
            )
        }
        Some(Commands::BindMsi {
            data,
            output,
            overrides,
        }) => {
            let options = commands::load_options(config, &overrides)?;
            commands::cmd_bind_msi(&data, &output, options)
        }
        Some(Commands::Unbind {
            database,
            output,
            export_folder,
            extract_folder,
            output_type,
            admin_image,
            suppress_demodularization,
            overrides,
        }) => {
            let options = commands::load_options(config, &overrides)?;
            commands::cmd_unbind(
                &database,
                &output,
                &export_folder,
                extract_folder.as_deref(),
                &output_type,
                admin_image,
                suppress_demodularization,
                options,
            )
        }
        Some(Commands::UnbindTransform {
            transform,
            output,
            export_folder,
            overrides,
        }) => {
            let options = commands::load_options(config, &overrides)?;
            commands::cmd_unbind_transform(&transform, &output, &export_folder, options)
        }
        Some(Commands::Diff {
            reference,
            updated,
            output,
        }) => commands::cmd_diff(&reference, &updated, &output),
        Some(Commands::ExportIdt {
            database,
            output,
            table,
        }) => commands::cmd_export_idt(&database, &output, &table),
        None => {
            println!("wixbind {}", env!("CARGO_PKG_VERSION"));
            println!("Run 'wixbind --help' for usage information");
            Ok(())
        }
    }
}
