// src/commands.rs
//! Command handlers for the wixbind CLI

use crate::cli::OptionOverrides;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use wixbind::data::{
    Intermediate, OutputType, SectionType, TableDefinitionCollection, WindowsInstallerData,
};
use wixbind::msi::{Database, OpenMode};
use wixbind::{
    BindBundleCommand, BindDatabaseCommand, BindOptions, BindOutputs, CompressionLevel, Messaging,
    UnbindDatabaseCommand, UnbindTransformCommand,
};

/// Load options from `--config` or `wixbind.toml`, then apply CLI overrides
pub fn load_options(config: Option<&str>, overrides: &OptionOverrides) -> Result<BindOptions> {
    let mut options = match config {
        Some(path) => BindOptions::load(Path::new(path))?,
        None => BindOptions::discover(&std::env::current_dir()?)?,
    };

    if let Some(folder) = &overrides.intermediate_folder {
        options.intermediate_folder = PathBuf::from(folder);
    }
    if let Some(threads) = overrides.threads {
        options.thread_count = threads;
    }
    if let Some(level) = &overrides.compression {
        options.default_compression = CompressionLevel::parse(level)
            .ok_or_else(|| anyhow::anyhow!("Unknown compression level: {}", level))?;
    }
    options.suppress_validation |= overrides.suppress_validation;
    options.warnings_as_errors |= overrides.warnings_as_errors;
    options.validate()?;
    Ok(options)
}

fn new_messaging(options: &BindOptions) -> Messaging {
    if options.warnings_as_errors {
        Messaging::new().with_warnings_as_errors()
    } else {
        Messaging::new()
    }
}

/// Print diagnostics and fail when any error was recorded
fn finish(messaging: &Messaging, what: &str) -> Result<()> {
    for message in messaging.errors().chain(messaging.warnings()) {
        eprintln!("{}", message);
    }
    if messaging.encountered_error() {
        return Err(anyhow::anyhow!(
            "{} failed with {} error(s)",
            what,
            messaging.error_count()
        ));
    }
    Ok(())
}

fn parse_output_type(value: &str) -> Result<OutputType> {
    match value.to_lowercase().as_str() {
        "product" => Ok(OutputType::Product),
        "module" => Ok(OutputType::Module),
        "patch" => Ok(OutputType::Patch),
        "patchcreation" => Ok(OutputType::PatchCreation),
        _ => Err(anyhow::anyhow!("Unknown output type: {}", value)),
    }
}

/// Carry out the copies and moves a bind asked for
fn apply_transfers(outputs: &BindOutputs) -> Result<()> {
    for transfer in &outputs.file_transfers {
        if transfer.redundant {
            continue;
        }
        if let Some(parent) = transfer.destination.parent() {
            fs::create_dir_all(parent)?;
        }
        let moved = transfer.move_file && fs::rename(&transfer.source, &transfer.destination).is_ok();
        if !moved {
            fs::copy(&transfer.source, &transfer.destination).with_context(|| {
                format!(
                    "Failed to copy {} to {}",
                    transfer.source.display(),
                    transfer.destination.display()
                )
            })?;
        }
    }
    Ok(())
}

pub fn cmd_bind_bundle(
    intermediate: &str,
    output: &str,
    base_folder: Option<&str>,
    stub: Option<&str>,
    pdb: Option<&str>,
    mut options: BindOptions,
) -> Result<()> {
    if let Some(stub) = stub {
        options.stub_path = Some(PathBuf::from(stub));
    }
    if let Some(pdb) = pdb {
        options.pdb_output = Some(PathBuf::from(pdb));
    }

    let intermediate = Intermediate::load(Path::new(intermediate))?;
    let mut section = intermediate
        .sections
        .into_iter()
        .find(|s| s.section_type == SectionType::Bundle)
        .ok_or_else(|| anyhow::anyhow!("Intermediate has no bundle section"))?;

    let base_folder = base_folder.map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
    let command = BindBundleCommand::new(Path::new(output), &options).with_base_folder(&base_folder);
    let mut outputs = BindOutputs::new();
    let mut messaging = new_messaging(&options);

    let result = command.execute(&mut section, &mut outputs, &mut messaging);
    if let Err(e) = &result {
        warn!(
            "Bind aborted; {} tracked files left in place",
            outputs.tracked_files.len()
        );
        return Err(anyhow::anyhow!("Bundle bind failed: {}", e));
    }
    finish(&messaging, "Bundle bind")?;

    if let Ok(Some(bundle)) = result {
        apply_transfers(&outputs)?;
        println!(
            "Bound {} ({} packages, {} containers)",
            bundle.bundle_path.display(),
            bundle.chain.packages.len(),
            bundle.burn_section.container_sizes.len()
        );
        println!("Wrote {}", bundle.wixout_path.display());
    }
    Ok(())
}

pub fn cmd_bind_msi(data: &str, output: &str, options: BindOptions) -> Result<()> {
    let data = WindowsInstallerData::load(Path::new(data))?;
    let mut messaging = new_messaging(&options);
    let outputs = BindDatabaseCommand::new(&data, Path::new(output), &options).execute(&mut messaging)?;
    finish(&messaging, "Database bind")?;
    apply_transfers(&outputs)?;
    println!("Bound {} tables into {}", data.tables.len(), output);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn cmd_unbind(
    database: &str,
    output: &str,
    export_folder: &str,
    extract_folder: Option<&str>,
    output_type: &str,
    admin_image: bool,
    suppress_demodularization: bool,
    mut options: BindOptions,
) -> Result<()> {
    options.admin_image |= admin_image;
    options.suppress_demodularization |= suppress_demodularization;
    let output_type = parse_output_type(output_type)?;
    let registry = TableDefinitionCollection::builtin();

    let mut command = UnbindDatabaseCommand::new(
        Path::new(database),
        output_type,
        Path::new(export_folder),
        &registry,
        &options,
    );
    if let Some(folder) = extract_folder {
        command = command.with_extract_folder(Path::new(folder));
    }

    let mut messaging = new_messaging(&options);
    let unbound = command.execute(&mut messaging)?;
    finish(&messaging, "Unbind")?;
    unbound.data.save(Path::new(output))?;

    if let Some(guid) = &unbound.modularization_guid {
        info!("Modularization GUID: {}", guid);
    }
    println!(
        "Unbound {} tables and {} files into {}",
        unbound.data.tables.len(),
        unbound.files.len(),
        output
    );
    Ok(())
}

pub fn cmd_unbind_transform(
    transform: &str,
    output: &str,
    export_folder: &str,
    options: BindOptions,
) -> Result<()> {
    let registry = TableDefinitionCollection::builtin();
    let unbound = UnbindTransformCommand::new(
        Path::new(transform),
        Path::new(export_folder),
        &registry,
        &options,
    )
    .execute()?;
    unbound.data.save(Path::new(output))?;

    for (table, columns) in &unbound.added_columns {
        println!("{}: adds columns {}", table, columns.join(", "));
    }
    println!("Unbound transform with {} tables into {}", unbound.data.tables.len(), output);
    Ok(())
}

pub fn cmd_diff(reference: &str, updated: &str, output: &str) -> Result<()> {
    let reference = Database::open(Path::new(reference), OpenMode::ReadOnly)?;
    let updated = Database::open(Path::new(updated), OpenMode::ReadOnly)?;
    if updated.generate_transform(&reference, Path::new(output))? {
        println!("Wrote transform {}", output);
    } else {
        println!("Databases are identical; no transform written");
    }
    Ok(())
}

pub fn cmd_export_idt(database: &str, output: &str, tables: &[String]) -> Result<()> {
    let db = Database::open(Path::new(database), OpenMode::ReadOnly)?;
    let tables = if tables.is_empty() {
        db.tables()?
    } else {
        tables.to_vec()
    };

    let folder = Path::new(output);
    fs::create_dir_all(folder)?;
    for table in &tables {
        db.export(table, folder, &format!("{table}.idt"))?;
    }
    println!("Exported {} tables to {}", tables.len(), folder.display());
    Ok(())
}
