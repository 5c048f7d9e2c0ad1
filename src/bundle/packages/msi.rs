// src/bundle/packages/msi.rs

//! MSI package inspection

use super::{PackageContext, generated_id, publish_package_variables, sibling_name};
use crate::bundle::facade::PackageFacade;
use crate::data::symbols::*;
use crate::data::{FieldValue, TableDefinitionCollection, WindowsInstallerData};
use crate::error::Result;
use crate::guid;
use crate::messaging::MessageId;
use crate::msi::{Database, OpenMode, Record, SummaryInformation};
use crate::unbind::directories::{DirectoryLayout, DirectoryResolver, NamePair};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

// Upgrade.Attributes
const UPGRADE_ONLY_DETECT: i32 = 0x2;
const UPGRADE_VERSION_MIN_INCLUSIVE: i32 = 0x100;
const UPGRADE_VERSION_MAX_INCLUSIVE: i32 = 0x200;
const UPGRADE_LANGUAGES_EXCLUSIVE: i32 = 0x400;

// File.Attributes
const FILE_NONCOMPRESSED: i32 = 0x2000;
const FILE_COMPRESSED: i32 = 0x4000;

pub(super) fn process(facade: &PackageFacade, ctx: &mut PackageContext<'_>) -> Result<()> {
    let Some((_, payload, path)) = ctx.package_file(facade)? else {
        return Ok(());
    };
    let source_line = ctx.source_line(facade);

    let db = match Database::open(&path, OpenMode::ReadOnly) {
        Ok(db) => db,
        Err(e) => {
            ctx.messaging.error(
                MessageId::InvalidMsiPackage,
                source_line.as_ref(),
                format!("Cannot open MSI package {}: {}", path.display(), e),
            );
            return Ok(());
        }
    };

    let properties = read_properties(&db)?;
    let Some(product_code) = properties.get("ProductCode") else {
        ctx.messaging.error(
            MessageId::InvalidMsiPackage,
            source_line.as_ref(),
            format!("MSI package {} has no ProductCode property", path.display()),
        );
        return Ok(());
    };
    let product_code = guid::normalize(product_code).unwrap_or_else(|_| product_code.clone());
    let upgrade_code = properties
        .get("UpgradeCode")
        .map(|c| guid::normalize(c).unwrap_or_else(|_| c.clone()));
    let version = properties.get("ProductVersion").cloned();
    let language = properties.get("ProductLanguage").cloned();
    let product_name = properties.get("ProductName").cloned();
    let manufacturer = properties.get("Manufacturer").cloned();

    let summary = db.summary_information()?;
    let compressed = summary.word_count().compressed();
    let win64 = summary
        .template()
        .and_then(|t| t.split(';').next())
        .is_some_and(|platform| {
            let platform = platform.to_ascii_lowercase();
            platform == "x64" || platform == "arm64" || platform == "intel64"
        });

    let msi = facade.specific_mut::<MsiPackageSymbol>(ctx.section)?;
    msi.product_code = Some(product_code.clone());
    msi.upgrade_code = upgrade_code.clone();
    msi.product_version = version.clone();
    msi.product_language = language.as_deref().and_then(|l| l.parse().ok());
    msi.product_name = product_name.clone();
    msi.manufacturer = manufacturer.clone();
    msi.compressed = compressed;
    let force_per_machine = msi.force_per_machine;
    let enable_feature_selection = msi.enable_feature_selection;
    let suppress_loose_files = msi.suppress_loose_file_payload_generation;

    let scope = scope_from_properties(&properties);
    let install_size = total_file_size(&db)?;

    let package = facade.package_mut(ctx.section)?;
    package.version = version.clone();
    package.language = language;
    package.win64 |= win64;
    if package.display_name.is_none() {
        package.display_name = product_name.clone();
    }
    if package.description.is_none() {
        package.description = product_name;
    }
    if package.cache_id.is_none() {
        package.cache_id = Some(format!(
            "{}v{}",
            product_code,
            version.as_deref().unwrap_or("")
        ));
    }
    if force_per_machine {
        package.per_machine = YesNoDefault::Yes;
    } else if package.per_machine == YesNoDefault::Default {
        package.per_machine = scope;
    }
    if install_size > 0 && package.install_size.is_none() {
        package.install_size = Some(install_size);
    }

    if enable_feature_selection {
        harvest_features(facade, ctx, &db)?;
    }
    harvest_related_packages(facade, ctx, &db)?;
    harvest_dependency_providers(facade, ctx, &db)?;
    harvest_cabinets(facade, ctx, &db, &payload, &path)?;
    if !suppress_loose_files && !compressed {
        harvest_loose_files(facade, ctx, &db, &payload, &path, &summary)?;
    }

    publish_package_variables(facade, ctx)?;
    ctx.cache.insert("packageProductCode", &facade.id, product_code);
    if let Some(upgrade_code) = upgrade_code {
        ctx.cache.insert("packageUpgradeCode", &facade.id, upgrade_code);
    }
    if let Some(manufacturer) = manufacturer {
        ctx.cache.insert("packageManufacturer", &facade.id, manufacturer);
    }
    for (name, value) in &properties {
        ctx.cache.insert(&format!("property.{name}"), &facade.id, value.clone());
    }

    info!("Inspected MSI package {} ({})", facade.id, path.display());
    Ok(())
}

fn read_properties(db: &Database) -> Result<BTreeMap<String, String>> {
    let mut properties = BTreeMap::new();
    if !db.table_exists("Property")? {
        return Ok(properties);
    }
    for record in db.open_execute_view("SELECT `Property`, `Value` FROM `Property`", None)? {
        if let (Some(name), Some(value)) = (record.get_string(0), record.get_string(1)) {
            properties.insert(name, value);
        }
    }
    Ok(properties)
}

/// Install scope implied by `ALLUSERS` and `MSIINSTALLPERUSER`
pub(crate) fn scope_from_properties(properties: &BTreeMap<String, String>) -> YesNoDefault {
    match properties.get("ALLUSERS").map(String::as_str) {
        Some("1") => YesNoDefault::Yes,
        Some("2") => {
            if properties.get("MSIINSTALLPERUSER").map(String::as_str) == Some("1") {
                YesNoDefault::No
            } else {
                YesNoDefault::Yes
            }
        }
        Some(other) if !other.is_empty() => {
            debug!("Unrecognized ALLUSERS value {}", other);
            YesNoDefault::Default
        }
        _ => YesNoDefault::No,
    }
}

fn total_file_size(db: &Database) -> Result<u64> {
    if !db.table_exists("File")? {
        return Ok(0);
    }
    Ok(db
        .open_execute_view("SELECT `FileSize` FROM `File`", None)?
        .filter_map(|r| r.get_integer(0))
        .map(|n| n.max(0) as u64)
        .sum())
}

fn harvest_features(facade: &PackageFacade, ctx: &mut PackageContext<'_>, db: &Database) -> Result<()> {
    if !db.table_exists("Feature")? {
        return Ok(());
    }
    let source_line = ctx.source_line(facade);
    let rows: Vec<Record> = db
        .open_execute_view(
            "SELECT `Feature`, `Feature_Parent`, `Title`, `Description`, `Display`, `Level`, `Directory_`, `Attributes` FROM `Feature`",
            None,
        )?
        .collect();
    for record in rows {
        let Some(name) = record.get_string(0) else {
            continue;
        };
        ctx.section.add(
            Some(&format!("{}.{}", facade.id, name)),
            source_line.clone(),
            MsiFeatureSymbol {
                package_ref: facade.id.clone(),
                name,
                parent: record.get_string(1),
                size: 0,
                title: record.get_string(2),
                description: record.get_string(3),
                display: record.get_integer(4).unwrap_or(0),
                level: record.get_integer(5).unwrap_or(1),
                directory: record.get_string(6),
                attributes: record.get_integer(7).unwrap_or(0),
            },
        );
    }
    Ok(())
}

fn harvest_related_packages(
    facade: &PackageFacade,
    ctx: &mut PackageContext<'_>,
    db: &Database,
) -> Result<()> {
    if !db.table_exists("Upgrade")? {
        return Ok(());
    }
    let source_line = ctx.source_line(facade);
    let rows: Vec<Record> = db
        .open_execute_view(
            "SELECT `UpgradeCode`, `VersionMin`, `VersionMax`, `Language`, `Attributes` FROM `Upgrade`",
            None,
        )?
        .collect();
    for record in rows {
        let Some(code) = record.get_string(0) else {
            continue;
        };
        let attributes = record.get_integer(4).unwrap_or(0);
        let languages = record
            .get_string(3)
            .map(|l| {
                l.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        ctx.section.add(
            None,
            source_line.clone(),
            RelatedPackageSymbol {
                package_ref: facade.id.clone(),
                related_id: guid::normalize(&code).unwrap_or(code),
                min_version: record.get_string(1),
                max_version: record.get_string(2),
                languages,
                min_inclusive: attributes & UPGRADE_VERSION_MIN_INCLUSIVE != 0,
                max_inclusive: attributes & UPGRADE_VERSION_MAX_INCLUSIVE != 0,
                only_detect: attributes & UPGRADE_ONLY_DETECT != 0,
                lang_inclusive: attributes & UPGRADE_LANGUAGES_EXCLUSIVE == 0,
            },
        );
    }
    Ok(())
}

fn harvest_dependency_providers(
    facade: &PackageFacade,
    ctx: &mut PackageContext<'_>,
    db: &Database,
) -> Result<()> {
    if !db.table_exists("WixDependencyProvider")? {
        return Ok(());
    }
    let source_line = ctx.source_line(facade);
    let rows: Vec<Record> = db
        .open_execute_view(
            "SELECT `ProviderKey`, `Version`, `DisplayName`, `Attributes` FROM `WixDependencyProvider`",
            None,
        )?
        .collect();
    for record in rows {
        let Some(key) = record.get_string(0) else {
            continue;
        };
        ctx.section.add(
            None,
            source_line.clone(),
            HarvestedDependencyProviderSymbol {
                package_ref: facade.id.clone(),
                provider_key: key,
                version: record.get_string(1),
                display_name: record.get_string(2),
                attributes: record.get_integer(3).unwrap_or(0),
            },
        );
    }
    Ok(())
}

/// External cabinets become payloads next to the package
fn harvest_cabinets(
    facade: &PackageFacade,
    ctx: &mut PackageContext<'_>,
    db: &Database,
    payload: &PayloadSymbol,
    path: &Path,
) -> Result<()> {
    if !db.table_exists("Media")? {
        return Ok(());
    }
    let folder = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let cabinets: Vec<String> = db
        .open_execute_view("SELECT `Cabinet` FROM `Media` ORDER BY `DiskId`", None)?
        .filter_map(|r| r.get_string(0))
        .filter(|c| !c.starts_with('#'))
        .collect();
    for cabinet in cabinets {
        let name = sibling_name(&payload.name, &cabinet);
        let id = generated_id("cab", &[&facade.id, &name]);
        ctx.add_package_payload(
            facade,
            &id,
            PayloadSymbol {
                name,
                source_file: Some(folder.join(&cabinet).to_string_lossy().into_owned()),
                compressed: payload.compressed,
                download_url: payload.download_url.clone(),
                ..Default::default()
            },
        );
        debug!("Package {} references external cabinet {}", facade.id, cabinet);
    }
    Ok(())
}

/// Uncompressed files become payloads at their source layout path
fn harvest_loose_files(
    facade: &PackageFacade,
    ctx: &mut PackageContext<'_>,
    db: &Database,
    payload: &PayloadSymbol,
    path: &Path,
    summary: &SummaryInformation,
) -> Result<()> {
    if !db.table_exists("File")? || !db.table_exists("Component")? {
        return Ok(());
    }
    let long_names = summary.word_count().long_filenames();
    let resolver = DirectoryResolver::new(&directory_data(db)?, long_names);
    let folder = path.parent().map(Path::to_path_buf).unwrap_or_default();

    let component_dirs: BTreeMap<String, String> = db
        .open_execute_view("SELECT `Component`, `Directory_` FROM `Component`", None)?
        .filter_map(|r| Some((r.get_string(0)?, r.get_string(1)?)))
        .collect();
    let files: Vec<Record> = db
        .open_execute_view(
            "SELECT `File`, `Component_`, `FileName`, `Attributes` FROM `File` ORDER BY `Sequence`",
            None,
        )?
        .collect();

    for record in files {
        let (Some(file_id), Some(component), Some(file_name)) =
            (record.get_string(0), record.get_string(1), record.get_string(2))
        else {
            continue;
        };
        let attributes = record.get_integer(3).unwrap_or(0);
        if attributes & FILE_COMPRESSED != 0 && attributes & FILE_NONCOMPRESSED == 0 {
            continue;
        }
        let Some(directory) = component_dirs
            .get(&component)
            .and_then(|d| resolver.path(d, DirectoryLayout::Source))
        else {
            continue;
        };
        let name_pair = NamePair::parse(&file_name);
        let relative: PathBuf = directory.join(name_pair.pick(long_names));
        let relative_name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("\\");
        let name = sibling_name(&payload.name, &relative_name);
        let id = generated_id("fil", &[&facade.id, &file_id]);
        ctx.add_package_payload(
            facade,
            &id,
            PayloadSymbol {
                name,
                source_file: Some(folder.join(&relative).to_string_lossy().into_owned()),
                compressed: payload.compressed,
                download_url: payload.download_url.clone(),
                ..Default::default()
            },
        );
    }
    Ok(())
}

/// The Directory table as a model the resolver understands
fn directory_data(db: &Database) -> Result<WindowsInstallerData> {
    let mut data = WindowsInstallerData::default();
    let registry = TableDefinitionCollection::builtin();
    let (true, Some(definition)) = (db.table_exists("Directory")?, registry.get("Directory")) else {
        return Ok(data);
    };
    let table = data.ensure_table(definition);
    let rows: Vec<Record> = db
        .open_execute_view(
            "SELECT `Directory`, `Directory_Parent`, `DefaultDir` FROM `Directory`",
            None,
        )?
        .collect();
    for record in rows {
        let field = |i: usize| {
            record
                .get_string(i)
                .map(FieldValue::String)
                .unwrap_or(FieldValue::Null)
        };
        table.add_row(None, vec![field(0), field(1), field(2)])?;
    }
    Ok(data)
}
