// src/bundle/packages/msp.rs

//! MSP package inspection

use super::{PackageContext, publish_package_variables};
use crate::bundle::facade::PackageFacade;
use crate::data::symbols::*;
use crate::error::Result;
use crate::guid;
use crate::messaging::MessageId;
use crate::msi::{Database, OpenMode};
use std::collections::BTreeMap;
use tracing::info;

/// Length of a braced GUID; the revision number starts with the patch code
const GUID_LENGTH: usize = 38;

pub(super) fn process(facade: &PackageFacade, ctx: &mut PackageContext<'_>) -> Result<()> {
    let Some((_, _, path)) = ctx.package_file(facade)? else {
        return Ok(());
    };
    let source_line = ctx.source_line(facade);

    let db = match Database::open(&path, OpenMode::OpenPatchFile) {
        Ok(db) => db,
        Err(e) => {
            ctx.messaging.error(
                MessageId::InvalidMspPackage,
                source_line.as_ref(),
                format!("Cannot open MSP package {}: {}", path.display(), e),
            );
            return Ok(());
        }
    };

    let summary = db.summary_information()?;
    let patch_code = summary
        .revision_number()
        .and_then(|r| r.get(..GUID_LENGTH))
        .and_then(|code| guid::normalize(code).ok());
    let Some(patch_code) = patch_code else {
        ctx.messaging.error(
            MessageId::InvalidMspPackage,
            source_line.as_ref(),
            format!("MSP package {} has no patch code", path.display()),
        );
        return Ok(());
    };

    let targets: Vec<String> = summary
        .template()
        .unwrap_or("")
        .split(';')
        .filter_map(|code| guid::normalize(code).ok())
        .collect();
    let metadata = read_metadata(&db)?;

    let msp = facade.specific_mut::<MspPackageSymbol>(ctx.section)?;
    msp.patch_code = Some(patch_code.clone());
    if msp.manufacturer.is_none() {
        msp.manufacturer = metadata.get("ManufacturerName").cloned();
    }

    let package = facade.package_mut(ctx.section)?;
    if package.display_name.is_none() {
        package.display_name = metadata.get("DisplayName").cloned();
    }
    if package.description.is_none() {
        package.description = metadata.get("Description").cloned();
    }
    if package.cache_id.is_none() {
        package.cache_id = Some(patch_code.clone());
    }

    for target in targets {
        ctx.section.add(
            None,
            source_line.clone(),
            PatchTargetCodeSymbol {
                package_ref: facade.id.clone(),
                target_code: target,
                target_type: PatchTargetType::ProductCode,
            },
        );
    }

    publish_package_variables(facade, ctx)?;
    ctx.cache.insert("packagePatchCode", &facade.id, patch_code);
    if let Some(manufacturer) = metadata.get("ManufacturerName") {
        ctx.cache.insert("packageManufacturer", &facade.id, manufacturer.clone());
    }

    info!("Inspected MSP package {} ({})", facade.id, path.display());
    Ok(())
}

/// `MsiPatchMetadata` properties without a company qualifier
fn read_metadata(db: &Database) -> Result<BTreeMap<String, String>> {
    let mut metadata = BTreeMap::new();
    if !db.table_exists("MsiPatchMetadata")? {
        return Ok(metadata);
    }
    let view = db.open_execute_view(
        "SELECT `Company`, `Property`, `Value` FROM `MsiPatchMetadata`",
        None,
    )?;
    for record in view {
        if record.get_string(0).is_some() {
            continue;
        }
        if let (Some(property), Some(value)) = (record.get_string(1), record.get_string(2)) {
            metadata.insert(property, value);
        }
    }
    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use super::super::tests::{inspect, package_section};
    use super::*;
    use crate::data::TableDefinitionCollection;
    use crate::msi::{Record, RecordField, SummaryInformation, summary};
    use std::path::Path;
    use tempfile::TempDir;

    const PATCH_CODE: &str = "{0A1B2C3D-4E5F-4A6B-8C7D-9E0F1A2B3C4D}";
    const TARGET_A: &str = "{11111111-1111-4111-8111-111111111111}";
    const TARGET_B: &str = "{22222222-2222-4222-8222-222222222222}";

    fn metadata(company: Option<&str>, property: &str, value: &str) -> Record {
        Record::from_fields(vec![
            RecordField::from(company),
            RecordField::from(property),
            RecordField::from(value),
        ])
    }

    fn write_patch(path: &Path, revision: &str) {
        let db = Database::create(path).unwrap();
        let registry = TableDefinitionCollection::builtin();
        db.create_table(registry.get("MsiPatchMetadata").unwrap()).unwrap();
        for record in [
            metadata(None, "DisplayName", "Hotfix 1"),
            metadata(None, "Description", "Fixes the widget"),
            metadata(None, "ManufacturerName", "Example Corp"),
            metadata(Some("Contoso"), "DisplayName", "Vendor name"),
        ] {
            db.insert_record("MsiPatchMetadata", &record).unwrap();
        }
        let mut info = SummaryInformation::new();
        info.set_string(summary::PID_REVNUMBER, revision).unwrap();
        info.set_string(summary::PID_TEMPLATE, format!("{TARGET_A};{TARGET_B}")).unwrap();
        db.set_summary_information(&info).unwrap();
        db.commit().unwrap();
    }

    #[test]
    fn test_patch_code_targets_and_metadata() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("hotfix.msp");
        // Obsoleted patch codes follow the patch code
        write_patch(&path, &format!("{PATCH_CODE}{TARGET_B}"));

        let mut section = package_section("Hotfix", PackageType::Msp, MspPackageSymbol::default(), &path);
        let (cache, messaging, _) = inspect(&mut section, "Hotfix", temp.path());
        assert!(!messaging.encountered_error(), "{:?}", messaging.messages());

        let (_, msp) = section.find::<MspPackageSymbol>("Hotfix").unwrap();
        assert_eq!(msp.patch_code.as_deref(), Some(PATCH_CODE));
        assert_eq!(msp.manufacturer.as_deref(), Some("Example Corp"));

        let (_, package) = section.find::<PackageSymbol>("Hotfix").unwrap();
        assert_eq!(package.display_name.as_deref(), Some("Hotfix 1"));
        assert_eq!(package.description.as_deref(), Some("Fixes the widget"));
        assert_eq!(package.cache_id.as_deref(), Some(PATCH_CODE));

        let targets: Vec<&str> = section
            .iter::<PatchTargetCodeSymbol>()
            .filter(|(_, _, t)| t.package_ref == "Hotfix")
            .map(|(_, _, t)| t.target_code.as_str())
            .collect();
        assert_eq!(targets, vec![TARGET_A, TARGET_B]);

        assert_eq!(cache.get("packagePatchCode.Hotfix"), Some(PATCH_CODE));
        assert_eq!(cache.get("packageManufacturer.Hotfix"), Some("Example Corp"));
        assert_eq!(cache.get("packageName.Hotfix"), Some("Hotfix 1"));
    }

    #[test]
    fn test_patch_without_code_is_invalid() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("broken.msp");
        write_patch(&path, "not-a-guid");

        let mut section = package_section("Broken", PackageType::Msp, MspPackageSymbol::default(), &path);
        let (cache, messaging, _) = inspect(&mut section, "Broken", temp.path());
        assert_eq!(messaging.count(MessageId::InvalidMspPackage), 1);
        assert!(cache.is_empty());
        let (_, msp) = section.find::<MspPackageSymbol>("Broken").unwrap();
        assert!(msp.patch_code.is_none());
    }
}
