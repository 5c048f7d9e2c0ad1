// src/bundle/packages/bundle.rs

//! Bundle package inspection
//!
//! A chained bundle is read through its burn section: the UX container is
//! unpacked into the intermediate folder and its burn manifest supplies the
//! identity of the child bundle.

use super::{PackageContext, publish_package_variables};
use crate::bundle::burn::BurnSection;
use crate::bundle::facade::PackageFacade;
use crate::bundle::manifest::{BURN_MANIFEST_NAME, read_registration};
use crate::cabinet;
use crate::context::TrackedFileType;
use crate::data::symbols::*;
use crate::error::{Error, Result};
use crate::guid;
use crate::messaging::MessageId;
use std::fs;
use tracing::info;

pub(super) fn process(facade: &PackageFacade, ctx: &mut PackageContext<'_>) -> Result<()> {
    let Some((_, _, path)) = ctx.package_file(facade)? else {
        return Ok(());
    };
    let source_line = ctx.source_line(facade);

    let burn = match BurnSection::read(&path) {
        Ok(burn) if !burn.container_sizes.is_empty() => burn,
        Ok(_) => {
            ctx.messaging.error(
                MessageId::InvalidBundlePackage,
                source_line.as_ref(),
                format!("Bundle package {} has no UX container", path.display()),
            );
            return Ok(());
        }
        Err(e) => {
            ctx.messaging.error(
                MessageId::InvalidBundlePackage,
                source_line.as_ref(),
                format!("{} is not a bundle: {}", path.display(), e),
            );
            return Ok(());
        }
    };

    let folder = ctx.intermediate_folder.join("bundles").join(&facade.id);
    let ux = burn.read_container(&path, 0)?;
    let names = cabinet::extract_from_reader(ux.as_slice(), &folder)?;
    for name in &names {
        ctx.outputs
            .track(folder.join(name), TrackedFileType::Temporary, source_line.as_ref());
    }

    let manifest_path = folder.join(BURN_MANIFEST_NAME);
    let registration = match fs::read_to_string(&manifest_path)
        .map_err(Error::from)
        .and_then(|xml| read_registration(&xml).map_err(Error::from))
    {
        Ok(registration) => registration,
        Err(e) => {
            ctx.messaging.error(
                MessageId::InvalidBundlePackage,
                source_line.as_ref(),
                format!("Cannot read the manifest of bundle {}: {}", path.display(), e),
            );
            return Ok(());
        }
    };

    let code = registration
        .code
        .clone()
        .unwrap_or_else(|| burn.bundle_code.clone());
    let code = guid::normalize(&code).unwrap_or(code);
    let version = registration.version.clone().unwrap_or_default();
    let upgrade_code = registration.upgrade_codes.first().cloned();

    let child = facade.specific_mut::<BundlePackageSymbol>(ctx.section)?;
    child.bundle_code = Some(code.clone());
    child.version = Some(version.clone());
    child.upgrade_code = upgrade_code.clone();
    child.engine_version = registration
        .engine_version
        .clone()
        .or_else(|| Some(burn.format_version.to_string()));
    child.supports_burn_protocol = true;

    let package = facade.package_mut(ctx.section)?;
    package.version = Some(version.clone());
    if package.display_name.is_none() {
        package.display_name = registration.display_name.clone();
    }
    if package.description.is_none() {
        package.description = registration.display_name.clone();
    }
    if package.per_machine == YesNoDefault::Default {
        package.per_machine = YesNoDefault::from_bool(registration.per_machine);
    }
    if package.cache_id.is_none() {
        package.cache_id = Some(format!("{code}v{version}"));
    }

    if let Some(provider_key) = registration.provider_key.clone() {
        ctx.section.add(
            None,
            source_line.clone(),
            HarvestedDependencyProviderSymbol {
                package_ref: facade.id.clone(),
                provider_key,
                version: Some(version.clone()),
                display_name: registration.display_name.clone(),
                attributes: 0,
            },
        );
    }

    publish_package_variables(facade, ctx)?;
    if let Some(upgrade_code) = upgrade_code {
        ctx.cache.insert("packageUpgradeCode", &facade.id, upgrade_code);
    }
    if let Some(publisher) = registration.publisher {
        ctx.cache.insert("packageManufacturer", &facade.id, publisher);
    }

    info!("Inspected bundle package {} ({})", facade.id, path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::tests::{inspect, package_section};
    use super::*;
    use crate::bundle::burn::write_bundle;
    use crate::cabinet::CabinetEntry;
    use crate::config::CompressionLevel;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    const CHILD_CODE: &str = "{3C2B1A09-8F7E-4D6C-9B5A-413121110F0E}";
    const CHILD_UPGRADE: &str = "{5A5A5A5A-0000-4000-8000-5A5A5A5A5A5A}";

    fn child_bundle(folder: &Path) -> PathBuf {
        let manifest = folder.join(BURN_MANIFEST_NAME);
        fs::write(
            &manifest,
            format!(
                r#"<BurnManifest xmlns="http://wixtoolset.org/schemas/v4/2008/Burn" EngineVersion="5.0.2.0">
  <RelatedBundle Code="{CHILD_UPGRADE}" Action="Upgrade" />
  <Registration Code="{CHILD_CODE}" Version="2.1.0.0" ProviderKey="child.bundle" PerMachine="yes">
    <Arp DisplayName="Child Bundle" Publisher="Example Corp" />
  </Registration>
</BurnManifest>"#
            ),
        )
        .unwrap();
        let ux = folder.join("child-ux.cab");
        cabinet::create_cabinet(
            &ux,
            &[CabinetEntry::new(BURN_MANIFEST_NAME, &manifest)],
            CompressionLevel::Low,
        )
        .unwrap();
        let path = folder.join("child.exe");
        write_bundle(&path, None, CHILD_CODE, &[ux]).unwrap();
        path
    }

    #[test]
    fn test_child_bundle_identity_from_manifest() {
        let temp = TempDir::new().unwrap();
        let path = child_bundle(temp.path());
        let obj = temp.path().join("obj");

        let mut section =
            package_section("Child", PackageType::Bundle, BundlePackageSymbol::default(), &path);
        let (cache, messaging, outputs) = inspect(&mut section, "Child", &obj);
        assert!(!messaging.encountered_error(), "{:?}", messaging.messages());

        let (_, child) = section.find::<BundlePackageSymbol>("Child").unwrap();
        assert_eq!(child.bundle_code.as_deref(), Some(CHILD_CODE));
        assert_eq!(child.upgrade_code.as_deref(), Some(CHILD_UPGRADE));
        assert_eq!(child.version.as_deref(), Some("2.1.0.0"));
        assert_eq!(child.engine_version.as_deref(), Some("5.0.2.0"));
        assert!(child.supports_burn_protocol);

        let (_, package) = section.find::<PackageSymbol>("Child").unwrap();
        assert_eq!(package.per_machine, YesNoDefault::Yes);
        assert_eq!(package.display_name.as_deref(), Some("Child Bundle"));
        assert_eq!(
            package.cache_id.as_deref(),
            Some(format!("{CHILD_CODE}v2.1.0.0").as_str())
        );

        let (_, _, provider) = section
            .iter::<HarvestedDependencyProviderSymbol>()
            .next()
            .unwrap();
        assert_eq!(provider.package_ref, "Child");
        assert_eq!(provider.provider_key, "child.bundle");

        assert_eq!(cache.get("packageVersion.Child"), Some("2.1.0.0"));
        assert_eq!(cache.get("packageUpgradeCode.Child"), Some(CHILD_UPGRADE));
        assert_eq!(cache.get("packageManufacturer.Child"), Some("Example Corp"));

        let extracted = obj.join("bundles").join("Child").join(BURN_MANIFEST_NAME);
        assert!(extracted.is_file());
        assert_eq!(outputs.tracked(TrackedFileType::Temporary).count(), 1);
    }

    #[test]
    fn test_plain_executable_is_not_a_bundle_package() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("setup.exe");
        fs::write(&path, b"MZ plain executable without a burn section").unwrap();

        let mut section =
            package_section("Plain", PackageType::Bundle, BundlePackageSymbol::default(), &path);
        let (cache, messaging, _) = inspect(&mut section, "Plain", temp.path());
        assert_eq!(messaging.count(MessageId::InvalidBundlePackage), 1);
        assert!(cache.is_empty());
    }
}
