// src/bundle/providers.rs

//! Dependency provider resolution
//!
//! Every package ends up with the providers it registers: authored ones,
//! harvested ones imported from the package itself, and for MSI/MSP packages
//! without any, one synthesized as `<code>_v<version>`. The bundle gets a
//! single provider key, the bundle code unless overridden.

use super::facade::{PackageFacade, PackageFacades};
use crate::data::IntermediateSection;
use crate::data::symbols::*;
use crate::error::Result;
use crate::messaging::{MessageId, Messaging};
use std::collections::BTreeMap;
use tracing::debug;

pub fn resolve_dependency_providers(
    section: &mut IntermediateSection,
    facades: &PackageFacades,
    messaging: &mut Messaging,
) -> Result<()> {
    resolve_bundle_provider(section, messaging);

    for facade in facades.values() {
        import_harvested(section, facade);
        default_package_providers(section, facade)?;
    }

    check_duplicate_keys(section, messaging);
    Ok(())
}

fn resolve_bundle_provider(section: &mut IntermediateSection, messaging: &mut Messaging) {
    let bundle_providers: Vec<(Option<String>, Option<_>)> = section
        .iter::<DependencyProviderSymbol>()
        .filter(|(_, _, p)| p.parent_ref.is_none())
        .map(|(_, s, p)| (p.provider_key.clone(), s.source_line.clone()))
        .collect();

    for (key, source_line) in bundle_providers.iter().skip(1) {
        messaging.error(
            MessageId::MultipleBundleProviders,
            source_line.as_ref(),
            format!(
                "The bundle declares more than one dependency provider ({})",
                key.as_deref().unwrap_or("<default>")
            ),
        );
    }

    let Some(bundle_index) = section.indexes::<BundleSymbol>().first().copied() else {
        return;
    };
    let authored = bundle_providers.first().and_then(|(key, _)| key.clone());
    if let Some(bundle) = section.get_mut::<BundleSymbol>(bundle_index) {
        bundle.provider_key = authored.or_else(|| bundle.bundle_code.clone());
        debug!("Bundle provider key: {:?}", bundle.provider_key);
    }
}

fn import_harvested(section: &mut IntermediateSection, facade: &PackageFacade) {
    let authored: Vec<String> = providers_of(section, &facade.id)
        .filter_map(|p| p.provider_key.clone())
        .collect();
    let harvested: Vec<(HarvestedDependencyProviderSymbol, Option<_>)> = section
        .iter::<HarvestedDependencyProviderSymbol>()
        .filter(|(_, _, h)| h.package_ref == facade.id)
        .map(|(_, s, h)| (h.clone(), s.source_line.clone()))
        .collect();

    for (provider, source_line) in harvested {
        if authored.contains(&provider.provider_key) {
            continue;
        }
        debug!(
            "Importing provider {} harvested from {}",
            provider.provider_key, facade.id
        );
        section.add(
            None,
            source_line,
            DependencyProviderSymbol {
                parent_ref: Some(facade.id.clone()),
                provider_key: Some(provider.provider_key),
                version: provider.version,
                display_name: provider.display_name,
                imported: true,
            },
        );
    }
}

fn default_package_providers(section: &mut IntermediateSection, facade: &PackageFacade) -> Result<()> {
    let package = facade.package(section)?;
    let version = package.version.clone();
    let display_name = package.display_name.clone();
    let code = match facade.package_type {
        PackageType::Msi => facade.specific::<MsiPackageSymbol>(section)?.product_code.clone(),
        PackageType::Msp => facade.specific::<MspPackageSymbol>(section)?.patch_code.clone(),
        PackageType::Bundle => facade.specific::<BundlePackageSymbol>(section)?.bundle_code.clone(),
        PackageType::Exe | PackageType::Msu => None,
    };

    let indexes: Vec<usize> = section
        .iter::<DependencyProviderSymbol>()
        .filter(|(_, _, p)| p.parent_ref.as_deref() == Some(facade.id.as_str()))
        .map(|(i, _, _)| i)
        .collect();

    for &index in &indexes {
        if let Some(provider) = section.get_mut::<DependencyProviderSymbol>(index) {
            if provider.provider_key.is_none() {
                provider.provider_key = Some(code.clone().unwrap_or_else(|| facade.id.clone()));
            }
            if provider.version.is_none() {
                provider.version = version.clone();
            }
            if provider.display_name.is_none() {
                provider.display_name = display_name.clone();
            }
        }
    }

    let needs_synthesized = indexes.is_empty()
        && matches!(facade.package_type, PackageType::Msi | PackageType::Msp);
    if needs_synthesized && let Some(code) = code {
        let key = format!("{}_v{}", code, version.as_deref().unwrap_or(""));
        debug!("Synthesized provider {} for {}", key, facade.id);
        let source_line = facade.source_line(section).cloned();
        section.add(
            None,
            source_line,
            DependencyProviderSymbol {
                parent_ref: Some(facade.id.clone()),
                provider_key: Some(key),
                version,
                display_name,
                imported: false,
            },
        );
    }
    Ok(())
}

fn providers_of<'s>(
    section: &'s IntermediateSection,
    package_id: &'s str,
) -> impl Iterator<Item = &'s DependencyProviderSymbol> {
    section
        .iter::<DependencyProviderSymbol>()
        .map(|(_, _, p)| p)
        .filter(move |p| p.parent_ref.as_deref() == Some(package_id))
}

/// Same key with a different version or display name is an error
fn check_duplicate_keys(section: &IntermediateSection, messaging: &mut Messaging) {
    let mut seen: BTreeMap<&str, (&DependencyProviderSymbol, &str)> = BTreeMap::new();
    for (_, symbol, provider) in section.iter::<DependencyProviderSymbol>() {
        let (Some(package), Some(key)) = (provider.parent_ref.as_deref(), provider.provider_key.as_deref())
        else {
            continue;
        };
        match seen.get(key) {
            Some((first, first_package)) => {
                if first.version != provider.version || first.display_name != provider.display_name {
                    messaging.error(
                        MessageId::DuplicateProviderDependencyKey,
                        symbol.source_line.as_ref(),
                        format!(
                            "Provider key {} of package {} is also provided by {} with a different version or display name",
                            key, package, first_package
                        ),
                    );
                }
            }
            None => {
                seen.insert(key, (provider, package));
            }
        }
    }
}
