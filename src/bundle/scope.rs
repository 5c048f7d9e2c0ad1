// src/bundle/scope.rs

//! Install scope resolution

use super::facade::PackageFacades;
use crate::data::IntermediateSection;
use crate::data::symbols::*;
use crate::error::Result;
use crate::messaging::{MessageId, Messaging};
use tracing::{debug, info};

/// Resolve the bundle scope and give every package an explicit one
///
/// The bundle is per-machine unless any package says per-user. Packages
/// without a scope inherit the bundle's. Returns the bundle scope.
pub fn resolve_install_scope(
    section: &mut IntermediateSection,
    facades: &PackageFacades,
    messaging: &mut Messaging,
) -> Result<bool> {
    let mut per_machine = true;
    for facade in facades.values() {
        if facade.package(section)?.per_machine == YesNoDefault::No {
            debug!("Package {} is per-user", facade.id);
            per_machine = false;
            break;
        }
    }

    for index in section.indexes::<BundleSymbol>() {
        if let Some(bundle) = section.get_mut::<BundleSymbol>(index) {
            bundle.per_machine = per_machine;
        }
    }

    for facade in facades.values() {
        let has_provider = section
            .iter::<DependencyProviderSymbol>()
            .any(|(_, _, p)| p.parent_ref.as_deref() == Some(facade.id.as_str()));
        let source_line = facade.source_line(section).cloned();

        let package = facade.package_mut(section)?;
        if package.per_machine == YesNoDefault::Default {
            package.per_machine = YesNoDefault::from_bool(per_machine);
        } else if package.per_machine == YesNoDefault::Yes && !per_machine && has_provider {
            messaging.warning(
                MessageId::PerUserBundleWithPerMachinePackage,
                source_line.as_ref(),
                format!(
                    "Per-machine package {} registers a dependency provider in a per-user bundle; \
                     its reference count will not include this bundle",
                    facade.id
                ),
            );
        }
    }

    info!(
        "Bundle scope: {}",
        if per_machine { "per-machine" } else { "per-user" }
    );
    Ok(per_machine)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::facade::build_facades;
    use crate::data::SectionType;

    fn package(section: &mut IntermediateSection, id: &str, per_machine: YesNoDefault) {
        section.add(
            Some(id),
            None,
            PackageSymbol {
                per_machine,
                ..Default::default()
            },
        );
        section.add(Some(id), None, ExePackageSymbol::default());
    }

    #[test]
    fn test_per_user_package_flips_bundle() {
        let mut section = IntermediateSection::new("b", SectionType::Bundle);
        section.add(None, None, BundleSymbol::default());
        package(&mut section, "PerUser", YesNoDefault::No);
        package(&mut section, "Inherits", YesNoDefault::Default);

        let facades = build_facades(&section).unwrap();
        let mut messaging = Messaging::new();
        let per_machine = resolve_install_scope(&mut section, &facades, &mut messaging).unwrap();

        assert!(!per_machine);
        let inherits = facades["Inherits"].package(&section).unwrap();
        assert_eq!(inherits.per_machine, YesNoDefault::No);
        let (_, _, bundle) = section.iter::<BundleSymbol>().next().unwrap();
        assert!(!bundle.per_machine);
    }

    #[test]
    fn test_default_bundle_is_per_machine() {
        let mut section = IntermediateSection::new("b", SectionType::Bundle);
        section.add(None, None, BundleSymbol::default());
        package(&mut section, "A", YesNoDefault::Default);
        package(&mut section, "B", YesNoDefault::Yes);

        let facades = build_facades(&section).unwrap();
        let mut messaging = Messaging::new();
        assert!(resolve_install_scope(&mut section, &facades, &mut messaging).unwrap());
        for facade in facades.values() {
            assert_eq!(facade.package(&section).unwrap().per_machine, YesNoDefault::Yes);
        }
    }

    #[test]
    fn test_per_machine_provider_in_per_user_bundle_warns() {
        let mut section = IntermediateSection::new("b", SectionType::Bundle);
        section.add(None, None, BundleSymbol::default());
        package(&mut section, "User", YesNoDefault::No);
        package(&mut section, "Machine", YesNoDefault::Yes);
        section.add(
            None,
            None,
            DependencyProviderSymbol {
                parent_ref: Some("Machine".into()),
                provider_key: Some("machine".into()),
                ..Default::default()
            },
        );

        let facades = build_facades(&section).unwrap();
        let mut messaging = Messaging::new();
        resolve_install_scope(&mut section, &facades, &mut messaging).unwrap();
        assert_eq!(messaging.count(MessageId::PerUserBundleWithPerMachinePackage), 1);
        assert!(!messaging.encountered_error());
    }
}
