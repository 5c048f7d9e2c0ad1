// src/bundle/slipstream.rs

//! Patch slipstreaming
//!
//! An MSP marked for slipstreaming is attached to every MSI in the bundle
//! whose product code it targets, so the patch installs together with the
//! product.

use super::facade::PackageFacades;
use crate::data::IntermediateSection;
use crate::data::symbols::*;
use crate::error::Result;
use crate::messaging::{MessageId, Messaging};
use std::collections::BTreeSet;
use tracing::debug;

/// Add slipstream rows for targeted MSIs, returning how many were added
pub fn slipstream_patches(
    section: &mut IntermediateSection,
    facades: &PackageFacades,
    messaging: &mut Messaging,
) -> Result<usize> {
    let mut existing: BTreeSet<(String, String)> = BTreeSet::new();
    for (_, symbol, row) in section.iter::<SlipstreamMspSymbol>() {
        let target_ok = facades
            .get(&row.target_package_ref)
            .is_some_and(|f| f.package_type == PackageType::Msi);
        let patch_ok = facades
            .get(&row.msp_package_ref)
            .is_some_and(|f| f.package_type == PackageType::Msp);
        if !target_ok || !patch_ok {
            messaging.error(
                MessageId::InvalidMspPackage,
                symbol.source_line.as_ref(),
                format!(
                    "Slipstream of {} into {} must reference an MspPackage and an MsiPackage",
                    row.msp_package_ref, row.target_package_ref
                ),
            );
        }
        existing.insert((row.target_package_ref.clone(), row.msp_package_ref.clone()));
    }

    let mut products: Vec<(String, String)> = Vec::new();
    for facade in facades.values() {
        if facade.package_type == PackageType::Msi
            && let Some(code) = &facade.specific::<MsiPackageSymbol>(section)?.product_code
        {
            products.push((code.to_ascii_uppercase(), facade.id.clone()));
        }
    }

    let mut additions = Vec::new();
    for facade in facades.values() {
        if facade.package_type != PackageType::Msp
            || !facade.specific::<MspPackageSymbol>(section)?.slipstream
        {
            continue;
        }
        let source_line = facade.source_line(section).cloned();
        for (_, _, target) in section.iter::<PatchTargetCodeSymbol>() {
            if target.package_ref != facade.id || target.target_type != PatchTargetType::ProductCode {
                continue;
            }
            let code = target.target_code.to_ascii_uppercase();
            for (product_code, msi_id) in &products {
                if *product_code == code
                    && existing.insert((msi_id.clone(), facade.id.clone()))
                {
                    additions.push((msi_id.clone(), facade.id.clone(), source_line.clone()));
                }
            }
        }
    }

    let count = additions.len();
    for (msi_id, msp_id, source_line) in additions {
        debug!("Slipstreaming {} into {}", msp_id, msi_id);
        section.add(
            None,
            source_line,
            SlipstreamMspSymbol {
                target_package_ref: msi_id,
                msp_package_ref: msp_id,
            },
        );
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::facade::build_facades;
    use crate::data::SectionType;

    const PRODUCT: &str = "{11111111-1111-1111-1111-111111111111}";

    fn section_with_patch(slipstream: bool) -> IntermediateSection {
        let mut section = IntermediateSection::new("b", SectionType::Bundle);
        section.add(
            Some("Msi"),
            None,
            PackageSymbol {
                package_type: PackageType::Msi,
                ..Default::default()
            },
        );
        section.add(
            Some("Msi"),
            None,
            MsiPackageSymbol {
                product_code: Some(PRODUCT.into()),
                ..Default::default()
            },
        );
        section.add(
            Some("Msp"),
            None,
            PackageSymbol {
                package_type: PackageType::Msp,
                ..Default::default()
            },
        );
        section.add(
            Some("Msp"),
            None,
            MspPackageSymbol {
                slipstream,
                ..Default::default()
            },
        );
        section.add(
            None,
            None,
            PatchTargetCodeSymbol {
                package_ref: "Msp".into(),
                target_code: PRODUCT.to_lowercase(),
                target_type: PatchTargetType::ProductCode,
            },
        );
        section
    }

    #[test]
    fn test_patch_is_slipstreamed_into_target() {
        let mut section = section_with_patch(true);
        let facades = build_facades(&section).unwrap();
        let mut messaging = Messaging::new();
        assert_eq!(slipstream_patches(&mut section, &facades, &mut messaging).unwrap(), 1);
        let (_, _, row) = section.iter::<SlipstreamMspSymbol>().next().unwrap();
        assert_eq!(row.target_package_ref, "Msi");
        assert_eq!(row.msp_package_ref, "Msp");

        // Second pass finds the existing row
        assert_eq!(slipstream_patches(&mut section, &facades, &mut messaging).unwrap(), 0);
        assert!(!messaging.encountered_error());
    }

    #[test]
    fn test_patch_without_slipstream_flag() {
        let mut section = section_with_patch(false);
        let facades = build_facades(&section).unwrap();
        let mut messaging = Messaging::new();
        assert_eq!(slipstream_patches(&mut section, &facades, &mut messaging).unwrap(), 0);
    }
}
