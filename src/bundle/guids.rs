// src/bundle/guids.rs

//! Canonical GUIDs for the bundle upgrade code and related bundles

use crate::data::IntermediateSection;
use crate::data::symbols::{BundleSymbol, RelatedBundleSymbol};
use crate::guid;
use crate::messaging::{MessageId, Messaging};
use tracing::debug;

/// Upper-case, braced GUIDs for the upgrade code and every related bundle
///
/// A related bundle code that does not parse is an authoring error at the
/// related bundle's source line. The upgrade code is normalized without an
/// element context and is left as authored when it does not parse.
pub fn normalize_bundle_guids(section: &mut IntermediateSection, messaging: &mut Messaging) {
    for index in section.indexes::<BundleSymbol>() {
        if let Some(bundle) = section.get_mut::<BundleSymbol>(index)
            && let Ok(normalized) = guid::normalize(&bundle.upgrade_code)
        {
            bundle.upgrade_code = normalized;
        }
    }

    for index in section.indexes::<RelatedBundleSymbol>() {
        let source_line = section.symbol(index).source_line.clone();
        let Some(related) = section.get_mut::<RelatedBundleSymbol>(index) else {
            continue;
        };
        match guid::normalize(&related.bundle_code) {
            Ok(normalized) => related.bundle_code = normalized,
            Err(e) => {
                debug!("Related bundle code {} rejected: {}", related.bundle_code, e);
                messaging.error(
                    MessageId::IllegalGuid,
                    source_line.as_ref(),
                    format!(
                        "The RelatedBundle/@Code value '{}' is not a legal GUID",
                        related.bundle_code
                    ),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{SectionType, SourceLineNumber};

    #[test]
    fn test_normalizes_codes() {
        let mut section = IntermediateSection::new("b", SectionType::Bundle);
        let bundle = section.add(
            None,
            None,
            BundleSymbol {
                upgrade_code: "8f1e2d3c-4b5a-6978-8a9b-0c1d2e3f4a5b".into(),
                ..Default::default()
            },
        );
        let related = section.add(
            None,
            None,
            RelatedBundleSymbol {
                bundle_code: "{11111111-2222-3333-4444-555555555555}".into(),
                ..Default::default()
            },
        );
        let mut messaging = Messaging::new();
        normalize_bundle_guids(&mut section, &mut messaging);

        assert!(!messaging.encountered_error());
        assert_eq!(
            section.get::<BundleSymbol>(bundle).unwrap().upgrade_code,
            "{8F1E2D3C-4B5A-6978-8A9B-0C1D2E3F4A5B}"
        );
        assert_eq!(
            section.get::<RelatedBundleSymbol>(related).unwrap().bundle_code,
            "{11111111-2222-3333-4444-555555555555}"
        );
    }

    #[test]
    fn test_bad_related_code_is_error_bad_upgrade_code_is_kept() {
        let mut section = IntermediateSection::new("b", SectionType::Bundle);
        let bundle = section.add(
            None,
            None,
            BundleSymbol {
                upgrade_code: "not-a-guid".into(),
                ..Default::default()
            },
        );
        for line in [4, 5] {
            section.add(
                None,
                Some(SourceLineNumber::new("bundle.wxs", line)),
                RelatedBundleSymbol {
                    bundle_code: "bogus".into(),
                    ..Default::default()
                },
            );
        }
        let mut messaging = Messaging::new();
        normalize_bundle_guids(&mut section, &mut messaging);

        assert_eq!(messaging.count(MessageId::IllegalGuid), 2);
        assert_eq!(section.get::<BundleSymbol>(bundle).unwrap().upgrade_code, "not-a-guid");
    }
}
