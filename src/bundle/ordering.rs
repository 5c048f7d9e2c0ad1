// src/bundle/ordering.rs

//! Chain order and rollback boundaries
//!
//! A rollback boundary applies to the package that follows it. A boundary
//! after the last package closes the chain backwards. Boundaries that end
//! up attached to nothing are dropped.

use super::facade::{PackageFacades, chain_members};
use crate::data::IntermediateSection;
use crate::data::symbols::*;
use crate::error::Result;
use crate::messaging::{MessageId, Messaging};
use std::collections::BTreeSet;
use tracing::debug;

/// Final install sequence
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainOrder {
    pub packages: Vec<String>,
    /// Boundaries referenced by a package, in chain order
    pub boundaries: Vec<String>,
}

pub fn order_packages(
    section: &mut IntermediateSection,
    facades: &PackageFacades,
    messaging: &mut Messaging,
) -> Result<ChainOrder> {
    let members = chain_members(section);
    let authored_boundaries: BTreeSet<String> = section
        .iter::<RollbackBoundarySymbol>()
        .filter_map(|(_, s, _)| s.id.clone())
        .collect();

    let mut order = ChainOrder::default();
    let mut pending: Option<String> = None;
    let mut seen = BTreeSet::new();

    for (kind, id) in members {
        match kind {
            ComplexReferenceType::RollbackBoundary => {
                if !authored_boundaries.contains(&id) {
                    messaging.error(
                        MessageId::PackageNotInChain,
                        None,
                        format!("Chain references undefined rollback boundary {}", id),
                    );
                    continue;
                }
                if let Some(dropped) = pending.replace(id) {
                    drop_boundary(&dropped, messaging);
                }
            }
            ComplexReferenceType::Package => {
                let Some(facade) = facades.get(&id) else {
                    messaging.error(
                        MessageId::PackageNotInChain,
                        None,
                        format!("Chain references undefined package {}", id),
                    );
                    continue;
                };
                if !seen.insert(id.clone()) {
                    debug!("Package {} appears in the chain more than once", id);
                    continue;
                }

                if order.packages.is_empty() && pending.is_none() {
                    pending = Some(ensure_default_boundary(section));
                }
                let boundary = pending.take();
                if let Some(boundary) = &boundary {
                    order.boundaries.push(boundary.clone());
                }
                facade.package_mut(section)?.rollback_boundary_ref = boundary;
                order.packages.push(id);
            }
            _ => {}
        }
    }

    if let Some(trailing) = pending.take() {
        match order.packages.last().and_then(|id| facades.get(id)) {
            Some(last) => {
                last.package_mut(section)?.rollback_boundary_backward_ref = Some(trailing.clone());
                order.boundaries.push(trailing);
            }
            None => drop_boundary(&trailing, messaging),
        }
    }

    for id in &authored_boundaries {
        if !order.boundaries.contains(id) {
            drop_boundary(id, messaging);
        }
    }

    for (id, facade) in facades {
        if !seen.contains(id) {
            messaging.warning(
                MessageId::PackageNotInChain,
                facade.source_line(section),
                format!("Package {} is not part of the chain and will not be installed", id),
            );
        }
    }

    debug!(
        "Chain: {} packages, {} rollback boundaries",
        order.packages.len(),
        order.boundaries.len()
    );
    Ok(order)
}

fn ensure_default_boundary(section: &mut IntermediateSection) -> String {
    if section.find::<RollbackBoundarySymbol>(DEFAULT_BOUNDARY_ID).is_none() {
        section.add(
            Some(DEFAULT_BOUNDARY_ID),
            None,
            RollbackBoundarySymbol::default(),
        );
    }
    DEFAULT_BOUNDARY_ID.to_string()
}

fn drop_boundary(id: &str, messaging: &mut Messaging) {
    messaging.verbose(
        MessageId::UnusedRollbackBoundary,
        None,
        format!("Rollback boundary {} is not followed by a package and was dropped", id),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::facade::build_facades;
    use crate::data::SectionType;

    fn chain(section: &mut IntermediateSection, child_type: ComplexReferenceType, id: &str) {
        section.add(
            None,
            None,
            GroupSymbol {
                parent_type: ComplexReferenceType::PackageGroup,
                parent_id: CHAIN_GROUP_ID.into(),
                child_type,
                child_id: id.into(),
            },
        );
    }

    fn exe(section: &mut IntermediateSection, id: &str) {
        section.add(Some(id), None, PackageSymbol::default());
        section.add(Some(id), None, ExePackageSymbol::default());
    }

    #[test]
    fn test_default_boundary_and_trailing_boundary() {
        let mut section = IntermediateSection::new("b", SectionType::Bundle);
        exe(&mut section, "A");
        exe(&mut section, "B");
        section.add(Some("Mid"), None, RollbackBoundarySymbol::default());
        section.add(Some("End"), None, RollbackBoundarySymbol::default());
        section.add(Some("Unused"), None, RollbackBoundarySymbol::default());
        chain(&mut section, ComplexReferenceType::Package, "A");
        chain(&mut section, ComplexReferenceType::RollbackBoundary, "Mid");
        chain(&mut section, ComplexReferenceType::Package, "B");
        chain(&mut section, ComplexReferenceType::RollbackBoundary, "End");

        let facades = build_facades(&section).unwrap();
        let mut messaging = Messaging::new();
        let order = order_packages(&mut section, &facades, &mut messaging).unwrap();

        assert_eq!(order.packages, vec!["A", "B"]);
        assert_eq!(order.boundaries, vec![DEFAULT_BOUNDARY_ID, "Mid", "End"]);
        let a = facades["A"].package(&section).unwrap();
        assert_eq!(a.rollback_boundary_ref.as_deref(), Some(DEFAULT_BOUNDARY_ID));
        let b = facades["B"].package(&section).unwrap();
        assert_eq!(b.rollback_boundary_ref.as_deref(), Some("Mid"));
        assert_eq!(b.rollback_boundary_backward_ref.as_deref(), Some("End"));
        assert_eq!(messaging.count(MessageId::UnusedRollbackBoundary), 1);
        assert!(!messaging.encountered_error());
    }

    #[test]
    fn test_consecutive_boundaries_drop_the_first() {
        let mut section = IntermediateSection::new("b", SectionType::Bundle);
        exe(&mut section, "A");
        section.add(Some("First"), None, RollbackBoundarySymbol::default());
        section.add(Some("Second"), None, RollbackBoundarySymbol::default());
        chain(&mut section, ComplexReferenceType::RollbackBoundary, "First");
        chain(&mut section, ComplexReferenceType::RollbackBoundary, "Second");
        chain(&mut section, ComplexReferenceType::Package, "A");

        let facades = build_facades(&section).unwrap();
        let mut messaging = Messaging::new();
        let order = order_packages(&mut section, &facades, &mut messaging).unwrap();
        assert_eq!(order.boundaries, vec!["Second"]);
        assert!(section.find::<RollbackBoundarySymbol>(DEFAULT_BOUNDARY_ID).is_none());
    }

    #[test]
    fn test_package_outside_chain_warns() {
        let mut section = IntermediateSection::new("b", SectionType::Bundle);
        exe(&mut section, "A");
        exe(&mut section, "Orphan");
        chain(&mut section, ComplexReferenceType::Package, "A");

        let facades = build_facades(&section).unwrap();
        let mut messaging = Messaging::new();
        let order = order_packages(&mut section, &facades, &mut messaging).unwrap();
        assert_eq!(order.packages, vec!["A"]);
        assert_eq!(messaging.warnings().count(), 1);
    }
}
