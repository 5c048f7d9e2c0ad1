// src/bundle/facade.rs

//! Package facades and membership indexes
//!
//! A facade pairs the type-independent `Package` symbol with the symbol of
//! its declared type. Both live in the section arena; a facade only holds
//! arena indexes, so facades stay valid while symbols are appended.

use crate::data::symbols::*;
use crate::data::{IntermediateSection, SourceLineNumber, SymbolKind};
use crate::error::{Error, Result};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Unified view over a package and its type-specific symbol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageFacade {
    pub id: String,
    pub package_type: PackageType,
    /// Arena index of the `Package` symbol
    pub package_index: usize,
    /// Arena index of the type-specific symbol
    pub specific_index: usize,
}

impl PackageFacade {
    pub fn package<'s>(&self, section: &'s IntermediateSection) -> Result<&'s PackageSymbol> {
        section
            .get::<PackageSymbol>(self.package_index)
            .ok_or_else(|| self.missing("Package"))
    }

    pub fn package_mut<'s>(
        &self,
        section: &'s mut IntermediateSection,
    ) -> Result<&'s mut PackageSymbol> {
        let missing = self.missing("Package");
        section
            .get_mut::<PackageSymbol>(self.package_index)
            .ok_or(missing)
    }

    /// Type-specific symbol; fails when `T` does not match the package type
    pub fn specific<'s, T: SymbolKind>(&self, section: &'s IntermediateSection) -> Result<&'s T> {
        section
            .get::<T>(self.specific_index)
            .ok_or_else(|| self.missing(T::NAME))
    }

    pub fn specific_mut<'s, T: SymbolKind>(
        &self,
        section: &'s mut IntermediateSection,
    ) -> Result<&'s mut T> {
        let missing = self.missing(T::NAME);
        section.get_mut::<T>(self.specific_index).ok_or(missing)
    }

    pub fn source_line<'s>(&self, section: &'s IntermediateSection) -> Option<&'s SourceLineNumber> {
        section.symbol(self.package_index).source_line.as_ref()
    }

    fn missing(&self, kind: &str) -> Error {
        Error::Toolchain(format!("Package {} has no {} symbol", self.id, kind))
    }
}

/// Facades by package id
pub type PackageFacades = BTreeMap<String, PackageFacade>;

/// Pair every `Package` symbol with the symbol of its declared type
pub fn build_facades(section: &IntermediateSection) -> Result<PackageFacades> {
    let mut facades = BTreeMap::new();
    for (index, symbol, package) in section.iter::<PackageSymbol>() {
        let Some(id) = symbol.id.clone() else {
            return Err(Error::Toolchain("Package symbol without an id".to_string()));
        };
        let specific = match package.package_type {
            PackageType::Bundle => section.find::<BundlePackageSymbol>(&id).map(|(i, _)| i),
            PackageType::Exe => section.find::<ExePackageSymbol>(&id).map(|(i, _)| i),
            PackageType::Msi => section.find::<MsiPackageSymbol>(&id).map(|(i, _)| i),
            PackageType::Msp => section.find::<MspPackageSymbol>(&id).map(|(i, _)| i),
            PackageType::Msu => section.find::<MsuPackageSymbol>(&id).map(|(i, _)| i),
        };
        let Some(specific_index) = specific else {
            return Err(Error::Toolchain(format!(
                "Package {} is declared {} but has no {}Package symbol",
                id, package.package_type, package.package_type
            )));
        };
        facades.insert(
            id.clone(),
            PackageFacade {
                id,
                package_type: package.package_type,
                package_index: index,
                specific_index,
            },
        );
    }
    Ok(facades)
}

/// Children of group rows, expanded through nested groups
struct GroupGraph<'s> {
    children: HashMap<(ComplexReferenceType, &'s str), Vec<(ComplexReferenceType, &'s str)>>,
}

impl<'s> GroupGraph<'s> {
    fn new(section: &'s IntermediateSection) -> Self {
        let mut children: HashMap<_, Vec<_>> = HashMap::new();
        for (_, _, group) in section.iter::<GroupSymbol>() {
            children
                .entry((group.parent_type, group.parent_id.as_str()))
                .or_default()
                .push((group.child_type, group.child_id.as_str()));
        }
        Self { children }
    }

    /// Leaf children of `wanted` type reachable from a parent, in authoring
    /// order, following payload and package groups
    fn leaves(
        &self,
        parent: (ComplexReferenceType, &'s str),
        wanted: ComplexReferenceType,
    ) -> Vec<&'s str> {
        let mut found = Vec::new();
        let mut visited = HashSet::new();
        self.walk(parent, wanted, &mut visited, &mut found);
        found
    }

    fn walk(
        &self,
        parent: (ComplexReferenceType, &'s str),
        wanted: ComplexReferenceType,
        visited: &mut HashSet<(ComplexReferenceType, &'s str)>,
        found: &mut Vec<&'s str>,
    ) {
        if !visited.insert(parent) {
            return;
        }
        let Some(children) = self.children.get(&parent) else {
            return;
        };
        for &(child_type, child_id) in children {
            if child_type == wanted {
                if !found.contains(&child_id) {
                    found.push(child_id);
                }
            } else if matches!(
                child_type,
                ComplexReferenceType::PayloadGroup | ComplexReferenceType::PackageGroup
            ) || (wanted == ComplexReferenceType::Payload
                && child_type == ComplexReferenceType::Package)
            {
                self.walk((child_type, child_id), wanted, visited, found);
            }
        }
    }
}

/// Payload membership of packages and containers
#[derive(Debug, Clone, Default)]
pub struct PayloadIndex {
    /// Payload id to arena index
    pub payloads: BTreeMap<String, usize>,
    /// Package id to its payloads; the package's own payload comes first
    pub package_payloads: BTreeMap<String, BTreeMap<String, usize>>,
    /// Package id to payload ids in authoring order
    pub package_payload_order: BTreeMap<String, Vec<String>>,
    /// Container id to payload ids placed in it by authoring
    pub container_payloads: BTreeMap<String, Vec<String>>,
    /// Payloads authored for layout only
    pub layout_payloads: BTreeSet<String>,
}

impl PayloadIndex {
    /// Build the index from the current group rows
    pub fn build(section: &IntermediateSection, facades: &PackageFacades) -> Result<Self> {
        let payloads = section
            .index_by_id::<PayloadSymbol>()
            .into_iter()
            .collect();
        let graph = GroupGraph::new(section);
        let mut index = PayloadIndex {
            payloads,
            ..Default::default()
        };

        for facade in facades.values() {
            let package = facade.package(section)?;
            let mut order = Vec::new();
            if !package.payload_ref.is_empty() {
                order.push(package.payload_ref.as_str());
            }
            for id in graph.leaves(
                (ComplexReferenceType::Package, facade.id.as_str()),
                ComplexReferenceType::Payload,
            ) {
                if !order.contains(&id) {
                    order.push(id);
                }
            }

            let mut map = BTreeMap::new();
            let mut ids = Vec::new();
            for id in order {
                if let Some(&arena) = index.payloads.get(id) {
                    map.insert(id.to_string(), arena);
                    ids.push(id.to_string());
                }
            }
            index.package_payloads.insert(facade.id.clone(), map);
            index.package_payload_order.insert(facade.id.clone(), ids);
        }

        for (_, symbol, _) in section.iter::<ContainerSymbol>() {
            let Some(id) = symbol.id.as_deref() else {
                continue;
            };
            let members = graph
                .leaves((ComplexReferenceType::Container, id), ComplexReferenceType::Payload)
                .into_iter()
                .map(str::to_string)
                .collect();
            index.container_payloads.insert(id.to_string(), members);
        }

        for (_, _, group) in section.iter::<GroupSymbol>() {
            if group.parent_type == ComplexReferenceType::Layout {
                for id in graph.leaves(
                    (ComplexReferenceType::Layout, group.parent_id.as_str()),
                    ComplexReferenceType::Payload,
                ) {
                    index.layout_payloads.insert(id.to_string());
                }
            }
        }

        Ok(index)
    }

    /// Package a payload belongs to, if any
    pub fn owning_package(&self, payload_id: &str) -> Option<&str> {
        self.package_payloads
            .iter()
            .find(|(_, payloads)| payloads.contains_key(payload_id))
            .map(|(package, _)| package.as_str())
    }

    pub fn payloads_of(&self, package_id: &str) -> impl Iterator<Item = (&str, usize)> {
        let order = self.package_payload_order.get(package_id);
        let map = self.package_payloads.get(package_id);
        order
            .into_iter()
            .flatten()
            .filter_map(move |id| map.and_then(|m| m.get(id)).map(|&i| (id.as_str(), i)))
    }
}

/// Package and rollback-boundary ids of the chain group, flattened in
/// authoring order
pub fn chain_members(section: &IntermediateSection) -> Vec<(ComplexReferenceType, String)> {
    let mut members = Vec::new();
    let mut visited = HashSet::new();
    collect_chain(
        section,
        ComplexReferenceType::PackageGroup,
        CHAIN_GROUP_ID,
        &mut visited,
        &mut members,
    );
    members
}

fn collect_chain(
    section: &IntermediateSection,
    parent_type: ComplexReferenceType,
    parent_id: &str,
    visited: &mut HashSet<String>,
    members: &mut Vec<(ComplexReferenceType, String)>,
) {
    if !visited.insert(parent_id.to_string()) {
        return;
    }
    for (_, _, group) in section.iter::<GroupSymbol>() {
        if group.parent_type != parent_type || group.parent_id != parent_id {
            continue;
        }
        match group.child_type {
            ComplexReferenceType::Package | ComplexReferenceType::RollbackBoundary => {
                members.push((group.child_type, group.child_id.clone()));
            }
            ComplexReferenceType::PackageGroup => collect_chain(
                section,
                ComplexReferenceType::PackageGroup,
                &group.child_id,
                visited,
                members,
            ),
            _ => {}
        }
    }
}
