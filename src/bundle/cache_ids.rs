// src/bundle/cache_ids.rs

//! Duplicate cache id detection

use super::facade::PackageFacades;
use super::ordering::ChainOrder;
use crate::data::IntermediateSection;
use crate::error::Result;
use crate::messaging::{MessageId, Messaging};
use std::collections::BTreeMap;

/// Report every chain package whose cache id an earlier package already uses
///
/// Each duplicate gets one error at its own location plus one at the
/// location of the package it collides with.
pub fn check_duplicate_cache_ids(
    section: &IntermediateSection,
    facades: &PackageFacades,
    chain: &ChainOrder,
    messaging: &mut Messaging,
) -> Result<usize> {
    let mut first_use: BTreeMap<&str, &str> = BTreeMap::new();
    let mut duplicates = 0;

    for id in &chain.packages {
        let Some(facade) = facades.get(id) else {
            continue;
        };
        let Some(cache_id) = facade.package(section)?.cache_id.as_deref() else {
            continue;
        };
        let Some(&first) = first_use.get(cache_id) else {
            first_use.insert(cache_id, id);
            continue;
        };

        duplicates += 1;
        messaging.error(
            MessageId::DuplicateCacheIds,
            facade.source_line(section),
            format!(
                "Package {} has cache id {} which is already used by package {}",
                id, cache_id, first
            ),
        );
        let first_line = facades.get(first).and_then(|f| f.source_line(section));
        messaging.error(
            MessageId::DuplicateCacheIdsLocation,
            first_line,
            format!("Location of package {} that first used cache id {}", first, cache_id),
        );
    }
    Ok(duplicates)
}
