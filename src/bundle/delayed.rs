// src/bundle/delayed.rs

//! Delayed field resolution
//!
//! Fields authored with `!(bind.<property>.<packageId>)` references are
//! filled in from the values package processing published.

use super::packages::VariableCache;
use crate::data::IntermediateSection;
use crate::error::Result;
use crate::messaging::{MessageId, Messaging};
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

static BIND_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\(bind\.([^)]+)\)").unwrap());

/// Substitute every bind reference in `value`
///
/// Returns the new value and the references that had no published value.
pub fn substitute(value: &str, cache: &VariableCache) -> (String, Vec<String>) {
    let mut missing = Vec::new();
    let resolved = BIND_REFERENCE.replace_all(value, |caps: &regex::Captures<'_>| {
        let key = &caps[1];
        match cache.get(key) {
            Some(found) => found.to_string(),
            None => {
                missing.push(key.to_string());
                caps[0].to_string()
            }
        }
    });
    (resolved.into_owned(), missing)
}

/// Resolve the section's delayed fields, returning how many changed
pub fn resolve_delayed_fields(
    section: &mut IntermediateSection,
    cache: &VariableCache,
    messaging: &mut Messaging,
) -> Result<usize> {
    let mut resolved = 0;
    let fields = section.delayed_fields.clone();

    for field in &fields {
        let target = section.symbols.iter().position(|s| {
            s.kind_name() == field.symbol_type
                && field
                    .symbol_id
                    .as_deref()
                    .is_none_or(|id| s.id.as_deref() == Some(id))
        });
        let Some(index) = target else {
            debug!(
                "Delayed field {}.{} has no target symbol",
                field.symbol_type, field.field
            );
            continue;
        };
        let Some(value) = section.string_field(index, &field.field)? else {
            continue;
        };

        let (new_value, missing) = substitute(&value, cache);
        let source_line = section.symbol(index).source_line.clone();
        for key in missing {
            messaging.error(
                MessageId::UnresolvedBindReference,
                source_line.as_ref(),
                format!(
                    "Unresolved bind variable !(bind.{}) in {}.{}",
                    key, field.symbol_type, field.field
                ),
            );
        }
        if new_value != value {
            section.set_string_field(index, &field.field, &new_value)?;
            resolved += 1;
        }
    }

    debug!("Resolved {} delayed fields", resolved);
    Ok(resolved)
}
