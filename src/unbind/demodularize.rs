// src/unbind/demodularize.rs

//! Strip merge-module GUID suffixes from identifiers
//!
//! Merge-module content is modularized by appending `.<GUID>` (with the
//! hyphens replaced by underscores) to every identifier. Unbinding removes
//! the suffix and remembers the GUID so it can be restored as the module's
//! package code.

use crate::guid;
use regex::Regex;
use std::sync::LazyLock;
use tracing::warn;

static MODULARIZATION_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\.([0-9A-Fa-f]{8}_[0-9A-Fa-f]{4}_[0-9A-Fa-f]{4}_[0-9A-Fa-f]{4}_[0-9A-Fa-f]{12})",
    )
    .unwrap()
});

/// Collects the modularization GUID while rewriting values
#[derive(Debug, Default)]
pub struct Demodularizer {
    guid: Option<String>,
}

impl Demodularizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove every modularization suffix from `value`
    ///
    /// Returns `None` when the value carries no suffix.
    pub fn demodularize(&mut self, value: &str) -> Option<String> {
        let mut found = false;
        for captures in MODULARIZATION_SUFFIX.captures_iter(value) {
            found = true;
            let suffix = captures[1].replace('_', "-");
            let Ok(normalized) = guid::normalize(&suffix) else {
                continue;
            };
            match &self.guid {
                None => self.guid = Some(normalized),
                Some(existing) if *existing != normalized => {
                    warn!("Identifier {} uses a second modularization GUID {}", value, normalized);
                }
                Some(_) => {}
            }
        }
        found.then(|| MODULARIZATION_SUFFIX.replace_all(value, "").into_owned())
    }

    /// The first GUID found, in canonical braced form
    pub fn modularization_guid(&self) -> Option<&str> {
        self.guid.as_deref()
    }
}
