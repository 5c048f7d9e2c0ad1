// src/bundle/packages/mod.rs

//! Per-package-type processing
//!
//! Each package type has a command that inspects the package payload, fills
//! in the computed fields of its symbols and publishes values for bind
//! variables (`!(bind.<property>.<packageId>)`).

mod bundle;
mod exe;
mod msi;
mod msp;
mod msu;

use super::facade::{PackageFacade, PayloadIndex};
use crate::context::{BindOutputs, CancellationToken};
use crate::data::symbols::*;
use crate::data::{IntermediateSection, SourceLineNumber};
use crate::error::Result;
use crate::hash;
use crate::messaging::{MessageId, Messaging};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Values published by package processing, keyed `<property>.<packageId>`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableCache {
    values: BTreeMap<String, String>,
}

impl VariableCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a value; the first value for a key wins
    pub fn insert(&mut self, property: &str, package_id: &str, value: impl Into<String>) {
        let key = format!("{property}.{package_id}");
        if self.values.contains_key(&key) {
            warn!("Bind variable {} already has a value", key);
            return;
        }
        self.values.insert(key, value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// State shared by the package commands of one bind
pub struct PackageContext<'a> {
    pub section: &'a mut IntermediateSection,
    pub index: &'a PayloadIndex,
    pub cache: &'a mut VariableCache,
    pub messaging: &'a mut Messaging,
    pub outputs: &'a mut BindOutputs,
    pub intermediate_folder: &'a Path,
    pub cancellation: &'a CancellationToken,
}

impl PackageContext<'_> {
    /// The package's own payload, already processed
    fn package_payload(&self, facade: &PackageFacade) -> Result<Option<(usize, PayloadSymbol)>> {
        let package = facade.package(self.section)?;
        let found = self
            .index
            .package_payloads
            .get(&facade.id)
            .and_then(|p| p.get(&package.payload_ref))
            .and_then(|&i| self.section.get::<PayloadSymbol>(i).map(|p| (i, p.clone())));
        Ok(found)
    }

    /// Local file of the package payload, or an error message when absent
    fn package_file(&mut self, facade: &PackageFacade) -> Result<Option<(usize, PayloadSymbol, PathBuf)>> {
        let source_line = facade.source_line(self.section).cloned();
        let Some((index, payload)) = self.package_payload(facade)? else {
            self.messaging.error(
                MessageId::MissingPackagePayload,
                source_line.as_ref(),
                format!("Package {} has no package payload", facade.id),
            );
            return Ok(None);
        };
        match payload.source_file.as_deref().map(PathBuf::from) {
            Some(path) if path.is_file() => Ok(Some((index, payload, path))),
            _ => {
                debug!("Package {} payload {} has no local file", facade.id, payload.name);
                Ok(None)
            }
        }
    }

    fn source_line(&self, facade: &PackageFacade) -> Option<SourceLineNumber> {
        facade.source_line(self.section).cloned()
    }

    /// Add a payload discovered while inspecting a package
    fn add_package_payload(
        &mut self,
        facade: &PackageFacade,
        payload_id: &str,
        payload: PayloadSymbol,
    ) -> usize {
        let source_line = self.source_line(facade);
        let index = self.section.add(Some(payload_id), source_line.clone(), payload);
        self.section.add(
            None,
            source_line,
            GroupSymbol {
                parent_type: ComplexReferenceType::Package,
                parent_id: facade.id.clone(),
                child_type: ComplexReferenceType::Payload,
                child_id: payload_id.to_string(),
            },
        );
        index
    }
}

/// Stable identifier derived from its parts
pub(crate) fn generated_id(prefix: &str, parts: &[&str]) -> String {
    let digest = hash::sha256(parts.join("|").as_bytes());
    format!("{prefix}{}", &digest[..24].to_uppercase())
}

/// Payload name relative to the folder of another payload
fn sibling_name(package_payload_name: &str, relative: &str) -> String {
    match package_payload_name.rsplit_once(['/', '\\']) {
        Some((folder, _)) => format!("{folder}\\{relative}"),
        None => relative.to_string(),
    }
}

/// Run the command of the facade's package type
pub fn process_package(facade: &PackageFacade, ctx: &mut PackageContext<'_>) -> Result<()> {
    ctx.cancellation.check()?;
    debug!("Processing {} package {}", facade.package_type, facade.id);
    match facade.package_type {
        PackageType::Bundle => bundle::process(facade, ctx),
        PackageType::Exe => exe::process(facade, ctx),
        PackageType::Msi => msi::process(facade, ctx),
        PackageType::Msp => msp::process(facade, ctx),
        PackageType::Msu => msu::process(facade, ctx),
    }
}

/// Publish the common package variables
fn publish_package_variables(facade: &PackageFacade, ctx: &mut PackageContext<'_>) -> Result<()> {
    let package = facade.package(ctx.section)?;
    let values = [
        ("packageVersion", package.version.clone()),
        ("packageLanguage", package.language.clone()),
        ("packageName", package.display_name.clone()),
        ("packageDescription", package.description.clone()),
    ];
    for (property, value) in values {
        if let Some(value) = value {
            ctx.cache.insert(property, &facade.id, value);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::facade::build_facades;
    use crate::data::{SectionType, SymbolKind};

    /// Section holding one package of `package_type` whose payload is `source`
    pub(super) fn package_section<T: SymbolKind>(
        id: &str,
        package_type: PackageType,
        specific: T,
        source: &Path,
    ) -> IntermediateSection {
        let payload_id = format!("{id}Payload");
        let mut section = IntermediateSection::new("b", SectionType::Bundle);
        section.add(
            Some(&payload_id),
            None,
            PayloadSymbol {
                name: source
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                source_file: Some(source.to_string_lossy().into_owned()),
                ..Default::default()
            },
        );
        section.add(
            Some(id),
            Some(SourceLineNumber::new("bundle.wxs", 7)),
            PackageSymbol {
                package_type,
                payload_ref: payload_id,
                ..Default::default()
            },
        );
        section.add(Some(id), None, specific);
        section
    }

    /// Run the command of package `id` the way the bundle driver does
    pub(super) fn inspect(
        section: &mut IntermediateSection,
        id: &str,
        intermediate_folder: &Path,
    ) -> (VariableCache, Messaging, BindOutputs) {
        let facades = build_facades(section).unwrap();
        let index = PayloadIndex::build(section, &facades).unwrap();
        let mut cache = VariableCache::new();
        let mut messaging = Messaging::new();
        let mut outputs = BindOutputs::new();
        let cancellation = CancellationToken::new();
        let mut ctx = PackageContext {
            section,
            index: &index,
            cache: &mut cache,
            messaging: &mut messaging,
            outputs: &mut outputs,
            intermediate_folder,
            cancellation: &cancellation,
        };
        process_package(&facades[id], &mut ctx).unwrap();
        (cache, messaging, outputs)
    }

    #[test]
    fn test_cache_first_value_wins() {
        let mut cache = VariableCache::new();
        cache.insert("packageVersion", "Msi", "1.0.0.0");
        cache.insert("packageVersion", "Msi", "2.0.0.0");
        assert_eq!(cache.get("packageVersion.Msi"), Some("1.0.0.0"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_generated_id_is_stable() {
        let a = generated_id("cab", &["Msi", "data1.cab"]);
        assert_eq!(a, generated_id("cab", &["Msi", "data1.cab"]));
        assert_ne!(a, generated_id("cab", &["Msi", "data2.cab"]));
        assert!(a.starts_with("cab"));
        assert_eq!(a.len(), 27);
    }

    #[test]
    fn test_sibling_name() {
        assert_eq!(sibling_name("redist\\setup.msi", "data1.cab"), "redist\\data1.cab");
        assert_eq!(sibling_name("setup.msi", "data1.cab"), "data1.cab");
    }
}
