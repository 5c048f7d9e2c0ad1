// src/bundle/payloads.rs

//! Payload processing: source resolution, hashing, packaging, embedded ids

use super::facade::{PackageFacades, PayloadIndex};
use crate::context::CancellationToken;
use crate::data::IntermediateSection;
use crate::data::symbols::*;
use crate::error::Result;
use crate::hash::{self, HashAlgorithm};
use crate::messaging::{MessageId, Messaging};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Hash and size payload files and decide how each one is delivered
pub struct ProcessPayloadsCommand<'a> {
    base_folder: &'a Path,
    /// Packaging of payloads that do not say
    default_compressed: bool,
    layout_payloads: &'a BTreeSet<String>,
    cancellation: &'a CancellationToken,
}

impl<'a> ProcessPayloadsCommand<'a> {
    pub fn new(
        base_folder: &'a Path,
        default_compressed: bool,
        layout_payloads: &'a BTreeSet<String>,
        cancellation: &'a CancellationToken,
    ) -> Self {
        Self {
            base_folder,
            default_compressed,
            layout_payloads,
            cancellation,
        }
    }

    /// Process the payloads at `indexes`, skipping any already in `processed`
    pub fn execute(
        &self,
        section: &mut IntermediateSection,
        indexes: impl IntoIterator<Item = usize>,
        processed: &mut BTreeSet<usize>,
        messaging: &mut Messaging,
    ) -> Result<usize> {
        let mut count = 0;
        for index in indexes {
            self.cancellation.check()?;
            if !processed.insert(index) {
                continue;
            }
            let id = section.symbol(index).id().to_string();
            let source_line = section.symbol(index).source_line.clone();
            let layout_only = self.layout_payloads.contains(&id);
            let Some(payload) = section.get_mut::<PayloadSymbol>(index) else {
                continue;
            };

            if payload.display_name.is_none() {
                payload.display_name = Some(payload.name.clone());
            }
            payload.layout_only |= layout_only;
            payload.packaging = self.packaging(payload);

            match payload.source_file.as_deref().map(|s| resolve_source(self.base_folder, s)) {
                Some(path) if path.is_file() => {
                    let (file_hash, size) = hash::hash_file(HashAlgorithm::Sha512, &path)?;
                    payload.hash = Some(file_hash.to_manifest_string());
                    payload.file_size = Some(size);
                    payload.source_file = Some(path.to_string_lossy().into_owned());
                    trace!("Payload {}: {} bytes", id, size);
                }
                _ if is_remote(payload) => {
                    debug!("Payload {} is remote", id);
                }
                source => {
                    let shown = source
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| "(none)".to_string());
                    messaging.error(
                        MessageId::MissingPayloadSource,
                        source_line.as_ref(),
                        format!("Payload {} source file {} was not found", id, shown),
                    );
                }
            }
            count += 1;
        }
        Ok(count)
    }

    fn packaging(&self, payload: &PayloadSymbol) -> PackagingType {
        if payload.layout_only {
            return PackagingType::External;
        }
        match payload.compressed {
            Some(true) => PackagingType::Embedded,
            Some(false) => PackagingType::External,
            None if payload.download_url.is_some() && payload.source_file.is_none() => {
                PackagingType::External
            }
            None if self.default_compressed => PackagingType::Embedded,
            None => PackagingType::External,
        }
    }
}

/// A payload known only by its download url, size and hash
fn is_remote(payload: &PayloadSymbol) -> bool {
    payload.download_url.is_some() && payload.file_size.is_some() && payload.hash.is_some()
}

fn resolve_source(base_folder: &Path, source: &str) -> PathBuf {
    let path = Path::new(source);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_folder.join(path)
    }
}

/// Sum payload sizes into packages and default display text
pub fn finalize_package_metadata(
    section: &mut IntermediateSection,
    facades: &PackageFacades,
    index: &PayloadIndex,
) -> Result<()> {
    for facade in facades.values() {
        let mut size = 0u64;
        for (_, arena) in index.payloads_of(&facade.id) {
            if let Some(payload) = section.get::<PayloadSymbol>(arena) {
                size += payload.file_size.unwrap_or(0);
            }
        }

        let package = facade.package(section)?;
        let own_payload = index
            .package_payloads
            .get(&facade.id)
            .and_then(|p| p.get(&package.payload_ref))
            .and_then(|&i| section.get::<PayloadSymbol>(i));
        let display_name = own_payload.and_then(|p| p.display_name.clone());
        let description = own_payload.and_then(|p| p.description.clone());

        let package = facade.package_mut(section)?;
        package.size = size;
        if package.install_size.is_none() {
            package.install_size = Some(size);
        }
        if package.display_name.is_none() {
            package.display_name = display_name;
        }
        if package.description.is_none() {
            package.description = description;
        }
    }
    Ok(())
}

/// Container of every embedded payload, by payload arena index
///
/// Authored container membership wins, then the payload's own
/// `container_ref`; everything else lands in the default attached container.
/// An embedded payload whose container has no symbol is an authoring error.
pub fn assign_containers(
    section: &mut IntermediateSection,
    index: &PayloadIndex,
    messaging: &mut Messaging,
) {
    let mut authored: BTreeMap<&str, &str> = BTreeMap::new();
    for (container, payloads) in &index.container_payloads {
        for payload in payloads {
            authored.entry(payload.as_str()).or_insert(container.as_str());
        }
    }
    let authored: BTreeMap<String, String> = authored
        .into_iter()
        .map(|(p, c)| (p.to_string(), c.to_string()))
        .collect();

    let defined: BTreeSet<String> = section
        .iter::<ContainerSymbol>()
        .filter_map(|(_, s, _)| s.id.clone())
        .collect();

    for arena in section.indexes::<PayloadSymbol>() {
        let symbol = section.symbol(arena);
        let id = symbol.id().to_string();
        let source_line = symbol.source_line.clone();
        let Some(payload) = section.get_mut::<PayloadSymbol>(arena) else {
            continue;
        };
        if let Some(container) = authored.get(&id) {
            payload.container_ref = Some(container.clone());
            if container == UX_CONTAINER_ID {
                payload.packaging = PackagingType::Embedded;
            }
        }
        if payload.packaging != PackagingType::Embedded {
            payload.container_ref = None;
            continue;
        }
        let container = payload
            .container_ref
            .get_or_insert_with(|| ATTACHED_CONTAINER_ID.to_string());
        if !defined.contains(container.as_str()) {
            messaging.error(
                MessageId::MissingPayloadContainer,
                source_line.as_ref(),
                format!("Payload {id} is embedded in container {container}, which is not defined"),
            );
        }
    }
}

/// Assign embedded ids: UX payloads first as `u0..`, then each other
/// container's payloads as `a0..`, dense within each container
///
/// Returns false after reporting an error when the bundle has no
/// bootstrapper application payloads.
pub fn assign_embedded_ids(section: &mut IntermediateSection, messaging: &mut Messaging) -> bool {
    let mut by_container: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (arena, _, payload) in section.iter::<PayloadSymbol>() {
        if payload.packaging == PackagingType::Embedded
            && let Some(container) = &payload.container_ref
        {
            by_container.entry(container.clone()).or_default().push(arena);
        }
    }

    let ux = by_container.remove(UX_CONTAINER_ID).unwrap_or_default();
    if ux.is_empty() {
        let source_line = section
            .iter::<BootstrapperApplicationSymbol>()
            .next()
            .and_then(|(_, s, _)| s.source_line.clone());
        messaging.error(
            MessageId::MissingBootstrapperApplicationPayloads,
            source_line.as_ref(),
            "The bootstrapper application has no payloads",
        );
        return false;
    }
    number_payloads(section, &ux, "u");

    // Remaining containers in the order they were authored
    let order: Vec<String> = section
        .iter::<ContainerSymbol>()
        .filter_map(|(_, s, _)| s.id.clone())
        .chain(by_container.keys().cloned())
        .collect();
    for container in order {
        if let Some(payloads) = by_container.remove(&container) {
            number_payloads(section, &payloads, "a");
        }
    }
    true
}

fn number_payloads(section: &mut IntermediateSection, payloads: &[usize], prefix: &str) {
    // Ids assigned earlier are kept; numbering stays dense over the rest
    let mut n = 0;
    for &arena in payloads {
        if let Some(payload) = section.get_mut::<PayloadSymbol>(arena)
            && payload.embedded_id.is_none()
        {
            payload.embedded_id = Some(format!("{prefix}{n}"));
            n += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{SectionType, SourceLineNumber};
    use tempfile::TempDir;

    fn payload(section: &mut IntermediateSection, id: &str, container: Option<&str>) -> usize {
        section.add(
            Some(id),
            None,
            PayloadSymbol {
                name: format!("{id}.bin"),
                packaging: PackagingType::Embedded,
                container_ref: container.map(str::to_string),
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_process_hashes_and_packaging() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("setup.exe"), b"MZ").unwrap();

        let mut section = IntermediateSection::new("b", SectionType::Bundle);
        let local = section.add(
            Some("Setup"),
            None,
            PayloadSymbol {
                name: "setup.exe".into(),
                source_file: Some("setup.exe".into()),
                ..Default::default()
            },
        );
        let missing = section.add(
            Some("Gone"),
            None,
            PayloadSymbol {
                name: "gone.exe".into(),
                source_file: Some("gone.exe".into()),
                compressed: Some(false),
                ..Default::default()
            },
        );
        let remote = section.add(
            Some("Remote"),
            None,
            PayloadSymbol {
                name: "redist.exe".into(),
                download_url: Some("https://example.com/redist.exe".into()),
                file_size: Some(10),
                hash: Some("AB".repeat(64)),
                ..Default::default()
            },
        );

        let token = CancellationToken::new();
        let layout = BTreeSet::new();
        let mut processed = BTreeSet::new();
        let mut messaging = Messaging::new();
        let command = ProcessPayloadsCommand::new(temp.path(), true, &layout, &token);
        let count = command
            .execute(&mut section, [local, missing, remote], &mut processed, &mut messaging)
            .unwrap();
        assert_eq!(count, 3);
        assert_eq!(messaging.count(MessageId::MissingPayloadSource), 1);

        let setup = section.get::<PayloadSymbol>(local).unwrap();
        assert_eq!(setup.file_size, Some(2));
        assert_eq!(setup.hash.as_ref().unwrap().len(), 128);
        assert_eq!(setup.packaging, PackagingType::Embedded);
        assert_eq!(section.get::<PayloadSymbol>(missing).unwrap().packaging, PackagingType::External);
        assert_eq!(section.get::<PayloadSymbol>(remote).unwrap().packaging, PackagingType::External);

        // Second pass skips what the first pass handled
        let again = command
            .execute(&mut section, [local], &mut processed, &mut messaging)
            .unwrap();
        assert_eq!(again, 0);
    }

    #[test]
    fn test_embedded_ids_dense_per_container_ux_first() {
        let mut section = IntermediateSection::new("b", SectionType::Bundle);
        section.add(Some("Detached"), None, ContainerSymbol {
            name: "detached.cab".into(),
            container_type: ContainerType::Detached,
            ..Default::default()
        });
        let a = payload(&mut section, "A", Some(ATTACHED_CONTAINER_ID));
        let d = payload(&mut section, "D", Some("Detached"));
        let ux1 = payload(&mut section, "Ux1", Some(UX_CONTAINER_ID));
        let b = payload(&mut section, "B", Some(ATTACHED_CONTAINER_ID));
        let ux2 = payload(&mut section, "Ux2", Some(UX_CONTAINER_ID));

        let mut messaging = Messaging::new();
        assert!(assign_embedded_ids(&mut section, &mut messaging));
        let id = |i| section.get::<PayloadSymbol>(i).unwrap().embedded_id.clone().unwrap();
        assert_eq!(id(ux1), "u0");
        assert_eq!(id(ux2), "u1");
        assert_eq!(id(a), "a0");
        assert_eq!(id(b), "a1");
        assert_eq!(id(d), "a0");
    }

    #[test]
    fn test_no_ux_payloads_is_error() {
        let mut section = IntermediateSection::new("b", SectionType::Bundle);
        payload(&mut section, "A", Some(ATTACHED_CONTAINER_ID));
        let mut messaging = Messaging::new();
        assert!(!assign_embedded_ids(&mut section, &mut messaging));
        assert_eq!(messaging.count(MessageId::MissingBootstrapperApplicationPayloads), 1);
    }

    fn container(section: &mut IntermediateSection, id: &str) {
        section.add(Some(id), None, ContainerSymbol {
            name: format!("{id}.cab"),
            container_type: ContainerType::Attached,
            ..Default::default()
        });
    }

    #[test]
    fn test_assign_containers_defaults_to_attached() {
        let mut section = IntermediateSection::new("b", SectionType::Bundle);
        container(&mut section, UX_CONTAINER_ID);
        container(&mut section, ATTACHED_CONTAINER_ID);
        let plain = payload(&mut section, "Plain", None);
        let external = section.add(Some("Ext"), None, PayloadSymbol {
            name: "ext.bin".into(),
            packaging: PackagingType::External,
            container_ref: Some("Detached".into()),
            ..Default::default()
        });
        let mut index = PayloadIndex::default();
        index
            .container_payloads
            .insert(UX_CONTAINER_ID.to_string(), vec!["Theme".to_string()]);
        let theme = section.add(Some("Theme"), None, PayloadSymbol {
            name: "theme.xml".into(),
            packaging: PackagingType::External,
            ..Default::default()
        });

        let mut messaging = Messaging::new();
        assign_containers(&mut section, &index, &mut messaging);
        assert!(!messaging.encountered_error(), "{:?}", messaging.messages());
        let container = |i| section.get::<PayloadSymbol>(i).unwrap().container_ref.clone();
        assert_eq!(container(plain).as_deref(), Some(ATTACHED_CONTAINER_ID));
        assert_eq!(container(external), None);
        assert_eq!(container(theme).as_deref(), Some(UX_CONTAINER_ID));
    }

    #[test]
    fn test_undefined_container_is_reported() {
        let mut section = IntermediateSection::new("b", SectionType::Bundle);
        container(&mut section, UX_CONTAINER_ID);
        let line = SourceLineNumber::new("bundle.wxs", 12);
        section.add(Some("Plain"), Some(line.clone()), PayloadSymbol {
            name: "plain.bin".into(),
            packaging: PackagingType::Embedded,
            ..Default::default()
        });
        payload(&mut section, "Named", Some("Missing"));
        payload(&mut section, "Ux", Some(UX_CONTAINER_ID));

        let mut messaging = Messaging::new();
        assign_containers(&mut section, &PayloadIndex::default(), &mut messaging);
        assert_eq!(messaging.count(MessageId::MissingPayloadContainer), 2);
        let first = messaging.errors().next().unwrap();
        assert_eq!(first.source_line.as_ref(), Some(&line));
        assert!(first.text.contains(ATTACHED_CONTAINER_ID));
    }

    #[test]
    fn test_existing_embedded_ids_are_kept() {
        let mut section = IntermediateSection::new("b", SectionType::Bundle);
        payload(&mut section, "Ux", Some(UX_CONTAINER_ID));
        let fixed = payload(&mut section, "Fixed", Some(ATTACHED_CONTAINER_ID));
        section.get_mut::<PayloadSymbol>(fixed).unwrap().embedded_id = Some("custom".into());
        let a = payload(&mut section, "A", Some(ATTACHED_CONTAINER_ID));
        let b = payload(&mut section, "B", Some(ATTACHED_CONTAINER_ID));

        let mut messaging = Messaging::new();
        assert!(assign_embedded_ids(&mut section, &mut messaging));
        let id = |i| section.get::<PayloadSymbol>(i).unwrap().embedded_id.clone().unwrap();
        assert_eq!(id(fixed), "custom");
        assert_eq!(id(a), "a0");
        assert_eq!(id(b), "a1");
    }
}
