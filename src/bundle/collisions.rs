// src/bundle/collisions.rs

//! Layout collision detection
//!
//! Runs before any container is written. Names compare case-insensitively
//! with either path separator, the way the target file system sees them.

use super::manifest::{BA_MANIFEST_NAME, BEXT_MANIFEST_NAME, BURN_MANIFEST_NAME};
use crate::data::symbols::*;
use crate::data::{IntermediateSection, SourceLineNumber};
use crate::messaging::{MessageId, Messaging};
use std::collections::BTreeMap;

fn layout_key(name: &str) -> String {
    name.replace('/', "\\").to_ascii_lowercase()
}

struct Seen<'s> {
    id: &'s str,
    hash: Option<&'s str>,
}

/// Report payload and container name collisions, returning how many
pub fn check_collisions(section: &IntermediateSection, messaging: &mut Messaging) -> usize {
    let mut collisions = 0;
    let mut report = |id: MessageId, source_line: Option<&SourceLineNumber>, text: String| {
        messaging.error(id, source_line, text);
        collisions += 1;
    };

    // Embedded payloads, per container
    let mut embedded: BTreeMap<&str, BTreeMap<String, &str>> = BTreeMap::new();
    for name in [BURN_MANIFEST_NAME, BA_MANIFEST_NAME, BEXT_MANIFEST_NAME] {
        embedded
            .entry(UX_CONTAINER_ID)
            .or_default()
            .insert(layout_key(name), name);
    }
    // External payloads and detached containers share the layout folder
    let mut external: BTreeMap<String, Seen<'_>> = BTreeMap::new();

    for (_, symbol, payload) in section.iter::<PayloadSymbol>() {
        let key = layout_key(&payload.name);
        match (payload.packaging, payload.container_ref.as_deref()) {
            (PackagingType::Embedded, Some(container)) => {
                let names = embedded.entry(container).or_default();
                if let Some(other) = names.get(&key) {
                    report(
                        MessageId::PayloadCollision,
                        symbol.source_line.as_ref(),
                        format!(
                            "Payload {} has the same name {} as {} in container {}",
                            symbol.id(),
                            payload.name,
                            other,
                            container
                        ),
                    );
                } else {
                    names.insert(key, symbol.id());
                }
            }
            (PackagingType::External, _) => match external.get(&key) {
                Some(other) if other.hash.is_some() && other.hash == payload.hash.as_deref() => {}
                Some(other) => report(
                    MessageId::ExternalPayloadCollision,
                    symbol.source_line.as_ref(),
                    format!(
                        "External payload {} has the same name {} as {} but different content",
                        symbol.id(),
                        payload.name,
                        other.id
                    ),
                ),
                None => {
                    external.insert(
                        key,
                        Seen {
                            id: symbol.id(),
                            hash: payload.hash.as_deref(),
                        },
                    );
                }
            },
            _ => {}
        }
    }

    let mut containers: BTreeMap<String, &str> = BTreeMap::new();
    for (_, symbol, container) in section.iter::<ContainerSymbol>() {
        if symbol.id() == UX_CONTAINER_ID {
            continue;
        }
        let key = layout_key(&container.name);
        if let Some(other) = containers.get(&key) {
            report(
                MessageId::ContainerCollision,
                symbol.source_line.as_ref(),
                format!(
                    "Container {} has the same name {} as container {}",
                    symbol.id(),
                    container.name,
                    other
                ),
            );
            continue;
        }
        if container.container_type == ContainerType::Detached
            && let Some(payload) = external.get(&key)
        {
            report(
                MessageId::ContainerCollision,
                symbol.source_line.as_ref(),
                format!(
                    "Detached container {} has the same name {} as external payload {}",
                    symbol.id(),
                    container.name,
                    payload.id
                ),
            );
        }
        containers.insert(key, symbol.id());
    }

    collisions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SectionType;

    fn payload(
        section: &mut IntermediateSection,
        id: &str,
        name: &str,
        packaging: PackagingType,
        container: Option<&str>,
        hash: &str,
    ) {
        section.add(
            Some(id),
            None,
            PayloadSymbol {
                name: name.into(),
                packaging,
                container_ref: container.map(str::to_string),
                hash: Some(hash.into()),
                ..Default::default()
            },
        );
    }

    #[test]
    fn test_embedded_collision_in_same_container() {
        let mut section = IntermediateSection::new("b", SectionType::Bundle);
        payload(&mut section, "A", "setup.exe", PackagingType::Embedded, Some("C"), "1");
        payload(&mut section, "B", "SETUP.EXE", PackagingType::Embedded, Some("C"), "2");
        payload(&mut section, "D", "setup.exe", PackagingType::Embedded, Some("Other"), "3");
        let mut messaging = Messaging::new();
        assert_eq!(check_collisions(&section, &mut messaging), 1);
        assert_eq!(messaging.count(MessageId::PayloadCollision), 1);
    }

    #[test]
    fn test_ux_payload_named_like_a_manifest() {
        let mut section = IntermediateSection::new("b", SectionType::Bundle);
        payload(
            &mut section,
            "Ba",
            "burn-manifest.xml",
            PackagingType::Embedded,
            Some(UX_CONTAINER_ID),
            "1",
        );
        let mut messaging = Messaging::new();
        assert_eq!(check_collisions(&section, &mut messaging), 1);
    }

    #[test]
    fn test_external_payloads_with_same_content_are_fine() {
        let mut section = IntermediateSection::new("b", SectionType::Bundle);
        payload(&mut section, "A", "redist\\vc.exe", PackagingType::External, None, "h");
        payload(&mut section, "B", "redist/vc.exe", PackagingType::External, None, "h");
        let mut messaging = Messaging::new();
        assert_eq!(check_collisions(&section, &mut messaging), 0);

        payload(&mut section, "C", "redist/vc.exe", PackagingType::External, None, "x");
        assert_eq!(check_collisions(&section, &mut messaging), 1);
        assert_eq!(messaging.count(MessageId::ExternalPayloadCollision), 1);
    }

    #[test]
    fn test_detached_container_collides_with_external_payload() {
        let mut section = IntermediateSection::new("b", SectionType::Bundle);
        payload(&mut section, "A", "extra.cab", PackagingType::External, None, "h");
        section.add(
            Some("Extra"),
            None,
            ContainerSymbol {
                name: "extra.cab".into(),
                container_type: ContainerType::Detached,
                ..Default::default()
            },
        );
        let mut messaging = Messaging::new();
        assert_eq!(check_collisions(&section, &mut messaging), 1);
        assert_eq!(messaging.count(MessageId::ContainerCollision), 1);
    }
}
