// src/bundle/tags.rs

//! Software identification tags (ISO/IEC 19770-2)

use super::manifest::{Attrs, XmlDocument};
use crate::data::IntermediateSection;
use crate::data::symbols::{BundleSymbol, SoftwareTagSymbol};
use crate::error::Result;
use tracing::debug;

const SWID_NAMESPACE: &str = "http://standards.iso.org/iso/19770/-2/2015/schema.xsd";

/// Generate the tag document of every software tag symbol
pub fn generate_software_tags(section: &mut IntermediateSection) -> Result<usize> {
    let Some(bundle) = section
        .iter::<BundleSymbol>()
        .next()
        .map(|(_, _, b)| b.clone())
    else {
        return Ok(0);
    };

    let indexes = section.indexes::<SoftwareTagSymbol>();
    for &index in &indexes {
        let Some(tag) = section.get_mut::<SoftwareTagSymbol>(index) else {
            continue;
        };
        let name = tag
            .name
            .clone()
            .or_else(|| bundle.name.clone())
            .unwrap_or_default();
        if tag.filename.is_empty() {
            tag.filename = format!("{} {}.swidtag", tag.regid, name);
        }
        tag.xml = Some(tag_document(&bundle, &tag.regid, &name)?);
        debug!("Generated software tag {}", tag.filename);
    }
    Ok(indexes.len())
}

fn tag_document(bundle: &BundleSymbol, regid: &str, name: &str) -> Result<String> {
    let tag_id = bundle
        .bundle_code
        .as_deref()
        .unwrap_or(&bundle.upgrade_code)
        .trim_matches(['{', '}']);

    let mut doc = XmlDocument::new()?;
    doc.start(
        "SoftwareIdentity",
        Attrs::new()
            .set("tagId", tag_id)
            .set("name", name)
            .set("version", &bundle.version)
            .set("versionScheme", "multipartnumeric")
            .set("xmlns", SWID_NAMESPACE),
    )?;
    doc.empty(
        "Entity",
        Attrs::new()
            .set("name", bundle.manufacturer.as_deref().unwrap_or(regid))
            .set("regid", regid)
            .set("role", "softwareCreator tagCreator"),
    )?;
    doc.empty(
        "Meta",
        Attrs::new().set("persistentId", bundle.upgrade_code.trim_matches(['{', '}'])),
    )?;
    doc.end("SoftwareIdentity")?;
    doc.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SectionType;

    #[test]
    fn test_tag_document() {
        let mut section = IntermediateSection::new("b", SectionType::Bundle);
        section.add(
            None,
            None,
            BundleSymbol {
                name: Some("Sample".into()),
                version: "1.0.0.0".into(),
                manufacturer: Some("Example Corp".into()),
                upgrade_code: "{11111111-2222-3333-4444-555555555555}".into(),
                bundle_code: Some("{AAAAAAAA-BBBB-CCCC-DDDD-EEEEEEEEEEEE}".into()),
                ..Default::default()
            },
        );
        section.add(
            None,
            None,
            SoftwareTagSymbol {
                regid: "regid.2026-01.com.example".into(),
                ..Default::default()
            },
        );

        assert_eq!(generate_software_tags(&mut section).unwrap(), 1);
        let (_, _, tag) = section.iter::<SoftwareTagSymbol>().next().unwrap();
        assert_eq!(tag.filename, "regid.2026-01.com.example Sample.swidtag");
        let xml = tag.xml.as_deref().unwrap();
        assert!(xml.contains("tagId=\"AAAAAAAA-BBBB-CCCC-DDDD-EEEEEEEEEEEE\""));
        assert!(xml.contains("persistentId=\"11111111-2222-3333-4444-555555555555\""));
        assert!(xml.contains("name=\"Example Corp\""));
    }
}
