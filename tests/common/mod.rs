// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::Path;
use tempfile::TempDir;
use wixbind::BindOptions;
use wixbind::data::symbols::*;
use wixbind::data::{
    FieldValue, IntermediateSection, SectionType, SourceLineNumber, TableDefinitionCollection,
    WindowsInstallerData,
};
use wixbind::msi::RetryPolicy;

/// Options writing scratch files under the temp dir
pub fn test_options(temp: &TempDir) -> BindOptions {
    BindOptions {
        intermediate_folder: temp.path().join("obj"),
        thread_count: 2,
        commit_retry: RetryPolicy::immediate(),
        ..BindOptions::default()
    }
}

fn s(value: &str) -> FieldValue {
    FieldValue::String(value.to_string())
}

/// Product with `file_count` files split over two media: disk 1 holds
/// sequences up to `split`, disk 2 the rest.
pub fn product_with_files(file_count: i32, split: i32) -> WindowsInstallerData {
    let registry = TableDefinitionCollection::builtin();
    let mut data = WindowsInstallerData::default();

    let property = data.ensure_table(registry.get("Property").unwrap());
    property
        .add_row(
            Some(SourceLineNumber::new("product.wxs", 2)),
            vec![s("ProductCode"), s("{8F1E2D3C-4B5A-6978-8A9B-0C1D2E3F4A5B}")],
        )
        .unwrap();
    property
        .add_row(None, vec![s("ProductVersion"), s("1.0.0")])
        .unwrap();

    let directory = data.ensure_table(registry.get("Directory").unwrap());
    directory
        .add_row(None, vec![s("TARGETDIR"), FieldValue::Null, s("SourceDir")])
        .unwrap();
    directory
        .add_row(None, vec![s("INSTALLFOLDER"), s("TARGETDIR"), s("App")])
        .unwrap();

    data.ensure_table(registry.get("Component").unwrap())
        .add_row(
            None,
            vec![
                s("MainComponent"),
                s("{11111111-2222-3333-4444-555555555555}"),
                s("INSTALLFOLDER"),
                FieldValue::Number(0),
                FieldValue::Null,
                FieldValue::Null,
            ],
        )
        .unwrap();

    let file = data.ensure_table(registry.get("File").unwrap());
    for n in 1..=file_count {
        file.add_row(
            None,
            vec![
                s(&format!("File{n}")),
                s("MainComponent"),
                s(&format!("file{n}.txt")),
                FieldValue::Number(10),
                FieldValue::Null,
                FieldValue::Null,
                FieldValue::Number(0),
                FieldValue::Number(n),
            ],
        )
        .unwrap();
    }

    let media = data.ensure_table(registry.get("Media").unwrap());
    for (disk, last) in [(1, split), (2, file_count)] {
        media
            .add_row(
                None,
                vec![
                    FieldValue::Number(disk),
                    FieldValue::Number(last),
                    FieldValue::Null,
                    FieldValue::Null,
                    FieldValue::Null,
                    FieldValue::Null,
                ],
            )
            .unwrap();
    }
    data
}

pub fn group(
    section: &mut IntermediateSection,
    parent_type: ComplexReferenceType,
    parent_id: &str,
    child_type: ComplexReferenceType,
    child_id: &str,
) {
    section.add(
        None,
        None,
        GroupSymbol {
            parent_type,
            parent_id: parent_id.to_string(),
            child_type,
            child_id: child_id.to_string(),
        },
    );
}

/// A bundle with one bootstrapper application payload and no packages yet
pub fn bundle_section(temp: &TempDir) -> IntermediateSection {
    let ba = temp.path().join("ba.dll");
    fs::write(&ba, b"bootstrapper application").unwrap();

    let mut section = IntermediateSection::new("Bundle", SectionType::Bundle);
    section.add(
        None,
        Some(SourceLineNumber::new("bundle.wxs", 1)),
        BundleSymbol {
            name: Some("Sample Bundle".into()),
            manufacturer: Some("Example Corp".into()),
            version: "v1.0.0.0".into(),
            upgrade_code: "11111111-2222-3333-4444-555555555555".into(),
            ..Default::default()
        },
    );
    section.add(None, None, ChainSymbol::default());
    section.add(None, None, BootstrapperApplicationSymbol::default());
    section.add(Some(UX_CONTAINER_ID), None, ContainerSymbol::default());
    section.add(
        Some(ATTACHED_CONTAINER_ID),
        None,
        ContainerSymbol {
            name: "attached".into(),
            ..Default::default()
        },
    );
    section.add(
        Some("BaPayload"),
        None,
        PayloadSymbol {
            name: "ba.dll".into(),
            source_file: Some(ba.to_string_lossy().into_owned()),
            ..Default::default()
        },
    );
    group(
        &mut section,
        ComplexReferenceType::Container,
        UX_CONTAINER_ID,
        ComplexReferenceType::Payload,
        "BaPayload",
    );
    section
}

/// Add an EXE package whose payload holds `content`, chained in order
pub fn add_exe_package(
    section: &mut IntermediateSection,
    folder: &Path,
    id: &str,
    content: &[u8],
    per_machine: YesNoDefault,
    line: u32,
) {
    let file_name = format!("{}.exe", id.to_lowercase());
    let path = folder.join(&file_name);
    fs::write(&path, content).unwrap();
    let payload_id = format!("{id}Payload");

    section.add(
        Some(&payload_id),
        None,
        PayloadSymbol {
            name: file_name,
            source_file: Some(path.to_string_lossy().into_owned()),
            ..Default::default()
        },
    );
    section.add(
        Some(id),
        Some(SourceLineNumber::new("bundle.wxs", line)),
        PackageSymbol {
            package_type: PackageType::Exe,
            payload_ref: payload_id.clone(),
            per_machine,
            ..Default::default()
        },
    );
    section.add(
        Some(id),
        None,
        ExePackageSymbol {
            detect_condition: Some(format!("{id}Installed")),
            uninstall_command: Some("/uninstall".into()),
            ..Default::default()
        },
    );
    group(
        section,
        ComplexReferenceType::Package,
        id,
        ComplexReferenceType::Payload,
        &payload_id,
    );
    group(
        section,
        ComplexReferenceType::PackageGroup,
        CHAIN_GROUP_ID,
        ComplexReferenceType::Package,
        id,
    );
}

/// Chain an MSI package whose payload is the database at `msi`
pub fn add_msi_package(section: &mut IntermediateSection, id: &str, msi: &Path, line: u32) {
    let payload_id = format!("{id}Payload");
    section.add(
        Some(&payload_id),
        None,
        PayloadSymbol {
            name: msi
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            source_file: Some(msi.to_string_lossy().into_owned()),
            ..Default::default()
        },
    );
    section.add(
        Some(id),
        Some(SourceLineNumber::new("bundle.wxs", line)),
        PackageSymbol {
            package_type: PackageType::Msi,
            payload_ref: payload_id.clone(),
            ..Default::default()
        },
    );
    section.add(Some(id), None, MsiPackageSymbol::default());
    group(
        section,
        ComplexReferenceType::Package,
        id,
        ComplexReferenceType::Payload,
        &payload_id,
    );
    group(
        section,
        ComplexReferenceType::PackageGroup,
        CHAIN_GROUP_ID,
        ComplexReferenceType::Package,
        id,
    );
}
