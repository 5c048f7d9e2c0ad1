// tests/transform.rs

//! Transform generation between bound databases and transform unbinding.

mod common;

use common::{product_with_files, test_options};
use tempfile::TempDir;
use wixbind::data::{FieldValue, RowOperation, TableDefinitionCollection, WindowsInstallerData};
use wixbind::msi::{Database, OpenMode};
use wixbind::{BindDatabaseCommand, BindOptions, Messaging, UnbindTransformCommand};

fn bind(data: &WindowsInstallerData, path: &std::path::Path, options: &BindOptions) -> Database {
    let mut messaging = Messaging::new();
    BindDatabaseCommand::new(data, path, options)
        .execute(&mut messaging)
        .unwrap();
    assert!(!messaging.encountered_error());
    Database::open(path, OpenMode::ReadOnly).unwrap()
}

fn set_property(data: &mut WindowsInstallerData, name: &str, value: &str) {
    let table = data.table_mut("Property").unwrap();
    let definition = table.definition.clone();
    match table.rows.iter_mut().find(|r| r.primary_key(&definition) == name) {
        Some(row) => row
            .set(&definition, 1, FieldValue::String(value.to_string()))
            .unwrap(),
        None => table
            .add_row(
                None,
                vec![
                    FieldValue::String(name.to_string()),
                    FieldValue::String(value.to_string()),
                ],
            )
            .unwrap(),
    }
}

#[test]
fn test_identical_databases_produce_no_transform() {
    let temp = TempDir::new().unwrap();
    let options = test_options(&temp);
    let data = product_with_files(3, 3);
    let reference = bind(&data, &temp.path().join("a.msi"), &options);
    let updated = bind(&data, &temp.path().join("b.msi"), &options);

    let output = temp.path().join("diff.mst");
    assert!(!updated.generate_transform(&reference, &output).unwrap());
    assert!(!output.exists());
}

#[test]
fn test_unbound_transform_marks_added_and_modified_rows() {
    let temp = TempDir::new().unwrap();
    let options = test_options(&temp);
    let original = product_with_files(3, 3);
    let mut changed = original.clone();
    set_property(&mut changed, "ProductVersion", "2.0.0");
    set_property(&mut changed, "ARPCOMMENTS", "Patched");

    let reference = bind(&original, &temp.path().join("old.msi"), &options);
    let updated = bind(&changed, &temp.path().join("new.msi"), &options);
    let mst = temp.path().join("update.mst");
    assert!(updated.generate_transform(&reference, &mst).unwrap());

    let registry = TableDefinitionCollection::builtin();
    let unbound = UnbindTransformCommand::new(&mst, &temp.path().join("export"), &registry, &options)
        .execute()
        .unwrap();

    let property = unbound.data.table("Property").unwrap();
    let added = property.find("ARPCOMMENTS").unwrap();
    assert_eq!(added.operation, RowOperation::Add);
    assert_eq!(added.value(1), &FieldValue::String("Patched".into()));

    let modified = property.find("ProductVersion").unwrap();
    assert_eq!(modified.operation, RowOperation::Modify);
    assert!(modified.fields[1].modified);
    assert_eq!(modified.value(1), &FieldValue::String("2.0.0".into()));

    // Unchanged rows are not part of the transform
    assert!(property.find("ProductCode").is_none());
    assert!(unbound.data.table("File").is_none());
}

#[test]
fn test_applied_transform_updates_reference() {
    let temp = TempDir::new().unwrap();
    let options = test_options(&temp);
    let original = product_with_files(2, 2);
    let mut changed = original.clone();
    set_property(&mut changed, "ProductVersion", "3.0.0");

    let reference = bind(&original, &temp.path().join("old.msi"), &options);
    let updated = bind(&changed, &temp.path().join("new.msi"), &options);
    let mst = temp.path().join("update.mst");
    assert!(updated.generate_transform(&reference, &mst).unwrap());
    drop(reference);

    let target = Database::open(&temp.path().join("old.msi"), OpenMode::Transact).unwrap();
    target
        .apply_transform(&mst, wixbind::msi::TransformErrorConditions::empty())
        .unwrap();
    let record = target
        .find_record("Property", &["ProductVersion".into()])
        .unwrap()
        .unwrap();
    assert_eq!(record.get(1).as_str(), Some("3.0.0"));
}
