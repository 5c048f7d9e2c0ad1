// tests/bundle_bind.rs

//! End-to-end bundle binding tests.

mod common;

use common::{add_exe_package, add_msi_package, bundle_section, product_with_files, test_options};
use tempfile::TempDir;
use wixbind::bundle::burn::BurnSection;
use wixbind::bundle::manifest::read_registration;
use wixbind::bundle::wixout::read_wixout;
use wixbind::cabinet;
use wixbind::data::symbols::*;
use wixbind::{
    BindBundleCommand, BindDatabaseCommand, BindOutputs, CancellationToken, Error, MessageId,
    Messaging, TrackedFileType,
};

#[test]
fn test_bind_bundle_end_to_end() {
    let temp = TempDir::new().unwrap();
    let options = test_options(&temp);
    let mut section = bundle_section(&temp);
    add_exe_package(&mut section, temp.path(), "First", b"first package", YesNoDefault::Default, 10);
    add_exe_package(&mut section, temp.path(), "Second", b"second package", YesNoDefault::Default, 20);

    let output = temp.path().join("out").join("bundle.exe");
    let mut outputs = BindOutputs::new();
    let mut messaging = Messaging::new();
    let bundle = BindBundleCommand::new(&output, &options)
        .with_base_folder(temp.path())
        .execute(&mut section, &mut outputs, &mut messaging)
        .unwrap()
        .expect("bind should succeed");

    assert!(!messaging.encountered_error(), "{:?}", messaging.messages());
    assert!(bundle.per_machine);
    assert_eq!(bundle.chain.packages, vec!["First", "Second"]);
    assert!(output.exists());
    assert!(bundle.wixout_path.exists());

    // UX container first, then the attached container
    let burn = BurnSection::read(&output).unwrap();
    assert_eq!(burn, bundle.burn_section);
    assert_eq!(burn.container_sizes.len(), 2);

    let ux_path = temp.path().join("ux.container");
    std::fs::write(&ux_path, burn.read_container(&output, 0).unwrap()).unwrap();
    let ux_entries: Vec<String> = cabinet::list_cabinet(&ux_path)
        .unwrap()
        .into_iter()
        .map(|(name, _)| name)
        .collect();
    assert_eq!(
        ux_entries,
        vec!["burn-manifest.xml", "ba-manifest.xml", "bext-manifest.xml", "u0"]
    );

    let wixout = read_wixout(&bundle.wixout_path).unwrap();
    let registration = read_registration(&wixout.streams["burn-manifest.xml"]).unwrap();
    assert_eq!(registration.version.as_deref(), Some("1.0.0.0"));
    assert!(registration.per_machine);
    assert_eq!(registration.code.as_deref(), Some(burn.bundle_code.as_str()));

    let (_, _, bundle_symbol) = wixout.intermediate.sections[0]
        .iter::<BundleSymbol>()
        .next()
        .unwrap();
    assert_eq!(bundle_symbol.upgrade_code, "{11111111-2222-3333-4444-555555555555}");

    assert_eq!(outputs.tracked(TrackedFileType::BuiltTargetOutput).count(), 2);
    assert!(outputs.tracked(TrackedFileType::Temporary).count() >= 4);
}

#[test]
fn test_embedded_ids_ux_first_and_attached_index() {
    let temp = TempDir::new().unwrap();
    let options = test_options(&temp);
    let mut section = bundle_section(&temp);
    add_exe_package(&mut section, temp.path(), "First", b"one", YesNoDefault::Default, 10);
    add_exe_package(&mut section, temp.path(), "Second", b"two", YesNoDefault::Default, 20);

    let output = temp.path().join("bundle.exe");
    let mut outputs = BindOutputs::new();
    let mut messaging = Messaging::new();
    BindBundleCommand::new(&output, &options)
        .execute(&mut section, &mut outputs, &mut messaging)
        .unwrap()
        .unwrap();

    let (_, ba) = section.find::<PayloadSymbol>("BaPayload").unwrap();
    assert_eq!(ba.embedded_id.as_deref(), Some("u0"));
    let (_, first) = section.find::<PayloadSymbol>("FirstPayload").unwrap();
    let (_, second) = section.find::<PayloadSymbol>("SecondPayload").unwrap();
    assert_eq!(first.embedded_id.as_deref(), Some("a0"));
    assert_eq!(second.embedded_id.as_deref(), Some("a1"));

    let (_, attached) = section.find::<ContainerSymbol>(ATTACHED_CONTAINER_ID).unwrap();
    assert_eq!(attached.attached_container_index, Some(1));
    assert!(attached.hash.is_some());
    let (_, ux) = section.find::<ContainerSymbol>(UX_CONTAINER_ID).unwrap();
    assert_eq!(ux.attached_container_index, Some(0));
}

#[test]
fn test_duplicate_cache_ids_stop_the_bind() {
    let temp = TempDir::new().unwrap();
    let options = test_options(&temp);
    let mut section = bundle_section(&temp);
    // Identical content gives identical hash-based cache ids
    for (n, id) in ["A", "B", "C"].iter().enumerate() {
        add_exe_package(&mut section, temp.path(), id, b"same bytes", YesNoDefault::Default, n as u32 + 10);
    }

    let output = temp.path().join("bundle.exe");
    let mut outputs = BindOutputs::new();
    let mut messaging = Messaging::new();
    let result = BindBundleCommand::new(&output, &options)
        .execute(&mut section, &mut outputs, &mut messaging)
        .unwrap();

    assert!(result.is_none());
    assert_eq!(messaging.count(MessageId::DuplicateCacheIds), 2);
    assert_eq!(messaging.count(MessageId::DuplicateCacheIdsLocation), 2);
    assert!(!output.exists());
}

#[test]
fn test_per_user_package_makes_bundle_per_user() {
    let temp = TempDir::new().unwrap();
    let options = test_options(&temp);
    let mut section = bundle_section(&temp);
    add_exe_package(&mut section, temp.path(), "User", b"user", YesNoDefault::No, 10);
    add_exe_package(&mut section, temp.path(), "Inherit", b"inherit", YesNoDefault::Default, 20);

    let output = temp.path().join("bundle.exe");
    let mut outputs = BindOutputs::new();
    let mut messaging = Messaging::new();
    let bundle = BindBundleCommand::new(&output, &options)
        .execute(&mut section, &mut outputs, &mut messaging)
        .unwrap()
        .unwrap();

    assert!(!bundle.per_machine);
    let (_, inherit) = section.find::<PackageSymbol>("Inherit").unwrap();
    assert_eq!(inherit.per_machine, YesNoDefault::No);
}

#[test]
fn test_missing_chain_is_reported_before_any_output() {
    let temp = TempDir::new().unwrap();
    let options = test_options(&temp);
    let mut section = bundle_section(&temp);
    add_exe_package(&mut section, temp.path(), "Only", b"only", YesNoDefault::Default, 10);
    section.symbols.retain(|s| s.kind_name() != "Chain");

    let mut outputs = BindOutputs::new();
    let mut messaging = Messaging::new();
    let result = BindBundleCommand::new(&temp.path().join("bundle.exe"), &options)
        .execute(&mut section, &mut outputs, &mut messaging)
        .unwrap();

    assert!(result.is_none());
    assert_eq!(messaging.count(MessageId::MissingBundleInformation), 1);
    assert!(outputs.tracked_files.is_empty());
}

#[test]
fn test_cancelled_bind_returns_error() {
    let temp = TempDir::new().unwrap();
    let options = test_options(&temp);
    let mut section = bundle_section(&temp);
    add_exe_package(&mut section, temp.path(), "Only", b"only", YesNoDefault::Default, 10);

    let token = CancellationToken::new();
    token.cancel();
    let mut outputs = BindOutputs::new();
    let mut messaging = Messaging::new();
    let result = BindBundleCommand::new(&temp.path().join("bundle.exe"), &options)
        .with_cancellation(token)
        .execute(&mut section, &mut outputs, &mut messaging);

    assert!(matches!(result, Err(Error::Cancelled)));
}

#[test]
fn test_missing_attached_container_is_reported() {
    let temp = TempDir::new().unwrap();
    let options = test_options(&temp);
    let mut section = bundle_section(&temp);
    add_exe_package(&mut section, temp.path(), "Only", b"only", YesNoDefault::Default, 10);
    section.symbols.retain(|s| {
        !(s.kind_name() == "Container" && s.id.as_deref() == Some(ATTACHED_CONTAINER_ID))
    });

    let output = temp.path().join("bundle.exe");
    let mut outputs = BindOutputs::new();
    let mut messaging = Messaging::new();
    let result = BindBundleCommand::new(&output, &options)
        .execute(&mut section, &mut outputs, &mut messaging)
        .unwrap();

    assert!(result.is_none());
    assert_eq!(messaging.count(MessageId::MissingPayloadContainer), 1);
    assert!(!output.exists());
}

#[test]
fn test_uncompressed_msi_package_is_inspected() {
    let temp = TempDir::new().unwrap();
    let options = test_options(&temp);

    // One File row, no cabinets: the file ships loose next to the database
    let msi_folder = temp.path().join("msi");
    let msi = msi_folder.join("product.msi");
    std::fs::create_dir_all(msi_folder.join("App")).unwrap();
    std::fs::write(msi_folder.join("App").join("file1.txt"), b"loose file").unwrap();
    let mut messaging = Messaging::new();
    BindDatabaseCommand::new(&product_with_files(1, 1), &msi, &options)
        .execute(&mut messaging)
        .unwrap();
    assert!(!messaging.encountered_error(), "{:?}", messaging.messages());

    let mut section = bundle_section(&temp);
    add_msi_package(&mut section, "Product", &msi, 10);
    let mut outputs = BindOutputs::new();
    let mut messaging = Messaging::new();
    BindBundleCommand::new(&temp.path().join("bundle.exe"), &options)
        .execute(&mut section, &mut outputs, &mut messaging)
        .unwrap()
        .expect("bind should succeed");
    assert!(!messaging.encountered_error(), "{:?}", messaging.messages());

    let (_, _, loose) = section
        .iter::<PayloadSymbol>()
        .find(|(_, _, p)| p.name == "App\\file1.txt")
        .expect("loose file payload");
    assert_eq!(loose.file_size, Some(10));

    let msi_size = std::fs::metadata(&msi).unwrap().len();
    let (_, package) = section.find::<PackageSymbol>("Product").unwrap();
    assert_eq!(package.size, msi_size + 10);
    assert_eq!(package.version.as_deref(), Some("1.0.0"));

    let (_, product) = section.find::<MsiPackageSymbol>("Product").unwrap();
    assert!(!product.compressed);
    let code = "{8F1E2D3C-4B5A-6978-8A9B-0C1D2E3F4A5B}";
    assert_eq!(product.product_code.as_deref(), Some(code));

    let keys: Vec<&str> = section
        .iter::<DependencyProviderSymbol>()
        .filter(|(_, _, p)| p.parent_ref.as_deref() == Some("Product"))
        .filter_map(|(_, _, p)| p.provider_key.as_deref())
        .collect();
    assert_eq!(keys, vec![format!("{code}_v1.0.0").as_str()]);
}
