// src/bundle/manifest.rs

//! Bundle manifests
//!
//! Three XML documents travel in the UX container:
//! - `burn-manifest.xml`: everything the engine needs to run the chain
//! - `ba-manifest.xml`: display data for the bootstrapper application
//! - `bext-manifest.xml`: per-extension search data
//!
//! [`read_registration`] reads back the identity block of a burn manifest,
//! which is how a bundle chained as a package is inspected.

use super::extension::BurnExtensions;
use super::facade::{PackageFacade, PackageFacades, PayloadIndex};
use super::ordering::ChainOrder;
use super::searches::OrderedSearches;
use crate::data::IntermediateSection;
use crate::data::symbols::*;
use crate::error::{Error, Result};
use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::attributes::AttrError;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use thiserror::Error as ThisError;

pub const BURN_MANIFEST_NAME: &str = "burn-manifest.xml";
pub const BA_MANIFEST_NAME: &str = "ba-manifest.xml";
pub const BEXT_MANIFEST_NAME: &str = "bext-manifest.xml";

const BURN_NAMESPACE: &str = "http://wixtoolset.org/schemas/v4/2008/Burn";
const BA_NAMESPACE: &str = "http://wixtoolset.org/schemas/v4/BootstrapperApplicationData";
const BEXT_NAMESPACE: &str = "http://wixtoolset.org/schemas/v4/BundleExtensionData";
const PROTOCOL_VERSION: u32 = 1;

/// Ordered attribute list of one element
#[derive(Debug, Default)]
pub(crate) struct Attrs(Vec<(&'static str, String)>);

impl Attrs {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set(mut self, key: &'static str, value: impl ToString) -> Self {
        self.0.push((key, value.to_string()));
        self
    }

    pub(crate) fn opt(self, key: &'static str, value: Option<impl ToString>) -> Self {
        match value {
            Some(value) => self.set(key, value),
            None => self,
        }
    }

    pub(crate) fn flag(self, key: &'static str, value: bool) -> Self {
        self.set(key, if value { "yes" } else { "no" })
    }

    fn start(&self, name: &str) -> BytesStart<'static> {
        let mut start = BytesStart::new(name.to_string());
        for (key, value) in &self.0 {
            start.push_attribute((*key, value.as_str()));
        }
        start
    }
}

/// Indented UTF-8 XML document under construction
pub(crate) struct XmlDocument {
    writer: Writer<Vec<u8>>,
}

impl XmlDocument {
    pub(crate) fn new() -> Result<Self> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
        Ok(Self { writer })
    }

    pub(crate) fn start(&mut self, name: &str, attrs: Attrs) -> Result<()> {
        self.writer.write_event(Event::Start(attrs.start(name)))?;
        Ok(())
    }

    pub(crate) fn end(&mut self, name: &str) -> Result<()> {
        self.writer.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }

    pub(crate) fn empty(&mut self, name: &str, attrs: Attrs) -> Result<()> {
        self.writer.write_event(Event::Empty(attrs.start(name)))?;
        Ok(())
    }

    pub(crate) fn text(&mut self, name: &str, attrs: Attrs, text: &str) -> Result<()> {
        self.writer.write_event(Event::Start(attrs.start(name)))?;
        self.writer.write_event(Event::Text(BytesText::new(text)))?;
        self.end(name)
    }

    pub(crate) fn finish(self) -> Result<String> {
        String::from_utf8(self.writer.into_inner())
            .map_err(|e| Error::SerializationError(format!("XML is not UTF-8: {e}")))
    }
}

/// Everything the manifest writers read
pub struct ManifestInputs<'a> {
    pub section: &'a IntermediateSection,
    pub facades: &'a PackageFacades,
    pub index: &'a PayloadIndex,
    pub chain: &'a ChainOrder,
    pub searches: &'a OrderedSearches,
    pub extensions: &'a BurnExtensions,
}

impl ManifestInputs<'_> {
    fn bundle(&self) -> Result<&BundleSymbol> {
        self.section
            .iter::<BundleSymbol>()
            .next()
            .map(|(_, _, b)| b)
            .ok_or_else(|| Error::Toolchain("Section has no Bundle symbol".to_string()))
    }

    fn chain_facades(&self) -> impl Iterator<Item = &PackageFacade> {
        self.chain
            .packages
            .iter()
            .filter_map(|id| self.facades.get(id))
    }
}

/// Build `burn-manifest.xml`
pub fn create_burn_manifest(inputs: &ManifestInputs<'_>) -> Result<String> {
    let section = inputs.section;
    let bundle = inputs.bundle()?;
    let mut doc = XmlDocument::new()?;

    doc.start(
        "BurnManifest",
        Attrs::new()
            .set("xmlns", BURN_NAMESPACE)
            .set("EngineVersion", env!("CARGO_PKG_VERSION"))
            .set("ProtocolVersion", PROTOCOL_VERSION)
            .flag("PerMachine", bundle.per_machine),
    )?;

    if bundle.log_prefix.is_some() || bundle.log_path_variable.is_some() {
        doc.empty(
            "Log",
            Attrs::new()
                .opt("PathVariable", bundle.log_path_variable.as_deref())
                .opt("Prefix", bundle.log_prefix.as_deref())
                .opt("Extension", bundle.log_extension.as_deref()),
        )?;
    }

    if !bundle.upgrade_code.is_empty() {
        doc.empty(
            "RelatedBundle",
            Attrs::new()
                .set("Code", &bundle.upgrade_code)
                .set("Action", RelatedBundleAction::Upgrade.as_str()),
        )?;
    }
    for (_, _, related) in section.iter::<RelatedBundleSymbol>() {
        doc.empty(
            "RelatedBundle",
            Attrs::new()
                .set("Code", &related.bundle_code)
                .set("Action", related.action.as_str()),
        )?;
    }

    for (_, symbol, variable) in section.iter::<VariableSymbol>() {
        doc.empty(
            "Variable",
            Attrs::new()
                .set("Id", symbol.id())
                .opt("Value", variable.value.as_deref())
                .opt(
                    "Type",
                    variable.value.as_ref().map(|_| variable.value_type.as_str()),
                )
                .flag("Hidden", variable.hidden)
                .flag("Persisted", variable.persisted),
        )?;
    }

    for &index in &inputs.searches.order {
        let symbol = section.symbol(index);
        if let Some(search) = section.get::<SearchSymbol>(index) {
            doc.empty(search.kind.element_name(), search_attrs(symbol.id(), search))?;
        }
    }

    doc.start("UX", Attrs::new())?;
    for (_, symbol, payload) in section.iter::<PayloadSymbol>() {
        if payload.container_ref.as_deref() == Some(UX_CONTAINER_ID) {
            doc.empty("Payload", payload_attrs(symbol.id(), payload))?;
        }
    }
    doc.end("UX")?;

    for (_, symbol, container) in section.iter::<ContainerSymbol>() {
        if symbol.id() == UX_CONTAINER_ID || container.hash.is_none() {
            continue;
        }
        let attached = container.container_type == ContainerType::Attached;
        doc.empty(
            "Container",
            Attrs::new()
                .set("Id", symbol.id())
                .opt("FileSize", container.size)
                .opt("Hash", container.hash.as_deref())
                .set("FilePath", &container.name)
                .flag("Attached", attached)
                .opt(
                    "AttachedIndex",
                    container.attached_container_index.filter(|_| attached),
                )
                .opt("DownloadUrl", container.download_url.as_deref()),
        )?;
    }

    for (_, symbol, payload) in section.iter::<PayloadSymbol>() {
        if payload.container_ref.as_deref() != Some(UX_CONTAINER_ID) {
            doc.empty("Payload", payload_attrs(symbol.id(), payload))?;
        }
    }

    for id in &inputs.chain.boundaries {
        if let Some((_, boundary)) = section.find::<RollbackBoundarySymbol>(id) {
            doc.empty(
                "RollbackBoundary",
                Attrs::new()
                    .set("Id", id)
                    .flag("Vital", boundary.vital)
                    .flag("Transaction", boundary.transaction)
                    .opt("LogPathVariable", boundary.log_path_variable.as_deref()),
            )?;
        }
    }

    write_registration(&mut doc, section, bundle)?;
    write_chain(&mut doc, inputs)?;

    doc.end("BurnManifest")?;
    doc.finish()
}

fn search_attrs(id: &str, search: &SearchSymbol) -> Attrs {
    let attrs = Attrs::new()
        .set("Id", id)
        .opt("Variable", search.variable.as_deref())
        .opt("Condition", search.condition.as_deref());
    match &search.kind {
        SearchKind::File { path, result } => attrs.set("Path", path).set("Type", result),
        SearchKind::Registry {
            root,
            key,
            value,
            result,
            win64,
            expand,
        } => attrs
            .set("Root", root)
            .set("Key", key)
            .opt("Value", value.as_deref())
            .set("Type", result)
            .flag("Win64", *win64)
            .flag("ExpandEnvironment", *expand),
        SearchKind::MsiComponent {
            component_id,
            product_code,
            result,
        } => attrs
            .set("ComponentId", component_id)
            .opt("ProductCode", product_code.as_deref())
            .set("Type", result),
        SearchKind::MsiProduct {
            guid,
            guid_type,
            result,
        } => {
            let key = match guid_type.as_str() {
                "UpgradeCode" => "UpgradeCode",
                _ => "ProductCode",
            };
            attrs.set(key, guid).set("Type", result)
        }
        SearchKind::SetVariable { value, value_type } => attrs
            .opt("Value", value.as_deref())
            .opt("Type", value_type.as_deref()),
        SearchKind::Extension { extension_id, .. } => attrs.set("ExtensionId", extension_id),
    }
}

fn payload_attrs(id: &str, payload: &PayloadSymbol) -> Attrs {
    let source_path = payload.embedded_id.as_deref().unwrap_or(&payload.name);
    Attrs::new()
        .set("Id", id)
        .set("FilePath", &payload.name)
        .opt("FileSize", payload.file_size)
        .opt("Hash", payload.hash.as_deref())
        .set("Packaging", payload.packaging.as_str())
        .set("SourcePath", source_path)
        .opt("Container", payload.container_ref.as_deref())
        .opt("DownloadUrl", payload.download_url.as_deref())
        .opt("LayoutOnly", payload.layout_only.then_some("yes"))
}

fn write_registration(
    doc: &mut XmlDocument,
    section: &IntermediateSection,
    bundle: &BundleSymbol,
) -> Result<()> {
    doc.start(
        "Registration",
        Attrs::new()
            .opt("Code", bundle.bundle_code.as_deref())
            .opt("ExecutableName", bundle.executable_name.as_deref())
            .flag("PerMachine", bundle.per_machine)
            .opt("Tag", bundle.tag.as_deref())
            .set("Version", &bundle.version)
            .opt("ProviderKey", bundle.provider_key.as_deref()),
    )?;
    doc.empty(
        "Arp",
        Attrs::new()
            .opt("DisplayName", bundle.name.as_deref())
            .set("DisplayVersion", &bundle.version)
            .opt("Publisher", bundle.manufacturer.as_deref())
            .opt("HelpLink", bundle.help_url.as_deref())
            .opt("HelpTelephone", bundle.help_telephone.as_deref())
            .opt("AboutUrl", bundle.about_url.as_deref())
            .opt("UpdateUrl", bundle.update_url.as_deref())
            .opt("ParentDisplayName", bundle.parent_name.as_deref())
            .opt("InProgressDisplayName", bundle.in_progress_name.as_deref())
            .opt("DisableModify", bundle.disable_modify.then_some("yes"))
            .opt("DisableRemove", bundle.disable_remove.then_some("yes")),
    )?;
    for (_, _, tag) in section.iter::<SoftwareTagSymbol>() {
        let attrs = Attrs::new()
            .set("Filename", &tag.filename)
            .set("Regid", &tag.regid)
            .opt("Path", tag.install_path.as_deref());
        match &tag.xml {
            Some(xml) => doc.text("SoftwareTag", attrs, xml)?,
            None => doc.empty("SoftwareTag", attrs)?,
        }
    }
    doc.end("Registration")
}

fn write_chain(doc: &mut XmlDocument, inputs: &ManifestInputs<'_>) -> Result<()> {
    let section = inputs.section;
    let chain = section
        .iter::<ChainSymbol>()
        .next()
        .map(|(_, _, c)| c.clone())
        .unwrap_or_default();

    doc.start(
        "Chain",
        Attrs::new()
            .opt("DisableRollback", chain.disable_rollback.then_some("yes"))
            .opt("DisableSystemRestore", chain.disable_system_restore.then_some("yes"))
            .opt("ParallelCache", chain.parallel_cache.then_some("yes")),
    )?;

    for facade in inputs.chain_facades() {
        let package = facade.package(section)?;
        let element = format!("{}Package", facade.package_type);
        let attrs = Attrs::new()
            .set("Id", &facade.id)
            .set("Cache", package.cache.as_str())
            .opt("CacheId", package.cache_id.as_deref())
            .set("InstallSize", package.install_size.unwrap_or(package.size))
            .set("Size", package.size)
            .flag("PerMachine", package.per_machine.is_yes())
            .flag("Permanent", package.permanent)
            .flag("Vital", package.vital)
            .opt("RollbackBoundaryForward", package.rollback_boundary_ref.as_deref())
            .opt(
                "RollbackBoundaryBackward",
                package.rollback_boundary_backward_ref.as_deref(),
            )
            .opt("LogPathVariable", package.log_path_variable.as_deref())
            .opt("RollbackLogPathVariable", package.rollback_log_path_variable.as_deref())
            .opt("InstallCondition", package.install_condition.as_deref())
            .opt("RepairCondition", package.repair_condition.as_deref())
            .flag("Win64", package.win64);
        let attrs = package_type_attrs(facade, section, attrs)?;

        doc.start(&element, attrs)?;
        write_package_children(doc, inputs, facade)?;
        doc.end(&element)?;
    }

    doc.end("Chain")
}

fn package_type_attrs(
    facade: &PackageFacade,
    section: &IntermediateSection,
    attrs: Attrs,
) -> Result<Attrs> {
    let attrs = match facade.package_type {
        PackageType::Msi => {
            let msi = facade.specific::<MsiPackageSymbol>(section)?;
            attrs
                .opt("ProductCode", msi.product_code.as_deref())
                .opt("Language", msi.product_language)
                .opt("Version", msi.product_version.as_deref())
                .opt("UpgradeCode", msi.upgrade_code.as_deref())
                .flag("DisplayInternalUI", msi.display_internal_ui)
        }
        PackageType::Msp => {
            let msp = facade.specific::<MspPackageSymbol>(section)?;
            attrs
                .opt("PatchCode", msp.patch_code.as_deref())
                .flag("DisplayInternalUI", msp.display_internal_ui)
        }
        PackageType::Exe => {
            let exe = facade.specific::<ExePackageSymbol>(section)?;
            let detection = match exe.detection_type {
                ExeDetectionType::None => "none",
                ExeDetectionType::Condition => "condition",
                ExeDetectionType::Arp => "arp",
            };
            attrs
                .set("DetectionType", detection)
                .opt("DetectCondition", exe.detect_condition.as_deref())
                .opt("InstallArguments", exe.install_command.as_deref())
                .opt("RepairArguments", exe.repair_command.as_deref())
                .opt("UninstallArguments", exe.uninstall_command.as_deref())
                .flag("Repairable", exe.repairable)
                .opt("Protocol", exe.protocol.as_deref())
                .opt("ArpId", exe.arp_id.as_deref())
                .opt("ArpDisplayVersion", exe.arp_display_version.as_deref())
                .opt("ArpWin64", exe.arp_win64.then_some("yes"))
        }
        PackageType::Msu => {
            let msu = facade.specific::<MsuPackageSymbol>(section)?;
            attrs
                .opt("DetectCondition", msu.detect_condition.as_deref())
                .opt("KB", msu.msu_kb.as_deref())
        }
        PackageType::Bundle => {
            let bundle = facade.specific::<BundlePackageSymbol>(section)?;
            attrs
                .opt("BundleCode", bundle.bundle_code.as_deref())
                .opt("Version", bundle.version.as_deref())
                .opt("InstallArguments", bundle.install_command.as_deref())
                .opt("RepairArguments", bundle.repair_command.as_deref())
                .opt("UninstallArguments", bundle.uninstall_command.as_deref())
                .flag("SupportsBurnProtocol", bundle.supports_burn_protocol)
        }
    };
    Ok(attrs)
}

fn write_package_children(
    doc: &mut XmlDocument,
    inputs: &ManifestInputs<'_>,
    facade: &PackageFacade,
) -> Result<()> {
    let section = inputs.section;
    let id = facade.id.as_str();

    for (_, _, provider) in section.iter::<DependencyProviderSymbol>() {
        if provider.parent_ref.as_deref() != Some(id) {
            continue;
        }
        if let Some(key) = &provider.provider_key {
            doc.empty(
                "Provides",
                Attrs::new()
                    .set("Key", key)
                    .opt("Version", provider.version.as_deref())
                    .opt("DisplayName", provider.display_name.as_deref())
                    .opt("Imported", provider.imported.then_some("yes")),
            )?;
        }
    }

    for (_, _, related) in section.iter::<RelatedPackageSymbol>() {
        if related.package_ref != id {
            continue;
        }
        let attrs = Attrs::new()
            .set("Id", &related.related_id)
            .opt("MinVersion", related.min_version.as_deref())
            .opt("MaxVersion", related.max_version.as_deref())
            .flag("MinInclusive", related.min_inclusive)
            .flag("MaxInclusive", related.max_inclusive)
            .flag("OnlyDetect", related.only_detect)
            .flag("LangInclusive", related.lang_inclusive);
        if related.languages.is_empty() {
            doc.empty("RelatedPackage", attrs)?;
        } else {
            doc.start("RelatedPackage", attrs)?;
            for language in &related.languages {
                doc.empty("Language", Attrs::new().set("Id", language))?;
            }
            doc.end("RelatedPackage")?;
        }
    }

    for (_, _, property) in section.iter::<MsiPropertySymbol>() {
        if property.package_ref == id {
            doc.empty(
                "MsiProperty",
                Attrs::new()
                    .set("Id", &property.name)
                    .set("Value", &property.value)
                    .opt("Condition", property.condition.as_deref()),
            )?;
        }
    }

    for (_, _, feature) in section.iter::<MsiFeatureSymbol>() {
        if feature.package_ref == id {
            doc.empty("MsiFeature", Attrs::new().set("Id", &feature.name))?;
        }
    }

    for (_, _, slipstream) in section.iter::<SlipstreamMspSymbol>() {
        if slipstream.target_package_ref == id {
            doc.empty("SlipstreamMsp", Attrs::new().set("Id", &slipstream.msp_package_ref))?;
        }
    }

    for (_, _, target) in section.iter::<PatchTargetCodeSymbol>() {
        if target.package_ref == id {
            doc.empty(
                "PatchTargetCode",
                Attrs::new()
                    .set("TargetCode", &target.target_code)
                    .flag("Product", target.target_type == PatchTargetType::ProductCode),
            )?;
        }
    }

    for (payload_id, _) in inputs.index.payloads_of(id) {
        doc.empty("PayloadRef", Attrs::new().set("Id", payload_id))?;
    }
    Ok(())
}

/// Build `ba-manifest.xml`
pub fn create_ba_manifest(inputs: &ManifestInputs<'_>) -> Result<String> {
    let section = inputs.section;
    let bundle = inputs.bundle()?;
    let mut doc = XmlDocument::new()?;
    doc.start("BootstrapperApplicationData", Attrs::new().set("xmlns", BA_NAMESPACE))?;

    doc.empty(
        "WixBundleProperties",
        Attrs::new()
            .opt("DisplayName", bundle.name.as_deref())
            .opt("LogPathVariable", bundle.log_path_variable.as_deref())
            .flag("Compressed", bundle.compressed.unwrap_or(false))
            .opt("BundleCode", bundle.bundle_code.as_deref())
            .set("UpgradeCode", &bundle.upgrade_code)
            .flag("PerMachine", bundle.per_machine),
    )?;

    for facade in inputs.chain_facades() {
        let package = facade.package(section)?;
        let payloads: Vec<&PayloadSymbol> = inputs
            .index
            .payloads_of(&facade.id)
            .filter_map(|(_, i)| section.get::<PayloadSymbol>(i))
            .collect();
        let download_size: u64 = payloads
            .iter()
            .filter(|p| p.packaging == PackagingType::External)
            .filter_map(|p| p.file_size)
            .sum();
        let compressed = !payloads.is_empty()
            && payloads.iter().all(|p| p.packaging == PackagingType::Embedded);

        let (product_code, upgrade_code, internal_ui) = match facade.package_type {
            PackageType::Msi => {
                let msi = facade.specific::<MsiPackageSymbol>(section)?;
                (
                    msi.product_code.clone(),
                    msi.upgrade_code.clone(),
                    Some(msi.display_internal_ui),
                )
            }
            PackageType::Msp => {
                let msp = facade.specific::<MspPackageSymbol>(section)?;
                (None, None, Some(msp.display_internal_ui))
            }
            _ => (None, None, None),
        };

        doc.empty(
            "WixPackageProperties",
            Attrs::new()
                .set("Package", &facade.id)
                .flag("Vital", package.vital)
                .opt("DisplayName", package.display_name.as_deref())
                .opt("Description", package.description.as_deref())
                .set("DownloadSize", download_size)
                .set("PackageSize", package.size)
                .opt("InstalledSize", package.install_size)
                .set("PackageType", facade.package_type)
                .flag("Permanent", package.permanent)
                .opt("LogPathVariable", package.log_path_variable.as_deref())
                .opt("RollbackLogPathVariable", package.rollback_log_path_variable.as_deref())
                .flag("Compressed", compressed)
                .opt("ProductCode", product_code)
                .opt("UpgradeCode", upgrade_code)
                .opt("Version", package.version.as_deref())
                .opt("InstallCondition", package.install_condition.as_deref())
                .opt("RepairCondition", package.repair_condition.as_deref())
                .set("Cache", package.cache.as_str())
                .opt("DisplayInternalUI", internal_ui.map(|ui| if ui { "yes" } else { "no" })),
        )?;
    }

    for (_, _, feature) in section.iter::<MsiFeatureSymbol>() {
        doc.empty(
            "WixPackageFeatureInfo",
            Attrs::new()
                .set("Package", &feature.package_ref)
                .set("Feature", &feature.name)
                .set("Size", feature.size)
                .opt("Parent", feature.parent.as_deref())
                .opt("Title", feature.title.as_deref())
                .opt("Description", feature.description.as_deref())
                .set("Display", feature.display)
                .set("Level", feature.level)
                .opt("Directory", feature.directory.as_deref())
                .set("Attributes", feature.attributes),
        )?;
    }

    for (_, symbol, payload) in section.iter::<PayloadSymbol>() {
        if payload.container_ref.as_deref() == Some(UX_CONTAINER_ID) {
            continue;
        }
        doc.empty(
            "WixPayloadProperties",
            Attrs::new()
                .opt("Package", inputs.index.owning_package(symbol.id()))
                .set("Payload", symbol.id())
                .opt("Container", payload.container_ref.as_deref())
                .set("Name", &payload.name)
                .opt("Size", payload.file_size)
                .opt("DownloadUrl", payload.download_url.as_deref()),
        )?;
    }

    doc.end("BootstrapperApplicationData")?;
    doc.finish()
}

/// Build `bext-manifest.xml`
pub fn create_bext_manifest(inputs: &ManifestInputs<'_>) -> Result<String> {
    let section = inputs.section;
    let mut extension_ids: Vec<&str> = section
        .iter::<BundleExtensionSymbol>()
        .map(|(_, s, _)| s.id())
        .chain(inputs.searches.extension_searches.keys().map(String::as_str))
        .collect();
    extension_ids.sort_unstable();
    extension_ids.dedup();

    let mut doc = XmlDocument::new()?;
    doc.start("BundleExtensionData", Attrs::new().set("xmlns", BEXT_NAMESPACE))?;
    for extension_id in extension_ids {
        let searches = inputs.searches.extension_searches.get(extension_id);
        if searches.is_none_or(|s| s.is_empty()) {
            doc.empty("BundleExtension", Attrs::new().set("Id", extension_id))?;
            continue;
        }

        doc.start("BundleExtension", Attrs::new().set("Id", extension_id))?;
        for &index in searches.into_iter().flatten() {
            let search_id = section.symbol(index).id();
            let authored = match section.get::<SearchSymbol>(index).map(|s| &s.kind) {
                Some(SearchKind::Extension { data, .. }) => data.as_deref(),
                _ => None,
            };
            let data = inputs
                .extensions
                .search_data(extension_id, search_id, authored)
                .or_else(|| authored.map(str::to_string));
            let attrs = Attrs::new().set("Id", search_id);
            match data {
                Some(data) => doc.text("ExtensionSearch", attrs, &data)?,
                None => doc.empty("ExtensionSearch", attrs)?,
            }
        }
        doc.end("BundleExtension")?;
    }
    doc.end("BundleExtensionData")?;
    doc.finish()
}

/// Errors reading a burn manifest back
#[derive(Debug, ThisError)]
pub enum ManifestError {
    #[error("Malformed manifest XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Malformed manifest attribute: {0}")]
    Attribute(#[from] AttrError),

    #[error("Burn manifest has no Registration element")]
    MissingRegistration,
}

/// Identity block of a burn manifest
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestRegistration {
    pub engine_version: Option<String>,
    pub code: Option<String>,
    pub version: Option<String>,
    pub provider_key: Option<String>,
    pub per_machine: bool,
    pub display_name: Option<String>,
    pub publisher: Option<String>,
    /// Codes of `RelatedBundle` elements with the Upgrade action
    pub upgrade_codes: Vec<String>,
}

/// Read the registration data out of a burn manifest
pub fn read_registration(xml: &str) -> std::result::Result<ManifestRegistration, ManifestError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut registration = ManifestRegistration::default();
    let mut found = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) => {
                let name = e.local_name();
                let attrs = read_attributes(&e)?;
                let get = |key: &str| {
                    attrs
                        .iter()
                        .find(|(k, _)| k == key)
                        .map(|(_, v)| v.clone())
                };
                match name.as_ref() {
                    b"BurnManifest" => registration.engine_version = get("EngineVersion"),
                    b"Registration" => {
                        found = true;
                        registration.code = get("Code");
                        registration.version = get("Version");
                        registration.provider_key = get("ProviderKey");
                        registration.per_machine = get("PerMachine").as_deref() == Some("yes");
                    }
                    b"Arp" => {
                        registration.display_name = get("DisplayName");
                        registration.publisher = get("Publisher");
                    }
                    b"RelatedBundle" if get("Action").as_deref() == Some("Upgrade") => {
                        if let Some(code) = get("Code") {
                            registration.upgrade_codes.push(code);
                        }
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !found {
        return Err(ManifestError::MissingRegistration);
    }
    Ok(registration)
}

fn read_attributes(
    start: &BytesStart<'_>,
) -> std::result::Result<Vec<(String, String)>, ManifestError> {
    let mut attrs = Vec::new();
    for attr in start.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        attrs.push((key, value));
    }
    Ok(attrs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::facade::build_facades;
    use crate::data::SectionType;

    fn sample() -> (IntermediateSection, ChainOrder) {
        let mut section = IntermediateSection::new("b", SectionType::Bundle);
        section.add(
            None,
            None,
            BundleSymbol {
                upgrade_code: "{11111111-2222-3333-4444-555555555555}".into(),
                version: "1.2.3.4".into(),
                name: Some("Sample & Co".into()),
                bundle_code: Some("{AAAAAAAA-BBBB-CCCC-DDDD-EEEEEEEEEEEE}".into()),
                provider_key: Some("sample".into()),
                per_machine: true,
                ..Default::default()
            },
        );
        section.add(
            Some("Exe"),
            None,
            PackageSymbol {
                payload_ref: "ExePayload".into(),
                size: 10,
                cache_id: Some("HASH".into()),
                rollback_boundary_ref: Some(DEFAULT_BOUNDARY_ID.into()),
                ..Default::default()
            },
        );
        section.add(Some("Exe"), None, ExePackageSymbol::default());
        section.add(
            Some("ExePayload"),
            None,
            PayloadSymbol {
                name: "setup.exe".into(),
                file_size: Some(10),
                hash: Some("HASH".into()),
                packaging: PackagingType::Embedded,
                container_ref: Some(ATTACHED_CONTAINER_ID.into()),
                embedded_id: Some("a0".into()),
                ..Default::default()
            },
        );
        section.add(Some(DEFAULT_BOUNDARY_ID), None, RollbackBoundarySymbol::default());
        let chain = ChainOrder {
            packages: vec!["Exe".into()],
            boundaries: vec![DEFAULT_BOUNDARY_ID.into()],
        };
        (section, chain)
    }

    #[test]
    fn test_burn_manifest_registration_reads_back() {
        let (section, chain) = sample();
        let facades = build_facades(&section).unwrap();
        let index = PayloadIndex::build(&section, &facades).unwrap();
        let searches = OrderedSearches::default();
        let extensions = BurnExtensions::new();
        let inputs = ManifestInputs {
            section: &section,
            facades: &facades,
            index: &index,
            chain: &chain,
            searches: &searches,
            extensions: &extensions,
        };

        let xml = create_burn_manifest(&inputs).unwrap();
        assert!(xml.contains("<ExePackage Id=\"Exe\""));
        assert!(xml.contains("<PayloadRef Id=\"ExePayload\"/>"));
        assert!(xml.contains("RollbackBoundaryForward=\"WixDefaultBoundary\""));
        assert!(xml.contains("Sample &amp; Co"));

        let registration = read_registration(&xml).unwrap();
        assert_eq!(
            registration.code.as_deref(),
            Some("{AAAAAAAA-BBBB-CCCC-DDDD-EEEEEEEEEEEE}")
        );
        assert_eq!(registration.version.as_deref(), Some("1.2.3.4"));
        assert_eq!(registration.provider_key.as_deref(), Some("sample"));
        assert!(registration.per_machine);
        assert_eq!(registration.display_name.as_deref(), Some("Sample & Co"));
        assert_eq!(
            registration.upgrade_codes,
            vec!["{11111111-2222-3333-4444-555555555555}"]
        );
    }

    #[test]
    fn test_ba_manifest_package_properties() {
        let (section, chain) = sample();
        let facades = build_facades(&section).unwrap();
        let index = PayloadIndex::build(&section, &facades).unwrap();
        let searches = OrderedSearches::default();
        let extensions = BurnExtensions::new();
        let inputs = ManifestInputs {
            section: &section,
            facades: &facades,
            index: &index,
            chain: &chain,
            searches: &searches,
            extensions: &extensions,
        };

        let xml = create_ba_manifest(&inputs).unwrap();
        assert!(xml.contains("<WixPackageProperties Package=\"Exe\""));
        assert!(xml.contains("Compressed=\"yes\""));
        assert!(xml.contains("<WixPayloadProperties Package=\"Exe\" Payload=\"ExePayload\""));
    }

    #[test]
    fn test_manifest_without_registration() {
        let xml = "<BurnManifest><Chain/></BurnManifest>";
        assert!(matches!(
            read_registration(xml),
            Err(ManifestError::MissingRegistration)
        ));
    }
}
