// src/bundle/mod.rs

//! Bundle binder
//!
//! [`BindBundleCommand`] turns one linked bundle section into a bundle
//! executable. The stages run strictly in order over the same section, and
//! the driver checks [`Messaging::encountered_error`] and the cancellation
//! token between stages. Files created along the way are recorded in the
//! caller's [`BindOutputs`] so they survive a failed or cancelled bind.

pub mod burn;
pub mod cache_ids;
pub mod collisions;
pub mod containers;
pub mod delayed;
pub mod embedded;
pub mod extension;
pub mod facade;
pub mod guids;
pub mod manifest;
pub mod ordering;
pub mod packages;
pub mod payloads;
pub mod providers;
pub mod scope;
pub mod searches;
pub mod slipstream;
pub mod tags;
pub mod version;
pub mod wixout;

pub use burn::BurnSection;
pub use extension::{BurnBackendExtension, BurnExtensions, UrlTarget};
pub use ordering::ChainOrder;

use crate::config::BindOptions;
use crate::context::{BindOutputs, CancellationToken, TrackedFileType};
use crate::data::symbols::*;
use crate::data::{Intermediate, IntermediateSection, SourceLineNumber};
use crate::error::Result;
use crate::guid;
use crate::messaging::{MessageId, Messaging};
use containers::CreateContainersCommand;
use embedded::ExtractEmbeddedFilesCommand;
use facade::{PackageFacades, PayloadIndex};
use manifest::{BA_MANIFEST_NAME, BEXT_MANIFEST_NAME, BURN_MANIFEST_NAME, ManifestInputs};
use packages::{PackageContext, VariableCache};
use payloads::ProcessPayloadsCommand;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// What a successful bundle bind produced
#[derive(Debug, Clone)]
pub struct BundleOutput {
    pub bundle_path: PathBuf,
    pub wixout_path: PathBuf,
    pub burn_section: BurnSection,
    pub chain: ChainOrder,
    pub per_machine: bool,
}

/// Binds one bundle section into a bundle executable
pub struct BindBundleCommand<'a> {
    options: &'a BindOptions,
    output_path: PathBuf,
    base_folder: PathBuf,
    extensions: BurnExtensions,
    cancellation: CancellationToken,
}

impl<'a> BindBundleCommand<'a> {
    pub fn new(output_path: &Path, options: &'a BindOptions) -> Self {
        Self {
            options,
            output_path: output_path.to_path_buf(),
            base_folder: PathBuf::from("."),
            extensions: BurnExtensions::new(),
            cancellation: CancellationToken::new(),
        }
    }

    /// Folder relative payload sources resolve against
    pub fn with_base_folder(mut self, base_folder: &Path) -> Self {
        self.base_folder = base_folder.to_path_buf();
        self
    }

    pub fn with_extensions(mut self, extensions: BurnExtensions) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    fn wixout_path(&self) -> PathBuf {
        self.output_path.with_extension("wixout")
    }

    /// Gate between stages: fails on cancellation, false once an error was reported
    fn proceed(&self, stage: &str, messaging: &Messaging) -> Result<bool> {
        self.cancellation.check()?;
        if messaging.encountered_error() {
            info!(
                "Bundle bind stopped before {} ({} errors)",
                stage,
                messaging.error_count()
            );
            return Ok(false);
        }
        debug!("Bundle bind: {}", stage);
        Ok(true)
    }

    /// Run every stage; `None` means errors were reported to `messaging`
    pub fn execute(
        &self,
        section: &mut IntermediateSection,
        outputs: &mut BindOutputs,
        messaging: &mut Messaging,
    ) -> Result<Option<BundleOutput>> {
        let intermediate_folder = self.options.intermediate_folder.as_path();
        info!("Binding bundle {}", self.output_path.display());

        // Structure
        self.cancellation.check()?;
        check_preconditions(section, messaging);
        if !self.proceed("GUID normalization", messaging)? {
            return Ok(None);
        }
        guids::normalize_bundle_guids(section, messaging);
        assign_bundle_code(section);

        if !self.proceed("search ordering", messaging)? {
            return Ok(None);
        }
        let searches = searches::order_searches(section, messaging);

        if !self.proceed("embedded file extraction", messaging)? {
            return Ok(None);
        }
        ExtractEmbeddedFilesCommand::new(&self.base_folder, intermediate_folder, &self.cancellation)
            .execute(section, outputs, messaging)?;

        // Packages and payloads
        if !self.proceed("payload indexing", messaging)? {
            return Ok(None);
        }
        let facades = facade::build_facades(section)?;
        let index = PayloadIndex::build(section, &facades)?;
        let default_compressed = section
            .iter::<BundleSymbol>()
            .next()
            .and_then(|(_, _, b)| b.compressed)
            .unwrap_or(true);
        let mut processed = BTreeSet::new();
        let all_payloads = section.indexes::<PayloadSymbol>();
        ProcessPayloadsCommand::new(
            &self.base_folder,
            default_compressed,
            &index.layout_payloads,
            &self.cancellation,
        )
        .execute(section, all_payloads, &mut processed, messaging)?;

        if !self.proceed("package processing", messaging)? {
            return Ok(None);
        }
        let mut cache = VariableCache::new();
        {
            let mut ctx = PackageContext {
                section: &mut *section,
                index: &index,
                cache: &mut cache,
                messaging: &mut *messaging,
                outputs: &mut *outputs,
                intermediate_folder,
                cancellation: &self.cancellation,
            };
            for facade in facades.values() {
                packages::process_package(facade, &mut ctx)?;
            }
        }

        if !self.proceed("delayed field resolution", messaging)? {
            return Ok(None);
        }
        delayed::resolve_delayed_fields(section, &cache, messaging)?;

        if !self.proceed("bundle version", messaging)? {
            return Ok(None);
        }
        normalize_bundle_version(section, messaging);

        if !self.proceed("payload re-indexing", messaging)? {
            return Ok(None);
        }
        let index = PayloadIndex::build(section, &facades)?;
        let all_payloads = section.indexes::<PayloadSymbol>();
        let added = ProcessPayloadsCommand::new(
            &self.base_folder,
            default_compressed,
            &index.layout_payloads,
            &self.cancellation,
        )
        .execute(section, all_payloads, &mut processed, messaging)?;
        debug!("Processed {} payloads found by package processing", added);

        if !self.proceed("package metadata", messaging)? {
            return Ok(None);
        }
        payloads::finalize_package_metadata(section, &facades, &index)?;
        payloads::assign_containers(section, &index, messaging);

        if !self.proceed("embedded ids", messaging)? {
            return Ok(None);
        }
        payloads::assign_embedded_ids(section, messaging);

        // Chain
        if !self.proceed("patch slipstreaming", messaging)? {
            return Ok(None);
        }
        slipstream::slipstream_patches(section, &facades, messaging)?;

        if !self.proceed("chain ordering", messaging)? {
            return Ok(None);
        }
        let chain = ordering::order_packages(section, &facades, messaging)?;

        if !self.proceed("dependency providers", messaging)? {
            return Ok(None);
        }
        providers::resolve_dependency_providers(section, &facades, messaging)?;

        if !self.proceed("install scope", messaging)? {
            return Ok(None);
        }
        let per_machine = scope::resolve_install_scope(section, &facades, messaging)?;

        if !self.proceed("software tags", messaging)? {
            return Ok(None);
        }
        tags::generate_software_tags(section)?;
        self.extensions.validate(section, messaging);
        if !self.proceed("cache id check", messaging)? {
            return Ok(None);
        }
        cache_ids::check_duplicate_cache_ids(section, &facades, &chain, messaging)?;

        // Layout
        if !self.proceed("collision detection", messaging)? {
            return Ok(None);
        }
        collisions::check_collisions(section, messaging);

        if !self.proceed("container creation", messaging)? {
            return Ok(None);
        }
        let packer = CreateContainersCommand::new(
            intermediate_folder,
            self.options.thread_count,
            self.options.default_compression,
            &self.cancellation,
        );
        let built = packer.execute(section, outputs)?;
        containers::resolve_download_urls(section, &index, &self.extensions);

        if !self.proceed("manifest generation", messaging)? {
            return Ok(None);
        }
        let manifests = self.write_manifests(section, &facades, &index, &chain, &searches, outputs)?;
        let manifest_files: Vec<(&str, PathBuf)> = manifests
            .iter()
            .map(|(name, path, _)| (*name, path.clone()))
            .collect();
        let ux = packer.create_ux_container(section, &manifest_files, outputs)?;

        if !self.proceed("bundle assembly", messaging)? {
            return Ok(None);
        }
        let mut attached = vec![ux.path.clone()];
        attached.extend(
            built
                .iter()
                .filter(|c| c.container_type == ContainerType::Attached)
                .map(|c| c.path.clone()),
        );
        let bundle_code = section
            .iter::<BundleSymbol>()
            .next()
            .and_then(|(_, _, b)| b.bundle_code.clone())
            .unwrap_or_default();
        let burn_section = burn::write_bundle(
            &self.output_path,
            self.options.stub_path.as_deref(),
            &bundle_code,
            &attached,
        )?;
        outputs.track(&self.output_path, TrackedFileType::BuiltTargetOutput, None);

        let output_folder = self.output_path.parent().unwrap_or(Path::new("."));
        containers::layout_transfers(section, &built, output_folder, outputs);

        let wixout_path = self.wixout_path();
        let intermediate = Intermediate::new(&section.id, vec![section.clone()]);
        let streams: Vec<(&str, &str)> = manifests
            .iter()
            .map(|(name, _, xml)| (*name, xml.as_str()))
            .collect();
        wixout::write_wixout(&wixout_path, &intermediate, &streams)?;
        outputs.track(&wixout_path, TrackedFileType::BuiltTargetOutput, None);
        if let Some(pdb) = &self.options.pdb_output {
            wixout::write_pdb(pdb, &intermediate)?;
            outputs.track(pdb, TrackedFileType::BuiltPdbOutput, None);
        }

        info!(
            "Bound bundle {} ({} packages, {})",
            self.output_path.display(),
            chain.packages.len(),
            if per_machine { "per-machine" } else { "per-user" }
        );
        Ok(Some(BundleOutput {
            bundle_path: self.output_path.clone(),
            wixout_path,
            burn_section,
            chain,
            per_machine,
        }))
    }

    /// Serialize the three manifests into the intermediate folder
    fn write_manifests(
        &self,
        section: &IntermediateSection,
        facades: &PackageFacades,
        index: &PayloadIndex,
        chain: &ChainOrder,
        searches: &searches::OrderedSearches,
        outputs: &mut BindOutputs,
    ) -> Result<Vec<(&'static str, PathBuf, String)>> {
        let inputs = ManifestInputs {
            section,
            facades,
            index,
            chain,
            searches,
            extensions: &self.extensions,
        };
        let documents = [
            (BURN_MANIFEST_NAME, manifest::create_burn_manifest(&inputs)?),
            (BA_MANIFEST_NAME, manifest::create_ba_manifest(&inputs)?),
            (BEXT_MANIFEST_NAME, manifest::create_bext_manifest(&inputs)?),
        ];

        let folder = self.options.intermediate_folder.join("manifests");
        fs::create_dir_all(&folder)?;
        let mut written = Vec::with_capacity(documents.len());
        for (name, xml) in documents {
            let path = folder.join(name);
            fs::write(&path, &xml)?;
            outputs.track(&path, TrackedFileType::Temporary, None);
            written.push((name, path, xml));
        }
        Ok(written)
    }
}

/// Report missing or repeated singleton symbols
///
/// Returns false when the section cannot be bound as a bundle.
pub fn check_preconditions(section: &IntermediateSection, messaging: &mut Messaging) -> bool {
    let errors = messaging.error_count();

    let mut require = |count: usize, max: usize, what: &str| {
        if count == 0 {
            messaging.error(
                MessageId::MissingBundleInformation,
                None,
                format!("The bundle has no {what}"),
            );
        } else if count > max {
            messaging.error(
                MessageId::MultipleSingletonSymbols,
                None,
                format!("The bundle has {count} {what} symbols; only {max} is allowed"),
            );
        }
    };
    require(section.count::<PackageSymbol>(), usize::MAX, "packages");
    require(section.count::<GroupSymbol>(), usize::MAX, "group rows");
    require(section.count::<BundleSymbol>(), 1, "Bundle");
    require(section.count::<ChainSymbol>(), 1, "Chain");

    let (primary, secondary): (Vec<_>, Vec<_>) = section
        .iter::<BootstrapperApplicationSymbol>()
        .map(|(_, s, ba)| (s.source_line.clone(), ba.secondary))
        .partition(|(_, secondary)| !secondary);
    require(primary.len(), 1, "primary BootstrapperApplication");
    if secondary.len() > 1 {
        let source_line: Option<&SourceLineNumber> = secondary[1].0.as_ref();
        messaging.error(
            MessageId::MultipleSingletonSymbols,
            source_line,
            "Only one secondary bootstrapper application is allowed",
        );
    }

    messaging.error_count() == errors
}

/// Generate the bundle code unless one was authored
fn assign_bundle_code(section: &mut IntermediateSection) {
    for index in section.indexes::<BundleSymbol>() {
        if let Some(bundle) = section.get_mut::<BundleSymbol>(index)
            && bundle.bundle_code.is_none()
        {
            let code = guid::new_guid();
            debug!("Generated bundle code {}", code);
            bundle.bundle_code = Some(code);
        }
    }
}

fn normalize_bundle_version(section: &mut IntermediateSection, messaging: &mut Messaging) {
    for index in section.indexes::<BundleSymbol>() {
        let source_line = section.symbol(index).source_line.clone();
        let Some(bundle) = section.get_mut::<BundleSymbol>(index) else {
            continue;
        };
        match version::normalize_version(&bundle.version) {
            Ok(normalized) => bundle.version = normalized,
            Err(e) => messaging.error(
                MessageId::InvalidBundleVersion,
                source_line.as_ref(),
                format!("Invalid bundle version {:?}: {}", bundle.version, e),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SectionType;

    fn minimal_section() -> IntermediateSection {
        let mut section = IntermediateSection::new("b", SectionType::Bundle);
        section.add(None, None, BundleSymbol::default());
        section.add(None, None, ChainSymbol::default());
        section.add(None, None, BootstrapperApplicationSymbol::default());
        section.add(Some("P"), None, PackageSymbol::default());
        section.add(
            None,
            None,
            GroupSymbol {
                parent_type: ComplexReferenceType::PackageGroup,
                parent_id: CHAIN_GROUP_ID.into(),
                child_type: ComplexReferenceType::Package,
                child_id: "P".into(),
            },
        );
        section
    }

    #[test]
    fn test_preconditions_pass() {
        let mut messaging = Messaging::new();
        assert!(check_preconditions(&minimal_section(), &mut messaging));
        assert!(!messaging.encountered_error());
    }

    #[test]
    fn test_preconditions_report_missing_and_duplicate() {
        let mut section = minimal_section();
        section.add(None, None, BundleSymbol::default());
        section.add(
            None,
            None,
            BootstrapperApplicationSymbol { secondary: true },
        );
        section.add(
            None,
            None,
            BootstrapperApplicationSymbol { secondary: true },
        );
        section.symbols.retain(|s| s.kind_name() != "Chain");

        let mut messaging = Messaging::new();
        assert!(!check_preconditions(&section, &mut messaging));
        assert_eq!(messaging.count(MessageId::MissingBundleInformation), 1);
        assert_eq!(messaging.count(MessageId::MultipleSingletonSymbols), 2);
    }

    #[test]
    fn test_version_prefix_and_invalid_version() {
        let mut section = minimal_section();
        let index = section.indexes::<BundleSymbol>()[0];
        section.get_mut::<BundleSymbol>(index).unwrap().version = "v1.2.3".into();
        let mut messaging = Messaging::new();
        normalize_bundle_version(&mut section, &mut messaging);
        assert_eq!(section.get::<BundleSymbol>(index).unwrap().version, "1.2.3");

        section.get_mut::<BundleSymbol>(index).unwrap().version = "one".into();
        normalize_bundle_version(&mut section, &mut messaging);
        assert_eq!(messaging.count(MessageId::InvalidBundleVersion), 1);
    }

    #[test]
    fn test_bundle_code_is_generated_once() {
        let mut section = minimal_section();
        assign_bundle_code(&mut section);
        let (_, _, bundle) = section.iter::<BundleSymbol>().next().unwrap();
        let code = bundle.bundle_code.clone().unwrap();
        assert!(guid::is_guid(&code));

        assign_bundle_code(&mut section);
        let (_, _, bundle) = section.iter::<BundleSymbol>().next().unwrap();
        assert_eq!(bundle.bundle_code.as_deref(), Some(code.as_str()));
    }
}
