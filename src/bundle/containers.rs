// src/bundle/containers.rs

//! Container packing, download URLs and layout transfers
//!
//! Non-UX containers are packed first, in parallel, so their hash and size
//! can go into the burn manifest. The UX container is packed last because
//! it carries the manifests.

use super::extension::{BurnExtensions, UrlTarget};
use super::facade::PayloadIndex;
use crate::cabinet::{self, CabinetEntry};
use crate::config::CompressionLevel;
use crate::context::{BindOutputs, CancellationToken, FileTransfer, TrackedFileType};
use crate::data::IntermediateSection;
use crate::data::symbols::*;
use crate::error::{Error, Result};
use crate::hash::{self, HashAlgorithm};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A container written to the intermediate folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltContainer {
    pub id: String,
    pub path: PathBuf,
    pub container_type: ContainerType,
    pub size: u64,
    pub hash: String,
}

struct ContainerJob {
    index: usize,
    id: String,
    container_type: ContainerType,
    path: PathBuf,
    entries: Vec<CabinetEntry>,
}

pub struct CreateContainersCommand<'a> {
    intermediate_folder: &'a Path,
    thread_count: usize,
    compression: CompressionLevel,
    cancellation: &'a CancellationToken,
}

impl<'a> CreateContainersCommand<'a> {
    pub fn new(
        intermediate_folder: &'a Path,
        thread_count: usize,
        compression: CompressionLevel,
        cancellation: &'a CancellationToken,
    ) -> Self {
        Self {
            intermediate_folder,
            thread_count,
            compression,
            cancellation,
        }
    }

    fn container_folder(&self) -> PathBuf {
        self.intermediate_folder.join("containers")
    }

    /// Pack every non-UX container that holds embedded payloads
    ///
    /// Attached containers are numbered from 1 in authoring order; index 0
    /// is the UX container.
    pub fn execute(
        &self,
        section: &mut IntermediateSection,
        outputs: &mut BindOutputs,
    ) -> Result<Vec<BuiltContainer>> {
        let folder = self.container_folder();
        let mut jobs = Vec::new();
        for (index, symbol, container) in section.iter::<ContainerSymbol>() {
            if symbol.id() == UX_CONTAINER_ID {
                continue;
            }
            let entries = embedded_entries(section, symbol.id())?;
            if entries.is_empty() {
                debug!("Container {} has no embedded payloads", symbol.id());
                continue;
            }
            jobs.push(ContainerJob {
                index,
                id: symbol.id().to_string(),
                container_type: container.container_type,
                path: folder.join(symbol.id()),
                entries,
            });
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.thread_count.max(1))
            .build()
            .map_err(|e| Error::Toolchain(format!("Failed to start container workers: {e}")))?;
        let results: Vec<(u64, String)> = pool.install(|| {
            jobs.par_iter()
                .map(|job| {
                    self.cancellation.check()?;
                    cabinet::create_cabinet(&job.path, &job.entries, self.compression)?;
                    let (file_hash, size) = hash::hash_file(HashAlgorithm::Sha512, &job.path)?;
                    Ok((size, file_hash.to_manifest_string()))
                })
                .collect::<Result<Vec<_>>>()
        })?;

        let mut built = Vec::with_capacity(jobs.len());
        let mut attached_index = 1;
        for (job, (size, hash)) in jobs.into_iter().zip(results) {
            let source_line = section.symbol(job.index).source_line.clone();
            outputs.track(&job.path, TrackedFileType::Temporary, source_line.as_ref());
            if let Some(container) = section.get_mut::<ContainerSymbol>(job.index) {
                container.hash = Some(hash.clone());
                container.size = Some(size);
                container.working_path = Some(job.path.to_string_lossy().into_owned());
                if job.container_type == ContainerType::Attached {
                    container.attached_container_index = Some(attached_index);
                    attached_index += 1;
                }
            }
            built.push(BuiltContainer {
                id: job.id,
                path: job.path,
                container_type: job.container_type,
                size,
                hash,
            });
        }

        info!("Packed {} containers", built.len());
        Ok(built)
    }

    /// Pack the UX container from the manifests and the UX payloads
    pub fn create_ux_container(
        &self,
        section: &mut IntermediateSection,
        manifests: &[(&str, PathBuf)],
        outputs: &mut BindOutputs,
    ) -> Result<BuiltContainer> {
        self.cancellation.check()?;
        let mut entries: Vec<CabinetEntry> = manifests
            .iter()
            .map(|(name, path)| CabinetEntry::new(*name, path))
            .collect();
        entries.extend(embedded_entries(section, UX_CONTAINER_ID)?);

        let path = self.container_folder().join(UX_CONTAINER_ID);
        cabinet::create_cabinet(&path, &entries, self.compression)?;
        let (file_hash, size) = hash::hash_file(HashAlgorithm::Sha512, &path)?;
        let hash = file_hash.to_manifest_string();
        outputs.track(&path, TrackedFileType::Temporary, None);

        if let Some((index, _)) = section.find::<ContainerSymbol>(UX_CONTAINER_ID) {
            if let Some(container) = section.get_mut::<ContainerSymbol>(index) {
                container.hash = Some(hash.clone());
                container.size = Some(size);
                container.attached_container_index = Some(0);
                container.working_path = Some(path.to_string_lossy().into_owned());
            }
        }

        debug!("Packed UX container ({} entries, {} bytes)", entries.len(), size);
        Ok(BuiltContainer {
            id: UX_CONTAINER_ID.to_string(),
            path,
            container_type: ContainerType::Attached,
            size,
            hash,
        })
    }
}

/// Cabinet entries of the embedded payloads placed in a container
fn embedded_entries(section: &IntermediateSection, container_id: &str) -> Result<Vec<CabinetEntry>> {
    let mut entries = Vec::new();
    for (_, symbol, payload) in section.iter::<PayloadSymbol>() {
        if payload.packaging != PackagingType::Embedded
            || payload.container_ref.as_deref() != Some(container_id)
        {
            continue;
        }
        let (Some(embedded_id), Some(source)) = (&payload.embedded_id, &payload.source_file) else {
            return Err(Error::NotFound(format!(
                "Embedded payload {} has no embedded id or source file",
                symbol.id()
            )));
        };
        entries.push(CabinetEntry::new(embedded_id.clone(), source));
    }
    Ok(entries)
}

/// Substitute `{0}` owner id, `{1}` payload id and `{2}` file name
pub fn expand_url_tokens(url: &str, target: &UrlTarget<'_>) -> String {
    url.replace("{0}", target.owner_id.unwrap_or(""))
        .replace("{1}", target.payload_id.unwrap_or(""))
        .replace("{2}", target.file_name)
}

/// Resolve the download URLs of payloads and detached containers
pub fn resolve_download_urls(
    section: &mut IntermediateSection,
    index: &PayloadIndex,
    extensions: &BurnExtensions,
) {
    let mut resolved = Vec::new();

    for (i, symbol, payload) in section.iter::<PayloadSymbol>() {
        let Some(url) = payload.download_url.as_deref() else {
            continue;
        };
        let owner = index
            .owning_package(symbol.id())
            .or(payload.container_ref.as_deref());
        let target = UrlTarget {
            owner_id: owner,
            payload_id: Some(symbol.id()),
            file_name: &payload.name,
        };
        let url = extensions
            .resolve_url(url, &target)
            .unwrap_or_else(|| expand_url_tokens(url, &target));
        resolved.push((i, url));
    }

    for (i, symbol, container) in section.iter::<ContainerSymbol>() {
        let Some(url) = container.download_url.as_deref() else {
            continue;
        };
        let target = UrlTarget {
            owner_id: Some(symbol.id()),
            payload_id: None,
            file_name: &container.name,
        };
        let url = extensions
            .resolve_url(url, &target)
            .unwrap_or_else(|| expand_url_tokens(url, &target));
        resolved.push((i, url));
    }

    for (i, url) in resolved {
        if let Some(payload) = section.get_mut::<PayloadSymbol>(i) {
            payload.download_url = Some(url);
        } else if let Some(container) = section.get_mut::<ContainerSymbol>(i) {
            container.download_url = Some(url);
        }
    }
}

/// Record where detached containers and external payloads are laid out
pub fn layout_transfers(
    section: &IntermediateSection,
    built: &[BuiltContainer],
    output_folder: &Path,
    outputs: &mut BindOutputs,
) {
    for container in built {
        if container.container_type != ContainerType::Detached {
            continue;
        }
        let (name, source_line) = match section.find::<ContainerSymbol>(&container.id) {
            Some((i, symbol)) => (symbol.name.clone(), section.symbol(i).source_line.clone()),
            None => (container.id.clone(), None),
        };
        outputs.transfer(FileTransfer::new(
            &container.path,
            &output_folder.join(name),
            true,
            source_line,
        ));
    }

    for (_, symbol, payload) in section.iter::<PayloadSymbol>() {
        if payload.packaging != PackagingType::External {
            continue;
        }
        if let Some(source) = &payload.source_file {
            outputs.transfer(FileTransfer::new(
                Path::new(source),
                &output_folder.join(payload.name.replace('\\', "/")),
                false,
                symbol.source_line.clone(),
            ));
        }
    }
}
