// src/bundle/embedded.rs

//! Extract payload files embedded in binary libraries
//!
//! A payload whose source is `<library>.wixlib#<entry>` lives inside a
//! library archive rather than on disk. Each referenced library is unpacked
//! once into the intermediate folder and the payload source is rewritten to
//! the extracted file.

use crate::cabinet;
use crate::context::{BindOutputs, CancellationToken, TrackedFileType};
use crate::data::IntermediateSection;
use crate::data::symbols::PayloadSymbol;
use crate::error::Result;
use crate::hash;
use crate::messaging::{MessageId, Messaging};
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const LIBRARY_EXTENSION: &str = ".wixlib";

/// Split `<library>.wixlib#<entry>` into library path and entry name
pub fn split_embedded_source(source: &str) -> Option<(&str, &str)> {
    let (library, entry) = source.rsplit_once('#')?;
    (library.to_lowercase().ends_with(LIBRARY_EXTENSION) && !entry.is_empty())
        .then_some((library, entry))
}

pub struct ExtractEmbeddedFilesCommand<'a> {
    base_folder: &'a Path,
    intermediate_folder: &'a Path,
    cancellation: &'a CancellationToken,
}

impl<'a> ExtractEmbeddedFilesCommand<'a> {
    pub fn new(
        base_folder: &'a Path,
        intermediate_folder: &'a Path,
        cancellation: &'a CancellationToken,
    ) -> Self {
        Self {
            base_folder,
            intermediate_folder,
            cancellation,
        }
    }

    /// Rewrite embedded payload sources and return how many were extracted
    pub fn execute(
        &self,
        section: &mut IntermediateSection,
        outputs: &mut BindOutputs,
        messaging: &mut Messaging,
    ) -> Result<usize> {
        let mut by_library: BTreeMap<String, Vec<(usize, String)>> = BTreeMap::new();
        for (index, _, payload) in section.iter::<PayloadSymbol>() {
            if let Some((library, entry)) = payload
                .source_file
                .as_deref()
                .and_then(split_embedded_source)
            {
                by_library
                    .entry(library.to_string())
                    .or_default()
                    .push((index, entry.to_string()));
            }
        }

        let mut extracted = 0;
        for (library, payloads) in by_library {
            self.cancellation.check()?;
            let library_path = self.base_folder.join(&library);
            let folder = self.library_folder(&library);

            let names = match File::open(&library_path) {
                Ok(file) => cabinet::extract_from_reader(file, &folder)?,
                Err(e) => {
                    for (index, _) in &payloads {
                        messaging.error(
                            MessageId::MissingPayloadSource,
                            section.symbol(*index).source_line.as_ref(),
                            format!("Cannot open library {}: {}", library_path.display(), e),
                        );
                    }
                    continue;
                }
            };
            debug!("Unpacked {} files from {}", names.len(), library_path.display());
            for name in &names {
                outputs.track(folder.join(name), TrackedFileType::Temporary, None);
            }

            for (index, entry) in payloads {
                if !names.contains(&entry) {
                    messaging.error(
                        MessageId::MissingPayloadSource,
                        section.symbol(index).source_line.as_ref(),
                        format!("Library {} has no embedded file {}", library, entry),
                    );
                    continue;
                }
                if let Some(payload) = section.get_mut::<PayloadSymbol>(index) {
                    payload.unresolved_source_file = payload.source_file.take();
                    payload.source_file = Some(folder.join(&entry).to_string_lossy().into_owned());
                    extracted += 1;
                }
            }
        }

        if extracted > 0 {
            info!("Extracted {} embedded payload files", extracted);
        }
        Ok(extracted)
    }

    fn library_folder(&self, library: &str) -> PathBuf {
        let digest = hash::sha256(library.as_bytes());
        self.intermediate_folder
            .join("embedded")
            .join(&digest[..16])
    }
}
