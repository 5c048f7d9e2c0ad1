// src/bundle/extension.rs

//! Hooks for bundle backend extensions
//!
//! Extensions contribute symbols the core does not understand (extension
//! searches, custom tables). The binder calls back into them at three
//! points: backend validation after scope resolution, download URL
//! resolution before the default token substitution, and search data for
//! the bundle extension manifest.

use crate::data::IntermediateSection;
use crate::messaging::Messaging;

/// Identity of the package or container a download URL is resolved for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UrlTarget<'a> {
    /// Package or container id
    pub owner_id: Option<&'a str>,
    pub payload_id: Option<&'a str>,
    pub file_name: &'a str,
}

pub trait BurnBackendExtension: Send + Sync {
    /// Bundle extension id this backend serves
    fn id(&self) -> &str;

    /// Validate the section after packages are fully processed
    fn validate(&self, _section: &IntermediateSection, _messaging: &mut Messaging) {}

    /// Resolve a download URL; `None` falls back to token substitution
    fn resolve_url(&self, _url: &str, _target: &UrlTarget<'_>) -> Option<String> {
        None
    }

    /// Data element content for an extension search
    fn search_data(&self, _search_id: &str, _authored: Option<&str>) -> Option<String> {
        None
    }
}

/// The registered backends of one bind
#[derive(Default)]
pub struct BurnExtensions {
    extensions: Vec<Box<dyn BurnBackendExtension>>,
}

impl BurnExtensions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, extension: Box<dyn BurnBackendExtension>) {
        self.extensions.push(extension);
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    pub fn validate(&self, section: &IntermediateSection, messaging: &mut Messaging) {
        for extension in &self.extensions {
            extension.validate(section, messaging);
        }
    }

    /// First URL any extension resolves
    pub fn resolve_url(&self, url: &str, target: &UrlTarget<'_>) -> Option<String> {
        self.extensions
            .iter()
            .find_map(|e| e.resolve_url(url, target))
    }

    pub fn search_data(
        &self,
        extension_id: &str,
        search_id: &str,
        authored: Option<&str>,
    ) -> Option<String> {
        self.extensions
            .iter()
            .filter(|e| e.id() == extension_id)
            .find_map(|e| e.search_data(search_id, authored))
    }
}

impl std::fmt::Debug for BurnExtensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.extensions.iter().map(|e| e.id()))
            .finish()
    }
}
