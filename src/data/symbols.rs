// src/data/symbols.rs

//! Typed bundle symbols
//!
//! Symbols reference each other by string identifier, never by pointer.
//! Fragments are produced independently and merged long after creation, so
//! every relationship is resolved by lookup when it is needed.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Id of the container holding the bootstrapper application payloads
pub const UX_CONTAINER_ID: &str = "WixUXContainer";
/// Id of the default attached container
pub const ATTACHED_CONTAINER_ID: &str = "WixAttachedContainer";
/// Package group that holds the chain
pub const CHAIN_GROUP_ID: &str = "WixChain";
/// Rollback boundary synthesized ahead of the first package
pub const DEFAULT_BOUNDARY_ID: &str = "WixDefaultBoundary";

/// Kind of package in the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PackageType {
    Bundle,
    #[default]
    Exe,
    Msi,
    Msp,
    Msu,
}

impl PackageType {
    pub fn as_str(&self) -> &str {
        match self {
            PackageType::Bundle => "Bundle",
            PackageType::Exe => "Exe",
            PackageType::Msi => "Msi",
            PackageType::Msp => "Msp",
            PackageType::Msu => "Msu",
        }
    }
}

impl fmt::Display for PackageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PackageType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "Bundle" => Ok(PackageType::Bundle),
            "Exe" => Ok(PackageType::Exe),
            "Msi" => Ok(PackageType::Msi),
            "Msp" => Ok(PackageType::Msp),
            "Msu" => Ok(PackageType::Msu),
            _ => Err(format!("Invalid package type: {s}")),
        }
    }
}

/// Tri-state authoring flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum YesNoDefault {
    #[default]
    Default,
    Yes,
    No,
}

impl YesNoDefault {
    pub fn from_bool(value: bool) -> Self {
        if value { YesNoDefault::Yes } else { YesNoDefault::No }
    }

    pub fn is_yes(&self) -> bool {
        *self == YesNoDefault::Yes
    }
}

/// Cache policy of a package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CacheType {
    #[default]
    Keep,
    Force,
    Remove,
}

impl CacheType {
    pub fn as_str(&self) -> &str {
        match self {
            CacheType::Keep => "keep",
            CacheType::Force => "force",
            CacheType::Remove => "remove",
        }
    }
}

/// Where a payload is delivered from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PackagingType {
    #[default]
    Unknown,
    Embedded,
    External,
}

impl PackagingType {
    pub fn as_str(&self) -> &str {
        match self {
            PackagingType::Unknown => "unknown",
            PackagingType::Embedded => "embedded",
            PackagingType::External => "external",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ContainerType {
    #[default]
    Attached,
    Detached,
}

/// Type of a parent or child in a group membership row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ComplexReferenceType {
    #[default]
    Unknown,
    Package,
    PackageGroup,
    Payload,
    PayloadGroup,
    Container,
    Layout,
    RollbackBoundary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RelatedBundleAction {
    #[default]
    Detect,
    Upgrade,
    Addon,
    Patch,
}

impl RelatedBundleAction {
    pub fn as_str(&self) -> &str {
        match self {
            RelatedBundleAction::Detect => "Detect",
            RelatedBundleAction::Upgrade => "Upgrade",
            RelatedBundleAction::Addon => "Addon",
            RelatedBundleAction::Patch => "Patch",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExeDetectionType {
    #[default]
    None,
    Condition,
    Arp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VariableType {
    #[default]
    String,
    Numeric,
    Version,
    Formatted,
}

impl VariableType {
    pub fn as_str(&self) -> &str {
        match self {
            VariableType::String => "string",
            VariableType::Numeric => "numeric",
            VariableType::Version => "version",
            VariableType::Formatted => "formatted",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PatchTargetType {
    #[default]
    Unspecified,
    ProductCode,
    UpgradeCode,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BundleSymbol {
    pub upgrade_code: String,
    pub version: String,
    pub name: Option<String>,
    pub manufacturer: Option<String>,
    pub copyright: Option<String>,
    pub about_url: Option<String>,
    pub help_url: Option<String>,
    pub help_telephone: Option<String>,
    pub update_url: Option<String>,
    pub disable_modify: bool,
    pub disable_remove: bool,
    pub compressed: Option<bool>,
    pub log_path_variable: Option<String>,
    pub log_prefix: Option<String>,
    pub log_extension: Option<String>,
    pub condition: Option<String>,
    pub tag: Option<String>,
    pub parent_name: Option<String>,
    pub in_progress_name: Option<String>,
    /// Generated when absent
    pub bundle_code: Option<String>,
    /// Resolved by dependency provider processing
    pub provider_key: Option<String>,
    /// Resolved by install-scope processing
    pub per_machine: bool,
    pub executable_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapperApplicationSymbol {
    pub secondary: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainSymbol {
    pub disable_rollback: bool,
    pub disable_system_restore: bool,
    pub parallel_cache: bool,
}

/// Type-independent part of a chain package
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageSymbol {
    pub package_type: PackageType,
    pub payload_ref: String,
    pub install_condition: Option<String>,
    pub repair_condition: Option<String>,
    pub cache: CacheType,
    pub cache_id: Option<String>,
    pub vital: bool,
    pub per_machine: YesNoDefault,
    pub permanent: bool,
    pub visible: bool,
    pub win64: bool,
    pub description: Option<String>,
    pub display_name: Option<String>,
    pub log_path_variable: Option<String>,
    pub rollback_log_path_variable: Option<String>,
    pub size: u64,
    pub install_size: Option<u64>,
    pub version: Option<String>,
    pub language: Option<String>,
    pub rollback_boundary_ref: Option<String>,
    pub rollback_boundary_backward_ref: Option<String>,
}

impl Default for PackageSymbol {
    fn default() -> Self {
        Self {
            package_type: PackageType::default(),
            payload_ref: String::new(),
            install_condition: None,
            repair_condition: None,
            cache: CacheType::Keep,
            cache_id: None,
            vital: true,
            per_machine: YesNoDefault::Default,
            permanent: false,
            visible: false,
            win64: false,
            description: None,
            display_name: None,
            log_path_variable: None,
            rollback_log_path_variable: None,
            size: 0,
            install_size: None,
            version: None,
            language: None,
            rollback_boundary_ref: None,
            rollback_boundary_backward_ref: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MsiPackageSymbol {
    pub product_code: Option<String>,
    pub upgrade_code: Option<String>,
    pub product_version: Option<String>,
    pub product_language: Option<i32>,
    pub product_name: Option<String>,
    pub manufacturer: Option<String>,
    pub enable_feature_selection: bool,
    pub force_per_machine: bool,
    pub suppress_loose_file_payload_generation: bool,
    pub display_internal_ui: bool,
    pub compressed: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MspPackageSymbol {
    pub patch_code: Option<String>,
    pub manufacturer: Option<String>,
    pub display_internal_ui: bool,
    /// Allow automatic slipstreaming into targeted MSI packages
    pub slipstream: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExePackageSymbol {
    pub detection_type: ExeDetectionType,
    pub detect_condition: Option<String>,
    pub install_command: Option<String>,
    pub repair_command: Option<String>,
    pub uninstall_command: Option<String>,
    pub protocol: Option<String>,
    pub repairable: bool,
    pub arp_id: Option<String>,
    pub arp_display_version: Option<String>,
    pub arp_win64: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MsuPackageSymbol {
    pub detect_condition: Option<String>,
    pub msu_kb: Option<String>,
}

/// Child bundle chained as a package
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BundlePackageSymbol {
    pub bundle_code: Option<String>,
    pub upgrade_code: Option<String>,
    pub engine_version: Option<String>,
    pub version: Option<String>,
    pub install_command: Option<String>,
    pub repair_command: Option<String>,
    pub uninstall_command: Option<String>,
    pub supports_burn_protocol: bool,
    pub win64: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PayloadSymbol {
    pub name: String,
    pub source_file: Option<String>,
    pub download_url: Option<String>,
    pub compressed: Option<bool>,
    pub unresolved_source_file: Option<String>,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub file_size: Option<u64>,
    pub hash: Option<String>,
    pub version: Option<String>,
    pub container_ref: Option<String>,
    pub content_file: bool,
    pub embedded_id: Option<String>,
    pub packaging: PackagingType,
    pub layout_only: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerSymbol {
    pub name: String,
    pub container_type: ContainerType,
    pub download_url: Option<String>,
    pub hash: Option<String>,
    pub size: Option<u64>,
    pub attached_container_index: Option<u32>,
    pub working_path: Option<String>,
}

/// Parent/child membership row
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupSymbol {
    pub parent_type: ComplexReferenceType,
    pub parent_id: String,
    pub child_type: ComplexReferenceType,
    pub child_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RollbackBoundarySymbol {
    pub vital: bool,
    pub transaction: bool,
    pub log_path_variable: Option<String>,
}

impl Default for RollbackBoundarySymbol {
    fn default() -> Self {
        Self {
            vital: true,
            transaction: false,
            log_path_variable: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelatedBundleSymbol {
    pub bundle_code: String,
    pub action: RelatedBundleAction,
}

/// Authored dependency provider; a missing parent means the bundle itself
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DependencyProviderSymbol {
    pub parent_ref: Option<String>,
    pub provider_key: Option<String>,
    pub version: Option<String>,
    pub display_name: Option<String>,
    pub imported: bool,
}

/// Provider discovered by inspecting a package payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestedDependencyProviderSymbol {
    pub package_ref: String,
    pub provider_key: String,
    pub version: Option<String>,
    pub display_name: Option<String>,
    pub attributes: i32,
}

/// What a search inspects
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "search")]
pub enum SearchKind {
    File {
        path: String,
        result: String,
    },
    Registry {
        root: String,
        key: String,
        value: Option<String>,
        result: String,
        win64: bool,
        expand: bool,
    },
    MsiComponent {
        component_id: String,
        product_code: Option<String>,
        result: String,
    },
    MsiProduct {
        guid: String,
        guid_type: String,
        result: String,
    },
    SetVariable {
        value: Option<String>,
        value_type: Option<String>,
    },
    Extension {
        extension_id: String,
        data: Option<String>,
    },
}

impl SearchKind {
    pub fn element_name(&self) -> &str {
        match self {
            SearchKind::File { .. } => "FileSearch",
            SearchKind::Registry { .. } => "RegistrySearch",
            SearchKind::MsiComponent { .. } => "MsiComponentSearch",
            SearchKind::MsiProduct { .. } => "MsiProductSearch",
            SearchKind::SetVariable { .. } => "SetVariable",
            SearchKind::Extension { .. } => "ExtensionSearch",
        }
    }
}

impl Default for SearchKind {
    fn default() -> Self {
        SearchKind::SetVariable {
            value: None,
            value_type: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSymbol {
    pub variable: Option<String>,
    pub condition: Option<String>,
    pub kind: SearchKind,
}

/// The child search runs after its parent search
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchRelationSymbol {
    pub search_ref: String,
    pub parent_search_ref: String,
    pub only_if_parent: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BundleExtensionSymbol {
    pub payload_ref: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VariableSymbol {
    pub value: Option<String>,
    pub value_type: VariableType,
    pub hidden: bool,
    pub persisted: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MsiFeatureSymbol {
    pub package_ref: String,
    pub name: String,
    pub parent: Option<String>,
    pub size: i64,
    pub title: Option<String>,
    pub description: Option<String>,
    pub display: i32,
    pub level: i32,
    pub directory: Option<String>,
    pub attributes: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MsiPropertySymbol {
    pub package_ref: String,
    pub name: String,
    pub value: String,
    pub condition: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SlipstreamMspSymbol {
    pub target_package_ref: String,
    pub msp_package_ref: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchTargetCodeSymbol {
    pub package_ref: String,
    pub target_code: String,
    pub target_type: PatchTargetType,
}

/// Upgrade relationship harvested from a package
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelatedPackageSymbol {
    pub package_ref: String,
    pub related_id: String,
    pub min_version: Option<String>,
    pub max_version: Option<String>,
    pub languages: Vec<String>,
    pub min_inclusive: bool,
    pub max_inclusive: bool,
    pub only_detect: bool,
    pub lang_inclusive: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SoftwareTagSymbol {
    pub filename: String,
    pub regid: String,
    pub name: Option<String>,
    pub install_path: Option<String>,
    /// Generated tag document
    pub xml: Option<String>,
}
