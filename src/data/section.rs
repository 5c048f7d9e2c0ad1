// src/data/section.rs

//! Symbol arena and intermediate container
//!
//! A section is a flat, append-only arena of symbols. Lookups by id are done
//! through indexes built fresh after each mutation phase; indexes into the
//! arena stay valid because symbols are never removed.

use super::source::SourceLineNumber;
use super::symbols::*;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Typed payload of a symbol
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SymbolData {
    Bundle(BundleSymbol),
    BootstrapperApplication(BootstrapperApplicationSymbol),
    Chain(ChainSymbol),
    Package(PackageSymbol),
    MsiPackage(MsiPackageSymbol),
    MspPackage(MspPackageSymbol),
    ExePackage(ExePackageSymbol),
    MsuPackage(MsuPackageSymbol),
    BundlePackage(BundlePackageSymbol),
    Payload(PayloadSymbol),
    Container(ContainerSymbol),
    Group(GroupSymbol),
    RollbackBoundary(RollbackBoundarySymbol),
    RelatedBundle(RelatedBundleSymbol),
    DependencyProvider(DependencyProviderSymbol),
    HarvestedDependencyProvider(HarvestedDependencyProviderSymbol),
    Search(SearchSymbol),
    SearchRelation(SearchRelationSymbol),
    BundleExtension(BundleExtensionSymbol),
    Variable(VariableSymbol),
    MsiFeature(MsiFeatureSymbol),
    MsiProperty(MsiPropertySymbol),
    SlipstreamMsp(SlipstreamMspSymbol),
    PatchTargetCode(PatchTargetCodeSymbol),
    RelatedPackage(RelatedPackageSymbol),
    SoftwareTag(SoftwareTagSymbol),
}

/// A symbol: optional id, provenance and typed data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symbol {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_line: Option<SourceLineNumber>,
    #[serde(flatten)]
    pub data: SymbolData,
}

impl Symbol {
    pub fn id(&self) -> &str {
        self.id.as_deref().unwrap_or("")
    }

    pub fn kind_name(&self) -> &'static str {
        macro_rules! names {
            ($($variant:ident),*) => {
                match &self.data {
                    $(SymbolData::$variant(_) => stringify!($variant),)*
                }
            };
        }
        names!(
            Bundle, BootstrapperApplication, Chain, Package, MsiPackage, MspPackage, ExePackage,
            MsuPackage, BundlePackage, Payload, Container, Group, RollbackBoundary, RelatedBundle,
            DependencyProvider, HarvestedDependencyProvider, Search, SearchRelation,
            BundleExtension, Variable, MsiFeature, MsiProperty, SlipstreamMsp, PatchTargetCode,
            RelatedPackage, SoftwareTag
        )
    }
}

/// Access to one variant of [`SymbolData`]
pub trait SymbolKind: Sized {
    const NAME: &'static str;
    fn from_data(data: &SymbolData) -> Option<&Self>;
    fn from_data_mut(data: &mut SymbolData) -> Option<&mut Self>;
    fn into_data(self) -> SymbolData;
}

macro_rules! symbol_kinds {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl SymbolKind for $ty {
                const NAME: &'static str = stringify!($variant);

                fn from_data(data: &SymbolData) -> Option<&Self> {
                    match data {
                        SymbolData::$variant(s) => Some(s),
                        _ => None,
                    }
                }

                fn from_data_mut(data: &mut SymbolData) -> Option<&mut Self> {
                    match data {
                        SymbolData::$variant(s) => Some(s),
                        _ => None,
                    }
                }

                fn into_data(self) -> SymbolData {
                    SymbolData::$variant(self)
                }
            }
        )*
    };
}

symbol_kinds! {
    Bundle => BundleSymbol,
    BootstrapperApplication => BootstrapperApplicationSymbol,
    Chain => ChainSymbol,
    Package => PackageSymbol,
    MsiPackage => MsiPackageSymbol,
    MspPackage => MspPackageSymbol,
    ExePackage => ExePackageSymbol,
    MsuPackage => MsuPackageSymbol,
    BundlePackage => BundlePackageSymbol,
    Payload => PayloadSymbol,
    Container => ContainerSymbol,
    Group => GroupSymbol,
    RollbackBoundary => RollbackBoundarySymbol,
    RelatedBundle => RelatedBundleSymbol,
    DependencyProvider => DependencyProviderSymbol,
    HarvestedDependencyProvider => HarvestedDependencyProviderSymbol,
    Search => SearchSymbol,
    SearchRelation => SearchRelationSymbol,
    BundleExtension => BundleExtensionSymbol,
    Variable => VariableSymbol,
    MsiFeature => MsiFeatureSymbol,
    MsiProperty => MsiPropertySymbol,
    SlipstreamMsp => SlipstreamMspSymbol,
    PatchTargetCode => PatchTargetCodeSymbol,
    RelatedPackage => RelatedPackageSymbol,
    SoftwareTag => SoftwareTagSymbol,
}

/// A field whose value is only known after package processing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayedField {
    /// Variant name of the owning symbol (`Bundle`, `Variable`, ...)
    pub symbol_type: String,
    pub symbol_id: Option<String>,
    /// Field name in the symbol's data
    pub field: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SectionType {
    #[default]
    Bundle,
    Product,
    Module,
    Patch,
    Fragment,
}

/// Flat arena of symbols produced by the linker
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntermediateSection {
    pub id: String,
    #[serde(default)]
    pub section_type: SectionType,
    #[serde(default)]
    pub symbols: Vec<Symbol>,
    #[serde(default)]
    pub delayed_fields: Vec<DelayedField>,
}

impl IntermediateSection {
    pub fn new(id: &str, section_type: SectionType) -> Self {
        Self {
            id: id.to_string(),
            section_type,
            symbols: Vec::new(),
            delayed_fields: Vec::new(),
        }
    }

    /// Append a symbol, returning its arena index
    pub fn add<T: SymbolKind>(
        &mut self,
        id: Option<&str>,
        source_line: Option<SourceLineNumber>,
        data: T,
    ) -> usize {
        self.symbols.push(Symbol {
            id: id.map(str::to_string),
            source_line,
            data: data.into_data(),
        });
        self.symbols.len() - 1
    }

    pub fn symbol(&self, index: usize) -> &Symbol {
        &self.symbols[index]
    }

    pub fn symbol_mut(&mut self, index: usize) -> &mut Symbol {
        &mut self.symbols[index]
    }

    /// Typed data at an arena index
    pub fn get<T: SymbolKind>(&self, index: usize) -> Option<&T> {
        self.symbols.get(index).and_then(|s| T::from_data(&s.data))
    }

    pub fn get_mut<T: SymbolKind>(&mut self, index: usize) -> Option<&mut T> {
        self.symbols
            .get_mut(index)
            .and_then(|s| T::from_data_mut(&mut s.data))
    }

    /// Every symbol of one kind with its arena index, in authoring order
    pub fn iter<'a, T: SymbolKind + 'a>(&'a self) -> impl Iterator<Item = (usize, &'a Symbol, &'a T)> {
        self.symbols
            .iter()
            .enumerate()
            .filter_map(|(i, s)| T::from_data(&s.data).map(|d| (i, s, d)))
    }

    /// Arena indexes of every symbol of one kind
    pub fn indexes<T: SymbolKind>(&self) -> Vec<usize> {
        self.iter::<T>().map(|(i, _, _)| i).collect()
    }

    pub fn count<T: SymbolKind>(&self) -> usize {
        self.iter::<T>().count()
    }

    /// Find a symbol of one kind by id
    pub fn find<T: SymbolKind>(&self, id: &str) -> Option<(usize, &T)> {
        self.iter::<T>()
            .find(|(_, s, _)| s.id.as_deref() == Some(id))
            .map(|(i, _, d)| (i, d))
    }

    /// Build an id → arena index map for one kind
    pub fn index_by_id<T: SymbolKind>(&self) -> HashMap<String, usize> {
        self.iter::<T>()
            .filter_map(|(i, s, _)| s.id.clone().map(|id| (id, i)))
            .collect()
    }

    /// Replace a named string field of a symbol
    ///
    /// Used for delayed fields, whose owning symbol type is only known by
    /// name at resolution time.
    pub fn set_string_field(&mut self, index: usize, field: &str, value: &str) -> Result<()> {
        let symbol = &mut self.symbols[index];
        let mut json = serde_json::to_value(&symbol.data)?;
        let object = json.as_object_mut().ok_or_else(|| {
            Error::SerializationError(format!("Symbol {} is not an object", symbol.id()))
        })?;
        if !object.contains_key(field) {
            return Err(Error::NotFound(format!(
                "Field {} on {} symbol {}",
                field,
                symbol.kind_name(),
                symbol.id()
            )));
        }
        object.insert(field.to_string(), serde_json::Value::String(value.to_string()));
        symbol.data = serde_json::from_value(json)?;
        Ok(())
    }

    /// Read a named string field of a symbol
    pub fn string_field(&self, index: usize, field: &str) -> Result<Option<String>> {
        let symbol = &self.symbols[index];
        let json = serde_json::to_value(&symbol.data)?;
        Ok(json
            .get(field)
            .and_then(|v| v.as_str())
            .map(str::to_string))
    }
}

/// Output of the linker: one or more sections
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Intermediate {
    pub id: String,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub sections: Vec<IntermediateSection>,
}

impl Intermediate {
    pub fn new(id: &str, sections: Vec<IntermediateSection>) -> Self {
        Self {
            id: id.to_string(),
            level: None,
            sections,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_find() {
        let mut section = IntermediateSection::new("Bundle", SectionType::Bundle);
        let index = section.add(
            Some("Payload1"),
            None,
            PayloadSymbol {
                name: "setup.msi".to_string(),
                ..Default::default()
            },
        );
        section.add(None, None, ChainSymbol::default());

        let (found, payload) = section.find::<PayloadSymbol>("Payload1").unwrap();
        assert_eq!(found, index);
        assert_eq!(payload.name, "setup.msi");
        assert!(section.find::<ContainerSymbol>("Payload1").is_none());
        assert_eq!(section.count::<ChainSymbol>(), 1);
        assert_eq!(section.symbol(index).kind_name(), "Payload");
    }

    #[test]
    fn test_set_string_field() {
        let mut section = IntermediateSection::new("Bundle", SectionType::Bundle);
        let index = section.add(
            None,
            None,
            BundleSymbol {
                version: "!(bind.packageVersion.Msi)".to_string(),
                ..Default::default()
            },
        );
        section.set_string_field(index, "version", "1.2.3.4").unwrap();
        assert_eq!(section.get::<BundleSymbol>(index).unwrap().version, "1.2.3.4");
        assert!(section.set_string_field(index, "nonexistent", "x").is_err());
    }

    #[test]
    fn test_json_round_trip_keeps_kind() {
        let mut section = IntermediateSection::new("Bundle", SectionType::Bundle);
        section.add(
            Some("Msi"),
            Some(SourceLineNumber::new("bundle.wxs", 3)),
            PackageSymbol {
                package_type: PackageType::Msi,
                payload_ref: "Msi".to_string(),
                ..Default::default()
            },
        );
        let intermediate = Intermediate::new("test", vec![section]);
        let json = intermediate.to_json().unwrap();
        let loaded = Intermediate::parse(&json).unwrap();
        let (_, package) = loaded.sections[0].find::<PackageSymbol>("Msi").unwrap();
        assert_eq!(package.package_type, PackageType::Msi);
        assert!(package.vital);
    }
}
