// src/data/registry.rs

//! Built-in installer table definitions and extension registration
//!
//! The registry is consulted by the unbinder before it falls back to
//! introspecting a live table, and by transform reconstruction to synthesize
//! a schema database containing every known table.

use super::column::{ColumnCategory as Cat, ColumnDefinition as Col, ColumnModularizeType as Modularize};
use super::table::TableDefinition;
use std::collections::{BTreeSet, HashMap};

/// Table schemas and custom action references contributed by an extension
#[derive(Debug, Clone, Default)]
pub struct ExtensionTables {
    pub extension_id: String,
    pub tables: Vec<TableDefinition>,
    pub custom_actions: Vec<String>,
}

/// Ordered set of table definitions, looked up by name
#[derive(Debug, Clone, Default)]
pub struct TableDefinitionCollection {
    definitions: Vec<TableDefinition>,
    by_name: HashMap<String, usize>,
    custom_actions: BTreeSet<String>,
}

impl TableDefinitionCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collection holding every built-in table
    pub fn builtin() -> Self {
        let mut collection = Self::new();
        for definition in builtin_definitions() {
            collection.add(definition);
        }
        collection
    }

    /// Add or replace a definition
    pub fn add(&mut self, definition: TableDefinition) {
        match self.by_name.get(&definition.name) {
            Some(&index) => self.definitions[index] = definition,
            None => {
                self.by_name
                    .insert(definition.name.clone(), self.definitions.len());
                self.definitions.push(definition);
            }
        }
    }

    /// Register the tables and custom actions of an extension
    pub fn register_extension(&mut self, extension: ExtensionTables) {
        tracing::debug!(
            "Registering {} tables from extension {}",
            extension.tables.len(),
            extension.extension_id
        );
        for definition in extension.tables {
            self.add(definition);
        }
        self.custom_actions.extend(extension.custom_actions);
    }

    pub fn get(&self, name: &str) -> Option<&TableDefinition> {
        self.by_name.get(name).map(|&i| &self.definitions[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TableDefinition> {
        self.definitions.iter()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn is_extension_custom_action(&self, action: &str) -> bool {
        self.custom_actions.contains(action)
    }
}

fn identifier(name: &str, length: u32) -> Col {
    Col::string(name, length)
        .category(Cat::Identifier)
        .modularize(Modularize::Column)
}

fn sequence_table(name: &str) -> TableDefinition {
    TableDefinition::new(
        name,
        vec![
            identifier("Action", 72).primary_key(),
            Col::string("Condition", 255)
                .nullable()
                .category(Cat::Condition)
                .modularize(Modularize::Condition),
            Col::number("Sequence", 2).nullable().range(-4, 32767),
        ],
    )
    .with_symbol("WixAction")
}

fn builtin_definitions() -> Vec<TableDefinition> {
    vec![
        TableDefinition::new(
            "_Validation",
            vec![
                Col::string("Table", 32).primary_key().category(Cat::Identifier),
                Col::string("Column", 32).primary_key().category(Cat::Identifier),
                Col::string("Nullable", 4).set("Y;N"),
                Col::number("MinValue", 4).nullable(),
                Col::number("MaxValue", 4).nullable(),
                Col::string("KeyTable", 255).nullable().category(Cat::Identifier),
                Col::number("KeyColumn", 2).nullable().range(1, 32),
                Col::string("Category", 32).nullable(),
                Col::string("Set", 255).nullable(),
                Col::string("Description", 255).nullable(),
            ],
        ),
        TableDefinition::new(
            "_Streams",
            vec![
                Col::string("Name", 62).primary_key(),
                Col::object("Data").nullable(),
            ],
        )
        .unreal(),
        TableDefinition::new(
            "_SummaryInformation",
            vec![
                Col::number("PropertyId", 2).primary_key(),
                Col::localized("Value", 255),
            ],
        )
        .unreal(),
        TableDefinition::new(
            "Property",
            vec![
                identifier("Property", 72).primary_key(),
                Col::localized("Value", 0),
            ],
        )
        .with_symbol("Property"),
        TableDefinition::new(
            "Directory",
            vec![
                identifier("Directory", 72).primary_key(),
                identifier("Directory_Parent", 72).nullable().key("Directory", 1),
                Col::localized("DefaultDir", 255).category(Cat::DefaultDir),
            ],
        )
        .with_symbol("Directory"),
        TableDefinition::new(
            "Component",
            vec![
                identifier("Component", 72).primary_key(),
                Col::string("ComponentId", 38).nullable().category(Cat::Guid),
                identifier("Directory_", 72).key("Directory", 1),
                Col::number("Attributes", 2),
                Col::string("Condition", 255)
                    .nullable()
                    .category(Cat::Condition)
                    .modularize(Modularize::Condition),
                identifier("KeyPath", 72).nullable(),
            ],
        )
        .with_symbol("Component"),
        TableDefinition::new(
            "Feature",
            vec![
                Col::string("Feature", 38).primary_key().category(Cat::Identifier),
                Col::string("Feature_Parent", 38)
                    .nullable()
                    .category(Cat::Identifier)
                    .key("Feature", 1),
                Col::localized("Title", 64).nullable(),
                Col::localized("Description", 255).nullable(),
                Col::number("Display", 2).nullable().range(0, 32767),
                Col::number("Level", 2).range(0, 32767),
                identifier("Directory_", 72).nullable().key("Directory", 1),
                Col::number("Attributes", 2),
            ],
        )
        .with_symbol("Feature"),
        TableDefinition::new(
            "FeatureComponents",
            vec![
                Col::string("Feature_", 38)
                    .primary_key()
                    .category(Cat::Identifier)
                    .key("Feature", 1),
                identifier("Component_", 72).primary_key().key("Component", 1),
            ],
        )
        .with_symbol("FeatureComponents"),
        TableDefinition::new(
            "File",
            vec![
                identifier("File", 72).primary_key(),
                identifier("Component_", 72).key("Component", 1),
                Col::localized("FileName", 255).category(Cat::Filename),
                Col::number("FileSize", 4).range(0, i32::MAX as i64),
                Col::string("Version", 72)
                    .nullable()
                    .category(Cat::Version)
                    .key("File", 1)
                    .modularize(Modularize::CompanionFile),
                Col::string("Language", 20).nullable().category(Cat::Language),
                Col::number("Attributes", 2).nullable().range(0, 32767),
                Col::number("Sequence", 4).range(1, i32::MAX as i64),
            ],
        )
        .with_symbol("File"),
        TableDefinition::new(
            "Media",
            vec![
                Col::number("DiskId", 2).primary_key().range(1, 32767),
                Col::number("LastSequence", 4).range(0, i32::MAX as i64),
                Col::localized("DiskPrompt", 64).nullable(),
                Col::string("Cabinet", 255).nullable().category(Cat::Cabinet),
                Col::string("VolumeLabel", 32).nullable(),
                Col::string("Source", 72).nullable().category(Cat::Property),
            ],
        )
        .with_symbol("Media"),
        TableDefinition::new(
            "Binary",
            vec![identifier("Name", 72).primary_key(), Col::object("Data")],
        )
        .with_symbol("Binary"),
        TableDefinition::new(
            "Icon",
            vec![
                Col::string("Name", 72)
                    .primary_key()
                    .category(Cat::Identifier)
                    .modularize(Modularize::Icon),
                Col::object("Data"),
            ],
        )
        .with_symbol("Icon"),
        TableDefinition::new(
            "Registry",
            vec![
                identifier("Registry", 72).primary_key(),
                Col::number("Root", 2).range(-1, 3),
                Col::localized("Key", 255)
                    .category(Cat::RegPath)
                    .modularize(Modularize::Property),
                Col::localized("Name", 255)
                    .nullable()
                    .category(Cat::Formatted)
                    .modularize(Modularize::Property),
                Col::localized("Value", 0)
                    .nullable()
                    .category(Cat::Formatted)
                    .modularize(Modularize::Property),
                identifier("Component_", 72).key("Component", 1),
            ],
        )
        .with_symbol("Registry"),
        TableDefinition::new(
            "CustomAction",
            vec![
                identifier("Action", 72).primary_key(),
                Col::number("Type", 2).range(1, 32767),
                Col::string("Source", 72)
                    .nullable()
                    .category(Cat::CustomSource)
                    .modularize(Modularize::Column),
                Col::string("Target", 255)
                    .nullable()
                    .category(Cat::Formatted)
                    .modularize(Modularize::Property),
                Col::number("ExtendedType", 4).nullable(),
            ],
        )
        .with_symbol("CustomAction"),
        sequence_table("InstallExecuteSequence"),
        sequence_table("InstallUISequence"),
        sequence_table("AdminExecuteSequence"),
        sequence_table("AdminUISequence"),
        sequence_table("AdvtExecuteSequence"),
        TableDefinition::new(
            "Upgrade",
            vec![
                Col::string("UpgradeCode", 38).primary_key().category(Cat::Guid),
                Col::string("VersionMin", 20)
                    .primary_key()
                    .nullable()
                    .category(Cat::Text),
                Col::string("VersionMax", 20)
                    .primary_key()
                    .nullable()
                    .category(Cat::Text),
                Col::string("Language", 255)
                    .primary_key()
                    .nullable()
                    .category(Cat::Language),
                Col::number("Attributes", 4).primary_key().range(0, 2_147_483_647),
                Col::string("Remove", 255).nullable().category(Cat::Formatted),
                Col::string("ActionProperty", 72).category(Cat::UpperCase),
            ],
        )
        .with_symbol("Upgrade"),
        TableDefinition::new(
            "Shortcut",
            vec![
                identifier("Shortcut", 72).primary_key(),
                identifier("Directory_", 72).key("Directory", 1),
                Col::localized("Name", 128).category(Cat::Filename),
                identifier("Component_", 72).key("Component", 1),
                Col::string("Target", 72).category(Cat::Shortcut),
                Col::string("Arguments", 255)
                    .nullable()
                    .category(Cat::Formatted)
                    .modularize(Modularize::Property),
                Col::localized("Description", 255).nullable(),
                Col::number("Hotkey", 2).nullable().range(0, 32767),
                Col::string("Icon_", 72)
                    .nullable()
                    .category(Cat::Identifier)
                    .key("Icon", 1)
                    .modularize(Modularize::Icon),
                Col::number("IconIndex", 2).nullable().range(-32767, 32767),
                Col::number("ShowCmd", 2).nullable().set("1;3;7"),
                identifier("WkDir", 72).nullable(),
            ],
        )
        .with_symbol("Shortcut"),
        TableDefinition::new(
            "MsiFileHash",
            vec![
                identifier("File_", 72).primary_key().key("File", 1),
                Col::number("Options", 2).range(0, 0),
                Col::number("HashPart1", 4),
                Col::number("HashPart2", 4),
                Col::number("HashPart3", 4),
                Col::number("HashPart4", 4),
            ],
        )
        .with_symbol("MsiFileHash"),
        TableDefinition::new(
            "LaunchCondition",
            vec![
                Col::string("Condition", 255)
                    .primary_key()
                    .category(Cat::Condition)
                    .modularize(Modularize::Condition),
                Col::localized("Description", 255).category(Cat::Formatted),
            ],
        )
        .with_symbol("LaunchCondition"),
        TableDefinition::new(
            "Condition",
            vec![
                Col::string("Feature_", 38)
                    .primary_key()
                    .category(Cat::Identifier)
                    .key("Feature", 1),
                Col::number("Level", 2).primary_key().range(0, 32767),
                Col::string("Condition", 255)
                    .nullable()
                    .category(Cat::Condition)
                    .modularize(Modularize::Condition),
            ],
        ),
        TableDefinition::new(
            "ModuleSignature",
            vec![
                Col::string("ModuleID", 72).primary_key().category(Cat::Identifier),
                Col::number("Language", 2).primary_key(),
                Col::string("Version", 32).category(Cat::Version),
            ],
        )
        .with_symbol("WixModule"),
        TableDefinition::new(
            "ModuleComponents",
            vec![
                identifier("Component", 72).primary_key().key("Component", 1),
                Col::string("ModuleID", 72).primary_key().category(Cat::Identifier),
                Col::number("Language", 2).primary_key(),
            ],
        ),
        TableDefinition::new(
            "Patch",
            vec![
                identifier("File_", 72).primary_key().key("File", 1),
                Col::number("Sequence", 4).primary_key().range(0, i32::MAX as i64),
                Col::number("PatchSize", 4).range(0, i32::MAX as i64),
                Col::number("Attributes", 2).range(0, 1),
                Col::object("Header").nullable(),
                Col::string("StreamRef_", 72).nullable().category(Cat::Identifier),
            ],
        ),
        TableDefinition::new(
            "PatchPackage",
            vec![
                Col::string("PatchId", 38).primary_key().category(Cat::Guid),
                Col::number("Media_", 2).range(0, 32767),
            ],
        ),
        TableDefinition::new(
            "MsiPatchMetadata",
            vec![
                Col::string("Company", 72).primary_key().nullable(),
                Col::string("Property", 72).primary_key(),
                Col::localized("Value", 0).nullable(),
            ],
        ),
        TableDefinition::new(
            "MsiPatchSequence",
            vec![
                Col::string("PatchFamily", 72).primary_key().category(Cat::Identifier),
                Col::string("ProductCode", 38)
                    .primary_key()
                    .nullable()
                    .category(Cat::Guid),
                Col::string("Sequence", 72).category(Cat::Version),
                Col::number("Attributes", 4).nullable(),
            ],
        ),
        TableDefinition::new(
            "WixDependencyProvider",
            vec![
                identifier("WixDependencyProvider", 72).primary_key(),
                identifier("Component_", 72).key("Component", 1),
                Col::string("ProviderKey", 255),
                Col::string("Version", 72).nullable().category(Cat::Version),
                Col::string("DisplayName", 255).nullable(),
                Col::number("Attributes", 4).nullable(),
            ],
        )
        .with_symbol("WixDependencyProvider"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::column::{ColumnDefinition, ColumnType};

    #[test]
    fn test_builtin_has_core_tables() {
        let tables = TableDefinitionCollection::builtin();
        for name in ["File", "Media", "Directory", "_Validation", "Property", "Patch"] {
            assert!(tables.contains(name), "missing {name}");
        }
        assert!(tables.get("_Streams").unwrap().unreal);
        assert!(!tables.get("File").unwrap().unreal);
    }

    #[test]
    fn test_every_builtin_table_has_primary_key() {
        for definition in TableDefinitionCollection::builtin().iter() {
            assert!(
                !definition.primary_key_indexes().is_empty(),
                "{} has no primary key",
                definition.name
            );
        }
    }

    #[test]
    fn test_register_extension() {
        let mut tables = TableDefinitionCollection::builtin();
        let before = tables.len();
        tables.register_extension(ExtensionTables {
            extension_id: "Http".to_string(),
            tables: vec![TableDefinition::new(
                "WixHttpUrlReservation",
                vec![
                    ColumnDefinition::string("WixHttpUrlReservation", 72).primary_key(),
                    ColumnDefinition::number("HandleExisting", 4),
                ],
            )],
            custom_actions: vec!["Wix4SchedHttpUrlReservationsInstall_X86".to_string()],
        });
        assert_eq!(tables.len(), before + 1);
        let table = tables.get("WixHttpUrlReservation").unwrap();
        assert_eq!(table.columns[1].column_type, ColumnType::Number);
        assert!(tables.is_extension_custom_action("Wix4SchedHttpUrlReservationsInstall_X86"));
        assert!(!tables.is_extension_custom_action("Other"));
    }
}
