// src/unbind/directories.rs

//! Resolve Directory rows into relative paths
//!
//! `Directory.DefaultDir` holds `target[:source]` where each side is
//! `short|long` or a single name. `.` means "same folder as the parent".

use crate::data::WindowsInstallerData;
use std::collections::HashMap;
use std::path::PathBuf;

/// Short and optional long form of one name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamePair {
    pub short: String,
    pub long: Option<String>,
}

impl NamePair {
    /// Parse `short|long` or a single name
    pub fn parse(value: &str) -> Self {
        match value.split_once('|') {
            Some((short, long)) => Self {
                short: short.to_string(),
                long: Some(long.to_string()),
            },
            None => Self {
                short: value.to_string(),
                long: None,
            },
        }
    }

    pub fn pick(&self, long_names: bool) -> &str {
        match &self.long {
            Some(long) if long_names => long,
            _ => &self.short,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct DirectoryEntry {
    parent: Option<String>,
    target: NamePair,
    source: NamePair,
}

/// Split `target[:source]`
pub fn parse_default_dir(value: &str) -> (NamePair, NamePair) {
    match value.split_once(':') {
        Some((target, source)) => (NamePair::parse(target), NamePair::parse(source)),
        None => {
            let names = NamePair::parse(value);
            (names.clone(), names)
        }
    }
}

/// Which side of `DefaultDir` to compose paths from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryLayout {
    Source,
    Target,
}

pub struct DirectoryResolver {
    entries: HashMap<String, DirectoryEntry>,
    long_names: bool,
}

impl DirectoryResolver {
    pub fn new(data: &WindowsInstallerData, long_names: bool) -> Self {
        let mut entries = HashMap::new();
        if let Some(table) = data.table("Directory") {
            let definition = &table.definition;
            for row in &table.rows {
                let Ok(Some(id)) = row.string(definition, "Directory") else {
                    continue;
                };
                let parent = row
                    .string(definition, "Directory_Parent")
                    .ok()
                    .flatten()
                    .filter(|p| !p.is_empty() && *p != id)
                    .map(str::to_string);
                let default_dir = row
                    .string(definition, "DefaultDir")
                    .ok()
                    .flatten()
                    .unwrap_or(".");
                let (target, source) = parse_default_dir(default_dir);
                entries.insert(
                    id.to_string(),
                    DirectoryEntry {
                        parent,
                        target,
                        source,
                    },
                );
            }
        }
        Self {
            entries,
            long_names,
        }
    }

    /// Path of a directory relative to the root of the layout, or `None`
    /// when the directory (or one of its parents) is unknown or the chain
    /// loops
    pub fn path(&self, id: &str, layout: DirectoryLayout) -> Option<PathBuf> {
        let mut names = Vec::new();
        let mut current = Some(id);
        let mut steps = 0;

        while let Some(id) = current {
            steps += 1;
            if steps > self.entries.len() {
                return None;
            }
            let entry = self.entries.get(id)?;
            if entry.parent.is_none() {
                // The root stands for the layout folder itself
                break;
            }
            let name = match layout {
                DirectoryLayout::Source => entry.source.pick(self.long_names),
                DirectoryLayout::Target => entry.target.pick(self.long_names),
            };
            if name != "." && !name.is_empty() {
                names.push(name);
            }
            current = entry.parent.as_deref();
        }

        Some(names.iter().rev().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{FieldValue, TableDefinitionCollection};

    fn directories() -> WindowsInstallerData {
        let registry = TableDefinitionCollection::builtin();
        let mut data = WindowsInstallerData::default();
        let table = data.ensure_table(registry.get("Directory").unwrap());
        for (id, parent, default_dir) in [
            ("TARGETDIR", None, "SourceDir"),
            ("ProgramFilesFolder", Some("TARGETDIR"), "PFiles"),
            ("INSTALLDIR", Some("ProgramFilesFolder"), "MYAPP~1|My App:src"),
            ("BinDir", Some("INSTALLDIR"), "."),
        ] {
            table
                .add_row(
                    None,
                    vec![
                        FieldValue::String(id.into()),
                        parent.map_or(FieldValue::Null, |p| FieldValue::String(p.into())),
                        FieldValue::String(default_dir.into()),
                    ],
                )
                .unwrap();
        }
        data
    }

    #[test]
    fn test_parse_default_dir() {
        let (target, source) = parse_default_dir("MYAPP~1|My App:SRC~1|Source");
        assert_eq!(target.pick(true), "My App");
        assert_eq!(target.pick(false), "MYAPP~1");
        assert_eq!(source.pick(true), "Source");
    }

    #[test]
    fn test_source_and_target_paths() {
        let data = directories();
        let resolver = DirectoryResolver::new(&data, true);
        assert_eq!(
            resolver.path("BinDir", DirectoryLayout::Target),
            Some(PathBuf::from("PFiles").join("My App"))
        );
        assert_eq!(
            resolver.path("INSTALLDIR", DirectoryLayout::Source),
            Some(PathBuf::from("PFiles").join("src"))
        );
        assert_eq!(resolver.path("TARGETDIR", DirectoryLayout::Source), Some(PathBuf::new()));
        assert_eq!(resolver.path("Missing", DirectoryLayout::Source), None);
    }

    #[test]
    fn test_short_names() {
        let data = directories();
        let resolver = DirectoryResolver::new(&data, false);
        assert_eq!(
            resolver.path("INSTALLDIR", DirectoryLayout::Target),
            Some(PathBuf::from("PFiles").join("MYAPP~1"))
        );
    }
}
