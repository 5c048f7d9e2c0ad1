// src/unbind/extract.rs

//! Extract the cabinets referenced by the Media table

use crate::cabinet;
use crate::context::CancellationToken;
use crate::error::Result;
use crate::msi::Database;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Extracts every cabinet of a database into one folder
///
/// Embedded cabinets (`#name`) are read from the `_Streams` table and
/// written to the intermediate folder first; external cabinets are looked
/// up next to the database.
pub struct ExtractCabinetsCommand<'a> {
    db: &'a Database,
    intermediate_folder: PathBuf,
    extract_folder: PathBuf,
    cancellation: CancellationToken,
}

impl<'a> ExtractCabinetsCommand<'a> {
    pub fn new(db: &'a Database, intermediate_folder: &Path, extract_folder: &Path) -> Self {
        Self {
            db,
            intermediate_folder: intermediate_folder.to_path_buf(),
            extract_folder: extract_folder.to_path_buf(),
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Extract and return the cabinet path of each disk id
    pub fn execute(&self) -> Result<BTreeMap<i32, PathBuf>> {
        let mut extracted = BTreeMap::new();
        if !self.db.table_exists("Media")? {
            return Ok(extracted);
        }

        let database_folder = self
            .db
            .path()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let mut view = self
            .db
            .open_execute_view("SELECT `DiskId`, `Cabinet` FROM `Media` ORDER BY `DiskId`", None)?;
        while let Some(record) = view.fetch() {
            self.cancellation.check()?;
            let (Some(disk_id), Some(name)) = (record.get_integer(0), record.get_string(1)) else {
                continue;
            };

            let cabinet_path = match name.strip_prefix('#') {
                Some(stream) => {
                    let Some(data) = self.db.stream(stream)? else {
                        warn!("Embedded cabinet {} is missing from the database", stream);
                        continue;
                    };
                    fs::create_dir_all(&self.intermediate_folder)?;
                    let path = self.intermediate_folder.join(stream);
                    fs::write(&path, data)?;
                    path
                }
                None => database_folder.join(&name),
            };

            if !cabinet_path.exists() {
                warn!("Cabinet {} for disk {} not found", cabinet_path.display(), disk_id);
                continue;
            }

            let names = cabinet::extract_cabinet(&cabinet_path, &self.extract_folder)?;
            debug!("Disk {}: {} files from {}", disk_id, names.len(), cabinet_path.display());
            extracted.insert(disk_id, cabinet_path);
        }

        info!("Extracted {} cabinets to {}", extracted.len(), self.extract_folder.display());
        Ok(extracted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cabinet::CabinetEntry;
    use crate::config::CompressionLevel;
    use crate::data::TableDefinitionCollection;
    use crate::msi::Record;
    use tempfile::TempDir;

    #[test]
    fn test_extracts_embedded_and_external() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("a.txt");
        fs::write(&file, b"alpha").unwrap();
        let cab = temp.path().join("embedded.cab");
        cabinet::create_cabinet(&cab, &[CabinetEntry::new("FileA", &file)], CompressionLevel::Low)
            .unwrap();
        cabinet::create_cabinet(
            &temp.path().join("disk2.cab"),
            &[CabinetEntry::new("FileB", &file)],
            CompressionLevel::Low,
        )
        .unwrap();

        let db = Database::create(&temp.path().join("product.msi")).unwrap();
        let registry = TableDefinitionCollection::builtin();
        db.create_table(registry.get("Media").unwrap()).unwrap();
        for (disk, last, cabinet) in [(1, 1, "#embedded.cab"), (2, 2, "disk2.cab")] {
            let mut record = Record::new(6);
            record.set(0, disk);
            record.set(1, last);
            record.set(3, cabinet);
            db.insert_record("Media", &record).unwrap();
        }
        db.set_stream("embedded.cab", &fs::read(&cab).unwrap()).unwrap();

        let extract = temp.path().join("extract");
        let index = ExtractCabinetsCommand::new(&db, &temp.path().join("obj"), &extract)
            .execute()
            .unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index[&1], temp.path().join("obj").join("embedded.cab"));
        assert!(extract.join("FileA").exists());
        assert!(extract.join("FileB").exists());
    }
}
