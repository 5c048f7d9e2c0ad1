// src/context.rs

//! State threaded through a bind: cancellation and side-effect records
//!
//! Every file a binder creates is reported as a [`TrackedFile`], every file
//! it wants copied or moved into place as a [`FileTransfer`]. Those lists are
//! the only way side effects reach layout and cleanup, so they are kept even
//! when a bind fails or is cancelled part way.

use crate::data::SourceLineNumber;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cooperative cancellation shared by every stage of a bind
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Fail with [`Error::Cancelled`] once cancellation was requested
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackedFileType {
    /// Scratch file the caller may delete after the bind
    Temporary,
    BuiltTargetOutput,
    BuiltPdbOutput,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedFile {
    pub path: PathBuf,
    pub source_line: Option<SourceLineNumber>,
    pub file_type: TrackedFileType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTransfer {
    pub source: PathBuf,
    pub destination: PathBuf,
    /// Move rather than copy
    pub move_file: bool,
    /// Source and destination are the same file; nothing to do
    pub redundant: bool,
    pub source_line: Option<SourceLineNumber>,
}

impl FileTransfer {
    pub fn new(
        source: &Path,
        destination: &Path,
        move_file: bool,
        source_line: Option<SourceLineNumber>,
    ) -> Self {
        let redundant = same_path(source, destination);
        Self {
            source: source.to_path_buf(),
            destination: destination.to_path_buf(),
            move_file,
            redundant,
            source_line,
        }
    }
}

fn same_path(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Append-only record of a bind's side effects
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BindOutputs {
    pub tracked_files: Vec<TrackedFile>,
    pub file_transfers: Vec<FileTransfer>,
}

impl BindOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a file the bind created and return its path
    pub fn track(
        &mut self,
        path: impl Into<PathBuf>,
        file_type: TrackedFileType,
        source_line: Option<&SourceLineNumber>,
    ) -> PathBuf {
        let path = path.into();
        self.tracked_files.push(TrackedFile {
            path: path.clone(),
            source_line: source_line.cloned(),
            file_type,
        });
        path
    }

    pub fn transfer(&mut self, transfer: FileTransfer) {
        self.file_transfers.push(transfer);
    }

    pub fn tracked(&self, file_type: TrackedFileType) -> impl Iterator<Item = &TrackedFile> {
        self.tracked_files
            .iter()
            .filter(move |f| f.file_type == file_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_is_shared() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(token.check().is_ok());
        clone.cancel();
        assert!(matches!(token.check(), Err(Error::Cancelled)));
    }

    #[test]
    fn test_redundant_transfer() {
        let temp = tempfile::TempDir::new().unwrap();
        let file = temp.path().join("a.txt");
        std::fs::write(&file, b"a").unwrap();
        assert!(FileTransfer::new(&file, &file, false, None).redundant);
        assert!(!FileTransfer::new(&file, &temp.path().join("b.txt"), true, None).redundant);
    }

    #[test]
    fn test_track_by_type() {
        let mut outputs = BindOutputs::new();
        outputs.track("a.xml", TrackedFileType::Temporary, None);
        outputs.track("out.exe", TrackedFileType::BuiltTargetOutput, None);
        assert_eq!(outputs.tracked(TrackedFileType::Temporary).count(), 1);
        assert_eq!(outputs.tracked_files.len(), 2);
    }
}
