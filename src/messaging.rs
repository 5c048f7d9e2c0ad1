// src/messaging.rs

//! Diagnostics collector threaded through every bind stage
//!
//! Stages record authoring problems here instead of returning early so that
//! as many problems as possible surface in one run. Drivers call
//! [`Messaging::encountered_error`] at every stage boundary and stop once it
//! reports true.

use crate::data::SourceLineNumber;
use std::fmt;
use tracing::{debug, error, warn};

/// Severity of a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MessageLevel {
    Verbose,
    Warning,
    Error,
}

impl MessageLevel {
    pub fn as_str(&self) -> &str {
        match self {
            MessageLevel::Verbose => "verbose",
            MessageLevel::Warning => "warning",
            MessageLevel::Error => "error",
        }
    }
}

/// Every diagnostic the binder can raise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageId {
    // Bundle structure
    MissingBundleInformation,
    MultipleSingletonSymbols,
    MissingBootstrapperApplicationPayloads,
    // Authoring
    IllegalGuid,
    InvalidBundleVersion,
    UnresolvedBindReference,
    InvalidSearchOrder,
    MissingPayloadSource,
    MissingPayloadContainer,
    InvalidMsiPackage,
    InvalidMspPackage,
    InvalidBundlePackage,
    InvalidExePackage,
    MissingPackagePayload,
    // Dependencies and scope
    DuplicateProviderDependencyKey,
    MultipleBundleProviders,
    PerUserBundleWithPerMachinePackage,
    // Chain
    DuplicateCacheIds,
    DuplicateCacheIdsLocation,
    PackageNotInChain,
    UnusedRollbackBoundary,
    // Layout
    PayloadCollision,
    ContainerCollision,
    ExternalPayloadCollision,
    // Database
    NullInNonNullableColumn,
    ValueOutOfRange,
    InvalidRowFieldCount,
    ForeignKeyRowNotFound,
    TableDefinitionMismatch,
    MissingObjectSource,
    // Extensions
    BackendValidation,
}

/// A single recorded diagnostic
#[derive(Debug, Clone)]
pub struct Message {
    pub level: MessageLevel,
    pub id: MessageId,
    pub source_line: Option<SourceLineNumber>,
    pub text: String,
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source_line {
            Some(source) => write!(f, "{}: {} {:?}: {}", source, self.level.as_str(), self.id, self.text),
            None => write!(f, "{} {:?}: {}", self.level.as_str(), self.id, self.text),
        }
    }
}

/// Accumulates diagnostics for one bind or unbind invocation
#[derive(Debug, Default)]
pub struct Messaging {
    messages: Vec<Message>,
    error_count: usize,
    warnings_as_errors: bool,
}

impl Messaging {
    pub fn new() -> Self {
        Self::default()
    }

    /// Promote every warning to an error
    pub fn with_warnings_as_errors(mut self) -> Self {
        self.warnings_as_errors = true;
        self
    }

    pub fn error(
        &mut self,
        id: MessageId,
        source_line: Option<&SourceLineNumber>,
        text: impl Into<String>,
    ) {
        self.write(MessageLevel::Error, id, source_line, text.into());
    }

    pub fn warning(
        &mut self,
        id: MessageId,
        source_line: Option<&SourceLineNumber>,
        text: impl Into<String>,
    ) {
        let level = if self.warnings_as_errors {
            MessageLevel::Error
        } else {
            MessageLevel::Warning
        };
        self.write(level, id, source_line, text.into());
    }

    pub fn verbose(&mut self, id: MessageId, source_line: Option<&SourceLineNumber>, text: impl Into<String>) {
        self.write(MessageLevel::Verbose, id, source_line, text.into());
    }

    fn write(
        &mut self,
        level: MessageLevel,
        id: MessageId,
        source_line: Option<&SourceLineNumber>,
        text: String,
    ) {
        let message = Message {
            level,
            id,
            source_line: source_line.cloned(),
            text,
        };

        match level {
            MessageLevel::Error => {
                self.error_count += 1;
                error!("{}", message);
            }
            MessageLevel::Warning => warn!("{}", message),
            MessageLevel::Verbose => debug!("{}", message),
        }

        self.messages.push(message);
    }

    /// True once any error has been recorded
    pub fn encountered_error(&self) -> bool {
        self.error_count > 0
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn errors(&self) -> impl Iterator<Item = &Message> {
        self.messages
            .iter()
            .filter(|m| m.level == MessageLevel::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Message> {
        self.messages
            .iter()
            .filter(|m| m.level == MessageLevel::Warning)
    }

    /// Number of messages with the given id at any level
    pub fn count(&self, id: MessageId) -> usize {
        self.messages.iter().filter(|m| m.id == id).count()
    }
}
