//! Error types for pteraform.
//!
//! This module provides the error hierarchy for every stage of a
//! reconciliation: configuration, running terraform, resolving the state
//! digest, validating resource attributes, and the local state store.

use std::path::PathBuf;
use thiserror::Error;

use crate::runner::{CancelReason, Phase};

/// The main error type for pteraform.
#[derive(Debug, Error)]
pub enum PteraformError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Running `terraform init` or `terraform apply` failed.
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// Resolving the state artifact digest failed.
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// Resource attribute errors.
    #[error("Invalid resource: {0}")]
    Resource(#[from] ResourceError),

    /// Local state store errors.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// The operation was aborted by the caller's cancellation token or deadline.
    #[error("{operation} aborted: {reason}")]
    Cancelled {
        /// What was running when the abort arrived.
        operation: String,
        /// Whether the token fired or the deadline passed.
        reason: CancelReason,
    },

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of a [`PteraformError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// An external phase could not be started or exited non-zero.
    Invocation,
    /// The caller cancelled the operation or its deadline passed.
    Cancellation,
    /// The state artifact does not exist.
    ArtifactNotFound,
    /// The state artifact exists but could not be read.
    ArtifactRead,
    /// Invalid or unreadable configuration.
    Configuration,
    /// Missing or malformed resource attributes.
    InvalidAttribute,
    /// The local state store failed.
    StateStore,
    /// Anything else.
    Internal,
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Duplicate unit definition.
    #[error("Duplicate unit name: {name}")]
    DuplicateName {
        /// The duplicated name.
        name: String,
    },

    /// A unit name was referenced that the configuration does not declare.
    #[error("Unknown unit: {name}")]
    UnknownUnit {
        /// The unknown name.
        name: String,
    },
}

/// Errors raised while running an external phase.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The executable could not be started.
    #[error("terraform {phase} failed, could not start {program}: {message}")]
    SpawnFailed {
        /// Phase being started.
        phase: Phase,
        /// Program that was invoked.
        program: String,
        /// Underlying OS error.
        message: String,
    },

    /// The process ran but exited unsuccessfully.
    #[error("terraform {phase} failed, got error: {status}, output: {output}")]
    Failed {
        /// Phase that failed.
        phase: Phase,
        /// Exit status description.
        status: String,
        /// Combined stdout and stderr.
        output: String,
    },

    /// Waiting on the child failed.
    #[error("terraform {phase} failed, could not wait for process: {message}")]
    WaitFailed {
        /// Phase being waited on.
        phase: Phase,
        /// Underlying OS error.
        message: String,
    },
}

/// Errors raised while deriving a unit's identity.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// The state artifact does not exist.
    #[error("Unable to open {}, no such file", path.display())]
    ArtifactNotFound {
        /// Path that was expected to hold the artifact.
        path: PathBuf,
    },

    /// The state artifact could not be opened or fully read.
    #[error("Unable to read {}, got error: {message}", path.display())]
    ArtifactReadFailed {
        /// Path of the artifact.
        path: PathBuf,
        /// Underlying IO error.
        message: String,
    },
}

/// Resource attribute errors.
#[derive(Debug, Error)]
pub enum ResourceError {
    /// A required attribute is absent or empty.
    #[error("missing required attribute '{attribute}'")]
    MissingAttribute {
        /// Attribute name.
        attribute: &'static str,
    },

    /// An attribute has an unusable value.
    #[error("invalid value for attribute '{attribute}': {message}")]
    InvalidAttribute {
        /// Attribute name.
        attribute: &'static str,
        /// What is wrong with it.
        message: String,
    },
}

/// Local state store errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// State is corrupted.
    #[error("State is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// State could not be written.
    #[error("Failed to write state: {message}")]
    WriteFailed {
        /// Description of the write failure.
        message: String,
    },

    /// State lock acquisition failed.
    #[error("Failed to acquire state lock: {message}")]
    LockFailed {
        /// Description of the lock failure.
        message: String,
    },

    /// State lock is held by another process.
    #[error("State is locked by another process (lock holder: {holder}, since: {since})")]
    LockedByOther {
        /// Identifier of the lock holder.
        holder: String,
        /// When the lock was acquired.
        since: String,
    },

    /// Serialization error.
    #[error("State serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },

    /// State version mismatch.
    #[error("State version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Expected state version.
        expected: String,
        /// Found state version.
        found: String,
    },
}

/// Result type alias for pteraform operations.
pub type Result<T> = std::result::Result<T, PteraformError>;

impl PteraformError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Creates a cancellation error for the named operation.
    #[must_use]
    pub fn cancelled(operation: impl Into<String>, reason: CancelReason) -> Self {
        Self::Cancelled {
            operation: operation.into(),
            reason,
        }
    }

    /// Classifies the error.
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::Process(_) => FailureKind::Invocation,
            Self::Cancelled { .. } => FailureKind::Cancellation,
            Self::Identity(IdentityError::ArtifactNotFound { .. }) => FailureKind::ArtifactNotFound,
            Self::Identity(IdentityError::ArtifactReadFailed { .. }) => FailureKind::ArtifactRead,
            Self::Config(_) => FailureKind::Configuration,
            Self::Resource(_) => FailureKind::InvalidAttribute,
            Self::State(_) => FailureKind::StateStore,
            Self::Io(_) | Self::Internal(_) => FailureKind::Internal,
        }
    }

    /// Returns true if the caller aborted the operation.
    #[must_use]
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Returns the phase this error was raised in, if it came from a process.
    #[must_use]
    pub const fn phase(&self) -> Option<Phase> {
        match self {
            Self::Process(
                ProcessError::SpawnFailed { phase, .. }
                | ProcessError::Failed { phase, .. }
                | ProcessError::WaitFailed { phase, .. },
            ) => Some(*phase),
            _ => None,
        }
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

impl StateError {
    /// Creates a write error with the given message.
    #[must_use]
    pub fn write(message: impl Into<String>) -> Self {
        Self::WriteFailed {
            message: message.into(),
        }
    }

    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }
}
