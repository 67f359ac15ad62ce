//! Error types for the restore system

use crate::entity::{EntityKind, SnapshotId, TargetId};
use std::time::Duration;
use thiserror::Error;

/// Result type for snapshot loading
pub type SnapshotResult<T> = Result<T, SnapshotError>;

/// Result type for remote calls
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type for a restore run
pub type RestoreResult<T> = Result<T, RestoreError>;

/// Errors raised while reading a backup, always before any remote call
#[derive(Error, Debug)]
pub enum SnapshotError {
    /// Backup file could not be read
    #[error("Failed to read backup file: {0}")]
    Io(#[from] std::io::Error),

    /// Backup file is not valid JSON
    #[error("Backup is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Backup root is not a JSON object
    #[error("Malformed snapshot: top-level value must be an object")]
    NotAnObject,

    /// A required top-level key is absent
    #[error("Malformed snapshot: missing required key(s): {}", .0.join(", "))]
    MissingKey(Vec<String>),

    /// A top-level collection is not an array
    #[error("Malformed snapshot: '{0}' must be an array")]
    NotAnArray(String),

    /// An entry in a collection has the wrong shape
    #[error("Malformed snapshot: {collection}[{index}]: {reason}")]
    InvalidEntry {
        collection: String,
        index: usize,
        reason: String,
    },

    /// Backup holds nothing to restore
    #[error("Backup has no monitors or notifications")]
    EmptySnapshot,
}

/// Whether a failed remote call is worth repeating
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Session or network trouble; a fresh session may succeed
    Transient,
    /// The target rejected the request; repeating it cannot help
    Permanent,
}

/// Errors surfaced by a remote transport
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    /// Socket namespace was dropped by the server
    #[error("Bad namespace: {0}")]
    BadNamespace(String),

    /// Call did not complete within the configured timeout
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Connection was closed or reset
    #[error("Connection reset: {0}")]
    ConnectionReset(String),

    /// Login was refused
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Target rejected the payload
    #[error("Validation error: {0}")]
    Validation(String),

    /// Target reported that an entity with this name already exists
    #[error("Duplicate name: {0}")]
    DuplicateName(String),

    /// Response could not be understood
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl TransportError {
    /// Classify this error for the retry policy
    pub fn class(&self) -> ErrorClass {
        match self {
            TransportError::BadNamespace(_)
            | TransportError::Timeout(_)
            | TransportError::ConnectionReset(_) => ErrorClass::Transient,
            TransportError::Authentication(_)
            | TransportError::Validation(_)
            | TransportError::DuplicateName(_)
            | TransportError::Protocol(_) => ErrorClass::Permanent,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}

/// Errors that terminate a restore run
///
/// Per-entity failures never show up here; they are recorded in the run summary.
#[derive(Error, Debug)]
pub enum RestoreError {
    /// Target refused the credentials
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// A setup call (session or listing) failed for good
    #[error("Setup failed while {action}: {source}")]
    Setup {
        action: String,
        #[source]
        source: TransportError,
    },

    /// A reference was resolved before its target had been created or matched
    #[error("Unresolved reference: {kind} {old_id} has no mapping yet")]
    UnresolvedReference { kind: EntityKind, old_id: SnapshotId },

    /// The same snapshot entity was mapped to two different target entities
    #[error("Identity conflict: {kind} {old_id} already mapped to {existing}, refusing {attempted}")]
    IdentityConflict {
        kind: EntityKind,
        old_id: SnapshotId,
        existing: TargetId,
        attempted: TargetId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(TransportError::BadNamespace("/".into()).is_transient());
        assert!(TransportError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(TransportError::ConnectionReset("eof".into()).is_transient());
    }

    #[test]
    fn test_permanent_classification() {
        assert_eq!(
            TransportError::Validation("bad".into()).class(),
            ErrorClass::Permanent
        );
        assert_eq!(
            TransportError::DuplicateName("x".into()).class(),
            ErrorClass::Permanent
        );
        assert_eq!(
            TransportError::Authentication("nope".into()).class(),
            ErrorClass::Permanent
        );
    }

    #[test]
    fn test_missing_key_message_lists_keys() {
        let err = SnapshotError::MissingKey(vec!["group".into(), "monitor".into()]);
        assert_eq!(
            err.to_string(),
            "Malformed snapshot: missing required key(s): group, monitor"
        );
    }
}
