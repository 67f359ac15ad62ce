//! Core types and traits for restoring Uptime Kuma backups
//!
//! This crate provides the foundational abstractions shared by the restore
//! orchestrator, the remote transports and the CLI.
//!
//! # Architecture
//!
//! - **Snapshot**: parsed backup records (`Snapshot`, `NotificationRecord`, `GroupRecord`, `MonitorRecord`)
//! - **Entities**: entity kinds, monitor types and the old/new id newtypes
//! - **Transport**: `KumaTransport` / `KumaSession`, the interface every remote backend implements
//! - **Summary**: run summary counters and per-entity outcome events
//! - **Errors**: snapshot, transport and run-level error taxonomies
//!
//! # Usage
//!
//! Transport implementations (e.g., `kuma-restore-socketio`) depend on this crate
//! and implement the `KumaTransport` trait.

pub mod entity;
pub mod error;
pub mod snapshot;
pub mod summary;
pub mod transport;

pub use entity::{EntityKind, MonitorType, SnapshotId, TargetId};
pub use error::{
    ErrorClass, RestoreError, RestoreResult, SnapshotError, SnapshotResult, TransportError,
    TransportResult,
};
pub use snapshot::{
    coerce_bool, GroupRecord, MonitorRecord, NotificationRecord, Snapshot, SnapshotLayout,
};
pub use summary::{
    FailureClass, KindCounts, Outcome, OutcomeEvent, RestoreReport, RunPhase, RunSummary,
    SkipReason,
};
pub use transport::{
    Credentials, ExistingEntity, KumaSession, KumaTransport, Payload, RemoteCall, RemoteReply,
};
