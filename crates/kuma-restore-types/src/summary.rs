//! Run summary and per-entity outcome events

use crate::entity::{EntityKind, SnapshotId, TargetId};
use crate::error::TransportError;
use serde::{Deserialize, Serialize};

/// Phase of a restore run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunPhase {
    Init,
    Notifications,
    Groups,
    Monitors,
    Done,
    Failed,
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunPhase::Init => "init",
            RunPhase::Notifications => "notifications",
            RunPhase::Groups => "groups",
            RunPhase::Monitors => "monitors",
            RunPhase::Done => "done",
            RunPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Why a per-entity operation failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// Transient transport failure that persisted through the retry
    Transport,
    /// Target rejected the payload
    Validation,
    /// Target already holds an entity with this name
    DuplicateName,
    /// Target answered with something unintelligible
    Protocol,
    /// An entity this one depends on failed earlier in the run
    DependencyFailed,
}

impl FailureClass {
    /// Classification for an error that escaped the retry wrapper
    pub fn from_transport(error: &TransportError) -> Self {
        match error {
            TransportError::BadNamespace(_)
            | TransportError::Timeout(_)
            | TransportError::ConnectionReset(_) => FailureClass::Transport,
            TransportError::Validation(_) | TransportError::Authentication(_) => {
                FailureClass::Validation
            }
            TransportError::DuplicateName(_) => FailureClass::DuplicateName,
            TransportError::Protocol(_) => FailureClass::Protocol,
        }
    }
}

impl std::fmt::Display for FailureClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureClass::Transport => "transport",
            FailureClass::Validation => "validation",
            FailureClass::DuplicateName => "duplicate_name",
            FailureClass::Protocol => "protocol",
            FailureClass::DependencyFailed => "dependency_failed",
        };
        f.write_str(name)
    }
}

/// Why an entity was not submitted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// Monitor was paused in the backup and only active monitors were requested
    Inactive,
    /// Monitor type is not supported by the target
    UnsupportedType { type_name: String },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::Inactive => f.write_str("inactive"),
            SkipReason::UnsupportedType { type_name } => {
                write!(f, "unsupported type '{}'", type_name)
            }
        }
    }
}

/// What happened to one snapshot entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// Created on the target
    Created { new_id: TargetId },
    /// An entity with the same name already existed and was reused
    Existing { new_id: TargetId },
    /// Not submitted
    Skipped(SkipReason),
    /// Paused after creation
    Paused { new_id: TargetId },
    /// Could not be restored
    Failed { class: FailureClass, message: String },
    /// Created, but the follow-up pause failed
    PauseFailed { new_id: TargetId, message: String },
}

impl Outcome {
    /// Short label, stable across live and dry runs
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Created { .. } => "created",
            Outcome::Existing { .. } => "existing",
            Outcome::Skipped(_) => "skipped",
            Outcome::Paused { .. } => "paused",
            Outcome::Failed { .. } => "failed",
            Outcome::PauseFailed { .. } => "pause_failed",
        }
    }
}

/// Outcome of one entity, as reported to the logging layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeEvent {
    pub kind: EntityKind,
    pub name: String,
    pub old_id: SnapshotId,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// Counters for one entity kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindCounts {
    /// Entities of this kind in the backup
    pub in_snapshot: usize,
    /// Entities created on the target
    pub created: usize,
    /// Entities not created: already present, filtered out or unsupported
    pub skipped: usize,
    /// Monitors paused after creation
    pub paused: usize,
    /// Entities that could not be restored
    pub failed: usize,
    /// Monitors created but left running because the pause failed
    pub pause_failed: usize,
}

/// Counters for a whole run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub notifications: KindCounts,
    pub groups: KindCounts,
    pub monitors: KindCounts,
}

impl RunSummary {
    pub fn counts(&self, kind: EntityKind) -> &KindCounts {
        match kind {
            EntityKind::Notification => &self.notifications,
            EntityKind::Group => &self.groups,
            EntityKind::Monitor => &self.monitors,
        }
    }

    pub fn counts_mut(&mut self, kind: EntityKind) -> &mut KindCounts {
        match kind {
            EntityKind::Notification => &mut self.notifications,
            EntityKind::Group => &mut self.groups,
            EntityKind::Monitor => &mut self.monitors,
        }
    }

    /// Count an outcome against its kind
    pub fn record(&mut self, kind: EntityKind, outcome: &Outcome) {
        let counts = self.counts_mut(kind);
        match outcome {
            Outcome::Created { .. } => counts.created += 1,
            Outcome::Existing { .. } | Outcome::Skipped(_) => counts.skipped += 1,
            Outcome::Paused { .. } => counts.paused += 1,
            Outcome::Failed { .. } => counts.failed += 1,
            Outcome::PauseFailed { .. } => counts.pause_failed += 1,
        }
    }

    pub fn total_created(&self) -> usize {
        self.notifications.created + self.groups.created + self.monitors.created
    }

    pub fn total_failed(&self) -> usize {
        self.notifications.failed + self.groups.failed + self.monitors.failed
    }
}

/// Report of a finished restore run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreReport {
    /// Whether creates and pauses were simulated
    pub dry_run: bool,
    /// Counters per entity kind
    pub summary: RunSummary,
    /// Per-entity outcomes in processing order
    pub events: Vec<OutcomeEvent>,
    /// Non-fatal problems (dropped references, parse warnings, detached groups)
    pub warnings: Vec<String>,
    /// Wall-clock duration of the run (seconds)
    pub duration_seconds: f64,
}

impl RestoreReport {
    /// Whether every entity was restored or deliberately skipped
    pub fn is_clean(&self) -> bool {
        self.summary.total_failed() == 0 && self.summary.monitors.pause_failed == 0
    }
}
