//! Restore orchestrator
//!
//! Drives a restore run through its phases: notifications, then groups in dependency
//! order, then monitors (with a pause for the ones that were inactive in the backup).
//! Per-entity failures are recorded and the run moves on; only setup failures and
//! broken ordering invariants end the run early.

use crate::dry_run::DryRunTransport;
use crate::identity::IdentityMap;
use crate::ordering::{order_groups, ParentLink};
use crate::retry::{RetryPolicy, RetryingClient};
use crate::sanitize::sanitize;
use kuma_restore_types::{
    EntityKind, FailureClass, GroupRecord, KumaTransport, MonitorRecord, MonitorType,
    NotificationRecord, Outcome, OutcomeEvent, Payload, RestoreError, RestoreReport,
    RestoreResult, RunPhase, RunSummary, SkipReason, Snapshot, SnapshotId, TargetId,
    TransportError,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Provider used when a notification in the backup does not name one
const DEFAULT_NOTIFICATION_PROVIDER: &str = "pushover";

/// Config keys that are rebuilt from the record instead of copied
const NOTIFICATION_RECORD_KEYS: &[&str] = &["type", "name", "applyExisting", "isDefault"];

/// Behaviour switches for a restore run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreOptions {
    /// Read the target but simulate every create and pause
    pub dry_run: bool,
    /// Do not restore notifications; monitors lose their notification links
    pub skip_notifications: bool,
    /// Only restore monitors that were active in the backup
    pub only_active: bool,
}

/// Runs one restore against one target
///
/// Consumed by [`RestoreOrchestrator::run`], so a run cannot be re-entered.
pub struct RestoreOrchestrator {
    client: RetryingClient,
    options: RestoreOptions,
    target: String,
    phase: RunPhase,
    identities: IdentityMap,
    failed_groups: HashSet<SnapshotId>,
    summary: RunSummary,
    events: Vec<OutcomeEvent>,
    warnings: Vec<String>,
}

impl RestoreOrchestrator {
    pub fn new(
        transport: Arc<dyn KumaTransport>,
        policy: RetryPolicy,
        call_timeout: Duration,
        options: RestoreOptions,
    ) -> Self {
        let transport: Arc<dyn KumaTransport> = if options.dry_run {
            Arc::new(DryRunTransport::new(transport))
        } else {
            transport
        };
        let target = transport.name().to_string();

        Self {
            client: RetryingClient::new(transport, policy, call_timeout),
            options,
            target,
            phase: RunPhase::Init,
            identities: IdentityMap::new(),
            failed_groups: HashSet::new(),
            summary: RunSummary::default(),
            events: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Restore `snapshot` and report what happened to each entity
    pub async fn run(mut self, snapshot: &Snapshot) -> RestoreResult<RestoreReport> {
        let started = Instant::now();
        info!(
            "Restoring {} notifications, {} groups and {} monitors via {}",
            snapshot.notifications.len(),
            snapshot.groups.len(),
            snapshot.monitors.len(),
            self.target
        );

        self.warnings.extend(snapshot.warnings.iter().cloned());
        self.summary.notifications.in_snapshot = snapshot.notifications.len();
        self.summary.groups.in_snapshot = snapshot.groups.len();
        self.summary.monitors.in_snapshot = snapshot.monitors.len();

        let result = self.run_phases(snapshot).await;
        self.client.end_session().await;

        match result {
            Ok(()) => {
                self.enter(RunPhase::Done);
                let duration_seconds = started.elapsed().as_secs_f64();
                info!(
                    "Restore finished in {:.1}s: {} created, {} failed",
                    duration_seconds,
                    self.summary.total_created(),
                    self.summary.total_failed()
                );
                Ok(RestoreReport {
                    dry_run: self.options.dry_run,
                    summary: self.summary,
                    events: self.events,
                    warnings: self.warnings,
                    duration_seconds,
                })
            }
            Err(e) => {
                error!("Restore failed during {} phase: {}", self.phase, e);
                self.enter(RunPhase::Failed);
                Err(e)
            }
        }
    }

    async fn run_phases(&mut self, snapshot: &Snapshot) -> RestoreResult<()> {
        self.client
            .open_session()
            .await
            .map_err(|e| setup_error("opening session", e))?;

        if self.options.skip_notifications {
            info!("Skipping notifications");
        } else {
            self.restore_notifications(&snapshot.notifications).await?;
        }
        self.client.end_session().await;

        self.restore_groups(&snapshot.groups).await?;
        self.client.end_session().await;

        let group_ids: HashSet<SnapshotId> = snapshot.groups.iter().map(|g| g.old_id).collect();
        self.restore_monitors(&snapshot.monitors, &group_ids).await
    }

    async fn restore_notifications(&mut self, notifications: &[NotificationRecord]) -> RestoreResult<()> {
        self.enter(RunPhase::Notifications);
        if notifications.is_empty() {
            return Ok(());
        }

        let mut existing = self.existing(EntityKind::Notification).await?;
        for record in notifications {
            let kind = EntityKind::Notification;
            if let Some(id) = existing.get(&record.name).copied() {
                self.identities.record_mapping(kind, record.old_id, id)?;
                self.report(kind, &record.name, record.old_id, Outcome::Existing { new_id: id });
                continue;
            }

            let payload = self.notification_payload(record);
            match self.client.create(kind, payload).await {
                Ok(new_id) => {
                    self.identities.record_mapping(kind, record.old_id, new_id)?;
                    existing.insert(record.name.clone(), new_id);
                    self.report(kind, &record.name, record.old_id, Outcome::Created { new_id });
                }
                Err(e) => self.report_failure(kind, &record.name, record.old_id, e)?,
            }
        }
        Ok(())
    }

    async fn restore_groups(&mut self, groups: &[GroupRecord]) -> RestoreResult<()> {
        self.enter(RunPhase::Groups);
        if groups.is_empty() {
            return Ok(());
        }

        let kind = EntityKind::Group;
        let mut existing = self.existing(kind).await?;
        for entry in order_groups(groups) {
            let record = entry.record;
            if let Some(id) = existing.get(&record.name).copied() {
                self.identities.record_mapping(kind, record.old_id, id)?;
                self.report(kind, &record.name, record.old_id, Outcome::Existing { new_id: id });
                continue;
            }

            let parent_old_id = match entry.parent {
                ParentLink::None => None,
                ParentLink::Detached(parent) => {
                    self.warn(format!(
                        "Group '{}' ({}): parent {} cannot be restored, creating it at top level",
                        record.name, record.old_id, parent
                    ));
                    None
                }
                ParentLink::InSnapshot(parent) if self.failed_groups.contains(&parent) => {
                    self.failed_groups.insert(record.old_id);
                    self.report_dependency_failure(
                        kind,
                        &record.name,
                        record.old_id,
                        format!("parent group {} was not restored", parent),
                    );
                    continue;
                }
                ParentLink::InSnapshot(parent) => Some(parent),
            };
            let parent = self.identities.resolve_optional(kind, parent_old_id)?;

            let mut fields = Payload::new();
            fields.insert("name".into(), json!(record.name));
            if let Some(parent) = parent {
                fields.insert("parent".into(), json!(parent.get()));
            }

            match self.client.create(kind, sanitize(kind, &fields)).await {
                Ok(new_id) => {
                    self.identities.record_mapping(kind, record.old_id, new_id)?;
                    existing.insert(record.name.clone(), new_id);
                    self.report(kind, &record.name, record.old_id, Outcome::Created { new_id });
                }
                Err(e) => {
                    self.failed_groups.insert(record.old_id);
                    self.report_failure(kind, &record.name, record.old_id, e)?;
                }
            }
        }
        Ok(())
    }

    async fn restore_monitors(
        &mut self,
        monitors: &[MonitorRecord],
        group_ids: &HashSet<SnapshotId>,
    ) -> RestoreResult<()> {
        self.enter(RunPhase::Monitors);
        if monitors.is_empty() {
            return Ok(());
        }

        let kind = EntityKind::Monitor;
        let mut existing = self.existing(kind).await?;
        for record in monitors {
            if self.options.only_active && !record.active {
                self.report(kind, &record.name, record.old_id, Outcome::Skipped(SkipReason::Inactive));
                continue;
            }

            let Some(monitor_type) = record.monitor_type else {
                self.warn(format!(
                    "Monitor '{}' ({}): unsupported type '{}', skipping",
                    record.name, record.old_id, record.type_name
                ));
                let reason = SkipReason::UnsupportedType {
                    type_name: record.type_name.clone(),
                };
                self.report(kind, &record.name, record.old_id, Outcome::Skipped(reason));
                continue;
            };

            if let Some(id) = existing.get(&record.name).copied() {
                self.identities.record_mapping(kind, record.old_id, id)?;
                self.report(kind, &record.name, record.old_id, Outcome::Existing { new_id: id });
                continue;
            }

            let parent = match record.group_old_id {
                None => None,
                Some(group) if self.failed_groups.contains(&group) => {
                    self.report_dependency_failure(
                        kind,
                        &record.name,
                        record.old_id,
                        format!("group {} was not restored", group),
                    );
                    continue;
                }
                Some(group) if !group_ids.contains(&group) => {
                    self.warn(format!(
                        "Monitor '{}' ({}): group {} is not in the backup, creating it without a group",
                        record.name, record.old_id, group
                    ));
                    None
                }
                Some(group) => Some(self.identities.resolve(EntityKind::Group, group)?),
            };

            let notification_ids = self.monitor_notifications(record);
            let payload = monitor_payload(record, monitor_type, parent, &notification_ids);

            let new_id = match self.client.create(kind, payload).await {
                Ok(new_id) => new_id,
                Err(e) => {
                    self.report_failure(kind, &record.name, record.old_id, e)?;
                    continue;
                }
            };
            self.identities.record_mapping(kind, record.old_id, new_id)?;
            existing.insert(record.name.clone(), new_id);
            self.report(kind, &record.name, record.old_id, Outcome::Created { new_id });

            if !record.active {
                let outcome = match self.client.pause(new_id).await {
                    Ok(()) => Outcome::Paused { new_id },
                    Err(TransportError::Authentication(msg)) => {
                        return Err(RestoreError::Authentication(msg))
                    }
                    Err(e) => Outcome::PauseFailed {
                        new_id,
                        message: e.to_string(),
                    },
                };
                self.report(kind, &record.name, record.old_id, outcome);
            }
        }
        Ok(())
    }

    /// Target ids for a monitor's notifications; references that were not restored are
    /// dropped with a warning
    fn monitor_notifications(&mut self, record: &MonitorRecord) -> Vec<TargetId> {
        if record.notification_old_ids.is_empty() {
            return Vec::new();
        }
        if self.options.skip_notifications {
            self.warn(format!(
                "Monitor '{}' ({}): notifications are skipped, dropping {} notification link(s)",
                record.name,
                record.old_id,
                record.notification_old_ids.len()
            ));
            return Vec::new();
        }

        let (resolved, missing) = self
            .identities
            .resolve_each(EntityKind::Notification, &record.notification_old_ids);
        for old_id in missing {
            self.warn(format!(
                "Monitor '{}' ({}): notification {} was not restored, dropping it",
                record.name, record.old_id, old_id
            ));
        }
        resolved
    }

    fn notification_payload(&mut self, record: &NotificationRecord) -> Payload {
        let provider = match record.provider() {
            Some(provider) => provider.to_string(),
            None => {
                self.warn(format!(
                    "Notification '{}' ({}): no provider type, defaulting to {}",
                    record.name, record.old_id, DEFAULT_NOTIFICATION_PROVIDER
                ));
                DEFAULT_NOTIFICATION_PROVIDER.to_string()
            }
        };

        let mut fields: Payload = record
            .config
            .iter()
            .filter(|(key, _)| !NOTIFICATION_RECORD_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        fields.insert("name".into(), json!(record.name));
        fields.insert("type".into(), json!(provider));
        fields.insert("isDefault".into(), json!(record.is_default));
        fields.insert("applyExisting".into(), json!(record.apply_existing()));

        sanitize(EntityKind::Notification, &fields)
    }

    /// Existing entities of `kind` on the target, keyed by name
    async fn existing(&mut self, kind: EntityKind) -> RestoreResult<HashMap<String, TargetId>> {
        let entities = self
            .client
            .list(kind)
            .await
            .map_err(|e| setup_error(&format!("listing existing {}s", kind), e))?;
        debug!("Target already has {} {}s", entities.len(), kind);

        let mut by_name = HashMap::with_capacity(entities.len());
        for entity in entities {
            by_name.entry(entity.name).or_insert(entity.id);
        }
        Ok(by_name)
    }

    fn enter(&mut self, phase: RunPhase) {
        debug!("Phase {} -> {}", self.phase, phase);
        self.phase = phase;
    }

    fn warn(&mut self, message: String) {
        warn!("{}", message);
        self.warnings.push(message);
    }

    fn report(&mut self, kind: EntityKind, name: &str, old_id: SnapshotId, outcome: Outcome) {
        match &outcome {
            Outcome::Failed { class, message } => {
                warn!("{} '{}' ({}) failed [{}]: {}", kind, name, old_id, class, message)
            }
            Outcome::PauseFailed { new_id, message } => {
                warn!("{} '{}' ({}) created as {} but could not be paused: {}", kind, name, old_id, new_id, message)
            }
            Outcome::Created { new_id } => info!("{} '{}' ({}) created as {}", kind, name, old_id, new_id),
            Outcome::Existing { new_id } => {
                info!("{} '{}' ({}) already exists as {}, skipping", kind, name, old_id, new_id)
            }
            Outcome::Paused { new_id } => info!("{} '{}' paused ({})", kind, name, new_id),
            Outcome::Skipped(reason) => info!("{} '{}' ({}) skipped: {}", kind, name, old_id, reason),
        }

        self.summary.record(kind, &outcome);
        self.events.push(OutcomeEvent {
            kind,
            name: name.to_string(),
            old_id,
            outcome,
        });
    }

    /// Record a failed create; a refused login ends the run
    fn report_failure(
        &mut self,
        kind: EntityKind,
        name: &str,
        old_id: SnapshotId,
        error: TransportError,
    ) -> RestoreResult<()> {
        if let TransportError::Authentication(msg) = error {
            return Err(RestoreError::Authentication(msg));
        }
        let outcome = Outcome::Failed {
            class: FailureClass::from_transport(&error),
            message: error.to_string(),
        };
        self.report(kind, name, old_id, outcome);
        Ok(())
    }

    fn report_dependency_failure(&mut self, kind: EntityKind, name: &str, old_id: SnapshotId, message: String) {
        let outcome = Outcome::Failed {
            class: FailureClass::DependencyFailed,
            message,
        };
        self.report(kind, name, old_id, outcome);
    }
}

fn setup_error(action: &str, error: TransportError) -> RestoreError {
    match error {
        TransportError::Authentication(msg) => RestoreError::Authentication(msg),
        source => RestoreError::Setup {
            action: action.to_string(),
            source,
        },
    }
}

/// Create payload for a monitor with its references already rewritten to target ids
fn monitor_payload(
    record: &MonitorRecord,
    monitor_type: MonitorType,
    parent: Option<TargetId>,
    notification_ids: &[TargetId],
) -> Payload {
    let mut fields = record.raw.clone();
    fields.insert("name".into(), json!(record.name));
    fields.insert("type".into(), json!(monitor_type.as_str()));

    match parent {
        Some(parent) => {
            fields.insert("parent".into(), json!(parent.get()));
        }
        None => {
            fields.remove("parent");
        }
    }

    if notification_ids.is_empty() {
        fields.remove("notificationIDList");
    } else {
        let ids: Vec<i64> = notification_ids.iter().map(|id| id.get()).collect();
        fields.insert("notificationIDList".into(), json!(ids));
    }

    sanitize(EntityKind::Monitor, &fields)
}
