//! Backup snapshot model
//!
//! Represents the entities recorded in an Uptime Kuma backup, in the order the backup
//! lists them. Every record keeps the complete original field map next to the few
//! fields the restore needs to reason about (ids, names, references).

use crate::entity::{MonitorType, SnapshotId};
use crate::error::{SnapshotError, SnapshotResult};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::Path;

/// Keys of the layout written by the Uptime Kuma export
const KUMA_NOTIFICATIONS: &str = "notificationList";
const KUMA_MONITORS: &str = "monitorList";

/// Keys of the normalized layout
const NOTIFICATION_KEY: &str = "notification";
const GROUP_KEY: &str = "group";
const MONITOR_KEY: &str = "monitor";

/// Top-level layout a backup was written in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SnapshotLayout {
    /// `notificationList` + `monitorList`, groups are monitors of type `group`
    KumaExport,
    /// Separate `notification`, `group` and `monitor` collections
    Normalized,
}

/// Notification channel recorded in the backup
#[derive(Debug, Clone, Serialize)]
pub struct NotificationRecord {
    /// Id in the backup
    pub old_id: SnapshotId,
    /// Display name, unique on the target
    pub name: String,
    /// Whether new monitors get this notification by default
    pub is_default: bool,
    /// Provider settings, decoded from the stored config blob
    pub config: Map<String, Value>,
    /// Complete original record
    pub raw: Map<String, Value>,
}

impl NotificationRecord {
    /// Provider type (`type`, or `name` in some backups)
    pub fn provider(&self) -> Option<&str> {
        ["type", "name"]
            .iter()
            .filter_map(|key| self.config.get(*key).and_then(Value::as_str))
            .map(str::trim)
            .find(|s| !s.is_empty())
    }

    /// Whether the target should attach this notification to existing monitors
    pub fn apply_existing(&self) -> bool {
        coerce_bool(self.config.get("applyExisting"), false)
    }
}

/// Group recorded in the backup
#[derive(Debug, Clone, Serialize)]
pub struct GroupRecord {
    /// Id in the backup
    pub old_id: SnapshotId,
    /// Display name
    pub name: String,
    /// Id of the enclosing group in the backup, if any
    pub parent_old_id: Option<SnapshotId>,
    /// Complete original record
    pub raw: Map<String, Value>,
}

/// Monitor recorded in the backup
#[derive(Debug, Clone, Serialize)]
pub struct MonitorRecord {
    /// Id in the backup
    pub old_id: SnapshotId,
    /// Display name
    pub name: String,
    /// Type as written in the backup, lowercased
    pub type_name: String,
    /// Parsed type, `None` when the target does not support it
    pub monitor_type: Option<MonitorType>,
    /// Whether the monitor was running when the backup was taken
    pub active: bool,
    /// Id of the enclosing group in the backup, if any
    pub group_old_id: Option<SnapshotId>,
    /// Notifications attached in the backup
    pub notification_old_ids: Vec<SnapshotId>,
    /// Complete original record
    pub raw: Map<String, Value>,
}

/// Parsed backup
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub layout: SnapshotLayout,
    pub notifications: Vec<NotificationRecord>,
    pub groups: Vec<GroupRecord>,
    pub monitors: Vec<MonitorRecord>,
    /// Problems that did not prevent parsing
    pub warnings: Vec<String>,
}

impl Snapshot {
    /// Read and parse a backup file
    pub fn load(path: impl AsRef<Path>) -> SnapshotResult<Self> {
        let data = std::fs::read(path.as_ref())?;
        let value: Value = serde_json::from_slice(&data)?;
        Self::from_value(value)
    }

    /// Parse a backup from its JSON text
    pub fn from_json_str(text: &str) -> SnapshotResult<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    /// Parse a backup from an already decoded JSON document
    pub fn from_value(value: Value) -> SnapshotResult<Self> {
        let Value::Object(root) = value else {
            return Err(SnapshotError::NotAnObject);
        };

        let layout = detect_layout(&root)?;
        let mut warnings = Vec::new();

        let (notifications, groups, monitors) = match layout {
            SnapshotLayout::KumaExport => {
                let mut seen = SeenIds::new(KUMA_NOTIFICATIONS);
                let notifications =
                    parse_collection(&root, KUMA_NOTIFICATIONS, |index, entry| {
                        let record =
                            parse_notification(KUMA_NOTIFICATIONS, index, entry, &mut warnings)?;
                        seen.insert(index, record.old_id)?;
                        Ok(record)
                    })?;

                let mut seen_groups = SeenIds::new(KUMA_MONITORS);
                let mut seen_monitors = SeenIds::new(KUMA_MONITORS);
                let mut groups = Vec::new();
                let mut monitors = Vec::new();
                for (index, entry) in collection(&root, KUMA_MONITORS)?.iter().enumerate() {
                    let fields = as_object(KUMA_MONITORS, index, entry)?;
                    if type_name(fields) == MonitorType::Group.as_str() {
                        let group = parse_group(KUMA_MONITORS, index, fields)?;
                        seen_groups.insert(index, group.old_id)?;
                        groups.push(group);
                    } else {
                        let monitor = parse_monitor(KUMA_MONITORS, index, fields, &mut warnings)?;
                        seen_monitors.insert(index, monitor.old_id)?;
                        monitors.push(monitor);
                    }
                }
                (notifications, groups, monitors)
            }
            SnapshotLayout::Normalized => {
                let mut seen = SeenIds::new(NOTIFICATION_KEY);
                let notifications = parse_collection(&root, NOTIFICATION_KEY, |index, entry| {
                    let record = parse_notification(NOTIFICATION_KEY, index, entry, &mut warnings)?;
                    seen.insert(index, record.old_id)?;
                    Ok(record)
                })?;
                let mut seen = SeenIds::new(GROUP_KEY);
                let groups = parse_collection(&root, GROUP_KEY, |index, entry| {
                    let group = parse_group(GROUP_KEY, index, as_object(GROUP_KEY, index, entry)?)?;
                    seen.insert(index, group.old_id)?;
                    Ok(group)
                })?;
                let mut seen = SeenIds::new(MONITOR_KEY);
                let monitors = parse_collection(&root, MONITOR_KEY, |index, entry| {
                    let fields = as_object(MONITOR_KEY, index, entry)?;
                    let monitor = parse_monitor(MONITOR_KEY, index, fields, &mut warnings)?;
                    seen.insert(index, monitor.old_id)?;
                    Ok(monitor)
                })?;
                (notifications, groups, monitors)
            }
        };

        if notifications.is_empty() && groups.is_empty() && monitors.is_empty() {
            return Err(SnapshotError::EmptySnapshot);
        }

        Ok(Self {
            layout,
            notifications,
            groups,
            monitors,
            warnings,
        })
    }
}

/// Interpret a loosely typed flag the way the target's own exports write them
///
/// Accepts booleans, numbers (non-zero is true) and the strings
/// `1`, `true`, `yes`, `y`, `on` in any case. Missing and null yield `default`.
pub fn coerce_bool(value: Option<&Value>, default: bool) -> bool {
    match value {
        None | Some(Value::Null) => default,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(default),
        Some(Value::String(s)) => matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "y" | "on"
        ),
        Some(_) => default,
    }
}

fn detect_layout(root: &Map<String, Value>) -> SnapshotResult<SnapshotLayout> {
    if root.contains_key(KUMA_MONITORS) || root.contains_key(KUMA_NOTIFICATIONS) {
        let missing = missing_keys(root, &[KUMA_NOTIFICATIONS, KUMA_MONITORS]);
        return if missing.is_empty() {
            Ok(SnapshotLayout::KumaExport)
        } else {
            Err(SnapshotError::MissingKey(missing))
        };
    }

    let missing = missing_keys(root, &[NOTIFICATION_KEY, GROUP_KEY, MONITOR_KEY]);
    if missing.is_empty() {
        Ok(SnapshotLayout::Normalized)
    } else {
        Err(SnapshotError::MissingKey(missing))
    }
}

fn missing_keys(root: &Map<String, Value>, keys: &[&str]) -> Vec<String> {
    keys.iter()
        .filter(|key| !root.contains_key(**key))
        .map(|key| key.to_string())
        .collect()
}

fn collection<'a>(root: &'a Map<String, Value>, key: &str) -> SnapshotResult<&'a Vec<Value>> {
    match root.get(key) {
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(SnapshotError::NotAnArray(key.to_string())),
        None => Err(SnapshotError::MissingKey(vec![key.to_string()])),
    }
}

/// Ids already taken within one kind
struct SeenIds<'a> {
    collection: &'a str,
    ids: HashSet<SnapshotId>,
}

impl<'a> SeenIds<'a> {
    fn new(collection: &'a str) -> Self {
        Self {
            collection,
            ids: HashSet::new(),
        }
    }

    fn insert(&mut self, index: usize, id: SnapshotId) -> SnapshotResult<()> {
        if self.ids.insert(id) {
            return Ok(());
        }
        Err(SnapshotError::InvalidEntry {
            collection: self.collection.to_string(),
            index,
            reason: format!("duplicate id {}", id),
        })
    }
}

fn parse_collection<T>(
    root: &Map<String, Value>,
    key: &str,
    mut parse: impl FnMut(usize, &Value) -> SnapshotResult<T>,
) -> SnapshotResult<Vec<T>> {
    collection(root, key)?
        .iter()
        .enumerate()
        .map(|(index, entry)| parse(index, entry))
        .collect()
}

fn as_object<'a>(
    collection: &str,
    index: usize,
    entry: &'a Value,
) -> SnapshotResult<&'a Map<String, Value>> {
    entry.as_object().ok_or_else(|| SnapshotError::InvalidEntry {
        collection: collection.to_string(),
        index,
        reason: "entry must be an object".to_string(),
    })
}

fn parse_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn required_id(
    collection: &str,
    index: usize,
    fields: &Map<String, Value>,
) -> SnapshotResult<SnapshotId> {
    fields
        .get("id")
        .and_then(parse_id)
        .map(SnapshotId)
        .ok_or_else(|| SnapshotError::InvalidEntry {
            collection: collection.to_string(),
            index,
            reason: "missing or non-integer 'id'".to_string(),
        })
}

/// Optional reference; absent, null and 0 all mean "no reference"
fn optional_ref(fields: &Map<String, Value>, key: &str) -> Option<SnapshotId> {
    fields
        .get(key)
        .and_then(parse_id)
        .filter(|id| *id != 0)
        .map(SnapshotId)
}

fn display_name(fields: &Map<String, Value>, fallback: impl FnOnce() -> String) -> String {
    fields
        .get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(fallback)
}

fn type_name(fields: &Map<String, Value>) -> String {
    fields
        .get("type")
        .and_then(Value::as_str)
        .map(|t| t.trim().to_lowercase())
        .unwrap_or_default()
}

fn parse_notification(
    collection: &str,
    index: usize,
    entry: &Value,
    warnings: &mut Vec<String>,
) -> SnapshotResult<NotificationRecord> {
    let fields = as_object(collection, index, entry)?;
    let old_id = required_id(collection, index, fields)?;
    let name = display_name(fields, || format!("Imported {}", old_id));

    // Exports store the provider settings as an encoded JSON string
    let config = match fields.get("config") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(config)) => config.clone(),
        Some(Value::String(text)) if text.trim().is_empty() => Map::new(),
        Some(Value::String(text)) => match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(config)) => config,
            _ => {
                warnings.push(format!(
                    "Notification '{}': invalid JSON in 'config'; using empty object",
                    name
                ));
                Map::new()
            }
        },
        Some(_) => {
            warnings.push(format!(
                "Notification '{}': 'config' is neither an object nor a string; using empty object",
                name
            ));
            Map::new()
        }
    };

    Ok(NotificationRecord {
        old_id,
        is_default: coerce_bool(fields.get("isDefault"), false),
        name,
        config,
        raw: fields.clone(),
    })
}

fn parse_group(
    collection: &str,
    index: usize,
    fields: &Map<String, Value>,
) -> SnapshotResult<GroupRecord> {
    let old_id = required_id(collection, index, fields)?;
    Ok(GroupRecord {
        old_id,
        name: display_name(fields, || format!("Group {}", old_id)),
        parent_old_id: optional_ref(fields, "parent"),
        raw: fields.clone(),
    })
}

fn parse_monitor(
    collection: &str,
    index: usize,
    fields: &Map<String, Value>,
    warnings: &mut Vec<String>,
) -> SnapshotResult<MonitorRecord> {
    let old_id = required_id(collection, index, fields)?;
    let name = display_name(fields, || "Unnamed".to_string());
    let type_name = type_name(fields);
    let notification_old_ids =
        notification_ids(fields.get("notificationIDList"), &name, warnings);

    Ok(MonitorRecord {
        old_id,
        monitor_type: MonitorType::parse(&type_name),
        type_name,
        active: coerce_bool(fields.get("active"), true),
        group_old_id: optional_ref(fields, "parent"),
        notification_old_ids,
        name,
        raw: fields.clone(),
    })
}

/// Normalize `{"3": true}` and `[3]` shapes into a list of ids
fn notification_ids(
    value: Option<&Value>,
    monitor: &str,
    warnings: &mut Vec<String>,
) -> Vec<SnapshotId> {
    let mut ids = Vec::new();
    let mut push = |raw: &Value| match parse_id(raw) {
        Some(id) if !ids.contains(&SnapshotId(id)) => ids.push(SnapshotId(id)),
        Some(_) => {}
        None => warnings.push(format!(
            "Monitor '{}': ignoring unparseable notification id {}",
            monitor, raw
        )),
    };

    match value {
        Some(Value::Object(selection)) => {
            for (key, enabled) in selection {
                if coerce_bool(Some(enabled), false) {
                    push(&Value::String(key.clone()));
                }
            }
        }
        Some(Value::Array(list)) => list.iter().for_each(&mut push),
        _ => {}
    }

    ids
}
