//! Interpreting server replies
//!
//! Acknowledgements are `{ok, msg, ...}` objects. Ids of created entities show up under
//! different keys depending on the server version, sometimes nested one level deep.

use kuma_restore_types::{ExistingEntity, TargetId, TransportError, TransportResult};
use serde_json::{Map, Value};

const ID_KEYS: &[&str] = &["monitorID", "monitorId", "id"];
const NESTED_KEYS: &[&str] = &["monitor", "data"];

/// Check an acknowledgement and return its body
///
/// A rejection mentioning an existing entity is a duplicate-name failure, any other
/// rejection is a validation failure.
pub fn check_ack(args: &[Value]) -> TransportResult<&Map<String, Value>> {
    let body = args
        .first()
        .and_then(Value::as_object)
        .ok_or_else(|| TransportError::Protocol(format!("unexpected acknowledgement: {:?}", args)))?;

    if body.get("ok").and_then(Value::as_bool).unwrap_or(false) {
        return Ok(body);
    }

    let msg = body
        .get("msg")
        .and_then(Value::as_str)
        .unwrap_or("request rejected")
        .to_string();
    if msg.to_lowercase().contains("already") {
        Err(TransportError::DuplicateName(msg))
    } else {
        Err(TransportError::Validation(msg))
    }
}

/// Id of a created entity, wherever the server put it
pub fn extract_id(body: &Map<String, Value>) -> Option<TargetId> {
    for key in ID_KEYS {
        if let Some(id) = body.get(*key).and_then(parse_id) {
            return Some(TargetId(id));
        }
    }
    NESTED_KEYS
        .iter()
        .filter_map(|key| body.get(*key).and_then(Value::as_object))
        .find_map(extract_id)
}

fn parse_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Which monitors of a `monitorList` push to keep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorFilter {
    Groups,
    Monitors,
}

/// Entities from a `monitorList` push, an object keyed by monitor id
pub fn monitors_from_list(list: &Value, filter: MonitorFilter) -> Vec<ExistingEntity> {
    let entries: Vec<&Value> = match list {
        Value::Object(map) => map.values().collect(),
        Value::Array(items) => items.iter().collect(),
        _ => Vec::new(),
    };

    let mut entities: Vec<ExistingEntity> = entries
        .into_iter()
        .filter_map(Value::as_object)
        .filter(|monitor| {
            let is_group = monitor.get("type").and_then(Value::as_str) == Some("group");
            match filter {
                MonitorFilter::Groups => is_group,
                MonitorFilter::Monitors => !is_group,
            }
        })
        .filter_map(entity)
        .collect();
    entities.sort_by_key(|e| e.id);
    entities
}

/// Entities from a `notificationList` push, an array of notification rows
pub fn notifications_from_list(list: &Value) -> Vec<ExistingEntity> {
    list.as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_object)
                .filter_map(entity)
                .collect()
        })
        .unwrap_or_default()
}

/// Id of the entity called `name` in a `monitorList` push
pub fn find_by_name(list: &Value, name: &str) -> Option<TargetId> {
    [MonitorFilter::Groups, MonitorFilter::Monitors]
        .into_iter()
        .flat_map(|filter| monitors_from_list(list, filter))
        .filter(|e| e.name == name)
        .map(|e| e.id)
        .max()
}

fn entity(fields: &Map<String, Value>) -> Option<ExistingEntity> {
    let id = fields.get("id").and_then(parse_id)?;
    let name = fields.get("name").and_then(Value::as_str)?;
    Some(ExistingEntity {
        id: TargetId(id),
        name: name.to_string(),
    })
}
