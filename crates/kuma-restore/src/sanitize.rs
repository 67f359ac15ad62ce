//! Payload sanitization
//!
//! Backups carry every column the source instance stored, including fields the
//! target's create endpoint rejects (`weight`, `resendInterval`, `description`, ...)
//! or that only exist in newer versions. Sanitizing keeps the fields listed for the
//! entity kind, applies the defaults the target expects, and drops everything else.
//!
//! The rules are data: one table per entity kind, and for monitors one table per
//! type family. Unknown keys are dropped silently.

use kuma_restore_types::{coerce_bool, EntityKind, MonitorType, Payload};
use serde_json::Value;

/// How a field value is normalized before submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    /// Passed through unchanged
    Raw,
    /// Loosely typed boolean, normalized to `true` / `false`
    Flag,
    /// Empty strings, arrays, objects, `0` and `false` count as missing
    NonEmpty,
    /// HTTP authentication method, unknown values mean "none"
    AuthMethod,
}

/// Value used when a field is missing or null
#[derive(Debug, Clone, Copy, PartialEq)]
enum Fallback {
    Absent,
    Int(i64),
    Bool(bool),
    Str(&'static str),
}

impl Fallback {
    fn value(self) -> Option<Value> {
        match self {
            Fallback::Absent => None,
            Fallback::Int(n) => Some(Value::from(n)),
            Fallback::Bool(b) => Some(Value::Bool(b)),
            Fallback::Str(s) => Some(Value::from(s)),
        }
    }
}

/// One accepted field
#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    key: &'static str,
    shape: Shape,
    fallback: Fallback,
}

const fn raw(key: &'static str) -> FieldRule {
    FieldRule {
        key,
        shape: Shape::Raw,
        fallback: Fallback::Absent,
    }
}

const fn int(key: &'static str, default: i64) -> FieldRule {
    FieldRule {
        key,
        shape: Shape::Raw,
        fallback: Fallback::Int(default),
    }
}

const fn text(key: &'static str, default: &'static str) -> FieldRule {
    FieldRule {
        key,
        shape: Shape::Raw,
        fallback: Fallback::Str(default),
    }
}

const fn flag(key: &'static str, default: bool) -> FieldRule {
    FieldRule {
        key,
        shape: Shape::Flag,
        fallback: Fallback::Bool(default),
    }
}

const fn non_empty(key: &'static str, fallback: Fallback) -> FieldRule {
    FieldRule {
        key,
        shape: Shape::NonEmpty,
        fallback,
    }
}

/// Groups: the target rejects any other key
const GROUP_FIELDS: &[FieldRule] = &[raw("name"), raw("parent")];

const MONITOR_BASE_FIELDS: &[FieldRule] = &[
    raw("type"),
    raw("name"),
    raw("parent"),
    int("interval", 60),
    int("retryInterval", 60),
    int("maxretries", 0),
    flag("upsideDown", false),
    int("timeout", 48),
    raw("notificationIDList"),
];

const HTTP_FIELDS: &[FieldRule] = &[
    raw("url"),
    text("method", "GET"),
    flag("ignoreTls", false),
    int("maxredirects", 10),
    non_empty("accepted_statuscodes", Fallback::Absent),
    non_empty("httpBodyEncoding", Fallback::Str("json")),
    raw("headers"),
    raw("body"),
    raw("keyword"),
    flag("invertKeyword", false),
    raw("jsonPath"),
    raw("expectedValue"),
    FieldRule {
        key: "authMethod",
        shape: Shape::AuthMethod,
        fallback: Fallback::Str(""),
    },
    raw("basic_auth_user"),
    raw("basic_auth_pass"),
    raw("oauth_client_id"),
    raw("oauth_client_secret"),
    raw("oauth_token_url"),
    raw("oauth_scopes"),
    raw("oauth_auth_method"),
    raw("tlsCa"),
    raw("tlsCert"),
    raw("tlsKey"),
];

const PING_FIELDS: &[FieldRule] = &[raw("hostname"), int("packetSize", 56)];

const DNS_FIELDS: &[FieldRule] = &[
    raw("hostname"),
    non_empty("port", Fallback::Int(53)),
    non_empty("dns_resolve_server", Fallback::Str("1.1.1.1")),
    non_empty("dns_resolve_type", Fallback::Str("A")),
];

const PORT_FIELDS: &[FieldRule] = &[raw("hostname"), raw("port")];

/// Notification keys that describe the stored row rather than the channel
const NOTIFICATION_BOOKKEEPING: &[&str] = &["id", "userId", "user_id"];

/// Authentication methods the target understands
const AUTH_METHODS: &[&str] = &["", "basic", "ntlm", "mtls", "oauth2-cc"];

/// Field rules for a monitor type, in submission order
pub fn monitor_rules(monitor_type: Option<MonitorType>) -> Vec<&'static FieldRule> {
    let family: &[FieldRule] = match monitor_type {
        Some(t) if t.is_http_family() => HTTP_FIELDS,
        Some(MonitorType::Ping) => PING_FIELDS,
        Some(MonitorType::Dns) => DNS_FIELDS,
        Some(MonitorType::Port) => PORT_FIELDS,
        _ => &[],
    };
    MONITOR_BASE_FIELDS.iter().chain(family.iter()).collect()
}

/// Reduce raw fields to the payload the target accepts for `kind`
pub fn sanitize(kind: EntityKind, fields: &Payload) -> Payload {
    match kind {
        EntityKind::Group => apply_rules(GROUP_FIELDS.iter(), fields),
        EntityKind::Monitor => {
            let monitor_type = fields
                .get("type")
                .and_then(Value::as_str)
                .and_then(MonitorType::parse);
            apply_rules(monitor_rules(monitor_type).into_iter(), fields)
        }
        EntityKind::Notification => fields
            .iter()
            .filter(|(key, _)| !NOTIFICATION_BOOKKEEPING.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
    }
}

fn apply_rules<'a>(rules: impl Iterator<Item = &'a FieldRule>, fields: &Payload) -> Payload {
    let mut payload = Payload::new();
    for rule in rules {
        let value = fields
            .get(rule.key)
            .and_then(|value| normalize(rule.shape, value))
            .or_else(|| rule.fallback.value());
        if let Some(value) = value {
            payload.insert(rule.key.to_string(), value);
        }
    }
    payload
}

fn normalize(shape: Shape, value: &Value) -> Option<Value> {
    if value.is_null() {
        return None;
    }
    match shape {
        Shape::Raw => Some(value.clone()),
        Shape::Flag => Some(Value::Bool(coerce_bool(Some(value), false))),
        Shape::NonEmpty => (!is_empty(value)).then(|| value.clone()),
        Shape::AuthMethod => {
            let method = value.as_str().map(str::trim).unwrap_or_default();
            let known = AUTH_METHODS.iter().find(|m| m.eq_ignore_ascii_case(method));
            Some(Value::from(known.copied().unwrap_or("")))
        }
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}
