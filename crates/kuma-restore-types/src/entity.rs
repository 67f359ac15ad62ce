//! Entity kinds and identifiers
//!
//! Snapshot ids and target ids live in different id spaces: a backup taken from one
//! instance carries ids that mean nothing on the instance being restored. They are
//! kept as distinct newtypes so one can never be submitted in place of the other.

use serde::{Deserialize, Serialize};

/// Identifier of an entity as recorded in the backup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotId(pub i64);

impl SnapshotId {
    pub fn get(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier assigned by the target instance
///
/// Dry runs hand out negative ids, which a live target never assigns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(pub i64);

impl TargetId {
    pub fn get(self) -> i64 {
        self.0
    }

    /// Whether this id was synthesized by a dry run
    pub fn is_synthetic(self) -> bool {
        self.0 < 0
    }
}

impl std::fmt::Display for TargetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of entity restored from a backup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// Notification channel (webhook, SMTP, Pushover, ...)
    Notification,
    /// Monitor of type `group`, may contain other groups and monitors
    Group,
    /// Any monitor that is not a group
    Monitor,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Notification => "notification",
            EntityKind::Group => "group",
            EntityKind::Monitor => "monitor",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Monitor types the target accepts on creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MonitorType {
    Group,
    Http,
    Ping,
    Dns,
    Port,
    Keyword,
    JsonQuery,
    GrpcKeyword,
    Docker,
    RealBrowser,
    Push,
    Steam,
    Gamedig,
    Mqtt,
    KafkaProducer,
    Sqlserver,
    Postgres,
    Mysql,
    Mongodb,
    Radius,
    Redis,
    TailscalePing,
}

impl MonitorType {
    pub const ALL: [MonitorType; 22] = [
        MonitorType::Group,
        MonitorType::Http,
        MonitorType::Ping,
        MonitorType::Dns,
        MonitorType::Port,
        MonitorType::Keyword,
        MonitorType::JsonQuery,
        MonitorType::GrpcKeyword,
        MonitorType::Docker,
        MonitorType::RealBrowser,
        MonitorType::Push,
        MonitorType::Steam,
        MonitorType::Gamedig,
        MonitorType::Mqtt,
        MonitorType::KafkaProducer,
        MonitorType::Sqlserver,
        MonitorType::Postgres,
        MonitorType::Mysql,
        MonitorType::Mongodb,
        MonitorType::Radius,
        MonitorType::Redis,
        MonitorType::TailscalePing,
    ];

    /// Get the wire identifier for this type
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorType::Group => "group",
            MonitorType::Http => "http",
            MonitorType::Ping => "ping",
            MonitorType::Dns => "dns",
            MonitorType::Port => "port",
            MonitorType::Keyword => "keyword",
            MonitorType::JsonQuery => "json-query",
            MonitorType::GrpcKeyword => "grpc-keyword",
            MonitorType::Docker => "docker",
            MonitorType::RealBrowser => "real-browser",
            MonitorType::Push => "push",
            MonitorType::Steam => "steam",
            MonitorType::Gamedig => "gamedig",
            MonitorType::Mqtt => "mqtt",
            MonitorType::KafkaProducer => "kafka-producer",
            MonitorType::Sqlserver => "sqlserver",
            MonitorType::Postgres => "postgres",
            MonitorType::Mysql => "mysql",
            MonitorType::Mongodb => "mongodb",
            MonitorType::Radius => "radius",
            MonitorType::Redis => "redis",
            MonitorType::TailscalePing => "tailscale-ping",
        }
    }

    /// Parse a monitor type, ignoring case and surrounding whitespace
    pub fn parse(s: &str) -> Option<Self> {
        let wanted = s.trim().to_lowercase();
        Self::ALL.into_iter().find(|t| t.as_str() == wanted)
    }

    /// Types that carry the HTTP request settings (url, method, auth, TLS material)
    pub fn is_http_family(&self) -> bool {
        matches!(
            self,
            MonitorType::Http
                | MonitorType::Keyword
                | MonitorType::JsonQuery
                | MonitorType::RealBrowser
                | MonitorType::Push
        )
    }
}

impl std::fmt::Display for MonitorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
