//! Remote transport traits
//!
//! Defines the interface every backend that can talk to a target instance must provide.
//! A transport knows how to authenticate; a session executes calls until it is dropped
//! or invalidated.

use crate::entity::{EntityKind, TargetId};
use crate::error::TransportResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Minimal field set submitted to the target
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Login credentials for the target
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    /// One-time token for accounts with 2FA enabled
    pub totp_token: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("totp_token", &self.totp_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Entity that already exists on the target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistingEntity {
    pub id: TargetId,
    pub name: String,
}

/// A single remote operation
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    /// List existing entities of a kind
    List(EntityKind),
    /// Create an entity from a sanitized payload
    Create { kind: EntityKind, payload: Payload },
    /// Pause a monitor
    Pause(TargetId),
}

impl RemoteCall {
    /// Short description for log lines
    pub fn describe(&self) -> String {
        match self {
            RemoteCall::List(kind) => format!("list {}s", kind),
            RemoteCall::Create { kind, payload } => match payload.get("name") {
                Some(serde_json::Value::String(name)) => format!("create {} '{}'", kind, name),
                _ => format!("create {}", kind),
            },
            RemoteCall::Pause(id) => format!("pause monitor {}", id),
        }
    }
}

/// Reply to a `RemoteCall`
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteReply {
    Listed(Vec<ExistingEntity>),
    Created(TargetId),
    Paused,
}

/// Authenticated connection to the target
///
/// A session that returned a transient error must not be reused; callers drop it
/// and open a new one.
#[async_trait]
pub trait KumaSession: Send {
    /// Execute one remote call
    async fn execute(&mut self, call: &RemoteCall) -> TransportResult<RemoteReply>;

    /// Close the session; errors are ignored
    async fn disconnect(&mut self);
}

/// Factory for authenticated sessions
#[async_trait]
pub trait KumaTransport: Send + Sync {
    /// Human-readable name for this transport
    fn name(&self) -> &str;

    /// Open a connection and authenticate
    async fn connect(&self) -> TransportResult<Box<dyn KumaSession>>;
}
