//! In-memory Uptime Kuma target shared across restore scenario tests
//!
//! Keeps created entities per kind, assigns increasing ids, records every call and
//! connect, and can be told to fail specific calls.

#![allow(dead_code)]

use async_trait::async_trait;
use kuma_restore_types::{
    EntityKind, ExistingEntity, KumaSession, KumaTransport, Payload, RemoteCall, RemoteReply,
    Snapshot, TargetId, TransportError, TransportResult,
};
use std::sync::{Arc, Mutex};

/// Failure injected into the next matching calls
struct Injected {
    matches: Box<dyn Fn(&RemoteCall) -> bool + Send>,
    error: TransportError,
    remaining: usize,
    /// Apply the call before failing it, as when only the reply is lost
    commit: bool,
}

#[derive(Default)]
struct FakeState {
    entities: Vec<(EntityKind, ExistingEntity, Payload)>,
    next_id: i64,
    calls: Vec<RemoteCall>,
    connects: usize,
    paused: Vec<TargetId>,
    login_error: Option<TransportError>,
    failures: Vec<Injected>,
}

/// Fake target; clones share state
#[derive(Clone, Default)]
pub struct FakeKuma {
    state: Arc<Mutex<FakeState>>,
}

impl FakeKuma {
    pub fn new() -> Self {
        let fake = Self::default();
        fake.state.lock().unwrap().next_id = 100;
        fake
    }

    pub fn transport(&self) -> Arc<dyn KumaTransport> {
        Arc::new(self.clone())
    }

    /// Seed an entity that already exists on the target
    pub fn with_existing(&self, kind: EntityKind, name: &str) -> TargetId {
        let mut state = self.state.lock().unwrap();
        let id = TargetId(state.next_id);
        state.next_id += 1;
        state.entities.push((
            kind,
            ExistingEntity {
                id,
                name: name.to_string(),
            },
            Payload::new(),
        ));
        id
    }

    pub fn reject_login(&self, message: &str) {
        self.state.lock().unwrap().login_error =
            Some(TransportError::Authentication(message.to_string()));
    }

    /// Fail the next `times` creates of an entity named `name`
    pub fn fail_create(&self, name: &str, error: TransportError, times: usize) {
        let name = name.to_string();
        self.inject(
            move |call| match call {
                RemoteCall::Create { payload, .. } => {
                    payload.get("name").and_then(|n| n.as_str()) == Some(name.as_str())
                }
                _ => false,
            },
            error,
            times,
        );
    }

    /// Commit the next `times` creates of `name` but answer them with `error`
    pub fn commit_then_fail(&self, name: &str, error: TransportError, times: usize) {
        let name = name.to_string();
        self.push_failure(Injected {
            matches: Box::new(move |call| match call {
                RemoteCall::Create { payload, .. } => {
                    payload.get("name").and_then(|n| n.as_str()) == Some(name.as_str())
                }
                _ => false,
            }),
            error,
            remaining: times,
            commit: true,
        });
    }

    pub fn fail_list(&self, kind: EntityKind, error: TransportError, times: usize) {
        self.inject(
            move |call| matches!(call, RemoteCall::List(k) if *k == kind),
            error,
            times,
        );
    }

    pub fn fail_pauses(&self, error: TransportError) {
        self.inject(
            |call| matches!(call, RemoteCall::Pause(_)),
            error,
            usize::MAX,
        );
    }

    fn inject(
        &self,
        matches: impl Fn(&RemoteCall) -> bool + Send + 'static,
        error: TransportError,
        times: usize,
    ) {
        self.push_failure(Injected {
            matches: Box::new(matches),
            error,
            remaining: times,
            commit: false,
        });
    }

    fn push_failure(&self, injected: Injected) {
        self.state.lock().unwrap().failures.push(injected);
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn connects(&self) -> usize {
        self.state.lock().unwrap().connects
    }

    /// Create calls that reached the target, including failed ones
    pub fn create_calls(&self, kind: EntityKind) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, RemoteCall::Create { kind: k, .. } if *k == kind))
            .count()
    }

    pub fn total_create_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, RemoteCall::Create { .. }))
            .count()
    }

    /// Names of created entities of `kind` in creation order
    pub fn created_names(&self, kind: EntityKind) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .entities
            .iter()
            .filter(|(k, _, payload)| *k == kind && !payload.is_empty())
            .map(|(_, entity, _)| entity.name.clone())
            .collect()
    }

    pub fn id_of(&self, kind: EntityKind, name: &str) -> Option<TargetId> {
        self.state
            .lock()
            .unwrap()
            .entities
            .iter()
            .find(|(k, entity, _)| *k == kind && entity.name == name)
            .map(|(_, entity, _)| entity.id)
    }

    /// Payload the entity was created with
    pub fn payload_of(&self, kind: EntityKind, name: &str) -> Option<Payload> {
        self.state
            .lock()
            .unwrap()
            .entities
            .iter()
            .find(|(k, entity, _)| *k == kind && entity.name == name)
            .map(|(_, _, payload)| payload.clone())
    }

    pub fn paused(&self) -> Vec<TargetId> {
        self.state.lock().unwrap().paused.clone()
    }
}

#[async_trait]
impl KumaTransport for FakeKuma {
    fn name(&self) -> &str {
        "fake-kuma"
    }

    async fn connect(&self) -> TransportResult<Box<dyn KumaSession>> {
        let mut state = self.state.lock().unwrap();
        state.connects += 1;
        if let Some(error) = state.login_error.clone() {
            return Err(error);
        }
        Ok(Box::new(FakeSession {
            state: self.state.clone(),
        }))
    }
}

struct FakeSession {
    state: Arc<Mutex<FakeState>>,
}

#[async_trait]
impl KumaSession for FakeSession {
    async fn execute(&mut self, call: &RemoteCall) -> TransportResult<RemoteReply> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call.clone());

        let mut lost_reply = None;
        if let Some(injected) = state
            .failures
            .iter_mut()
            .find(|f| f.remaining > 0 && (f.matches)(call))
        {
            injected.remaining -= 1;
            if !injected.commit {
                return Err(injected.error.clone());
            }
            lost_reply = Some(injected.error.clone());
        }

        let reply = match call {
            RemoteCall::List(kind) => Ok(RemoteReply::Listed(
                state
                    .entities
                    .iter()
                    .filter(|(k, _, _)| k == kind)
                    .map(|(_, entity, _)| entity.clone())
                    .collect(),
            )),
            RemoteCall::Create { kind, payload } => {
                let name = payload
                    .get("name")
                    .and_then(|n| n.as_str())
                    .ok_or_else(|| TransportError::Validation("name is required".into()))?
                    .to_string();
                let id = TargetId(state.next_id);
                state.next_id += 1;
                state
                    .entities
                    .push((*kind, ExistingEntity { id, name }, payload.clone()));
                Ok(RemoteReply::Created(id))
            }
            RemoteCall::Pause(id) => {
                state.paused.push(*id);
                Ok(RemoteReply::Paused)
            }
        };
        match lost_reply {
            Some(error) => Err(error),
            None => reply,
        }
    }

    async fn disconnect(&mut self) {}
}

/// Parse a snapshot from inline JSON
pub fn snapshot(value: serde_json::Value) -> Snapshot {
    Snapshot::from_value(value).unwrap()
}
