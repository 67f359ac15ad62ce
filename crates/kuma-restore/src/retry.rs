//! Retrying wrapper around a transport session
//!
//! Every remote call made during a restore goes through [`RetryingClient`]. It owns the
//! session, bounds each call with a timeout, and on a transient failure throws the session
//! away, waits, re-authenticates and tries again.

use kuma_restore_types::{
    EntityKind, ErrorClass, ExistingEntity, KumaSession, KumaTransport, Payload, RemoteCall,
    RemoteReply, TargetId, TransportError, TransportResult,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

/// When and how often a failed call is repeated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts per call, including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    pub delay: Duration,
    /// Multiplier applied to the delay for every further retry
    pub backoff: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            delay: Duration::from_millis(1000),
            backoff: 2,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn classify(&self, error: &TransportError) -> ErrorClass {
        error.class()
    }

    /// Whether a call that failed on attempt `attempt` (1-based) should run again
    pub fn should_retry(&self, error: &TransportError, attempt: u32) -> bool {
        self.classify(error) == ErrorClass::Transient && attempt < self.max_attempts
    }

    /// Delay before retrying after failed attempt `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self
            .backoff
            .max(1)
            .saturating_pow(attempt.saturating_sub(1));
        self.delay.saturating_mul(factor)
    }
}

/// Transport client that owns one session at a time and retries transient failures
pub struct RetryingClient {
    transport: Arc<dyn KumaTransport>,
    session: Option<Box<dyn KumaSession>>,
    policy: RetryPolicy,
    call_timeout: Duration,
}

impl RetryingClient {
    pub fn new(transport: Arc<dyn KumaTransport>, policy: RetryPolicy, call_timeout: Duration) -> Self {
        Self {
            transport,
            session: None,
            policy,
            call_timeout,
        }
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    /// Authenticate now rather than on the first call
    ///
    /// Connection failures are not retried here; the caller decides whether a failed
    /// login is fatal.
    pub async fn open_session(&mut self) -> TransportResult<()> {
        self.session().await.map(|_| ())
    }

    /// Close the current session, if any
    pub async fn end_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            debug!("Closing session");
            let _ = timeout(self.call_timeout, session.disconnect()).await;
        }
    }

    /// Execute a call, retrying transient failures according to the policy
    ///
    /// A create that failed transiently may still have been committed by the target, so
    /// before it is sent again the kind is listed on the fresh session and an entity
    /// carrying the payload's name is adopted instead. Callers only create names the
    /// target did not hold before the call.
    pub async fn call(&mut self, call: &RemoteCall) -> TransportResult<RemoteReply> {
        let mut attempt = 1;
        loop {
            let result = if attempt > 1 {
                self.reattempt(call).await
            } else {
                self.attempt(call).await
            };
            match result {
                Ok(reply) => {
                    if attempt > 1 {
                        debug!("{} succeeded on attempt {}", call.describe(), attempt);
                    }
                    return Ok(reply);
                }
                Err(error) if self.policy.should_retry(&error, attempt) => {
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        "{} failed (attempt {}/{}): {}, reconnecting in {}ms",
                        call.describe(),
                        attempt,
                        self.policy.max_attempts,
                        error,
                        delay.as_millis()
                    );
                    self.end_session().await;
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => {
                    if error.is_transient() {
                        self.end_session().await;
                    }
                    return Err(error);
                }
            }
        }
    }

    pub async fn list(&mut self, kind: EntityKind) -> TransportResult<Vec<ExistingEntity>> {
        match self.call(&RemoteCall::List(kind)).await? {
            RemoteReply::Listed(entities) => Ok(entities),
            other => Err(unexpected("list", &other)),
        }
    }

    pub async fn create(&mut self, kind: EntityKind, payload: Payload) -> TransportResult<TargetId> {
        match self.call(&RemoteCall::Create { kind, payload }).await? {
            RemoteReply::Created(id) => Ok(id),
            other => Err(unexpected("create", &other)),
        }
    }

    pub async fn pause(&mut self, id: TargetId) -> TransportResult<()> {
        match self.call(&RemoteCall::Pause(id)).await? {
            RemoteReply::Paused => Ok(()),
            other => Err(unexpected("pause", &other)),
        }
    }

    /// Retry of `call` after a transient failure
    async fn reattempt(&mut self, call: &RemoteCall) -> TransportResult<RemoteReply> {
        let RemoteCall::Create { kind, payload } = call else {
            return self.attempt(call).await;
        };
        let Some(name) = payload.get("name").and_then(|n| n.as_str()) else {
            return self.attempt(call).await;
        };

        let listing = self.attempt(&RemoteCall::List(*kind)).await?;
        let RemoteReply::Listed(entities) = listing else {
            return Err(unexpected("list", &listing));
        };
        match entities.iter().filter(|e| e.name == name).map(|e| e.id).max() {
            Some(id) => {
                warn!(
                    "{} was committed before the failure, adopting {} {}",
                    call.describe(),
                    kind,
                    id
                );
                Ok(RemoteReply::Created(id))
            }
            None => self.attempt(call).await,
        }
    }

    async fn attempt(&mut self, call: &RemoteCall) -> TransportResult<RemoteReply> {
        let limit = self.call_timeout;
        let session = self.session().await?;
        match timeout(limit, session.execute(call)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(limit)),
        }
    }

    async fn session(&mut self) -> TransportResult<&mut Box<dyn KumaSession>> {
        let session = match self.session.take() {
            Some(session) => session,
            None => {
                debug!("Opening session");
                match timeout(self.call_timeout, self.transport.connect()).await {
                    Ok(result) => result?,
                    Err(_) => return Err(TransportError::Timeout(self.call_timeout)),
                }
            }
        };
        Ok(self.session.insert(session))
    }
}

fn unexpected(operation: &str, reply: &RemoteReply) -> TransportError {
    TransportError::Protocol(format!("unexpected reply to {}: {:?}", operation, reply))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mockall::mock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    mock! {
        Session {}

        #[async_trait]
        impl KumaSession for Session {
            async fn execute(&mut self, call: &RemoteCall) -> TransportResult<RemoteReply>;
            async fn disconnect(&mut self);
        }
    }

    mock! {
        Transport {}

        #[async_trait]
        impl KumaTransport for Transport {
            fn name(&self) -> &str;
            async fn connect(&self) -> TransportResult<Box<dyn KumaSession>>;
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::default().with_delay(Duration::from_millis(1))
    }

    /// Session that lists `listing` and answers every other call with `reply`
    fn session_replying(
        reply: TransportResult<RemoteReply>,
        listing: Vec<ExistingEntity>,
    ) -> Box<dyn KumaSession> {
        let mut session = MockSession::new();
        session.expect_execute().returning(move |call| match call {
            RemoteCall::List(_) => Ok(RemoteReply::Listed(listing.clone())),
            _ => reply.clone(),
        });
        session.expect_disconnect().returning(|| ());
        Box::new(session)
    }

    /// Transport whose n-th connect (0-based) yields a session replying with `replies[n]`
    fn transport_with(
        replies: Vec<TransportResult<RemoteReply>>,
    ) -> (Arc<dyn KumaTransport>, Arc<AtomicUsize>) {
        let connects = Arc::new(AtomicUsize::new(0));
        let counter = connects.clone();
        let mut transport = MockTransport::new();
        transport.expect_connect().returning(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            Ok(session_replying(replies[n].clone(), Vec::new()))
        });
        (Arc::new(transport), connects)
    }

    fn group_payload() -> Payload {
        let mut payload = Payload::new();
        payload.insert("name".into(), serde_json::json!("Edge"));
        payload
    }

    #[test]
    fn test_policy_retries_only_transient_errors() {
        // Arrange
        let policy = RetryPolicy::default();

        // Assert
        assert!(policy.should_retry(&TransportError::BadNamespace("/".into()), 1));
        assert!(policy.should_retry(&TransportError::Timeout(Duration::from_secs(1)), 1));
        assert!(policy.should_retry(&TransportError::ConnectionReset("eof".into()), 1));
        assert!(!policy.should_retry(&TransportError::Validation("bad".into()), 1));
        assert!(!policy.should_retry(&TransportError::DuplicateName("x".into()), 1));
        assert!(!policy.should_retry(&TransportError::Authentication("no".into()), 1));
        assert!(!policy.should_retry(&TransportError::Protocol("?".into()), 1));
    }

    #[test]
    fn test_policy_retries_once_by_default() {
        let policy = RetryPolicy::default();
        let error = TransportError::ConnectionReset("eof".into());

        assert!(policy.should_retry(&error, 1));
        assert!(!policy.should_retry(&error, 2));
        assert!(!RetryPolicy::no_retry().should_retry(&error, 1));
    }

    #[test]
    fn test_delay_grows_exponentially() {
        let policy = RetryPolicy {
            max_attempts: 4,
            delay: Duration::from_millis(100),
            backoff: 2,
        };

        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_call_succeeds_without_retry() {
        // Arrange
        let (transport, connects) = transport_with(vec![Ok(RemoteReply::Created(TargetId(9)))]);
        let mut client = RetryingClient::new(transport, fast_policy(), Duration::from_secs(5));

        // Act
        let id = client.create(EntityKind::Group, group_payload()).await.unwrap();

        // Assert
        assert_eq!(id, TargetId(9));
        assert_eq!(connects.load(Ordering::SeqCst), 1);
        assert!(client.has_session());
    }

    #[tokio::test]
    async fn test_transient_failure_reconnects_and_retries() {
        // Arrange
        let (transport, connects) = transport_with(vec![
            Err(TransportError::BadNamespace("/".into())),
            Ok(RemoteReply::Created(TargetId(12))),
        ]);
        let mut client = RetryingClient::new(transport, fast_policy(), Duration::from_secs(5));

        // Act
        let id = client.create(EntityKind::Group, group_payload()).await.unwrap();

        // Assert
        assert_eq!(id, TargetId(12));
        assert_eq!(connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_second_transient_failure_is_surfaced() {
        let (transport, connects) = transport_with(vec![
            Err(TransportError::ConnectionReset("eof".into())),
            Err(TransportError::ConnectionReset("eof".into())),
        ]);
        let mut client = RetryingClient::new(transport, fast_policy(), Duration::from_secs(5));

        let result = client.create(EntityKind::Group, group_payload()).await;

        assert!(matches!(result, Err(TransportError::ConnectionReset(_))));
        assert_eq!(connects.load(Ordering::SeqCst), 2);
        assert!(!client.has_session());
    }

    #[tokio::test]
    async fn test_validation_failure_is_not_retried() {
        let (transport, connects) =
            transport_with(vec![Err(TransportError::Validation("url required".into()))]);
        let mut client = RetryingClient::new(transport, fast_policy(), Duration::from_secs(5));

        let result = client.create(EntityKind::Monitor, group_payload()).await;

        assert!(matches!(result, Err(TransportError::Validation(_))));
        assert_eq!(connects.load(Ordering::SeqCst), 1);
        assert!(client.has_session());
    }

    #[tokio::test]
    async fn test_authentication_failure_is_not_retried() {
        let connects = Arc::new(AtomicUsize::new(0));
        let counter = connects.clone();
        let mut transport = MockTransport::new();
        transport.expect_connect().returning(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(TransportError::Authentication("Incorrect username or password".into()))
        });
        let mut client =
            RetryingClient::new(Arc::new(transport), fast_policy(), Duration::from_secs(5));

        let result = client.open_session().await;

        assert!(matches!(result, Err(TransportError::Authentication(_))));
        assert_eq!(connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_committed_create_is_adopted_instead_of_resent() {
        // Arrange: the first create lands on the target but its reply times out
        let mut lost_reply = MockSession::new();
        lost_reply
            .expect_execute()
            .times(1)
            .returning(|_| Err(TransportError::Timeout(Duration::from_secs(5))));
        lost_reply.expect_disconnect().returning(|| ());

        let mut after_reconnect = MockSession::new();
        after_reconnect
            .expect_execute()
            .withf(|call| matches!(call, RemoteCall::List(EntityKind::Group)))
            .times(1)
            .returning(|_| {
                Ok(RemoteReply::Listed(vec![ExistingEntity {
                    id: TargetId(7),
                    name: "Edge".into(),
                }]))
            });
        after_reconnect.expect_disconnect().returning(|| ());

        let mut sessions: Vec<Box<dyn KumaSession>> =
            vec![Box::new(lost_reply), Box::new(after_reconnect)];
        sessions.reverse();
        let mut transport = MockTransport::new();
        transport
            .expect_connect()
            .times(2)
            .returning(move || {
                sessions
                    .pop()
                    .ok_or_else(|| TransportError::ConnectionReset("no session".into()))
            });
        let mut client =
            RetryingClient::new(Arc::new(transport), fast_policy(), Duration::from_secs(5));

        // Act
        let id = client.create(EntityKind::Group, group_payload()).await.unwrap();

        // Assert
        assert_eq!(id, TargetId(7));
    }

    #[tokio::test]
    async fn test_retried_create_is_resent_when_not_committed() {
        let connects = Arc::new(AtomicUsize::new(0));
        let counter = connects.clone();
        let mut transport = MockTransport::new();
        transport.expect_connect().returning(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            let reply = if n == 0 {
                Err(TransportError::ConnectionReset("eof".into()))
            } else {
                Ok(RemoteReply::Created(TargetId(8)))
            };
            let other = ExistingEntity {
                id: TargetId(3),
                name: "Core".into(),
            };
            Ok(session_replying(reply, vec![other]))
        });
        let mut client =
            RetryingClient::new(Arc::new(transport), fast_policy(), Duration::from_secs(5));

        let id = client.create(EntityKind::Group, group_payload()).await.unwrap();

        assert_eq!(id, TargetId(8));
        assert_eq!(connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_wrong_reply_variant_is_protocol_error() {
        let (transport, _) = transport_with(vec![Ok(RemoteReply::Created(TargetId(3)))]);
        let mut client = RetryingClient::new(transport, fast_policy(), Duration::from_secs(5));

        let result = client.pause(TargetId(1)).await;

        assert!(matches!(result, Err(TransportError::Protocol(_))));
    }

    struct SlowSession;

    #[async_trait]
    impl KumaSession for SlowSession {
        async fn execute(&mut self, _call: &RemoteCall) -> TransportResult<RemoteReply> {
            sleep(Duration::from_millis(200)).await;
            Ok(RemoteReply::Paused)
        }

        async fn disconnect(&mut self) {}
    }

    #[tokio::test]
    async fn test_slow_call_times_out() {
        // Arrange
        let mut transport = MockTransport::new();
        transport
            .expect_connect()
            .returning(|| Ok(Box::new(SlowSession) as Box<dyn KumaSession>));
        let mut client = RetryingClient::new(
            Arc::new(transport),
            RetryPolicy::no_retry(),
            Duration::from_millis(20),
        );

        // Act
        let result = client.pause(TargetId(1)).await;

        // Assert
        assert_eq!(result, Err(TransportError::Timeout(Duration::from_millis(20))));
        assert!(!client.has_session());
    }

    #[tokio::test]
    async fn test_end_session_forces_reconnect() {
        let (transport, connects) = transport_with(vec![
            Ok(RemoteReply::Listed(vec![])),
            Ok(RemoteReply::Listed(vec![])),
        ]);
        let mut client = RetryingClient::new(transport, fast_policy(), Duration::from_secs(5));

        client.list(EntityKind::Notification).await.unwrap();
        client.end_session().await;
        client.list(EntityKind::Group).await.unwrap();

        assert_eq!(connects.load(Ordering::SeqCst), 2);
    }
}
