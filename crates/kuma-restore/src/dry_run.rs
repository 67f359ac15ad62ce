//! Transport wrapper that reads the target but never writes to it

use async_trait::async_trait;
use kuma_restore_types::{
    KumaSession, KumaTransport, RemoteCall, RemoteReply, TargetId, TransportResult,
};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::info;

/// Wraps a real transport for dry runs
///
/// Listings still reach the target so existing entities are detected exactly as in a
/// live run. Creates return synthetic negative ids and pauses succeed without a call.
pub struct DryRunTransport {
    inner: Arc<dyn KumaTransport>,
    next_id: Arc<AtomicI64>,
    name: String,
}

impl DryRunTransport {
    pub fn new(inner: Arc<dyn KumaTransport>) -> Self {
        let name = format!("{} (dry run)", inner.name());
        Self {
            inner,
            next_id: Arc::new(AtomicI64::new(-1)),
            name,
        }
    }
}

#[async_trait]
impl KumaTransport for DryRunTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> TransportResult<Box<dyn KumaSession>> {
        let inner = self.inner.connect().await?;
        Ok(Box::new(DryRunSession {
            inner,
            next_id: self.next_id.clone(),
        }))
    }
}

struct DryRunSession {
    inner: Box<dyn KumaSession>,
    next_id: Arc<AtomicI64>,
}

#[async_trait]
impl KumaSession for DryRunSession {
    async fn execute(&mut self, call: &RemoteCall) -> TransportResult<RemoteReply> {
        match call {
            RemoteCall::List(_) => self.inner.execute(call).await,
            RemoteCall::Create { .. } => {
                let id = TargetId(self.next_id.fetch_sub(1, Ordering::SeqCst));
                info!("[dry run] would {} (synthetic id {})", call.describe(), id);
                Ok(RemoteReply::Created(id))
            }
            RemoteCall::Pause(_) => {
                info!("[dry run] would {}", call.describe());
                Ok(RemoteReply::Paused)
            }
        }
    }

    async fn disconnect(&mut self) {
        self.inner.disconnect().await;
    }
}
