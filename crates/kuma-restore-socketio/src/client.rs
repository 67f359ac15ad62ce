//! Socket.IO session against one Uptime Kuma instance
//!
//! A background task owns the WebSocket. It answers Engine.IO pings, routes
//! acknowledgements to the callers waiting on them and keeps the latest `monitorList`
//! and `notificationList` pushes. The session talks to it over a channel.

use crate::packet::{EnginePacket, SocketPacket};
use crate::reply::{
    check_ack, extract_id, find_by_name, monitors_from_list, notifications_from_list,
    MonitorFilter,
};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use kuma_restore_types::{
    Credentials, EntityKind, KumaSession, Payload, RemoteCall, RemoteReply, TargetId,
    TransportError, TransportResult,
};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace, warn};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Status codes Uptime Kuma expects on HTTP monitors when none are given
const DEFAULT_ACCEPTED_STATUS_CODES: &str = "200-299";

enum Command {
    Emit {
        event: String,
        args: Vec<Value>,
        reply: oneshot::Sender<Vec<Value>>,
    },
    Close,
}

/// Shared between the session and its connection task
struct Pushes {
    monitors: watch::Sender<Option<Value>>,
    notifications: watch::Sender<Option<Value>>,
    /// Why the connection ended, once it has
    closed: Mutex<Option<TransportError>>,
}

impl Pushes {
    fn close_reason(&self) -> TransportError {
        self.closed
            .lock()
            .ok()
            .and_then(|reason| reason.clone())
            .unwrap_or_else(|| TransportError::ConnectionReset("connection closed".into()))
    }

    fn set_closed(&self, reason: TransportError) {
        if let Ok(mut closed) = self.closed.lock() {
            closed.get_or_insert(reason);
        }
    }
}

/// Authenticated Socket.IO session
pub struct SocketIoSession {
    commands: mpsc::Sender<Command>,
    pushes: Arc<Pushes>,
    monitors: watch::Receiver<Option<Value>>,
    notifications: watch::Receiver<Option<Value>>,
    driver: Option<JoinHandle<()>>,
    timeout: Duration,
}

impl SocketIoSession {
    /// Open the WebSocket, join the default namespace and log in
    pub async fn open(url: &Url, credentials: &Credentials, wait: Duration) -> TransportResult<Self> {
        debug!("Connecting to {}", url);
        let (ws, _) = connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::ConnectionReset(format!("websocket connect failed: {}", e)))?;

        let (commands, command_rx) = mpsc::channel(32);
        let (monitors_tx, monitors) = watch::channel(None);
        let (notifications_tx, notifications) = watch::channel(None);
        let pushes = Arc::new(Pushes {
            monitors: monitors_tx,
            notifications: notifications_tx,
            closed: Mutex::new(None),
        });
        let (ready_tx, ready_rx) = oneshot::channel();
        let driver = tokio::spawn(drive(ws, command_rx, pushes.clone(), ready_tx));

        let mut session = Self {
            commands,
            pushes,
            monitors,
            notifications,
            driver: Some(driver),
            timeout: wait,
        };

        let joined = match timeout(wait, ready_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(session.pushes.close_reason()),
            Err(_) => Err(TransportError::Timeout(wait)),
        };
        if let Err(e) = joined {
            session.disconnect().await;
            return Err(e);
        }

        if let Err(e) = session.login(credentials).await {
            session.disconnect().await;
            return Err(e);
        }
        Ok(session)
    }

    async fn login(&mut self, credentials: &Credentials) -> TransportResult<()> {
        let token = credentials.totp_token.clone().unwrap_or_default();
        let args = self
            .emit(
                "login",
                vec![json!({
                    "username": credentials.username,
                    "password": credentials.password,
                    "token": token,
                })],
            )
            .await?;

        let body = args
            .first()
            .and_then(Value::as_object)
            .ok_or_else(|| TransportError::Protocol("empty login reply".into()))?;
        if body.get("ok").and_then(Value::as_bool).unwrap_or(false) {
            debug!("Logged in as {}", credentials.username);
            return Ok(());
        }
        if body.get("tokenRequired").and_then(Value::as_bool).unwrap_or(false) {
            return Err(TransportError::Authentication(
                "two-factor token required (set KUMA_2FA_TOKEN)".into(),
            ));
        }
        let msg = body
            .get("msg")
            .and_then(Value::as_str)
            .unwrap_or("login rejected");
        Err(TransportError::Authentication(msg.to_string()))
    }

    /// Emit an event and wait for its acknowledgement
    async fn emit(&self, event: &str, args: Vec<Value>) -> TransportResult<Vec<Value>> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Emit {
                event: event.to_string(),
                args,
                reply,
            })
            .await
            .map_err(|_| self.pushes.close_reason())?;

        match timeout(self.timeout, response).await {
            Ok(Ok(args)) => Ok(args),
            Ok(Err(_)) => Err(self.pushes.close_reason()),
            Err(_) => Err(TransportError::Timeout(self.timeout)),
        }
    }

    /// Latest push of a list, waiting for the first one if needed
    async fn latest(&self, which: EntityKind) -> TransportResult<Value> {
        let mut rx = match which {
            EntityKind::Notification => self.notifications.clone(),
            EntityKind::Group | EntityKind::Monitor => self.monitors.clone(),
        };
        let list = match timeout(self.timeout, rx.wait_for(Option::is_some)).await {
            Ok(Ok(list)) => list.clone(),
            Ok(Err(_)) => return Err(self.pushes.close_reason()),
            Err(_) => {
                return Err(TransportError::Protocol(format!(
                    "server did not push its {} list",
                    which
                )))
            }
        };
        list.ok_or_else(|| TransportError::Protocol("empty list push".into()))
    }

    async fn add_monitor(&mut self, kind: EntityKind, payload: &Payload) -> TransportResult<TargetId> {
        let wire = wire_monitor(kind, payload);
        let name = payload
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        // Only pushes that arrive after this point can carry the new monitor
        self.latest(EntityKind::Monitor).await?;
        self.monitors.borrow_and_update();

        let args = self.emit("add", vec![Value::Object(wire)]).await?;
        let body = check_ack(&args)?;
        if let Some(id) = extract_id(body) {
            return Ok(id);
        }

        debug!("No id in reply for '{}', waiting for the monitor list", name);
        let wait = self.timeout;
        let monitors = &mut self.monitors;
        let found = timeout(wait, async {
            loop {
                monitors.changed().await?;
                let list = monitors.borrow_and_update().clone();
                if let Some(id) = list.as_ref().and_then(|list| find_by_name(list, &name)) {
                    return Ok::<_, watch::error::RecvError>(id);
                }
            }
        })
        .await;

        match found {
            Ok(Ok(id)) => Ok(id),
            Ok(Err(_)) => Err(self.pushes.close_reason()),
            Err(_) => Err(TransportError::Protocol(format!(
                "created '{}' but the server returned no id",
                name
            ))),
        }
    }

    async fn add_notification(&mut self, payload: &Payload) -> TransportResult<TargetId> {
        let args = self
            .emit("addNotification", vec![Value::Object(payload.clone()), Value::Null])
            .await?;
        let body = check_ack(&args)?;
        extract_id(body)
            .ok_or_else(|| TransportError::Protocol("notification created without an id".into()))
    }
}

#[async_trait]
impl KumaSession for SocketIoSession {
    async fn execute(&mut self, call: &RemoteCall) -> TransportResult<RemoteReply> {
        trace!("Executing {}", call.describe());
        match call {
            RemoteCall::List(EntityKind::Notification) => {
                let list = self.latest(EntityKind::Notification).await?;
                Ok(RemoteReply::Listed(notifications_from_list(&list)))
            }
            RemoteCall::List(kind) => {
                let list = self.latest(*kind).await?;
                let filter = match kind {
                    EntityKind::Group => MonitorFilter::Groups,
                    _ => MonitorFilter::Monitors,
                };
                Ok(RemoteReply::Listed(monitors_from_list(&list, filter)))
            }
            RemoteCall::Create {
                kind: EntityKind::Notification,
                payload,
            } => self.add_notification(payload).await.map(RemoteReply::Created),
            RemoteCall::Create { kind, payload } => {
                self.add_monitor(*kind, payload).await.map(RemoteReply::Created)
            }
            RemoteCall::Pause(id) => {
                let args = self.emit("pauseMonitor", vec![json!(id.get())]).await?;
                check_ack(&args)?;
                Ok(RemoteReply::Paused)
            }
        }
    }

    async fn disconnect(&mut self) {
        let _ = self.commands.send(Command::Close).await;
        if let Some(mut driver) = self.driver.take() {
            if timeout(Duration::from_secs(2), &mut driver).await.is_err() {
                debug!("Connection task did not stop in time");
                driver.abort();
            }
        }
    }
}

impl Drop for SocketIoSession {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }
}

/// `add` payload with the defaults the server does not fill in itself
fn wire_monitor(kind: EntityKind, payload: &Payload) -> Map<String, Value> {
    let mut wire = payload.clone();
    if kind == EntityKind::Group {
        wire.insert("type".into(), json!("group"));
    }
    wire.entry("accepted_statuscodes")
        .or_insert_with(|| json!([DEFAULT_ACCEPTED_STATUS_CODES]));

    if let Some(Value::Array(ids)) = wire.get("notificationIDList") {
        let selection: Map<String, Value> = ids
            .iter()
            .map(|id| (id.to_string(), Value::Bool(true)))
            .collect();
        wire.insert("notificationIDList".into(), Value::Object(selection));
    }
    wire
}

/// Owns the WebSocket until it closes or the session asks it to stop
async fn drive(
    mut ws: WsStream,
    mut commands: mpsc::Receiver<Command>,
    pushes: Arc<Pushes>,
    ready: oneshot::Sender<TransportResult<()>>,
) {
    let mut ready = Some(ready);
    let mut pending: HashMap<u64, oneshot::Sender<Vec<Value>>> = HashMap::new();
    let mut next_ack: u64 = 0;

    let reason = loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Emit { event, args, reply }) => {
                    let ack_id = next_ack;
                    next_ack += 1;
                    let frame = SocketPacket::event(ack_id, &event, args).to_frame();
                    trace!("-> {} (ack {})", event, ack_id);
                    if let Err(e) = ws.send(Message::Text(frame)).await {
                        break TransportError::ConnectionReset(e.to_string());
                    }
                    pending.insert(ack_id, reply);
                }
                Some(Command::Close) | None => {
                    let _ = ws.close(None).await;
                    break TransportError::ConnectionReset("session closed".into());
                }
            },
            message = ws.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    trace!("<- {} bytes", text.len());
                    match handle_frame(&text, &mut ws, &pushes, &mut pending, &mut ready).await {
                        Ok(()) => {}
                        Err(reason) => break reason,
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = ws.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) | None => {
                    break TransportError::ConnectionReset("server closed the connection".into());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => break TransportError::ConnectionReset(e.to_string()),
            },
        }
    };

    debug!("Connection closed: {}", reason);
    pushes.set_closed(reason.clone());
    if let Some(ready) = ready.take() {
        let _ = ready.send(Err(reason));
    }
    // Dropping the pending senders wakes every caller still waiting on an ack
}

async fn handle_frame(
    text: &str,
    ws: &mut WsStream,
    pushes: &Pushes,
    pending: &mut HashMap<u64, oneshot::Sender<Vec<Value>>>,
    ready: &mut Option<oneshot::Sender<TransportResult<()>>>,
) -> Result<(), TransportError> {
    let packet = match EnginePacket::decode(text) {
        Ok(packet) => packet,
        Err(e) => {
            warn!("Ignoring malformed frame: {}", e);
            return Ok(());
        }
    };

    match packet {
        EnginePacket::Open(handshake) => {
            debug!("Engine.IO handshake: {}", handshake);
            let join = SocketPacket::Connect(None).to_frame();
            ws.send(Message::Text(join))
                .await
                .map_err(|e| TransportError::ConnectionReset(e.to_string()))?;
        }
        EnginePacket::Ping(body) => {
            ws.send(Message::Text(EnginePacket::Pong(body).encode()))
                .await
                .map_err(|e| TransportError::ConnectionReset(e.to_string()))?;
        }
        EnginePacket::Close => {
            return Err(TransportError::ConnectionReset("server closed the session".into()))
        }
        EnginePacket::Message(body) => match SocketPacket::decode(&body) {
            Ok(SocketPacket::Connect(_)) => {
                if let Some(ready) = ready.take() {
                    let _ = ready.send(Ok(()));
                }
            }
            Ok(SocketPacket::ConnectError(data)) => {
                return Err(TransportError::BadNamespace(data.to_string()));
            }
            Ok(SocketPacket::Disconnect) => {
                return Err(TransportError::BadNamespace("server left the namespace".into()));
            }
            Ok(SocketPacket::Ack { ack_id, args }) => match pending.remove(&ack_id) {
                Some(waiter) => {
                    let _ = waiter.send(args);
                }
                None => debug!("Ack {} has no waiter", ack_id),
            },
            Ok(SocketPacket::Event { name, mut args, .. }) => match name.as_str() {
                "monitorList" if !args.is_empty() => {
                    pushes.monitors.send_replace(Some(args.swap_remove(0)));
                }
                "notificationList" if !args.is_empty() => {
                    pushes.notifications.send_replace(Some(args.swap_remove(0)));
                }
                other => trace!("Ignoring event {}", other),
            },
            Err(e) => warn!("Ignoring malformed packet: {}", e),
        },
        EnginePacket::Pong(_) | EnginePacket::Upgrade | EnginePacket::Noop => {}
    }
    Ok(())
}
