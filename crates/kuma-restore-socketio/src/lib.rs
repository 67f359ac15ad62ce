//! Uptime Kuma Socket.IO transport
//!
//! Uptime Kuma has no REST API for managing monitors; its web UI talks to the server
//! over Socket.IO. This crate speaks that protocol (Engine.IO v4 over a WebSocket) and
//! implements [`KumaTransport`] on top of it:
//!
//! - `login` authenticates the session (with an optional 2FA token)
//! - `add` creates monitors and groups, `addNotification` creates notifications
//! - `pauseMonitor` pauses a monitor
//! - existing entities are read from the `monitorList` / `notificationList` pushes the
//!   server sends after login
//!
//! [`KumaTransport`]: kuma_restore_types::KumaTransport

pub mod client;
pub mod packet;
pub mod reply;
pub mod transport;

pub use client::SocketIoSession;
pub use packet::{EnginePacket, PacketError, SocketPacket};
pub use transport::{socket_url, ConfigError, SocketIoConfig, SocketIoTransport};
