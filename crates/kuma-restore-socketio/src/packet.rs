//! Engine.IO v4 and Socket.IO v5 text packets
//!
//! Engine.IO frames every WebSocket text message with a one-digit packet type. Socket.IO
//! packets ride inside Engine.IO `message` packets:
//!
//! ```text
//! 4 2 12 ["add",{...}]
//! | | |  +-- JSON data
//! | | +-- ack id (optional)
//! | +-- socket.io type (EVENT)
//! +-- engine.io type (MESSAGE)
//! ```
//!
//! Only the default namespace is used; a namespace prefix on incoming packets is skipped.

use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PacketError {
    #[error("empty packet")]
    Empty,

    #[error("unknown {layer} packet type '{kind}'")]
    UnknownType { layer: &'static str, kind: char },

    #[error("invalid packet data: {0}")]
    InvalidData(String),
}

/// Engine.IO packet
#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    /// Handshake data sent by the server when the connection opens
    Open(String),
    Close,
    Ping(String),
    Pong(String),
    /// Carries a Socket.IO packet
    Message(String),
    Upgrade,
    Noop,
}

impl EnginePacket {
    pub fn decode(text: &str) -> Result<Self, PacketError> {
        let mut chars = text.chars();
        let kind = chars.next().ok_or(PacketError::Empty)?;
        let body = chars.as_str().to_string();
        match kind {
            '0' => Ok(EnginePacket::Open(body)),
            '1' => Ok(EnginePacket::Close),
            '2' => Ok(EnginePacket::Ping(body)),
            '3' => Ok(EnginePacket::Pong(body)),
            '4' => Ok(EnginePacket::Message(body)),
            '5' => Ok(EnginePacket::Upgrade),
            '6' => Ok(EnginePacket::Noop),
            kind => Err(PacketError::UnknownType {
                layer: "engine.io",
                kind,
            }),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            EnginePacket::Open(body) => format!("0{}", body),
            EnginePacket::Close => "1".to_string(),
            EnginePacket::Ping(body) => format!("2{}", body),
            EnginePacket::Pong(body) => format!("3{}", body),
            EnginePacket::Message(body) => format!("4{}", body),
            EnginePacket::Upgrade => "5".to_string(),
            EnginePacket::Noop => "6".to_string(),
        }
    }
}

/// Socket.IO packet on the default namespace
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect(Option<Value>),
    Disconnect,
    Event {
        ack_id: Option<u64>,
        name: String,
        args: Vec<Value>,
    },
    Ack {
        ack_id: u64,
        args: Vec<Value>,
    },
    ConnectError(Value),
}

impl SocketPacket {
    /// Event packet that asks the server for an acknowledgement
    pub fn event(ack_id: u64, name: &str, args: Vec<Value>) -> Self {
        SocketPacket::Event {
            ack_id: Some(ack_id),
            name: name.to_string(),
            args,
        }
    }

    pub fn decode(text: &str) -> Result<Self, PacketError> {
        let mut chars = text.chars();
        let kind = chars.next().ok_or(PacketError::Empty)?;
        let mut rest = chars.as_str();

        // "/admin,..." namespace prefix
        if rest.starts_with('/') {
            rest = match rest.find(',') {
                Some(comma) => &rest[comma + 1..],
                None => "",
            };
        }

        let digits = rest.chars().take_while(char::is_ascii_digit).count();
        let ack_id = if digits > 0 {
            let id = rest[..digits]
                .parse::<u64>()
                .map_err(|e| PacketError::InvalidData(e.to_string()))?;
            Some(id)
        } else {
            None
        };
        let data = &rest[digits..];

        match kind {
            '0' => Ok(SocketPacket::Connect(parse_optional(data)?)),
            '1' => Ok(SocketPacket::Disconnect),
            '2' => {
                let mut args = parse_array(data)?;
                if args.is_empty() {
                    return Err(PacketError::InvalidData("event without a name".into()));
                }
                let name = match args.remove(0) {
                    Value::String(name) => name,
                    other => {
                        return Err(PacketError::InvalidData(format!(
                            "event name must be a string, got {}",
                            other
                        )))
                    }
                };
                Ok(SocketPacket::Event { ack_id, name, args })
            }
            '3' => {
                let ack_id = ack_id
                    .ok_or_else(|| PacketError::InvalidData("ack without an id".into()))?;
                Ok(SocketPacket::Ack {
                    ack_id,
                    args: parse_array(data)?,
                })
            }
            '4' => Ok(SocketPacket::ConnectError(
                parse_optional(data)?.unwrap_or(Value::Null),
            )),
            kind => Err(PacketError::UnknownType {
                layer: "socket.io",
                kind,
            }),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            SocketPacket::Connect(None) => "0".to_string(),
            SocketPacket::Connect(Some(auth)) => format!("0{}", auth),
            SocketPacket::Disconnect => "1".to_string(),
            SocketPacket::Event { ack_id, name, args } => {
                let mut data = Vec::with_capacity(args.len() + 1);
                data.push(Value::String(name.clone()));
                data.extend(args.iter().cloned());
                let id = ack_id.map(|id| id.to_string()).unwrap_or_default();
                format!("2{}{}", id, Value::Array(data))
            }
            SocketPacket::Ack { ack_id, args } => {
                format!("3{}{}", ack_id, Value::Array(args.clone()))
            }
            SocketPacket::ConnectError(data) => format!("4{}", data),
        }
    }

    /// Wrap in an Engine.IO message frame
    pub fn to_frame(&self) -> String {
        EnginePacket::Message(self.encode()).encode()
    }
}

fn parse_optional(data: &str) -> Result<Option<Value>, PacketError> {
    if data.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(data)
        .map(Some)
        .map_err(|e| PacketError::InvalidData(e.to_string()))
}

fn parse_array(data: &str) -> Result<Vec<Value>, PacketError> {
    match parse_optional(data)? {
        Some(Value::Array(items)) => Ok(items),
        Some(other) => Err(PacketError::InvalidData(format!(
            "expected a JSON array, got {}",
            other
        ))),
        None => Ok(Vec::new()),
    }
}
