//! `KumaTransport` implementation over Socket.IO

use crate::client::SocketIoSession;
use async_trait::async_trait;
use kuma_restore_types::{Credentials, KumaSession, KumaTransport, TransportResult};
use rustls::crypto::CryptoProvider;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Errors in the transport settings, reported before any connection attempt
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid server URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Unsupported URL scheme '{0}' (expected http, https, ws or wss)")]
    UnsupportedScheme(String),

    #[error("Username must not be empty")]
    MissingUsername,
}

/// Settings for connecting to an Uptime Kuma instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketIoConfig {
    /// Base URL of the instance, e.g. `https://status.example.com`
    pub url: String,
    pub credentials: Credentials,
    /// Bound on the handshake and on every acknowledgement
    pub timeout: Duration,
}

/// Connects to Uptime Kuma over its Socket.IO API
pub struct SocketIoTransport {
    socket_url: Url,
    credentials: Credentials,
    timeout: Duration,
    name: String,
}

impl SocketIoTransport {
    pub fn new(config: SocketIoConfig) -> Result<Self, ConfigError> {
        if config.credentials.username.trim().is_empty() {
            return Err(ConfigError::MissingUsername);
        }
        let socket_url = socket_url(&config.url)?;

        // wss needs a process-wide crypto provider; a second install is a no-op
        let _ = CryptoProvider::install_default(rustls::crypto::ring::default_provider());

        debug!("Socket.IO endpoint: {}", socket_url);
        Ok(Self {
            name: format!("Uptime Kuma at {}", config.url.trim_end_matches('/')),
            socket_url,
            credentials: config.credentials,
            timeout: config.timeout,
        })
    }

    pub fn socket_url(&self) -> &Url {
        &self.socket_url
    }
}

#[async_trait]
impl KumaTransport for SocketIoTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> TransportResult<Box<dyn KumaSession>> {
        let session = SocketIoSession::open(&self.socket_url, &self.credentials, self.timeout).await?;
        Ok(Box::new(session))
    }
}

/// Socket.IO WebSocket endpoint for an instance base URL
///
/// `http` becomes `ws` and `https` becomes `wss`. A sub-path (reverse proxy prefix) is
/// kept.
pub fn socket_url(base: &str) -> Result<Url, ConfigError> {
    let mut url = Url::parse(base.trim())?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
    };
    url.set_scheme(scheme)
        .map_err(|_| ConfigError::UnsupportedScheme(url.scheme().to_string()))?;

    let path = format!("{}/socket.io/", url.path().trim_end_matches('/'));
    url.set_path(&path);
    url.set_query(Some("EIO=4&transport=websocket"));
    url.set_fragment(None);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> Credentials {
        Credentials {
            username: "admin".into(),
            password: "secret".into(),
            totp_token: None,
        }
    }

    #[test]
    fn test_socket_url_from_http() {
        let url = socket_url("http://localhost:3001").unwrap();

        assert_eq!(
            url.as_str(),
            "ws://localhost:3001/socket.io/?EIO=4&transport=websocket"
        );
    }

    #[test]
    fn test_socket_url_keeps_sub_path_and_tls() {
        let url = socket_url("https://example.com/kuma/").unwrap();

        assert_eq!(
            url.as_str(),
            "wss://example.com/kuma/socket.io/?EIO=4&transport=websocket"
        );
    }

    #[test]
    fn test_socket_url_rejects_other_schemes() {
        assert!(matches!(
            socket_url("ftp://example.com"),
            Err(ConfigError::UnsupportedScheme(s)) if s == "ftp"
        ));
        assert!(matches!(socket_url("not a url"), Err(ConfigError::InvalidUrl(_))));
    }

    #[test]
    fn test_transport_requires_username() {
        let mut config = SocketIoConfig {
            url: "http://localhost:3001".into(),
            credentials: credentials(),
            timeout: Duration::from_secs(5),
        };
        config.credentials.username = " ".into();

        assert!(matches!(
            SocketIoTransport::new(config),
            Err(ConfigError::MissingUsername)
        ));
    }

    #[test]
    fn test_transport_name_describes_target() {
        let transport = SocketIoTransport::new(SocketIoConfig {
            url: "http://localhost:3001/".into(),
            credentials: credentials(),
            timeout: Duration::from_secs(5),
        })
        .unwrap();

        assert_eq!(transport.name(), "Uptime Kuma at http://localhost:3001");
        assert_eq!(transport.socket_url().scheme(), "ws");
    }
}
