// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Raw TCP connection engine.
//!
//! [`TcpConnection`] manages a plain TCP peer: resolve, connect under a
//! deadline, and a one-byte round-trip liveness probe. It is the simplest
//! engine and the reference for how the others handle status and errors.

use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;

use tether_core::connection::{Connection, ConnectionConfig};
use tether_core::endpoint::{Endpoint, Scheme};
use tether_core::error::ConnectError;
use tether_core::state::{ConnectionStatus, StatusCell};

/// The byte written by the liveness probe.
const PROBE_BYTE: [u8; 1] = [0x00];

// =============================================================================
// TcpConnection
// =============================================================================

/// A raw TCP connection engine.
pub struct TcpConnection {
    name: String,
    config: ConnectionConfig,
    cell: StatusCell,
    stream: Mutex<Option<TcpStream>>,
}

impl TcpConnection {
    /// Creates an engine for the given configuration.
    pub fn new(name: impl Into<String>, config: ConnectionConfig) -> Self {
        Self {
            name: name.into(),
            config,
            cell: StatusCell::new(),
            stream: Mutex::new(None),
        }
    }

    /// Returns the engine configuration.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    fn validate(&self) -> Result<(), ConnectError> {
        if self.config.endpoint.scheme() != Scheme::Tcp {
            return Err(ConnectError::validation(
                "endpoint",
                format!(
                    "Scheme '{}' is not a raw TCP scheme",
                    self.config.endpoint.scheme()
                ),
            ));
        }
        Ok(())
    }

    async fn open_stream(&self) -> Result<TcpStream, ConnectError> {
        let addr = resolve(&self.config.endpoint).await?;

        let stream = TcpStream::connect(addr).await.map_err(|e| {
            ConnectError::transport_with(
                format!("Connect to {} failed", self.config.endpoint.authority()),
                e,
            )
        })?;

        stream.set_nodelay(true).ok();
        Ok(stream)
    }
}

/// Resolves an endpoint's authority to a socket address.
///
/// An unresolvable host is an endpoint validation failure, not a
/// transport error: retrying it cannot succeed without a config change.
pub(crate) async fn resolve(endpoint: &Endpoint) -> Result<SocketAddr, ConnectError> {
    let authority = endpoint.authority();

    if let Ok(addr) = authority.parse::<SocketAddr>() {
        return Ok(addr);
    }

    let mut addrs = tokio::net::lookup_host(&authority).await.map_err(|e| {
        ConnectError::validation("host", format!("'{}' is not resolvable: {}", endpoint.host(), e))
    })?;

    addrs.next().ok_or_else(|| {
        ConnectError::validation(
            "host",
            format!("'{}' resolved to no addresses", endpoint.host()),
        )
    })
}

#[async_trait]
impl Connection for TcpConnection {
    fn name(&self) -> &str {
        &self.name
    }

    fn endpoint(&self) -> &Endpoint {
        &self.config.endpoint
    }

    fn cell(&self) -> &StatusCell {
        &self.cell
    }

    async fn connect(&self) -> Result<bool, ConnectError> {
        self.validate()?;

        let guard = self.cell.begin().await;
        if guard.status().is_connected() {
            return Ok(true);
        }

        guard
            .transition(ConnectionStatus::Connecting)
            .map_err(|e| ConnectError::validation("status", e.to_string()))?;

        match timeout(self.config.connect_timeout, self.open_stream()).await {
            Ok(Ok(stream)) => {
                *self.stream.lock().await = Some(stream);
                guard
                    .transition(ConnectionStatus::Connected)
                    .map_err(|e| ConnectError::validation("status", e.to_string()))?;

                tracing::info!(
                    endpoint = %self.config.endpoint,
                    "TCP connection established"
                );
                Ok(true)
            }
            Ok(Err(error)) => {
                let _ = guard.transition(ConnectionStatus::Error);
                Err(error)
            }
            Err(_) => {
                let _ = guard.transition(ConnectionStatus::Error);
                Err(ConnectError::timeout(self.config.connect_timeout))
            }
        }
    }

    async fn disconnect(&self) -> Result<bool, ConnectError> {
        let guard = self.cell.begin().await;

        let mut stream = match self.stream.lock().await.take() {
            Some(stream) => stream,
            None => return Ok(true),
        };

        let _ = guard.transition(ConnectionStatus::Disconnecting);

        if let Err(error) = stream.shutdown().await {
            tracing::debug!(
                endpoint = %self.config.endpoint,
                error = %error,
                "TCP shutdown reported an error"
            );
        }

        let _ = guard.transition(ConnectionStatus::Disconnected);

        tracing::info!(endpoint = %self.config.endpoint, "TCP connection closed");
        Ok(true)
    }

    async fn ping(&self) -> Result<bool, ConnectError> {
        let mut stream_slot = self.stream.lock().await;
        let stream = stream_slot.as_mut().ok_or(ConnectError::NotConnected)?;

        let probe = async {
            stream.write_all(&PROBE_BYTE).await?;
            let mut buf = [0u8; 1];
            let n = stream.read(&mut buf).await?;
            Ok::<usize, std::io::Error>(n)
        };

        match timeout(self.config.ping_timeout, probe).await {
            Ok(Ok(n)) => Ok(n > 0),
            Ok(Err(error)) => {
                tracing::debug!(
                    endpoint = %self.config.endpoint,
                    error = %error,
                    "TCP probe failed"
                );
                Ok(false)
            }
            Err(_) => Ok(false),
        }
    }
}

impl std::fmt::Debug for TcpConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpConnection")
            .field("name", &self.name)
            .field("endpoint", &self.config.endpoint.to_string())
            .field("status", &self.cell.status())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn echo_server() -> (TcpListener, Endpoint) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let endpoint = Endpoint::parse(&format!("tcp://127.0.0.1:{}", port)).unwrap();
        (listener, endpoint)
    }

    fn engine(endpoint: Endpoint) -> TcpConnection {
        TcpConnection::new("peer", ConnectionConfig::new(endpoint))
    }

    #[tokio::test]
    async fn test_connect_and_disconnect() {
        let (listener, endpoint) = echo_server().await;
        tokio::spawn(async move {
            let _ = listener.accept().await;
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        });

        let conn = engine(endpoint);
        assert!(conn.connect().await.unwrap());
        assert!(conn.is_connected());

        assert!(conn.disconnect().await.unwrap());
        assert!(conn.disconnect().await.unwrap());
        assert_eq!(conn.status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to get a port with no listener.
        let (listener, endpoint) = echo_server().await;
        drop(listener);

        let conn = engine(endpoint);
        let error = conn.connect().await.unwrap_err();
        assert!(matches!(error, ConnectError::Transport { .. }));
        assert_eq!(conn.status(), ConnectionStatus::Error);
    }

    #[tokio::test]
    async fn test_ping_round_trip() {
        let (listener, endpoint) = echo_server().await;
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1];
            loop {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {
                        if socket.write_all(&buf).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        let conn = engine(endpoint);
        conn.connect().await.unwrap();
        assert!(conn.ping().await.unwrap());
    }

    #[tokio::test]
    async fn test_ping_without_handle() {
        let (_listener, endpoint) = echo_server().await;
        let conn = engine(endpoint);

        assert!(matches!(conn.ping().await, Err(ConnectError::NotConnected)));
    }

    #[tokio::test]
    async fn test_ping_timeout_is_false() {
        let (listener, endpoint) = echo_server().await;
        tokio::spawn(async move {
            // Accept but never echo.
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(std::time::Duration::from_secs(10)).await;
        });

        let config = ConnectionConfig::new(endpoint)
            .with_ping_timeout(std::time::Duration::from_millis(50));
        let conn = TcpConnection::new("mute", config);

        conn.connect().await.unwrap();
        assert_eq!(conn.ping().await.unwrap(), false);
    }

    #[tokio::test]
    async fn test_wrong_scheme_fails_validation() {
        let endpoint = Endpoint::parse("https://host:443").unwrap();
        let conn = engine(endpoint);

        assert!(matches!(
            conn.connect().await,
            Err(ConnectError::Validation { .. })
        ));
    }
}
