// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Per-client tunnel sessions.
//!
//! A [`TunnelSession`] pairs one accepted client socket with the managed
//! backend connection and is supervised as a process-lifecycle instance:
//! its [`ProcessRecord`] walks `Created -> Initialized -> Ready ->
//! Running` as the session comes up and ends in `Terminated` (clean
//! client disconnect) or `Failed` (backend or client I/O failure). Either
//! side's disconnect cascades: a dead backend closes the client socket,
//! and a departing client releases its backend claim.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use uuid::Uuid;

use tether_core::process::{ProcessRecord, ProcessState};

use crate::backend::Backend;
use crate::protocol::{format_backend_error, format_unknown, format_value, parse_command};

// =============================================================================
// SessionOutcome
// =============================================================================

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The client disconnected cleanly.
    ClientClosed,
    /// A backend failure closed the session.
    BackendFailed,
    /// A client I/O failure closed the session.
    ClientIoFailed,
}

// =============================================================================
// TunnelSession
// =============================================================================

/// One accepted client bridged to the backend.
pub struct TunnelSession {
    id: Uuid,
    peer: SocketAddr,
    record: ProcessRecord,
    shared_backend: bool,
}

impl TunnelSession {
    /// Creates a session for an accepted client.
    pub fn new(peer: SocketAddr, shared_backend: bool) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            peer,
            record: ProcessRecord::new(format!("tunnel-session-{}", id)),
            shared_backend,
        }
    }

    /// Returns the session id.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the client address.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Runs the session to completion.
    ///
    /// Each request line acquires a permit from the shared worker pool
    /// before it touches the backend, so a slow backend saturates the
    /// pool instead of the accept loop.
    ///
    /// Returns the outcome and the finished lifecycle record.
    pub async fn run(
        mut self,
        stream: TcpStream,
        backend: Arc<dyn Backend>,
        workers: Arc<Semaphore>,
    ) -> (SessionOutcome, ProcessRecord) {
        let _ = self
            .record
            .transition(ProcessState::Initialized, "client socket accepted");

        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        // The session is only Ready once the backend is reachable.
        match backend.ensure_connected().await {
            Ok(true) => {
                let _ = self
                    .record
                    .transition(ProcessState::Ready, "backend connected");
            }
            Ok(false) | Err(_) => {
                let _ = self
                    .record
                    .transition(ProcessState::Failed, "backend unavailable");
                let _ = write_half
                    .write_all(format_backend_error("backend no disponible").as_bytes())
                    .await;
                return (SessionOutcome::BackendFailed, self.record);
            }
        }

        let _ = self
            .record
            .transition(ProcessState::Running, "serving client requests");

        let outcome = loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break SessionOutcome::ClientClosed,
                Err(error) => {
                    tracing::debug!(
                        session = %self.id,
                        peer = %self.peer,
                        error = %error,
                        "Client read failed"
                    );
                    break SessionOutcome::ClientIoFailed;
                }
            };

            let reply = match parse_command(&line) {
                Ok(command) => {
                    // Bounded dispatch: one permit per in-flight backend
                    // request across all sessions.
                    let permit = workers.acquire().await;
                    if permit.is_err() {
                        break SessionOutcome::BackendFailed;
                    }

                    match command {
                        crate::protocol::Command::Read { id } => {
                            match backend.read_value(&id).await {
                                Ok(value) => format_value(&value),
                                Err(error) => {
                                    tracing::warn!(
                                        session = %self.id,
                                        peer = %self.peer,
                                        id = %id,
                                        error = %error,
                                        "Backend read failed, closing client"
                                    );
                                    let _ = write_half
                                        .write_all(
                                            format_backend_error(&error.to_string()).as_bytes(),
                                        )
                                        .await;
                                    break SessionOutcome::BackendFailed;
                                }
                            }
                        }
                    }
                }
                Err(unknown) => format_unknown(&unknown.input),
            };

            if let Err(error) = write_half.write_all(reply.as_bytes()).await {
                tracing::debug!(
                    session = %self.id,
                    peer = %self.peer,
                    error = %error,
                    "Client write failed"
                );
                break SessionOutcome::ClientIoFailed;
            }
        };

        let _ = write_half.shutdown().await;

        match outcome {
            SessionOutcome::ClientClosed => {
                let _ = self
                    .record
                    .transition(ProcessState::Terminated, "client disconnected");
            }
            SessionOutcome::BackendFailed => {
                let _ = self
                    .record
                    .transition(ProcessState::Failed, "backend failure");
            }
            SessionOutcome::ClientIoFailed => {
                let _ = self
                    .record
                    .transition(ProcessState::Failed, "client I/O failure");
            }
        }

        // A departing client releases its backend claim unless the
        // backend is pooled across sessions.
        if !self.shared_backend {
            if let Err(error) = backend.release().await {
                tracing::warn!(
                    session = %self.id,
                    error = %error,
                    "Backend release failed"
                );
            }
        }

        tracing::info!(
            session = %self.id,
            peer = %self.peer,
            outcome = ?outcome,
            "Tunnel session ended"
        );

        (outcome, self.record)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tether_core::error::ConnectError;
    use tokio::io::AsyncReadExt;

    struct TableBackend {
        values: HashMap<String, String>,
        available: bool,
        releases: AtomicU64,
    }

    impl TableBackend {
        fn with_value(id: &str, value: &str) -> Arc<Self> {
            let mut values = HashMap::new();
            values.insert(id.to_string(), value.to_string());
            Arc::new(Self {
                values,
                available: true,
                releases: AtomicU64::new(0),
            })
        }

        fn unavailable() -> Arc<Self> {
            Arc::new(Self {
                values: HashMap::new(),
                available: false,
                releases: AtomicU64::new(0),
            })
        }
    }

    #[async_trait]
    impl Backend for TableBackend {
        async fn ensure_connected(&self) -> Result<bool, ConnectError> {
            Ok(self.available)
        }

        async fn read_value(&self, id: &str) -> Result<String, ConnectError> {
            self.values
                .get(id)
                .cloned()
                .ok_or_else(|| ConnectError::transport(format!("no such id: {}", id)))
        }

        async fn release(&self) -> Result<(), ConnectError> {
            self.releases.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    async fn client_pair() -> (TcpStream, TcpStream) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (client, server)
    }

    #[tokio::test]
    async fn test_read_round_trip() {
        let (mut client, server) = client_pair().await;
        let backend = TableBackend::with_value("42", "7");
        let session = TunnelSession::new(server.peer_addr().unwrap(), true);

        let task = tokio::spawn(session.run(
            server,
            backend,
            Arc::new(Semaphore::new(4)),
        ));

        client.write_all(b"READ:42\n").await.unwrap();
        client.shutdown().await.unwrap();

        let mut reply = String::new();
        client.read_to_string(&mut reply).await.unwrap();
        assert_eq!(reply, "Valor leído: 7\n");

        let (outcome, record) = task.await.unwrap();
        assert_eq!(outcome, SessionOutcome::ClientClosed);
        assert_eq!(record.state(), ProcessState::Terminated);
    }

    #[tokio::test]
    async fn test_unknown_command_echoed() {
        let (mut client, server) = client_pair().await;
        let backend = TableBackend::with_value("42", "7");
        let session = TunnelSession::new(server.peer_addr().unwrap(), true);

        let task = tokio::spawn(session.run(
            server,
            backend,
            Arc::new(Semaphore::new(4)),
        ));

        client.write_all(b"WRITE:1=2\n").await.unwrap();
        client.shutdown().await.unwrap();

        let mut reply = String::new();
        client.read_to_string(&mut reply).await.unwrap();
        assert_eq!(reply, "Comando no reconocido: WRITE:1=2\n");

        let (outcome, _) = task.await.unwrap();
        assert_eq!(outcome, SessionOutcome::ClientClosed);
    }

    #[tokio::test]
    async fn test_backend_error_closes_client() {
        let (mut client, server) = client_pair().await;
        let backend = TableBackend::with_value("42", "7");
        let session = TunnelSession::new(server.peer_addr().unwrap(), true);

        let task = tokio::spawn(session.run(
            server,
            backend,
            Arc::new(Semaphore::new(4)),
        ));

        client.write_all(b"READ:99\n").await.unwrap();

        let mut reply = String::new();
        client.read_to_string(&mut reply).await.unwrap();
        assert!(reply.starts_with("Error procesando la solicitud:"));

        let (outcome, record) = task.await.unwrap();
        assert_eq!(outcome, SessionOutcome::BackendFailed);
        assert_eq!(record.state(), ProcessState::Failed);
    }

    #[tokio::test]
    async fn test_unavailable_backend_fails_session() {
        let (mut client, server) = client_pair().await;
        let backend = TableBackend::unavailable();
        let session = TunnelSession::new(server.peer_addr().unwrap(), true);

        let task = tokio::spawn(session.run(
            server,
            backend,
            Arc::new(Semaphore::new(4)),
        ));

        let mut reply = String::new();
        client.read_to_string(&mut reply).await.unwrap();
        assert!(reply.starts_with("Error procesando la solicitud:"));

        let (outcome, record) = task.await.unwrap();
        assert_eq!(outcome, SessionOutcome::BackendFailed);
        assert_eq!(record.state(), ProcessState::Failed);
    }

    #[tokio::test]
    async fn test_exclusive_backend_released_on_disconnect() {
        let (mut client, server) = client_pair().await;
        let backend = TableBackend::with_value("42", "7");
        let session = TunnelSession::new(server.peer_addr().unwrap(), false);

        let task = tokio::spawn(session.run(
            server,
            backend.clone(),
            Arc::new(Semaphore::new(4)),
        ));

        client.shutdown().await.unwrap();
        let _ = task.await.unwrap();

        assert_eq!(backend.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_session_record_history_is_complete() {
        let (mut client, server) = client_pair().await;
        let backend = TableBackend::with_value("42", "7");
        let session = TunnelSession::new(server.peer_addr().unwrap(), true);

        let task = tokio::spawn(session.run(
            server,
            backend,
            Arc::new(Semaphore::new(4)),
        ));

        client.shutdown().await.unwrap();
        let (_, record) = task.await.unwrap();

        let states: Vec<ProcessState> = record.history().iter().map(|e| e.to).collect();
        assert_eq!(
            states,
            vec![
                ProcessState::Initialized,
                ProcessState::Ready,
                ProcessState::Running,
                ProcessState::Terminated,
            ]
        );
    }
}
