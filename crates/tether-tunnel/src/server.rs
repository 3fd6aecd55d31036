// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The tunnel server: accept loop, session registry, bounded dispatch.
//!
//! [`TcpTunnel`] listens on the configured port and spawns one
//! [`TunnelSession`] task per accepted client. The accept loop does
//! nothing but accept: all backend dispatch happens in session tasks
//! behind a shared [`Semaphore`], so a slow backend can never starve new
//! client accepts. On a backend failure the affected client is closed
//! and, when configured, a delayed retry of the backend connection is
//! scheduled.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::net::TcpListener;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::backend::Backend;
use crate::error::{TunnelError, TunnelResult};
use crate::protocol::DEFAULT_LISTEN_PORT;
use crate::session::{SessionOutcome, TunnelSession};

// =============================================================================
// TunnelConfig
// =============================================================================

/// Tunnel server configuration.
#[derive(Debug, Clone)]
pub struct TunnelConfig {
    /// Address to bind.
    pub listen_addr: String,

    /// Port to bind.
    pub listen_port: u16,

    /// Maximum concurrent backend requests across all sessions.
    pub max_workers: usize,

    /// Whether sessions share one pooled backend connection.
    ///
    /// When `false`, each departing client releases its backend claim.
    pub shared_backend: bool,

    /// Delay before retrying the backend connection after a failure.
    /// `None` disables the retry.
    pub backend_retry_delay: Option<Duration>,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0".to_string(),
            listen_port: DEFAULT_LISTEN_PORT,
            max_workers: 8,
            shared_backend: true,
            backend_retry_delay: Some(Duration::from_secs(5)),
        }
    }
}

impl TunnelConfig {
    /// Returns the bind address string.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.listen_addr, self.listen_port)
    }
}

// =============================================================================
// SessionInfo / TunnelStats
// =============================================================================

/// Registry entry for a live session.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// The client's address.
    pub peer: SocketAddr,
    /// When the session was accepted.
    pub accepted_at: DateTime<Utc>,
}

/// Counters maintained by a running tunnel.
#[derive(Debug, Default)]
pub struct TunnelStats {
    accepted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    backend_retries: AtomicU64,
}

impl TunnelStats {
    /// Clients accepted.
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    /// Sessions that ended with a clean client disconnect.
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Sessions that ended in failure.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Delayed backend retries scheduled.
    pub fn backend_retries(&self) -> u64 {
        self.backend_retries.load(Ordering::Relaxed)
    }
}

// =============================================================================
// TcpTunnel
// =============================================================================

/// The TCP tunnel server.
pub struct TcpTunnel {
    config: TunnelConfig,
    backend: Arc<dyn Backend>,
    workers: Arc<Semaphore>,
    sessions: Arc<DashMap<Uuid, SessionInfo>>,
    stats: Arc<TunnelStats>,
}

impl TcpTunnel {
    /// Creates a tunnel over the given backend.
    pub fn new(config: TunnelConfig, backend: Arc<dyn Backend>) -> Self {
        let workers = Arc::new(Semaphore::new(config.max_workers.max(1)));
        Self {
            config,
            backend,
            workers,
            sessions: Arc::new(DashMap::new()),
            stats: Arc::new(TunnelStats::default()),
        }
    }

    /// Returns the tunnel statistics handle.
    pub fn stats(&self) -> Arc<TunnelStats> {
        Arc::clone(&self.stats)
    }

    /// Returns the live session registry.
    pub fn sessions(&self) -> Arc<DashMap<Uuid, SessionInfo>> {
        Arc::clone(&self.sessions)
    }

    /// Binds the configured listen address.
    pub async fn bind(&self) -> TunnelResult<TcpListener> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| TunnelError::bind(&addr, e))?;

        tracing::info!(addr = %addr, "Tunnel listening");
        Ok(listener)
    }

    /// Serves accepted clients until `shutdown` flips to `true`.
    pub async fn serve(
        self: Arc<Self>,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> TunnelResult<()> {
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => self.spawn_session(stream, peer),
                        Err(error) => {
                            // Accept errors are transient (fd exhaustion,
                            // aborted handshakes); log and keep serving.
                            tracing::warn!(error = %error, "Accept failed");
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("Tunnel accept loop stopping");
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    /// Binds and serves in a background task, returning a stop handle.
    pub async fn spawn(self: Arc<Self>) -> TunnelResult<TunnelHandle> {
        let listener = self.bind().await?;
        let local_addr = listener.local_addr().map_err(TunnelError::accept)?;

        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(Arc::clone(&self).serve(listener, stop_rx));

        Ok(TunnelHandle {
            local_addr,
            stop_tx,
            task,
        })
    }

    fn spawn_session(self: &Arc<Self>, stream: tokio::net::TcpStream, peer: SocketAddr) {
        self.stats.accepted.fetch_add(1, Ordering::Relaxed);

        let session = TunnelSession::new(peer, self.config.shared_backend);
        let id = session.id();

        self.sessions.insert(
            id,
            SessionInfo {
                peer,
                accepted_at: Utc::now(),
            },
        );

        tracing::info!(session = %id, peer = %peer, "Tunnel client accepted");

        let tunnel = Arc::clone(self);
        tokio::spawn(async move {
            let backend = Arc::clone(&tunnel.backend);
            let workers = Arc::clone(&tunnel.workers);

            let (outcome, _record) = session.run(stream, backend, workers).await;

            tunnel.sessions.remove(&id);

            match outcome {
                SessionOutcome::ClientClosed => {
                    tunnel.stats.completed.fetch_add(1, Ordering::Relaxed);
                }
                SessionOutcome::BackendFailed => {
                    tunnel.stats.failed.fetch_add(1, Ordering::Relaxed);
                    tunnel.schedule_backend_retry();
                }
                SessionOutcome::ClientIoFailed => {
                    tunnel.stats.failed.fetch_add(1, Ordering::Relaxed);
                }
            }
        });
    }

    /// Schedules a delayed retry of the backend connection.
    fn schedule_backend_retry(self: &Arc<Self>) {
        let Some(delay) = self.config.backend_retry_delay else {
            return;
        };

        self.stats.backend_retries.fetch_add(1, Ordering::Relaxed);
        let backend = Arc::clone(&self.backend);

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match backend.ensure_connected().await {
                Ok(true) => tracing::info!("Backend reconnected after tunnel failure"),
                Ok(false) => tracing::warn!("Delayed backend retry did not connect"),
                Err(error) => {
                    tracing::warn!(error = %error, "Delayed backend retry failed");
                }
            }
        });
    }
}

impl std::fmt::Debug for TcpTunnel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpTunnel")
            .field("bind_addr", &self.config.bind_addr())
            .field("max_workers", &self.config.max_workers)
            .field("live_sessions", &self.sessions.len())
            .finish()
    }
}

// =============================================================================
// TunnelHandle
// =============================================================================

/// Handle to a running tunnel server.
pub struct TunnelHandle {
    local_addr: SocketAddr,
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<TunnelResult<()>>,
}

impl TunnelHandle {
    /// Returns the bound address (useful with an ephemeral port).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops the accept loop and waits for it to finish.
    pub async fn stop(self) -> TunnelResult<()> {
        let _ = self.stop_tx.send(true);
        match self.task.await {
            Ok(result) => result,
            Err(join_error) => {
                tracing::warn!(error = %join_error, "Tunnel task did not join cleanly");
                Ok(())
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
