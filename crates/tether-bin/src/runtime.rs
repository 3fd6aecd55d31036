// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Supervisor runtime orchestration.
//!
//! The [`SupervisorRuntime`] assembles everything from configuration:
//!
//! - one connection engine per configured endpoint (OPC UA, TLS, or TCP)
//! - a single-flight reconnector and health monitor per endpoint
//! - the optional TCP tunnel over a designated OPC UA backend
//! - graceful shutdown, where `stop()` completes every in-flight
//!   disconnect and reports the handles that failed to close
//!
//! The OPC UA protocol library is injected through the transport seam;
//! development mode wires the in-process simulated transport instead.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use tether_cert::{ChainValidator, TrustAnchorSet, ValidationPolicy};
use tether_config::{load_config, TetherConfig};
use tether_core::connection::{Connection, ConnectionConfig};
use tether_core::endpoint::Scheme;
use tether_core::error::ConnectError;
use tether_core::health::{HealthConfig, HealthMonitor, MonitorHandle};
use tether_core::reconnect::Reconnector;
use tether_core::retry::RetryPolicy;
use tether_net::{TcpConnection, TlsConnection};
use tether_opcua::{NodeId, OpcUaConfig, OpcUaConnection, OpcUaTransport, SimTransport};
use tether_tunnel::{Backend, TcpTunnel, TunnelConfig, TunnelHandle};

use crate::error::{BinError, BinResult};
use crate::shutdown::ShutdownCoordinator;

// =============================================================================
// ManagedEndpoint
// =============================================================================

/// One supervised endpoint: its engine plus recovery machinery.
pub struct ManagedEndpoint {
    /// Endpoint id from configuration.
    pub id: String,
    /// The engine, type-erased for supervision.
    pub conn: Arc<dyn Connection>,
    /// The engine, kept concrete where the tunnel needs reads.
    opcua: Option<Arc<OpcUaConnection>>,
    /// Single-flight reconnector for this handle.
    pub reconnector: Arc<Reconnector>,
}

// =============================================================================
// StopReport
// =============================================================================

/// Result of a supervisor stop sequence.
#[derive(Debug, Default)]
pub struct StopReport {
    /// Endpoints whose disconnect did not complete cleanly.
    pub failed: Vec<(String, ConnectError)>,
}

impl StopReport {
    /// Returns `true` when every disconnect completed.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

// =============================================================================
// SupervisorRuntime
// =============================================================================

/// The supervisor runtime.
pub struct SupervisorRuntime {
    config: Arc<TetherConfig>,
    shutdown: ShutdownCoordinator,
    opcua_transport: Option<Arc<dyn OpcUaTransport>>,
    dev_mode: bool,
    skip_connect: bool,
}

impl SupervisorRuntime {
    /// Creates a runtime over a validated configuration.
    pub fn new(config: TetherConfig) -> Self {
        Self {
            config: Arc::new(config),
            shutdown: ShutdownCoordinator::new(),
            opcua_transport: None,
            dev_mode: false,
            skip_connect: false,
        }
    }

    /// Injects the OPC UA protocol library backend.
    pub fn with_opcua_transport(mut self, transport: Arc<dyn OpcUaTransport>) -> Self {
        self.opcua_transport = Some(transport);
        self
    }

    /// Enables development mode (simulated OPC UA transport).
    pub fn with_dev_mode(mut self, enabled: bool) -> Self {
        self.dev_mode = enabled;
        self
    }

    /// Skips the initial connect of all endpoints.
    pub fn with_skip_connect(mut self, skip: bool) -> Self {
        self.skip_connect = skip;
        self
    }

    /// Returns the shutdown coordinator for external control.
    pub fn shutdown_handle(&self) -> ShutdownCoordinator {
        self.shutdown.clone()
    }

    /// Runs the supervisor until shutdown is signaled.
    pub async fn run(self) -> BinResult<()> {
        info!(client = %self.config.client.id, "Starting TETHER supervisor");

        let running = self.start().await?;

        info!(
            endpoints = running.endpoints.len(),
            tunnel = running.tunnel.is_some(),
            "TETHER supervisor is ready"
        );

        running.shutdown.wait_for_shutdown().await;

        let report = running.stop().await;
        if report.is_clean() {
            info!("TETHER supervisor shutdown complete");
        } else {
            for (id, error) in &report.failed {
                warn!(endpoint = %id, error = %error, "Endpoint did not close cleanly");
            }
        }

        Ok(())
    }

    /// Starts all components and returns the running supervisor.
    pub async fn start(&self) -> BinResult<RunningSupervisor> {
        let policy = self.config.retry.to_policy();
        let endpoints = self.build_endpoints(&policy)?;

        // Initial connect of every endpoint. Failures are logged, not
        // fatal: the health monitor and reconnector own recovery.
        if !self.skip_connect {
            for endpoint in &endpoints {
                match endpoint.conn.connect().await {
                    Ok(true) => {
                        info!(endpoint = %endpoint.id, "Connected");
                    }
                    Ok(false) | Err(_) => {
                        warn!(endpoint = %endpoint.id, "Initial connect failed, scheduling recovery");
                        let reconnector = Arc::clone(&endpoint.reconnector);
                        let conn = Arc::clone(&endpoint.conn);
                        tokio::spawn(async move {
                            let _ = reconnector.reconnect(&conn).await;
                        });
                    }
                }
            }
        }

        // One health monitor per endpoint.
        let interval = self.config.health.interval();
        let monitors = endpoints
            .iter()
            .map(|endpoint| {
                let monitor = HealthMonitor::new(
                    HealthConfig::with_interval(interval),
                    Arc::clone(&endpoint.reconnector),
                );
                monitor.spawn(Arc::clone(&endpoint.conn))
            })
            .collect();

        let tunnel = self.start_tunnel(&endpoints).await?;

        Ok(RunningSupervisor {
            endpoints,
            monitors,
            tunnel,
            shutdown: self.shutdown.clone(),
        })
    }

    /// Builds the engines declared in configuration.
    fn build_endpoints(&self, policy: &RetryPolicy) -> BinResult<Vec<ManagedEndpoint>> {
        let validator = self.build_validator()?;
        let mut endpoints = Vec::with_capacity(self.config.endpoints.len());

        for entry in &self.config.endpoints {
            let endpoint = entry.parsed_endpoint()?;

            let (conn, opcua): (Arc<dyn Connection>, Option<Arc<OpcUaConnection>>) =
                match endpoint.scheme() {
                    Scheme::OpcTcp | Scheme::OpcsTcp => {
                        let mut config = OpcUaConfig::new(endpoint.clone())
                            .with_connect_timeout(entry.connect_timeout())
                            .with_ping_timeout(entry.ping_timeout());

                        if let Some(policy_id) = entry.security_policy.as_deref() {
                            config = config.with_security_policy(policy_id.parse().map_err(
                                |e: ConnectError| BinError::initialization(e.to_string()),
                            )?);
                        }
                        if let Some(mode_id) = entry.security_mode.as_deref() {
                            config = config.with_security_mode(mode_id.parse().map_err(
                                |e: ConnectError| BinError::initialization(e.to_string()),
                            )?);
                        }

                        let mut engine =
                            OpcUaConnection::new(&entry.id, config, self.opcua_transport()?);
                        if let Some(validator) = &validator {
                            engine = engine.with_validator(Arc::clone(validator));
                        }

                        let engine = Arc::new(engine);
                        (engine.clone(), Some(engine))
                    }
                    Scheme::Tls | Scheme::Https => {
                        let validator = validator.clone().ok_or_else(|| {
                            BinError::initialization(format!(
                                "Endpoint '{}' is TLS-secured but no trust anchors are configured",
                                entry.id
                            ))
                        })?;

                        let config = ConnectionConfig::new(endpoint)
                            .with_connect_timeout(entry.connect_timeout())
                            .with_ping_timeout(entry.ping_timeout());

                        (Arc::new(TlsConnection::new(&entry.id, config, validator)), None)
                    }
                    Scheme::Tcp => {
                        let config = ConnectionConfig::new(endpoint)
                            .with_connect_timeout(entry.connect_timeout())
                            .with_ping_timeout(entry.ping_timeout());

                        (Arc::new(TcpConnection::new(&entry.id, config)), None)
                    }
                };

            let strategy: Arc<dyn tether_core::retry::RetryStrategy> =
                Arc::from(policy.build_strategy());

            endpoints.push(ManagedEndpoint {
                id: entry.id.clone(),
                conn,
                opcua,
                reconnector: Arc::new(Reconnector::new(strategy)),
            });
        }

        Ok(endpoints)
    }

    /// Builds the shared chain validator from trust settings.
    fn build_validator(&self) -> BinResult<Option<Arc<ChainValidator>>> {
        let trust = &self.config.trust;

        if trust.roots.is_empty() && !trust.allow_chain_tail {
            return Ok(None);
        }

        let anchors = if trust.roots.is_empty() {
            TrustAnchorSet::empty()
        } else {
            TrustAnchorSet::from_files(&trust.roots)
                .map_err(|e| BinError::initialization(e.to_string()))?
        };

        let policy = if trust.allow_chain_tail {
            warn!("trust.allow_chain_tail is set; chain validation is anchored on presented chains");
            ValidationPolicy {
                allow_chain_tail_anchor: true,
                allow_self_signed: true,
                ..ValidationPolicy::default()
            }
        } else {
            ValidationPolicy::default()
        };

        Ok(Some(Arc::new(ChainValidator::with_policy(anchors, policy))))
    }

    fn opcua_transport(&self) -> BinResult<Arc<dyn OpcUaTransport>> {
        if let Some(transport) = &self.opcua_transport {
            return Ok(Arc::clone(transport));
        }
        if self.dev_mode {
            return Ok(Arc::new(SimTransport::new()));
        }
        Err(BinError::initialization(
            "OPC UA endpoints are configured but no protocol transport was injected \
             (use --dev for the simulated transport)",
        ))
    }

    /// Starts the tunnel when enabled.
    async fn start_tunnel(
        &self,
        endpoints: &[ManagedEndpoint],
    ) -> BinResult<Option<TunnelHandle>> {
        let settings = &self.config.tunnel;
        if !settings.enabled {
            return Ok(None);
        }

        let target = endpoints
            .iter()
            .find(|e| e.id == settings.target)
            .ok_or_else(|| {
                BinError::initialization(format!(
                    "Tunnel target '{}' is not a configured endpoint",
                    settings.target
                ))
            })?;

        let engine = target.opcua.clone().ok_or_else(|| {
            BinError::initialization(format!(
                "Tunnel target '{}' is not an OPC UA endpoint",
                settings.target
            ))
        })?;

        let backend: Arc<dyn Backend> = Arc::new(EngineBackend { engine });

        let tunnel_config = TunnelConfig {
            listen_addr: settings.listen_addr.clone(),
            listen_port: settings.listen_port,
            max_workers: settings.max_workers,
            shared_backend: settings.shared_backend,
            backend_retry_delay: settings.backend_retry_delay(),
        };

        let tunnel = Arc::new(TcpTunnel::new(tunnel_config, backend));
        let handle = tunnel.spawn().await?;

        info!(addr = %handle.local_addr(), target = %settings.target, "Tunnel started");
        Ok(Some(handle))
    }
}

// =============================================================================
// RunningSupervisor
// =============================================================================

/// A started supervisor: live endpoints, monitors, and tunnel.
pub struct RunningSupervisor {
    /// Supervised endpoints.
    pub endpoints: Vec<ManagedEndpoint>,
    monitors: Vec<MonitorHandle>,
    tunnel: Option<TunnelHandle>,
    shutdown: ShutdownCoordinator,
}

impl std::fmt::Debug for RunningSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningSupervisor")
            .field("endpoints", &self.endpoints.len())
            .field("monitors", &self.monitors.len())
            .field("tunnel", &self.tunnel.is_some())
            .finish()
    }
}

impl RunningSupervisor {
    /// Stops everything, completing all in-flight disconnects.
    ///
    /// Monitors and the tunnel stop first so nothing triggers a
    /// reconnection mid-teardown; every endpoint is then disconnected and
    /// failures are collected into the report instead of aborting the
    /// sequence.
    pub async fn stop(self) -> StopReport {
        if let Some(tunnel) = self.tunnel {
            if let Err(error) = tunnel.stop().await {
                warn!(error = %error, "Tunnel stop reported an error");
            }
        }

        for monitor in self.monitors {
            monitor.stop().await;
        }

        let mut report = StopReport::default();
        for endpoint in &self.endpoints {
            if let Err(error) = endpoint.conn.disconnect().await {
                report.failed.push((endpoint.id.clone(), error));
            }
        }

        report
    }
}

// =============================================================================
// EngineBackend
// =============================================================================

/// Tunnel backend over an OPC UA engine.
struct EngineBackend {
    engine: Arc<OpcUaConnection>,
}

impl EngineBackend {
    /// Maps a tunnel id to a node: bare integers become numeric nodes in
    /// namespace 0, everything else must parse as a full node id.
    fn parse_node(id: &str) -> Result<NodeId, ConnectError> {
        if let Ok(numeric) = id.parse::<u32>() {
            return Ok(NodeId::numeric(numeric));
        }
        id.parse()
    }
}

#[async_trait]
impl Backend for EngineBackend {
    async fn ensure_connected(&self) -> Result<bool, ConnectError> {
        if self.engine.is_connected() {
            return Ok(true);
        }
        self.engine.connect().await
    }

    async fn read_value(&self, id: &str) -> Result<String, ConnectError> {
        let node = Self::parse_node(id)?;
        let value = self.engine.read(&node).await?;
        Ok(value.to_string())
    }

    async fn release(&self) -> Result<(), ConnectError> {
        self.engine.disconnect().await.map(|_| ())
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for constructing the supervisor runtime.
#[derive(Default)]
pub struct RuntimeBuilder {
    config_path: Option<std::path::PathBuf>,
    config: Option<TetherConfig>,
    dev_mode: bool,
    skip_connect: bool,
}

impl RuntimeBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the configuration file path.
    pub fn config_path(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Sets the configuration directly.
    pub fn config(mut self, config: TetherConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Enables development mode.
    pub fn dev_mode(mut self, enabled: bool) -> Self {
        self.dev_mode = enabled;
        self
    }

    /// Skips the initial connect.
    pub fn skip_connect(mut self, skip: bool) -> Self {
        self.skip_connect = skip;
        self
    }

    /// Builds the runtime.
    pub fn build(self) -> BinResult<SupervisorRuntime> {
        let config = match self.config {
            Some(config) => config,
            None => {
                let path = self.config_path.ok_or_else(|| {
                    BinError::initialization("No configuration provided")
                })?;
                load_config(&path)?
            }
        };

        Ok(SupervisorRuntime::new(config)
            .with_dev_mode(self.dev_mode)
            .with_skip_connect(self.skip_connect))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tether_config::{ClientConfig, EndpointEntry, RetrySettings};
    use tether_opcua::NodeValue;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn config_with_tunnel() -> TetherConfig {
        TetherConfig {
            client: ClientConfig {
                id: "test-supervisor".into(),
                name: String::new(),
            },
            endpoints: vec![EndpointEntry {
                id: "plc".into(),
                url: "opc.tcp://sim:4840".into(),
                security_policy: None,
                security_mode: None,
                connect_timeout_ms: 1000,
                ping_timeout_ms: 200,
            }],
            retry: RetrySettings::default(),
            health: Default::default(),
            trust: Default::default(),
            tunnel: tether_config::TunnelSettings {
                enabled: true,
                listen_addr: "127.0.0.1".into(),
                listen_port: 0,
                target: "plc".into(),
                max_workers: 4,
                shared_backend: true,
                backend_retry_ms: 0,
            },
            logging: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_start_and_stop_with_sim_transport() {
        let transport = Arc::new(SimTransport::new());
        transport.set_node(NodeId::numeric(42), NodeValue::Int(7));

        let runtime = SupervisorRuntime::new(config_with_tunnel())
            .with_opcua_transport(transport.clone());

        let running = runtime.start().await.unwrap();
        assert_eq!(running.endpoints.len(), 1);
        assert!(running.endpoints[0].conn.is_connected());

        let report = running.stop().await;
        assert!(report.is_clean());
        assert_eq!(transport.closes(), 1);
    }

    #[tokio::test]
    async fn test_tunnel_round_trip_through_runtime() {
        let transport = Arc::new(SimTransport::new());
        transport.set_node(NodeId::numeric(42), NodeValue::Int(7));

        let runtime = SupervisorRuntime::new(config_with_tunnel())
            .with_opcua_transport(transport);
        let running = runtime.start().await.unwrap();

        let addr = running
            .tunnel
            .as_ref()
            .map(|t| t.local_addr())
            .expect("tunnel should be running");

        let mut client = tokio::net::TcpStream::connect(addr).await.unwrap();
        client.write_all(b"READ:42\n").await.unwrap();
        client.shutdown().await.unwrap();

        let mut reply = String::new();
        client.read_to_string(&mut reply).await.unwrap();
        assert_eq!(reply, "Valor leído: 7\n");

        running.stop().await;
    }

    #[tokio::test]
    async fn test_opcua_without_transport_fails() {
        let runtime = SupervisorRuntime::new(config_with_tunnel());
        let error = runtime.start().await.unwrap_err();
        assert!(matches!(error, BinError::Initialization(_)));
    }

    #[tokio::test]
    async fn test_dev_mode_uses_sim_transport() {
        let mut config = config_with_tunnel();
        config.tunnel.enabled = false;

        let runtime = SupervisorRuntime::new(config)
            .with_dev_mode(true)
            .with_skip_connect(true);

        let running = runtime.start().await.unwrap();
        assert_eq!(running.endpoints.len(), 1);
        running.stop().await;
    }

    #[test]
    fn test_builder_requires_config() {
        assert!(RuntimeBuilder::new().build().is_err());
    }

    #[test]
    fn test_parse_node_forms() {
        assert_eq!(
            EngineBackend::parse_node("42").unwrap(),
            NodeId::numeric(42)
        );
        assert_eq!(
            EngineBackend::parse_node("ns=2;s=Tank.Level").unwrap(),
            NodeId::string(2, "Tank.Level")
        );
        assert!(EngineBackend::parse_node("!!").is_err());
    }
}
