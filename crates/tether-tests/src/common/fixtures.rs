// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Test fixtures: endpoints, retry policies, and certificate material.

use std::time::Duration;

use tether_cert::{CertificateChain, TrustAnchorSet};
use tether_core::endpoint::Endpoint;
use tether_core::retry::{RetryPolicy, StrategyKind};

/// Root CA certificate (PEM).
pub const ROOT_PEM: &[u8] = include_bytes!("../../../tether-cert/testdata/root.pem");

/// Leaf certificate signed by the root (PEM).
pub const LEAF_PEM: &[u8] = include_bytes!("../../../tether-cert/testdata/leaf.pem");

/// Expired certificate signed by the root (PEM).
pub const EXPIRED_PEM: &[u8] = include_bytes!("../../../tether-cert/testdata/expired.pem");

/// A standalone self-signed certificate (PEM).
pub const SELF_SIGNED_PEM: &[u8] = include_bytes!("../../../tether-cert/testdata/selfsigned.pem");

/// Returns the DER encoding of the first certificate in a PEM blob.
pub fn der_of(pem: &[u8]) -> Vec<u8> {
    CertificateChain::from_pem(pem)
        .expect("fixture PEM parses")
        .ders()[0]
        .clone()
}

/// A trust anchor set containing only the fixture root.
pub fn root_anchors() -> TrustAnchorSet {
    TrustAnchorSet::from_ders(vec![der_of(ROOT_PEM)]).expect("fixture root parses")
}

/// An OPC UA endpoint for the simulated transport.
pub fn sim_endpoint() -> Endpoint {
    Endpoint::parse("opc.tcp://sim-plc:4840").expect("fixture endpoint parses")
}

/// A fast exponential policy for timing-sensitive tests.
pub fn fast_exponential(max_retries: u32) -> RetryPolicy {
    RetryPolicy::new()
        .with_max_retries(max_retries)
        .with_initial_wait(Duration::from_millis(100))
        .with_backoff_factor(2.0)
}

/// A fast linear policy for timing-sensitive tests.
pub fn fast_linear(max_retries: u32) -> RetryPolicy {
    RetryPolicy::new()
        .with_max_retries(max_retries)
        .with_wait_time(Duration::from_millis(100))
        .with_strategy(StrategyKind::Linear)
}

/// A minimal YAML configuration with one OPC UA endpoint.
pub fn minimal_yaml() -> &'static str {
    r#"
client:
  id: test-client
endpoints:
  - id: plc
    url: opc.tcp://plc-01:4840
"#
}
