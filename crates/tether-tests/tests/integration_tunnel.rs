// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Integration tests for the TCP tunnel: wire protocol round trips over
//! real sockets, error paths, and cascade close behavior.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use tether_tunnel::{TcpTunnel, TunnelConfig, TunnelHandle};

use tether_tests::common::MockBackend;

async fn start_tunnel(backend: Arc<MockBackend>) -> (Arc<TcpTunnel>, TunnelHandle) {
    let config = TunnelConfig {
        listen_addr: "127.0.0.1".into(),
        listen_port: 0,
        max_workers: 4,
        shared_backend: true,
        backend_retry_delay: Some(Duration::from_millis(10)),
    };

    let tunnel = Arc::new(TcpTunnel::new(config, backend));
    let handle = Arc::clone(&tunnel).spawn().await.unwrap();
    (tunnel, handle)
}

async fn one_shot(handle: &TunnelHandle, line: &str) -> String {
    let mut client = TcpStream::connect(handle.local_addr()).await.unwrap();
    client.write_all(line.as_bytes()).await.unwrap();
    client.shutdown().await.unwrap();

    let mut reply = String::new();
    client.read_to_string(&mut reply).await.unwrap();
    reply
}

#[tokio::test]
async fn test_read_round_trip() {
    let backend = Arc::new(MockBackend::new());
    backend.set_value("42", "7");

    let (_tunnel, handle) = start_tunnel(backend).await;

    // The canonical round trip: READ:42 against a backend value of 7.
    assert_eq!(one_shot(&handle, "READ:42\n").await, "Valor leído: 7\n");

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn test_unrecognized_command_is_echoed() {
    let backend = Arc::new(MockBackend::new());
    let (_tunnel, handle) = start_tunnel(backend).await;

    assert_eq!(
        one_shot(&handle, "WRITE:42=1\n").await,
        "Comando no reconocido: WRITE:42=1\n"
    );
    assert_eq!(
        one_shot(&handle, "hola\n").await,
        "Comando no reconocido: hola\n"
    );

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn test_backend_error_reply_and_close() {
    let backend = Arc::new(MockBackend::new());
    backend.set_value("42", "7");
    backend.set_fail_reads(true);

    let (tunnel, handle) = start_tunnel(backend).await;
    let stats = tunnel.stats();

    let reply = one_shot(&handle, "READ:42\n").await;
    assert!(reply.starts_with("Error procesando la solicitud:"));

    // The failed session scheduled a delayed backend retry.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(stats.failed(), 1);
    assert_eq!(stats.backend_retries(), 1);

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn test_multiple_requests_one_session() {
    let backend = Arc::new(MockBackend::new());
    backend.set_value("1", "10");
    backend.set_value("2", "20");

    let (_tunnel, handle) = start_tunnel(backend).await;

    let mut client = TcpStream::connect(handle.local_addr()).await.unwrap();
    client.write_all(b"READ:1\n").await.unwrap();
    client.write_all(b"mistake\n").await.unwrap();
    client.write_all(b"READ:2\n").await.unwrap();

    let (read_half, _write_half) = client.split();
    let mut lines = BufReader::new(read_half).lines();

    assert_eq!(lines.next_line().await.unwrap().unwrap(), "Valor leído: 10");
    assert_eq!(
        lines.next_line().await.unwrap().unwrap(),
        "Comando no reconocido: mistake"
    );
    assert_eq!(lines.next_line().await.unwrap().unwrap(), "Valor leído: 20");
}

#[tokio::test]
async fn test_concurrent_clients_are_all_served() {
    let backend = Arc::new(MockBackend::new());
    for i in 0..8 {
        backend.set_value(format!("{}", i), format!("{}", i * 10));
    }

    let (tunnel, handle) = start_tunnel(backend).await;
    let stats = tunnel.stats();

    let mut tasks = Vec::new();
    for i in 0..8 {
        let addr = handle.local_addr();
        tasks.push(tokio::spawn(async move {
            let mut client = TcpStream::connect(addr).await.unwrap();
            client
                .write_all(format!("READ:{}\n", i).as_bytes())
                .await
                .unwrap();
            client.shutdown().await.unwrap();

            let mut reply = String::new();
            client.read_to_string(&mut reply).await.unwrap();
            (i, reply)
        }));
    }

    for task in tasks {
        let (i, reply) = task.await.unwrap();
        assert_eq!(reply, format!("Valor leído: {}\n", i * 10));
    }

    handle.stop().await.unwrap();
    assert_eq!(stats.accepted(), 8);
}

#[tokio::test]
async fn test_unavailable_backend_rejects_session() {
    let backend = Arc::new(MockBackend::new());
    backend.set_available(false);

    let (_tunnel, handle) = start_tunnel(backend.clone()).await;

    let reply = one_shot(&handle, "READ:42\n").await;
    assert!(reply.starts_with("Error procesando la solicitud:"));
    assert!(backend.connects() >= 1);

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn test_tunnel_stops_accepting_after_shutdown() {
    let backend = Arc::new(MockBackend::new());
    let (_tunnel, handle) = start_tunnel(backend).await;
    let addr = handle.local_addr();

    handle.stop().await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Either the connect fails outright or the socket closes immediately
    // without serving; both prove the accept loop is gone.
    match TcpStream::connect(addr).await {
        Err(_) => {}
        Ok(mut client) => {
            let _ = client.write_all(b"READ:42\n").await;
            let mut reply = String::new();
            let n = client.read_to_string(&mut reply).await.unwrap_or(0);
            assert_eq!(n, 0, "no session should serve after shutdown");
        }
    }
}
