//! Shared helpers for gateway integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use mesh_gateway::registry::{Operation, OperationType, ServiceInfo};
use mesh_gateway::{Cluster, GatewayServer, MeshConfig, Shutdown};

/// A gateway running on an ephemeral port plus handles into its fabric.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub cluster: Cluster,
    pub config: MeshConfig,
    pub shutdown: Arc<Shutdown>,
}

impl TestGateway {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }
}

/// Boot a gateway and wait for its event consumers to come up.
pub async fn start_gateway(mut config: MeshConfig) -> TestGateway {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    config.listener.bind_address = addr.to_string();

    let cluster = Cluster::new();
    let shutdown = Arc::new(Shutdown::new());
    let server = GatewayServer::new(config.clone(), cluster.clone());

    let task_shutdown = shutdown.clone();
    tokio::spawn(async move {
        server.run(listener, task_shutdown.as_ref()).await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    TestGateway {
        addr,
        cluster,
        config,
        shutdown,
    }
}

pub fn operation(name: &str, url: &str, kind: OperationType, produces: &[&str]) -> Operation {
    let mut op = Operation::new(name, url, kind);
    op.produces = produces.iter().map(|s| s.to_string()).collect();
    op
}

pub fn service(name: &str, port: u16, operations: Vec<Operation>) -> ServiceInfo {
    ServiceInfo::new(name, "127.0.0.1", port, operations)
}

/// A bus-attached fake service: answers heartbeat pings while alive and
/// echoes the dispatch payload back on every operation address.
pub struct MockService {
    pub info: ServiceInfo,
    alive: Arc<AtomicBool>,
}

impl MockService {
    /// Stop answering pings. Consumers stay attached, so probes time out
    /// instead of failing fast.
    pub fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    /// Resume answering pings.
    pub fn revive(&self) {
        self.alive.store(true, Ordering::SeqCst);
    }
}

pub fn spawn_mock_service(cluster: &Cluster, info: ServiceInfo) -> MockService {
    let alive = Arc::new(AtomicBool::new(true));

    let mut ping_rx = cluster.bus().consumer(&info.info_address());
    let ping_alive = alive.clone();
    tokio::spawn(async move {
        while let Some(mut msg) = ping_rx.recv().await {
            if ping_alive.load(Ordering::SeqCst) {
                msg.reply(b"pong".to_vec());
            }
        }
    });

    for op in &info.operations {
        // Websocket operation addresses belong to the test's own relay
        // consumer; a second consumer here would steal unicast frames.
        if op.kind == OperationType::Websocket {
            continue;
        }
        let mut rx = cluster.bus().consumer(&op.url);
        tokio::spawn(async move {
            while let Some(mut msg) = rx.recv().await {
                let body = msg.body.clone();
                msg.reply(body);
            }
        });
    }

    MockService { info, alive }
}

/// Register `info` over the bus and wait for the route binding to land.
pub async fn register(gateway: &TestGateway, info: &ServiceInfo) {
    let body = serde_json::to_vec(info).unwrap();
    let reply = gateway
        .cluster
        .bus()
        .request(
            &gateway.config.registry.registry_register_path,
            body,
            Duration::from_secs(1),
        )
        .await
        .unwrap();
    assert_eq!(reply, b"true");
    tokio::time::sleep(Duration::from_millis(50)).await;
}
