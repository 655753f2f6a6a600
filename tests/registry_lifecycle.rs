//! Registration protocol, directory queries and heartbeat eviction.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use mesh_gateway::config::RegistryConfig;
use mesh_gateway::discovery::{DiscoveryClient, DiscoveryError};
use mesh_gateway::registry::{now_millis, OperationType, ServiceRegistry};
use mesh_gateway::{Cluster, Shutdown};

use common::{operation, service, spawn_mock_service};

fn fast_config() -> RegistryConfig {
    RegistryConfig {
        ping_interval_ms: 50,
        timeout_ms: 50,
        unhealthy_threshold: 2,
        sweep_interval_ms: 0,
        ..RegistryConfig::default()
    }
}

fn deploy(cluster: &Cluster, config: RegistryConfig) -> (Arc<ServiceRegistry>, Shutdown) {
    let registry = Arc::new(ServiceRegistry::new(cluster.clone(), config));
    let shutdown = Shutdown::new();
    registry.run(&shutdown);
    (registry, shutdown)
}

async fn register_over_bus(cluster: &Cluster, config: &RegistryConfig, info: &common::MockService) {
    let body = serde_json::to_vec(&info.info).unwrap();
    let reply = cluster
        .bus()
        .request(&config.registry_register_path, body, Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(reply, b"true");
}

#[tokio::test]
async fn test_register_round_trip_preserves_operations() {
    let cluster = Cluster::new();
    let config = RegistryConfig::default();
    let (_registry, _shutdown) = deploy(&cluster, config.clone());

    let t0 = now_millis();
    let ops = vec![
        operation("list", "/orders/list", OperationType::RestGet, &[]),
        operation("create", "/orders/create", OperationType::RestPost, &[]),
        operation("feed", "/orders/feed", OperationType::Websocket, &[]),
    ];
    let mock = spawn_mock_service(&cluster, service("/orders", 9100, ops));
    register_over_bus(&cluster, &config, &mock).await;

    let discovery = DiscoveryClient::new(&cluster, &config);
    let found = discovery.get_service("/orders").await.unwrap();
    assert_eq!(found.len(), 1);

    let entry = &found[0];
    assert!(entry.last_connection >= t0);
    let names: Vec<_> = entry.operations.iter().map(|o| o.name.as_str()).collect();
    assert_eq!(names, vec!["list", "create", "feed"]);
}

#[tokio::test]
async fn test_reregister_replaces_the_single_entry() {
    let cluster = Cluster::new();
    let config = RegistryConfig::default();
    let (_registry, _shutdown) = deploy(&cluster, config.clone());

    let first = spawn_mock_service(
        &cluster,
        service(
            "/orders",
            9100,
            vec![operation("old", "/orders/old", OperationType::RestGet, &[])],
        ),
    );
    register_over_bus(&cluster, &config, &first).await;

    let second = spawn_mock_service(
        &cluster,
        service(
            "/orders",
            9101,
            vec![operation("new", "/orders/new", OperationType::RestGet, &[])],
        ),
    );
    register_over_bus(&cluster, &config, &second).await;

    let discovery = DiscoveryClient::new(&cluster, &config);
    let found = discovery.get_service("/orders").await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].port, 9101);
    assert_eq!(found[0].operations[0].name, "new");
}

#[tokio::test]
async fn test_query_by_host() {
    let cluster = Cluster::new();
    let config = RegistryConfig::default();
    let (registry, _shutdown) = deploy(&cluster, config.clone());

    registry
        .register(service("/a", 9100, Vec::new()))
        .await
        .unwrap();
    registry
        .register(service("/b", 9200, Vec::new()))
        .await
        .unwrap();

    let discovery = DiscoveryClient::new(&cluster, &config);
    let found = discovery.get_services_by_host("127.0.0.1").await.unwrap();
    assert_eq!(found.len(), 2);
}

#[tokio::test]
async fn test_discovery_reports_unknown_service() {
    let cluster = Cluster::new();
    let config = RegistryConfig::default();
    let (_registry, _shutdown) = deploy(&cluster, config.clone());

    let discovery = DiscoveryClient::new(&cluster, &config);
    let err = discovery.get_service("/ghost").await.unwrap_err();
    assert!(matches!(err, DiscoveryError::ServiceNotFound(_)));
}

#[tokio::test]
async fn test_silent_service_is_evicted_exactly_once() {
    let cluster = Cluster::new();
    let config = fast_config();
    let mut evictions = cluster.bus().consumer(&config.unregister_path);
    let (_registry, _shutdown) = deploy(&cluster, config.clone());

    let mock = spawn_mock_service(&cluster, service("/flaky", 9100, Vec::new()));
    register_over_bus(&cluster, &config, &mock).await;

    // Survives probing while it answers pings.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(evictions.try_recv().is_err());

    mock.kill();

    let evicted = timeout(Duration::from_secs(3), evictions.recv())
        .await
        .expect("eviction was never announced")
        .unwrap();
    let info: mesh_gateway::ServiceInfo = evicted.body_as().unwrap();
    assert_eq!(info.service_name, "/flaky");

    // The entry is gone, so no further eviction rounds announce it.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(evictions.try_recv().is_err());

    let discovery = DiscoveryClient::new(&cluster, &config);
    assert!(discovery.get_service("/flaky").await.is_err());
}

#[tokio::test]
async fn test_recovered_probe_resets_the_failure_count() {
    let cluster = Cluster::new();
    // Generous threshold so recovery always lands before eviction could.
    let config = RegistryConfig {
        unhealthy_threshold: 5,
        ..fast_config()
    };
    let mut evictions = cluster.bus().consumer(&config.unregister_path);
    let (_registry, _shutdown) = deploy(&cluster, config.clone());

    let mock = spawn_mock_service(&cluster, service("/wobbly", 9100, Vec::new()));
    register_over_bus(&cluster, &config, &mock).await;

    // A couple of failed rounds, then recovery resets the count.
    mock.kill();
    tokio::time::sleep(Duration::from_millis(150)).await;
    mock.revive();

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(evictions.try_recv().is_err());
}
