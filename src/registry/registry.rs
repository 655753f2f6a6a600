//! Service registry: registration protocol and directory queries.
//!
//! # Responsibilities
//! - Consume register requests and directory queries from the bus
//! - Maintain the replicated directory holder (CAS read-modify-write)
//! - Publish register/unregister events for the entry-point router
//! - Elect and run the heartbeat monitor

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::cluster::{BusError, BusMessage, Cluster, MapError, SharedMap};
use crate::config::RegistryConfig;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::registry::heartbeat::HeartbeatMonitor;
use crate::registry::model::{ServiceInfo, ServiceInfoHolder};

/// Well-known replicated map key holding the whole directory.
pub const SERVICE_HOLDER_KEY: &str = "service-info-holder";

/// Lock name electing the node that runs the heartbeat loop.
const HEARTBEAT_SCHEDULER_LOCK: &str = "registry-heartbeat-scheduler";

const MAX_CAS_RETRIES: usize = 8;

/// Error type for registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Map(#[from] MapError),
    #[error(transparent)]
    Bus(#[from] BusError),
    #[error("directory update for key '{0}' lost {MAX_CAS_RETRIES} CAS races, giving up")]
    Contention(&'static str),
    #[error("malformed registry message: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Directory query carried over the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceQuery {
    ByName { name: String },
    ByHost { host: String },
}

/// Reply to a [`ServiceQuery`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryReply {
    pub success: bool,
    #[serde(default)]
    pub services: Vec<ServiceInfo>,
    #[serde(default)]
    pub error: Option<String>,
}

impl QueryReply {
    fn found(services: Vec<ServiceInfo>) -> Self {
        Self {
            success: true,
            services,
            error: None,
        }
    }

    fn not_found(what: String) -> Self {
        Self {
            success: false,
            services: Vec::new(),
            error: Some(what),
        }
    }
}

/// The service registry. One instance per node; state lives in the
/// replicated directory holder, so instances on different nodes agree up
/// to map propagation.
pub struct ServiceRegistry {
    cluster: Cluster,
    directory: SharedMap,
    config: RegistryConfig,
}

impl ServiceRegistry {
    pub fn new(cluster: Cluster, config: RegistryConfig) -> Self {
        let directory = cluster.replicated_map();
        Self {
            cluster,
            directory,
            config,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Start bus consumers and, on the elected node, the heartbeat loop.
    pub fn run(self: &Arc<Self>, shutdown: &Shutdown) {
        let register_rx = self.cluster.bus().consumer(&self.config.registry_register_path);
        let query_rx = self.cluster.bus().consumer(&self.config.registry_get_path);

        tokio::spawn(Self::register_loop(
            self.clone(),
            register_rx,
            shutdown.subscribe(),
        ));
        tokio::spawn(Self::query_loop(self.clone(), query_rx, shutdown.subscribe()));

        match self.cluster.locks().try_hold(HEARTBEAT_SCHEDULER_LOCK) {
            Some(hold) => {
                tracing::info!(
                    ping_interval_ms = self.config.ping_interval_ms,
                    "Heartbeat scheduler elected on this node"
                );
                let monitor = HeartbeatMonitor::new(self.clone(), hold);
                tokio::spawn(monitor.run(shutdown.subscribe()));
            }
            None => {
                tracing::debug!("Heartbeat scheduler already held by another node");
            }
        }
    }

    async fn register_loop(
        registry: Arc<Self>,
        mut rx: mpsc::UnboundedReceiver<BusMessage>,
        mut shutdown: tokio::sync::broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                msg = rx.recv() => {
                    let Some(mut msg) = msg else { break };
                    registry.handle_register(&mut msg).await;
                }
                _ = shutdown.recv() => break,
            }
        }
    }

    async fn query_loop(
        registry: Arc<Self>,
        mut rx: mpsc::UnboundedReceiver<BusMessage>,
        mut shutdown: tokio::sync::broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                msg = rx.recv() => {
                    let Some(mut msg) = msg else { break };
                    registry.handle_query(&mut msg).await;
                }
                _ = shutdown.recv() => break,
            }
        }
    }

    /// Bus consumer failures are answered or logged, never propagated.
    async fn handle_register(&self, msg: &mut BusMessage) {
        let info: ServiceInfo = match msg.body_as() {
            Ok(info) => info,
            Err(e) => {
                tracing::warn!(error = %e, "Discarding malformed register request");
                msg.reply(b"false".to_vec());
                return;
            }
        };

        let name = info.service_name.clone();
        match self.register(info).await {
            Ok(()) => msg.reply(b"true".to_vec()),
            Err(e) => {
                tracing::error!(service = %name, error = %e, "Registration failed");
                msg.reply(b"false".to_vec());
            }
        }
    }

    async fn handle_query(&self, msg: &mut BusMessage) {
        let reply = match msg.body_as::<ServiceQuery>() {
            Ok(query) => self.query(&query).await,
            Err(e) => {
                tracing::warn!(error = %e, "Discarding malformed directory query");
                QueryReply::not_found(format!("malformed query: {e}"))
            }
        };
        match serde_json::to_vec(&reply) {
            Ok(body) => msg.reply(body),
            Err(e) => tracing::error!(error = %e, "Failed to encode query reply"),
        }
    }

    /// Register `info`: stamp its last-contact time, replace-else-append in
    /// the directory, then announce it. Idempotent per service name.
    pub async fn register(&self, mut info: ServiceInfo) -> Result<(), RegistryError> {
        info.touch();
        let announced = info.clone();

        let holder = self
            .mutate_holder(move |h| {
                h.add_or_replace(info.clone());
            })
            .await?;

        metrics::record_registration(&announced.service_name);
        metrics::record_directory_size(holder.len());
        tracing::info!(
            service = %announced.service_name,
            host = %announced.host,
            port = announced.port,
            operations = announced.operations.len(),
            "Service registered"
        );

        let body = serde_json::to_vec(&announced)?;
        self.cluster.bus().publish(&self.config.register_path, body);
        Ok(())
    }

    /// Remove `name` from the directory and announce the eviction.
    /// Returns the removed descriptor, or None when it was already gone.
    pub async fn unregister(&self, name: &str) -> Result<Option<ServiceInfo>, RegistryError> {
        let owned = name.to_string();
        let mut removed: Option<ServiceInfo> = None;
        let holder = self
            .mutate_holder(|h| {
                removed = h.remove(&owned);
            })
            .await?;

        let Some(info) = removed else {
            return Ok(None);
        };

        self.cluster.counters().reset(&failure_counter_key(name));
        metrics::record_eviction(name);
        metrics::record_directory_size(holder.len());
        tracing::warn!(service = %name, "Service unregistered");

        let body = serde_json::to_vec(&info)?;
        self.cluster
            .bus()
            .publish(&self.config.unregister_path, body);
        Ok(Some(info))
    }

    /// Stamp the last-contact time of `name` after a successful probe.
    pub async fn record_contact(&self, name: &str) -> Result<(), RegistryError> {
        let owned = name.to_string();
        self.mutate_holder(move |h| {
            if let Some(info) = h.services.iter_mut().find(|s| s.service_name == owned) {
                info.touch();
            }
        })
        .await?;
        Ok(())
    }

    /// Answer a directory query from the current holder.
    pub async fn query(&self, query: &ServiceQuery) -> QueryReply {
        let holder = match self.current().await {
            Ok(holder) => holder,
            Err(e) => {
                tracing::error!(error = %e, "Directory read failed");
                return QueryReply::not_found(e.to_string());
            }
        };

        let (matches, what) = match query {
            ServiceQuery::ByName { name } => (holder.find_by_name(name), name.clone()),
            ServiceQuery::ByHost { host } => (holder.find_by_host(host), host.clone()),
        };

        if matches.is_empty() {
            QueryReply::not_found(what)
        } else {
            QueryReply::found(matches)
        }
    }

    /// Read the current directory holder (empty when never written).
    pub async fn current(&self) -> Result<ServiceInfoHolder, RegistryError> {
        Ok(self
            .directory
            .get::<ServiceInfoHolder>(SERVICE_HOLDER_KEY)
            .await?
            .map(|v| v.value)
            .unwrap_or_default())
    }

    /// Read-modify-write the holder with optimistic versioned replace.
    /// Retries on lost CAS races; the holder is created lazily on first use.
    async fn mutate_holder<F>(&self, mut mutate: F) -> Result<ServiceInfoHolder, RegistryError>
    where
        F: FnMut(&mut ServiceInfoHolder),
    {
        for _ in 0..MAX_CAS_RETRIES {
            let read = self
                .directory
                .get::<ServiceInfoHolder>(SERVICE_HOLDER_KEY)
                .await?;
            let (mut holder, version) = match read {
                Some(v) => (v.value, Some(v.version)),
                None => (ServiceInfoHolder::default(), None),
            };

            mutate(&mut holder);

            if self
                .directory
                .put_if(SERVICE_HOLDER_KEY, version, &holder)
                .await?
            {
                return Ok(holder);
            }
        }
        Err(RegistryError::Contention(SERVICE_HOLDER_KEY))
    }

    pub(crate) fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    pub(crate) fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.config.timeout_ms)
    }
}

/// Counter key tracking consecutive failed probes for one service.
pub(crate) fn failure_counter_key(service_name: &str) -> String {
    format!("heartbeat-failures:{service_name}")
}
