//! Discovery client.
//!
//! # Responsibilities
//! - Query the registry by service name or host
//! - Surface an explicit not-found failure when nothing matches

use std::time::Duration;

use thiserror::Error;

use crate::cluster::{BusError, Cluster, MessageBus};
use crate::config::RegistryConfig;
use crate::registry::model::ServiceInfo;
use crate::registry::registry::{QueryReply, ServiceQuery};

/// Error type for discovery queries.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("no service matched '{0}'")]
    ServiceNotFound(String),
    #[error(transparent)]
    Bus(#[from] BusError),
    #[error("malformed query reply: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Read-only query façade over the service registry.
pub struct DiscoveryClient {
    bus: MessageBus,
    query_address: String,
    timeout: Duration,
}

impl DiscoveryClient {
    pub fn new(cluster: &Cluster, config: &RegistryConfig) -> Self {
        Self {
            bus: cluster.bus().clone(),
            query_address: config.registry_get_path.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    /// Services registered under `name`.
    pub async fn get_service(&self, name: &str) -> Result<Vec<ServiceInfo>, DiscoveryError> {
        self.query(
            ServiceQuery::ByName {
                name: name.to_string(),
            },
            name,
        )
        .await
    }

    /// Services advertising `host`.
    pub async fn get_services_by_host(
        &self,
        host: &str,
    ) -> Result<Vec<ServiceInfo>, DiscoveryError> {
        self.query(
            ServiceQuery::ByHost {
                host: host.to_string(),
            },
            host,
        )
        .await
    }

    async fn query(
        &self,
        query: ServiceQuery,
        what: &str,
    ) -> Result<Vec<ServiceInfo>, DiscoveryError> {
        let body = serde_json::to_vec(&query)?;
        let raw = self.bus.request(&self.query_address, body, self.timeout).await?;
        let reply: QueryReply = serde_json::from_slice(&raw)?;

        if reply.success && !reply.services.is_empty() {
            Ok(reply.services)
        } else {
            Err(DiscoveryError::ServiceNotFound(what.to_string()))
        }
    }
}
