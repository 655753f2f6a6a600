//! WebSocket endpoint registry (local and clustered).
//!
//! # Responsibilities
//! - Track live socket identities in a shared holder
//! - Serialize holder mutation with a bounded lock
//! - Unicast replies to the originating socket's address
//! - Fan out replies to every socket on a url, across nodes
//!
//! # Design Decisions
//! - `local` and `clustered` constructors differ only in the backing map;
//!   both take the same lock around register/remove
//! - A lock timeout abandons the operation without touching the holder
//! - Fan-out is best-effort: a dead address is logged and skipped

use std::time::Duration;

use thiserror::Error;

use crate::cluster::{BusError, Cluster, LockError, MapError, MessageBus, LockRegistry, SharedMap};
use crate::config::WsConfig;
use crate::observability::metrics;
use crate::ws::endpoint::{Audience, PayloadKind, WsEndpoint, WsEndpointHolder, WsMessageWrapper};

/// Well-known map key holding the whole endpoint set.
pub const WS_HOLDER_KEY: &str = "ws-endpoint-holder";

const WS_HOLDER_LOCK: &str = "ws-endpoint-holder-lock";

const MAX_CAS_RETRIES: usize = 8;

/// Error type for WS registry operations.
#[derive(Debug, Error)]
pub enum WsRegistryError {
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error(transparent)]
    Map(#[from] MapError),
    #[error("endpoint holder update lost {MAX_CAS_RETRIES} CAS races, giving up")]
    Contention,
}

/// Registry of live WebSocket endpoint identities.
pub struct WsEndpointRegistry {
    holder_map: SharedMap,
    locks: LockRegistry,
    bus: MessageBus,
    lock_timeout: Duration,
}

impl WsEndpointRegistry {
    /// Single-node variant: endpoint state stays on this node.
    pub fn local(cluster: &Cluster, config: &WsConfig) -> Self {
        Self::with_map(cluster, config, cluster.local_map())
    }

    /// Clustered variant: endpoint state is replicated, so any node can
    /// resolve any socket's addresses.
    pub fn clustered(cluster: &Cluster, config: &WsConfig) -> Self {
        Self::with_map(cluster, config, cluster.replicated_map())
    }

    fn with_map(cluster: &Cluster, config: &WsConfig, holder_map: SharedMap) -> Self {
        Self {
            holder_map,
            locks: cluster.locks().clone(),
            bus: cluster.bus().clone(),
            lock_timeout: Duration::from_millis(config.lock_timeout_ms),
        }
    }

    /// Mint an identity for a socket accepted on `url` and add it to the
    /// holder. The returned endpoint carries the bus addresses the caller
    /// must consume on.
    pub async fn register(&self, url: &str) -> Result<WsEndpoint, WsRegistryError> {
        let _guard = self.locks.acquire(WS_HOLDER_LOCK, self.lock_timeout).await?;
        let endpoint = WsEndpoint::new(url);
        let added = endpoint.clone();
        self.mutate(move |holder| {
            holder.add(added.clone());
        })
        .await?;

        tracing::debug!(url = %endpoint.url, "WebSocket endpoint registered");
        Ok(endpoint)
    }

    /// Remove the closing connection's endpoint from the holder.
    /// Returns false when no structurally matching entry was found.
    pub async fn deregister(&self, endpoint: &WsEndpoint) -> Result<bool, WsRegistryError> {
        let _guard = self.locks.acquire(WS_HOLDER_LOCK, self.lock_timeout).await?;
        let binary_id = endpoint.binary_handler_id.clone();
        let text_id = endpoint.text_handler_id.clone();
        let mut removed = false;
        self.mutate(|holder| {
            removed = holder.remove_by_handler_ids(&binary_id, &text_id).is_some();
        })
        .await?;

        if removed {
            tracing::debug!(url = %endpoint.url, "WebSocket endpoint deregistered");
        }
        Ok(removed)
    }

    /// Unicast a reply to the wrapper's own endpoint. No holder lookup:
    /// the identity already carries the destination address.
    pub fn reply_to_caller(&self, wrapper: &WsMessageWrapper) -> Result<(), BusError> {
        self.send_to(&wrapper.endpoint, wrapper)
    }

    /// Fan a reply out to every endpoint on the wrapper's url, honoring
    /// the audience. Returns the number of sockets reached.
    pub async fn reply_to_url(&self, wrapper: &WsMessageWrapper) -> Result<usize, WsRegistryError> {
        let mut delivered = 0;
        self.for_each_endpoint(&wrapper.endpoint, |endpoint| {
            if wrapper.audience == Audience::AllButSender && endpoint == &wrapper.endpoint {
                return;
            }
            match self.send_to(endpoint, wrapper) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::debug!(url = %endpoint.url, error = %e, "Skipping dead endpoint")
                }
            }
        })
        .await?;

        metrics::record_ws_fanout(&wrapper.endpoint.url, delivered);
        Ok(delivered)
    }

    /// Iterate every endpoint sharing `current`'s url.
    pub async fn for_each_endpoint<F>(
        &self,
        current: &WsEndpoint,
        mut f: F,
    ) -> Result<(), WsRegistryError>
    where
        F: FnMut(&WsEndpoint),
    {
        for endpoint in self.endpoints_for_url(&current.url).await? {
            f(&endpoint);
        }
        Ok(())
    }

    /// Endpoints currently registered on `url`.
    pub async fn endpoints_for_url(&self, url: &str) -> Result<Vec<WsEndpoint>, WsRegistryError> {
        let holder = self
            .holder_map
            .get::<WsEndpointHolder>(WS_HOLDER_KEY)
            .await?
            .map(|v| v.value)
            .unwrap_or_default();
        Ok(holder.for_url(url))
    }

    fn send_to(&self, endpoint: &WsEndpoint, wrapper: &WsMessageWrapper) -> Result<(), BusError> {
        let address = match wrapper.kind {
            PayloadKind::Text => &endpoint.text_handler_id,
            PayloadKind::Binary => &endpoint.binary_handler_id,
        };
        self.bus.send(address, wrapper.body.clone())
    }

    /// CAS read-modify-write on the holder. The lock already serializes
    /// local callers; the retry loop covers peers on other nodes.
    async fn mutate<F>(&self, mut mutate: F) -> Result<(), WsRegistryError>
    where
        F: FnMut(&mut WsEndpointHolder),
    {
        for _ in 0..MAX_CAS_RETRIES {
            let read = self
                .holder_map
                .get::<WsEndpointHolder>(WS_HOLDER_KEY)
                .await?;
            let (mut holder, version) = match read {
                Some(v) => (v.value, Some(v.version)),
                None => (WsEndpointHolder::default(), None),
            };

            mutate(&mut holder);

            if self
                .holder_map
                .put_if(WS_HOLDER_KEY, version, &holder)
                .await?
            {
                return Ok(());
            }
        }
        Err(WsRegistryError::Contention)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::endpoint::Audience;

    fn registry(cluster: &Cluster) -> WsEndpointRegistry {
        WsEndpointRegistry::clustered(cluster, &WsConfig::default())
    }

    #[tokio::test]
    async fn test_register_is_visible_on_other_nodes() {
        let cluster = Cluster::new();
        let node_a = registry(&cluster);
        let node_b = registry(&cluster.clone());

        let endpoint = node_a.register("/chat").await.unwrap();
        let seen = node_b.endpoints_for_url("/chat").await.unwrap();
        assert_eq!(seen, vec![endpoint]);
    }

    #[tokio::test]
    async fn test_deregister_removes_by_handler_ids() {
        let cluster = Cluster::new();
        let reg = registry(&cluster);
        let endpoint = reg.register("/chat").await.unwrap();

        assert!(reg.deregister(&endpoint).await.unwrap());
        assert!(!reg.deregister(&endpoint).await.unwrap());
        assert!(reg.endpoints_for_url("/chat").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_all_but_sender_skips_the_sender() {
        let cluster = Cluster::new();
        let reg = registry(&cluster);

        let a = reg.register("/chat").await.unwrap();
        let b = reg.register("/chat").await.unwrap();

        let mut a_rx = cluster.bus().consumer(&a.text_handler_id);
        let mut b_rx = cluster.bus().consumer(&b.text_handler_id);

        let wrapper = WsMessageWrapper {
            endpoint: a.clone(),
            body: b"hello".to_vec(),
            kind: PayloadKind::Text,
            audience: Audience::AllButSender,
        };
        let delivered = reg.reply_to_url(&wrapper).await.unwrap();

        assert_eq!(delivered, 1);
        assert_eq!(b_rx.recv().await.unwrap().body, b"hello");
        assert!(a_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_audience_all_includes_sender() {
        let cluster = Cluster::new();
        let reg = registry(&cluster);

        let a = reg.register("/chat").await.unwrap();
        let b = reg.register("/chat").await.unwrap();
        let _other = reg.register("/feed").await.unwrap();

        let mut a_rx = cluster.bus().consumer(&a.text_handler_id);
        let mut b_rx = cluster.bus().consumer(&b.text_handler_id);

        let wrapper = WsMessageWrapper {
            endpoint: a.clone(),
            body: b"news".to_vec(),
            kind: PayloadKind::Text,
            audience: Audience::All,
        };
        let delivered = reg.reply_to_url(&wrapper).await.unwrap();

        // Only the two /chat sockets, not the /feed one.
        assert_eq!(delivered, 2);
        assert_eq!(a_rx.recv().await.unwrap().body, b"news");
        assert_eq!(b_rx.recv().await.unwrap().body, b"news");
    }
}
