//! Asynchronous message bus.
//!
//! # Responsibilities
//! - Register consumers on string addresses
//! - Unicast send (round-robin over an address's consumers)
//! - Broadcast publish to every consumer of an address
//! - Request/reply with a per-call timeout
//!
//! # Design Decisions
//! - Unbounded channels: producers never block, slow consumers lag
//! - Dead consumers are pruned lazily on the next delivery
//! - No delivery guarantee beyond best-effort

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Error type for bus operations.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("no consumer registered for address '{0}'")]
    NoConsumer(String),
    #[error("request to '{0}' timed out")]
    Timeout(String),
    #[error("consumer for address '{0}' went away before replying")]
    Closed(String),
}

/// One delivery on the bus.
pub struct BusMessage {
    pub address: String,
    pub body: Vec<u8>,
    reply_tx: Option<oneshot::Sender<Vec<u8>>>,
}

impl BusMessage {
    /// Whether the sender is waiting on a reply.
    pub fn expects_reply(&self) -> bool {
        self.reply_tx.is_some()
    }

    /// Answer a request. A no-op for fire-and-forget deliveries or if the
    /// requester already timed out.
    pub fn reply(&mut self, body: Vec<u8>) {
        if let Some(tx) = self.reply_tx.take() {
            let _ = tx.send(body);
        }
    }

    /// Decode the body as JSON.
    pub fn body_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

struct AddressEntry {
    senders: Vec<mpsc::UnboundedSender<BusMessage>>,
    next: AtomicUsize,
}

/// String-addressed bus spanning all nodes of a [`Cluster`](super::Cluster).
#[derive(Clone, Default)]
pub struct MessageBus {
    addresses: Arc<DashMap<String, AddressEntry>>,
}

impl MessageBus {
    /// Register a consumer on `address`. Multiple consumers may share an
    /// address: `send` round-robins across them, `publish` reaches all.
    pub fn consumer(&self, address: &str) -> mpsc::UnboundedReceiver<BusMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.addresses
            .entry(address.to_string())
            .or_insert_with(|| AddressEntry {
                senders: Vec::new(),
                next: AtomicUsize::new(0),
            })
            .senders
            .push(tx);
        rx
    }

    fn deliver(&self, address: &str, message: BusMessage) -> Result<(), BusError> {
        let mut entry = self
            .addresses
            .get_mut(address)
            .ok_or_else(|| BusError::NoConsumer(address.to_string()))?;

        let mut message = message;
        while !entry.senders.is_empty() {
            let idx = entry.next.fetch_add(1, Ordering::Relaxed) % entry.senders.len();
            match entry.senders[idx].send(message) {
                Ok(()) => return Ok(()),
                Err(mpsc::error::SendError(returned)) => {
                    // Receiver dropped: prune and try the next one.
                    entry.senders.remove(idx);
                    message = returned;
                }
            }
        }
        Err(BusError::NoConsumer(address.to_string()))
    }

    /// Unicast: deliver to one consumer of `address`.
    pub fn send(&self, address: &str, body: Vec<u8>) -> Result<(), BusError> {
        self.deliver(
            address,
            BusMessage {
                address: address.to_string(),
                body,
                reply_tx: None,
            },
        )
    }

    /// Broadcast: deliver a copy to every live consumer of `address`.
    /// Returns the number of consumers reached.
    pub fn publish(&self, address: &str, body: Vec<u8>) -> usize {
        let Some(mut entry) = self.addresses.get_mut(address) else {
            return 0;
        };
        let mut reached = 0;
        entry.senders.retain(|tx| {
            tx.send(BusMessage {
                address: address.to_string(),
                body: body.clone(),
                reply_tx: None,
            })
            .map(|_| reached += 1)
            .is_ok()
        });
        reached
    }

    /// Unicast with a reply, bounded by `timeout`.
    pub async fn request(
        &self,
        address: &str,
        body: Vec<u8>,
        timeout: Duration,
    ) -> Result<Vec<u8>, BusError> {
        let (tx, rx) = oneshot::channel();
        self.deliver(
            address,
            BusMessage {
                address: address.to_string(),
                body,
                reply_tx: Some(tx),
            },
        )?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(BusError::Closed(address.to_string())),
            Err(_) => Err(BusError::Timeout(address.to_string())),
        }
    }
}
