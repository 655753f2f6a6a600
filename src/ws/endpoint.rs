//! WebSocket endpoint identity model.
//!
//! A `WsEndpoint` is the bus-addressable identity of one live socket, not
//! the socket itself. Equality is structural over all three fields; the
//! holder relies on that for idempotent add and remove-by-match.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Bus-addressable identity of one live WebSocket connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WsEndpoint {
    /// Bus address receiving binary frames for this socket.
    pub binary_handler_id: String,
    /// Bus address receiving text frames for this socket.
    pub text_handler_id: String,
    /// Path the socket connected on.
    pub url: String,
}

impl WsEndpoint {
    /// Mint a fresh identity for a socket accepted on `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            binary_handler_id: Uuid::new_v4().to_string(),
            text_handler_id: Uuid::new_v4().to_string(),
            url: url.into(),
        }
    }
}

/// Set of live endpoint identities, stored whole under a well-known key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WsEndpointHolder {
    pub endpoints: Vec<WsEndpoint>,
}

impl WsEndpointHolder {
    /// Idempotent add by structural equality.
    pub fn add(&mut self, endpoint: WsEndpoint) -> bool {
        if self.endpoints.contains(&endpoint) {
            false
        } else {
            self.endpoints.push(endpoint);
            true
        }
    }

    /// Remove by structural match.
    pub fn remove(&mut self, endpoint: &WsEndpoint) -> bool {
        let before = self.endpoints.len();
        self.endpoints.retain(|e| e != endpoint);
        self.endpoints.len() != before
    }

    /// Locate and remove the endpoint whose both handler ids match.
    pub fn remove_by_handler_ids(&mut self, binary_id: &str, text_id: &str) -> Option<WsEndpoint> {
        let idx = self
            .endpoints
            .iter()
            .position(|e| e.binary_handler_id == binary_id && e.text_handler_id == text_id)?;
        Some(self.endpoints.remove(idx))
    }

    /// Endpoints connected on `url`.
    pub fn for_url(&self, url: &str) -> Vec<WsEndpoint> {
        self.endpoints
            .iter()
            .filter(|e| e.url == url)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

/// Fan-out policy for a relayed reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Audience {
    Sender,
    All,
    AllButSender,
}

/// Payload framing of a relayed reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    Text,
    Binary,
}

/// Transient envelope carrying a reply plus routing intent back to
/// whichever node holds the target socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsMessageWrapper {
    pub endpoint: WsEndpoint,
    pub body: Vec<u8>,
    pub kind: PayloadKind,
    pub audience: Audience,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_is_idempotent_by_structural_equality() {
        let mut holder = WsEndpointHolder::default();
        let endpoint = WsEndpoint::new("/chat");
        assert!(holder.add(endpoint.clone()));
        assert!(!holder.add(endpoint.clone()));
        assert_eq!(holder.len(), 1);
    }

    #[test]
    fn test_remove_by_handler_ids() {
        let mut holder = WsEndpointHolder::default();
        let a = WsEndpoint::new("/chat");
        let b = WsEndpoint::new("/chat");
        holder.add(a.clone());
        holder.add(b.clone());

        let removed = holder
            .remove_by_handler_ids(&a.binary_handler_id, &a.text_handler_id)
            .unwrap();
        assert_eq!(removed, a);
        assert_eq!(holder.for_url("/chat"), vec![b]);
    }

    #[test]
    fn test_for_url_filters_by_path() {
        let mut holder = WsEndpointHolder::default();
        holder.add(WsEndpoint::new("/chat"));
        holder.add(WsEndpoint::new("/feed"));
        assert_eq!(holder.for_url("/chat").len(), 1);
        assert_eq!(holder.for_url("/nope").len(), 0);
    }
}
