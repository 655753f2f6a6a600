//! Service directory data model.
//!
//! # Responsibilities
//! - Describe one callable route of a service (`Operation`)
//! - Describe a service and its operations (`ServiceInfo`)
//! - Hold the full directory with at-most-one-entry-per-name semantics
//!   (`ServiceInfoHolder`)
//!
//! # Design Decisions
//! - Holder uniqueness is replace-else-append, preserving insertion order
//! - `last_connection` is unix epoch milliseconds (wire-friendly)

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Current time as unix epoch milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Protocol type of one callable operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
    RestGet,
    RestPost,
    Websocket,
    Eventbus,
}

/// One callable route advertised by a service. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub url: String,
    #[serde(rename = "type")]
    pub kind: OperationType,
    #[serde(default)]
    pub produces: Vec<String>,
    #[serde(default)]
    pub consumes: Vec<String>,
    #[serde(default)]
    pub parameters: Vec<String>,
}

impl Operation {
    pub fn new(name: impl Into<String>, url: impl Into<String>, kind: OperationType) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            url: url.into(),
            kind,
            produces: Vec::new(),
            consumes: Vec::new(),
            parameters: Vec::new(),
        }
    }
}

/// Full descriptor of one registered service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub service_name: String,
    pub host: String,
    pub port: u16,
    /// Unix epoch milliseconds of the last successful contact.
    #[serde(default)]
    pub last_connection: u64,
    #[serde(default)]
    pub operations: Vec<Operation>,
}

impl ServiceInfo {
    pub fn new(
        service_name: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        operations: Vec<Operation>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            host: host.into(),
            port,
            last_connection: 0,
            operations,
        }
    }

    /// Stamp the last-contact time to now.
    pub fn touch(&mut self) {
        self.last_connection = now_millis();
    }

    /// Bus address this service answers heartbeat probes on.
    pub fn info_address(&self) -> String {
        format!("{}-info", self.service_name)
    }
}

/// Insertion-ordered collection of [`ServiceInfo`], at most one entry per
/// service name. Read and written as one whole value against the backing
/// map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceInfoHolder {
    pub services: Vec<ServiceInfo>,
}

impl ServiceInfoHolder {
    /// Replace the entry with the same name in place, else append.
    /// Returns true when an existing entry was replaced.
    pub fn add_or_replace(&mut self, info: ServiceInfo) -> bool {
        if let Some(existing) = self
            .services
            .iter_mut()
            .find(|s| s.service_name == info.service_name)
        {
            *existing = info;
            true
        } else {
            self.services.push(info);
            false
        }
    }

    /// Remove the entry for `name`, returning it if present.
    pub fn remove(&mut self, name: &str) -> Option<ServiceInfo> {
        let idx = self.services.iter().position(|s| s.service_name == name)?;
        Some(self.services.remove(idx))
    }

    pub fn find_by_name(&self, name: &str) -> Vec<ServiceInfo> {
        self.services
            .iter()
            .filter(|s| s.service_name == name)
            .cloned()
            .collect()
    }

    pub fn find_by_host(&self, host: &str) -> Vec<ServiceInfo> {
        self.services
            .iter()
            .filter(|s| s.host == host)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}
