//! Versioned shared key-value map.
//!
//! # Responsibilities
//! - Whole-value get/put/remove keyed by string
//! - Optimistic replace: `put_if` succeeds only when the stored version
//!   still matches the one the caller read
//!
//! # Design Decisions
//! - Values are JSON bytes; callers read and write typed whole values
//! - Versions are per-key monotonic counters, never reused
//! - The async surface mirrors a remote store even though the in-process
//!   fabric completes immediately

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Error type for map operations.
#[derive(Debug, Error)]
pub enum MapError {
    #[error("failed to encode value for key '{key}': {source}")]
    Encode {
        key: String,
        source: serde_json::Error,
    },
    #[error("failed to decode value for key '{key}': {source}")]
    Decode {
        key: String,
        source: serde_json::Error,
    },
}

/// A value read from the map together with the version to CAS against.
#[derive(Debug, Clone)]
pub struct Versioned<T> {
    pub value: T,
    pub version: u64,
}

/// Whole-value key-value store shared by all holders of a clone.
#[derive(Clone, Default)]
pub struct SharedMap {
    entries: Arc<DashMap<String, (u64, Vec<u8>)>>,
}

impl SharedMap {
    /// Read the value under `key`, if any.
    pub async fn get<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<Versioned<T>>, MapError> {
        let Some(entry) = self.entries.get(key) else {
            return Ok(None);
        };
        let (version, bytes) = entry.value();
        let value = serde_json::from_slice(bytes).map_err(|source| MapError::Decode {
            key: key.to_string(),
            source,
        })?;
        Ok(Some(Versioned {
            value,
            version: *version,
        }))
    }

    /// Unconditional write. Returns the new version.
    pub async fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<u64, MapError> {
        let bytes = encode(key, value)?;
        let mut version = 1;
        self.entries
            .entry(key.to_string())
            .and_modify(|(v, b)| {
                *v += 1;
                version = *v;
                *b = bytes.clone();
            })
            .or_insert((1, bytes));
        Ok(version)
    }

    /// Compare-and-swap write. `expected = None` inserts only when the key
    /// is absent; `Some(v)` replaces only when the stored version is `v`.
    /// Returns false when the precondition no longer holds.
    pub async fn put_if<T: Serialize>(
        &self,
        key: &str,
        expected: Option<u64>,
        value: &T,
    ) -> Result<bool, MapError> {
        let bytes = encode(key, value)?;
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if expected == Some(occupied.get().0) {
                    let next = occupied.get().0 + 1;
                    occupied.insert((next, bytes));
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(vacant) => {
                if expected.is_none() {
                    vacant.insert((1, bytes));
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
        }
    }

    /// Remove the value under `key`.
    pub async fn remove(&self, key: &str) {
        self.entries.remove(key);
    }
}

fn encode<T: Serialize>(key: &str, value: &T) -> Result<Vec<u8>, MapError> {
    serde_json::to_vec(value).map_err(|source| MapError::Encode {
        key: key.to_string(),
        source,
    })
}
