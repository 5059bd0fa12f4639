// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Config service and storage port for scene RPC tools.

use std::collections::BTreeMap;
use std::sync::Mutex;

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// Storage port for raw config blobs (keyed by logical name).
pub trait ConfigStore {
    /// Load a raw config blob. Returns `NotFound` when missing.
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError>;
    /// Persist a raw config blob.
    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError>;
}

/// Error type for config operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Key not present in store.
    #[error("not found")]
    NotFound,
    /// I/O error while reading/writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization/deserialization failure.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
    /// Catch-all error variant.
    #[error("other: {0}")]
    Other(String),
}

/// Thin service that serializes config values and delegates storage to a `ConfigStore`.
pub struct ConfigService<S> {
    store: S,
}

impl<S> ConfigService<S> {
    /// Create a new service using the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Borrow the inner store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Consume the service and return the inner store.
    pub fn into_inner(self) -> S {
        self.store
    }
}

impl<S> ConfigService<S>
where
    S: ConfigStore,
{
    /// Load and deserialize a config value for `key`. Returns `Ok(None)` if missing.
    pub fn load<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: DeserializeOwned,
    {
        match self.store.load_raw(key) {
            Ok(bytes) => {
                if bytes.is_empty() {
                    return Ok(None);
                }
                let value = serde_json::from_slice(&bytes)?;
                Ok(Some(value))
            }
            Err(ConfigError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Load `key`, falling back to `T::default()` when it is missing.
    pub fn load_or_default<T>(&self, key: &str) -> Result<T, ConfigError>
    where
        T: DeserializeOwned + Default,
    {
        Ok(self.load(key)?.unwrap_or_default())
    }

    /// Serialize and persist a config value for `key`.
    pub fn save<T>(&self, key: &str, value: &T) -> Result<(), ConfigError>
    where
        T: Serialize,
    {
        let data = serde_json::to_vec_pretty(value)?;
        self.store.save_raw(key, &data)
    }
}

/// In-process store, for tests and one-shot tools.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    blobs: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryConfigStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError> {
        let blobs = self
            .blobs
            .lock()
            .map_err(|_| ConfigError::Other("config store lock poisoned".into()))?;
        blobs.get(key).cloned().ok_or(ConfigError::NotFound)
    }

    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError> {
        let mut blobs = self
            .blobs
            .lock()
            .map_err(|_| ConfigError::Other("config store lock poisoned".into()))?;
        blobs.insert(key.to_owned(), data.to_vec());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        depth: u32,
    }

    #[test]
    fn missing_key_loads_none() {
        let svc = ConfigService::new(MemoryConfigStore::new());
        assert_eq!(svc.load::<Sample>("absent").unwrap(), None);
        assert_eq!(
            svc.load_or_default::<Sample>("absent").unwrap(),
            Sample::default()
        );
    }

    #[test]
    fn save_then_load() {
        let svc = ConfigService::new(MemoryConfigStore::new());
        let value = Sample {
            name: "receiver".into(),
            depth: 3,
        };
        svc.save("sample", &value).unwrap();
        assert_eq!(svc.load::<Sample>("sample").unwrap(), Some(value));
    }

    #[test]
    fn empty_blob_is_treated_as_missing() {
        let store = MemoryConfigStore::new();
        store.save_raw("blank", b"").unwrap();
        let svc = ConfigService::new(store);
        assert_eq!(svc.load::<Sample>("blank").unwrap(), None);
    }

    #[test]
    fn malformed_json_is_a_serde_error() {
        let store = MemoryConfigStore::new();
        store.save_raw("bad", b"{not json").unwrap();
        let svc = ConfigService::new(store);
        assert!(matches!(svc.load::<Sample>("bad"), Err(ConfigError::Serde(_))));
    }
}
