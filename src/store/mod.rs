//! Opaque key/value persistence for credential material.
//!
//! Values are strings (JSON documents in practice). Keys are labels inside a
//! single service namespace; see [`crate::vault`] for the label layout.

use serde::{Serialize, de::DeserializeOwned};

use crate::error::StoreError;

mod os_keyring;
mod memory;

pub use self::os_keyring::{KeyringBackend, KeyringStore, PlatformKeyring};
pub use self::memory::MemoryStore;

pub trait SecretStore: Send + Sync {
    /// Fetch a secret; `Ok(None)` when it does not exist.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Create or overwrite a secret. A reader never observes a partial value.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Delete a secret; returns whether it existed.
    fn remove(&self, key: &str) -> Result<bool, StoreError>;

    /// Labels of every stored secret.
    fn keys(&self) -> Result<Vec<String>, StoreError>;
}

pub fn get_json<T: DeserializeOwned>(
    store: &dyn SecretStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    let Some(raw) = store.get(key)? else {
        return Ok(None);
    };

    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|source| StoreError::Serialization {
            key: key.to_string(),
            source,
        })
}

pub fn set_json<T: Serialize>(
    store: &dyn SecretStore,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    let raw = serde_json::to_string(value).map_err(|source| StoreError::Serialization {
        key: key.to_string(),
        source,
    })?;
    store.set(key, &raw)
}
