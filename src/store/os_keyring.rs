use std::collections::BTreeSet;
use std::sync::Mutex;

use ::keyring::{Entry, Error as KeyringError};
use tracing::{debug, warn};

use super::SecretStore;
use crate::error::StoreError;

/// Label of the entry listing every other label, since OS keyrings cannot be
/// enumerated portably
const INDEX_KEY: &str = "__index__";

/// Raw per-label access to a keyring
pub trait KeyringBackend: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>, KeyringError>;
    fn write(&self, key: &str, value: &str) -> Result<(), KeyringError>;
    /// Returns whether the entry existed
    fn delete(&self, key: &str) -> Result<bool, KeyringError>;
}

/// The platform keyring (macOS Keychain, Windows Credential Manager, Secret
/// Service on Linux), one entry per label under a service name
#[derive(Debug)]
pub struct PlatformKeyring {
    service: String,
}

impl PlatformKeyring {
    fn entry(&self, key: &str) -> Result<Entry, KeyringError> {
        Entry::new(&self.service, key)
    }
}

impl KeyringBackend for PlatformKeyring {
    fn read(&self, key: &str) -> Result<Option<String>, KeyringError> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(KeyringError::NoEntry) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), KeyringError> {
        self.entry(key)?.set_password(value)
    }

    fn delete(&self, key: &str) -> Result<bool, KeyringError> {
        match self.entry(key)?.delete_credential() {
            Ok(()) => Ok(true),
            Err(KeyringError::NoEntry) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// [`SecretStore`] over a keyring, keeping an index entry of its labels
#[derive(Debug)]
pub struct KeyringStore<B = PlatformKeyring> {
    backend: B,
    index_lock: Mutex<()>,
}

impl KeyringStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self::with_backend(PlatformKeyring {
            service: service.into(),
        })
    }

    pub fn service(&self) -> &str {
        &self.backend.service
    }
}

impl<B: KeyringBackend> KeyringStore<B> {
    pub fn with_backend(backend: B) -> Self {
        Self {
            backend,
            index_lock: Mutex::new(()),
        }
    }

    fn read_index(&self) -> Result<BTreeSet<String>, StoreError> {
        let Some(raw) = self
            .backend
            .read(INDEX_KEY)
            .map_err(|e| backend_error(INDEX_KEY, e))?
        else {
            return Ok(BTreeSet::new());
        };

        serde_json::from_str(&raw).map_err(|source| StoreError::Serialization {
            key: INDEX_KEY.to_string(),
            source,
        })
    }

    fn update_index(
        &self,
        key: &str,
        update: impl FnOnce(&mut BTreeSet<String>) -> bool,
    ) -> Result<(), StoreError> {
        let _guard = self.index_lock.lock().map_err(|_| StoreError::Backend {
            key: INDEX_KEY.to_string(),
            reason: "index lock poisoned".to_string(),
        })?;

        let mut index = self.read_index()?;
        if !update(&mut index) {
            return Ok(());
        }

        let raw = serde_json::to_string(&index).map_err(|source| StoreError::Serialization {
            key: INDEX_KEY.to_string(),
            source,
        })?;
        self.backend
            .write(INDEX_KEY, &raw)
            .map_err(|e| backend_error(INDEX_KEY, e))?;

        debug!("Updated keyring index after change to '{}'", key);
        Ok(())
    }
}

impl<B: KeyringBackend> SecretStore for KeyringStore<B> {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.backend.read(key).map_err(|e| backend_error(key, e))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.backend
            .write(key, value)
            .map_err(|e| backend_error(key, e))?;

        // The value is stored at this point; a stale index only hides it from `keys`
        if let Err(e) = self.update_index(key, |index| index.insert(key.to_string())) {
            warn!("Failed to update keyring index after storing '{}': {}", key, e);
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, StoreError> {
        let existed = self.backend.delete(key).map_err(|e| backend_error(key, e))?;

        if let Err(e) = self.update_index(key, |index| index.remove(key)) {
            warn!("Failed to update keyring index after removing '{}': {}", key, e);
        }

        Ok(existed)
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.read_index()?.into_iter().collect())
    }
}

fn backend_error(key: &str, err: KeyringError) -> StoreError {
    StoreError::Backend {
        key: key.to_string(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::Credentials;
    use crate::vault::MasterCredentialsProvider;
    use std::collections::HashMap;
    use std::sync::Arc;

    /// Keyring whose writes to the index entry can be made to fail
    #[derive(Debug, Default)]
    struct LockedIndexKeyring {
        entries: Mutex<HashMap<String, String>>,
        index_locked: bool,
    }

    impl KeyringBackend for LockedIndexKeyring {
        fn read(&self, key: &str) -> Result<Option<String>, KeyringError> {
            Ok(self.entries.lock().unwrap().get(key).cloned())
        }

        fn write(&self, key: &str, value: &str) -> Result<(), KeyringError> {
            if self.index_locked && key == INDEX_KEY {
                return Err(KeyringError::NoStorageAccess("keychain is locked".into()));
            }
            self.entries
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_string());
            Ok(())
        }

        fn delete(&self, key: &str) -> Result<bool, KeyringError> {
            Ok(self.entries.lock().unwrap().remove(key).is_some())
        }
    }

    #[test]
    fn test_backend_error_keeps_key() {
        let err = backend_error("base", KeyringError::NoEntry);
        let message = err.to_string();
        assert!(message.contains("'base'"));
    }

    #[test]
    fn test_service_name() {
        let store = KeyringStore::new("rotavault-test");
        assert_eq!(store.service(), "rotavault-test");
    }

    #[test]
    fn test_index_tracks_set_and_remove() {
        let store = KeyringStore::with_backend(LockedIndexKeyring::default());
        store.set("base", "v1").unwrap();
        store.set("work", "v2").unwrap();
        assert_eq!(store.keys().unwrap(), vec!["base", "work"]);

        assert!(store.remove("base").unwrap());
        assert!(!store.remove("base").unwrap());
        assert_eq!(store.keys().unwrap(), vec!["work"]);
        assert_eq!(store.get("base").unwrap(), None);
    }

    #[test]
    fn test_set_succeeds_when_index_write_fails() {
        let store = KeyringStore::with_backend(LockedIndexKeyring {
            index_locked: true,
            ..Default::default()
        });

        store.set("base", "v1").unwrap();
        assert_eq!(store.get("base").unwrap().as_deref(), Some("v1"));
        assert!(store.keys().unwrap().is_empty());
    }

    #[test]
    fn test_master_store_reports_success_when_index_write_fails() {
        let store = Arc::new(KeyringStore::with_backend(LockedIndexKeyring {
            index_locked: true,
            ..Default::default()
        }));
        let master = MasterCredentialsProvider::new(store, "base");

        master.store(&Credentials::new("AKIANEW1", "new-secret")).unwrap();
        assert_eq!(master.retrieve().unwrap().access_key_id, "AKIANEW1");
    }
}
