use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use dialoguer::{Input, Password, theme::ColorfulTheme};
use tracing::{info, warn};

use crate::{
    aws::Credentials,
    constants,
    store::{KeyringStore, SecretStore},
    vault::{MasterCredentialsProvider, SessionCache},
};

#[derive(Debug, Clone, Args)]
pub struct StoreCommand {
    #[arg(short = 'p', long, default_value = "default", help = "Profile to store the credentials under")]
    pub profile: String,
}

impl StoreCommand {
    pub fn execute(self) -> Result<()> {
        let theme = ColorfulTheme::default();

        let access_key_id = Input::<String>::with_theme(&theme)
            .with_prompt("Enter Access Key ID")
            .validate_with(|input: &String| {
                if input.trim().is_empty() {
                    Err("Access Key ID is required")
                } else {
                    Ok(())
                }
            })
            .interact_text()
            .context("Failed to read Access Key ID")?;

        let secret_access_key = Password::with_theme(&theme)
            .with_prompt("Enter Secret Access Key")
            .interact()
            .context("Failed to read Secret Access Key")?;

        let credentials = Credentials::new(access_key_id.trim(), secret_access_key.trim());
        let store: Arc<dyn SecretStore> = Arc::new(KeyringStore::new(constants::keyring_service()));
        store_credentials(store, &self.profile, &credentials)?;

        println!("\nAdded credentials to profile {:?} in vault", self.profile);
        Ok(())
    }
}

/// Write long-term credentials for a profile and drop sessions derived from
/// whatever was stored before. Returns the number of sessions deleted.
pub fn store_credentials(
    store: Arc<dyn SecretStore>,
    profile: &str,
    credentials: &Credentials,
) -> Result<usize> {
    MasterCredentialsProvider::new(store.clone(), profile)
        .store(credentials)
        .with_context(|| format!("Failed to store credentials for profile '{profile}'"))?;

    let deleted = match SessionCache::new(store).delete_all(profile) {
        Ok(n) => n,
        Err(e) => {
            warn!("Failed to delete cached sessions for '{}': {}", profile, e);
            0
        }
    };
    if deleted > 0 {
        info!("Deleted {} existing sessions.", deleted);
    }

    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::SessionCredentials;
    use crate::error::StoreError;
    use crate::store::MemoryStore;
    use chrono::{Duration, Utc};

    #[test]
    fn test_store_credentials_replaces_and_clears_sessions() {
        let store: Arc<dyn SecretStore> = Arc::new(MemoryStore::new());
        let sessions = SessionCache::new(store.clone());
        sessions
            .put(
                "base",
                None,
                &SessionCredentials {
                    access_key_id: "ASIAOLD".to_string(),
                    secret_access_key: "s".to_string(),
                    session_token: "t".to_string(),
                    expiration: Utc::now() + Duration::hours(1),
                    identity: None,
                },
            )
            .unwrap();

        let deleted =
            store_credentials(store.clone(), "base", &Credentials::new("AKIANEW1", "secret")).unwrap();
        assert_eq!(deleted, 1);

        let stored = MasterCredentialsProvider::new(store, "base").retrieve().unwrap();
        assert_eq!(stored.access_key_id, "AKIANEW1");
    }

    /// Store that cannot list its keys, so cached sessions cannot be found
    struct UnlistableStore(MemoryStore);

    impl SecretStore for UnlistableStore {
        fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.0.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
            self.0.set(key, value)
        }

        fn remove(&self, key: &str) -> Result<bool, StoreError> {
            self.0.remove(key)
        }

        fn keys(&self) -> Result<Vec<String>, StoreError> {
            Err(StoreError::Backend {
                key: "*".to_string(),
                reason: "listing not permitted".to_string(),
            })
        }
    }

    #[test]
    fn test_store_credentials_succeeds_when_sessions_cannot_be_cleared() {
        let store: Arc<dyn SecretStore> = Arc::new(UnlistableStore(MemoryStore::new()));

        let deleted =
            store_credentials(store.clone(), "base", &Credentials::new("AKIANEW1", "secret")).unwrap();
        assert_eq!(deleted, 0);

        let stored = MasterCredentialsProvider::new(store, "base").retrieve().unwrap();
        assert_eq!(stored.access_key_id, "AKIANEW1");
    }
}
