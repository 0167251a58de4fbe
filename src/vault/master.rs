use std::sync::Arc;

use tracing::{debug, info};

use crate::aws::{Credentials, mask_access_key};
use crate::error::{CredentialError, StoreError};
use crate::store::{self, SecretStore};

/// Reads and writes the long-term credentials of one profile. Nothing else
/// writes the label it owns.
#[derive(Clone)]
pub struct MasterCredentialsProvider {
    store: Arc<dyn SecretStore>,
    credentials_name: String,
}

impl MasterCredentialsProvider {
    pub fn new(store: Arc<dyn SecretStore>, credentials_name: impl Into<String>) -> Self {
        Self {
            store,
            credentials_name: credentials_name.into(),
        }
    }

    pub fn credentials_name(&self) -> &str {
        &self.credentials_name
    }

    pub fn retrieve(&self) -> Result<Credentials, CredentialError> {
        debug!("Looking up long-term credentials for '{}'", self.credentials_name);
        store::get_json::<Credentials>(self.store.as_ref(), &self.credentials_name)?
            .ok_or_else(|| CredentialError::NotFound(self.credentials_name.clone()))
    }

    /// Overwrite the stored credentials in one write
    pub fn store(&self, credentials: &Credentials) -> Result<(), StoreError> {
        store::set_json(self.store.as_ref(), &self.credentials_name, credentials)?;
        info!(
            "Stored access key {} for '{}'",
            mask_access_key(&credentials.access_key_id),
            self.credentials_name
        );
        Ok(())
    }
}
