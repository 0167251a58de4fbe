//! Durable marker for a rotation whose new key is stored but whose old key
//! has not been deleted yet.

use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::store::{self, SecretStore};

const CHECKPOINT_KEY_PREFIX: &str = "rotation";

/// Only key ids are recorded, never secret material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationCheckpoint {
    pub credentials_name: String,
    pub old_access_key_id: String,
    pub new_access_key_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct CheckpointStore {
    store: Arc<dyn SecretStore>,
}

impl CheckpointStore {
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self { store }
    }

    fn key(credentials_name: &str) -> String {
        format!(
            "{CHECKPOINT_KEY_PREFIX},{}",
            URL_SAFE_NO_PAD.encode(credentials_name.as_bytes())
        )
    }

    pub fn load(&self, credentials_name: &str) -> Result<Option<RotationCheckpoint>, StoreError> {
        store::get_json(self.store.as_ref(), &Self::key(credentials_name))
    }

    pub fn save(&self, checkpoint: &RotationCheckpoint) -> Result<(), StoreError> {
        store::set_json(
            self.store.as_ref(),
            &Self::key(&checkpoint.credentials_name),
            checkpoint,
        )
    }

    pub fn clear(&self, credentials_name: &str) -> Result<bool, StoreError> {
        self.store.remove(&Self::key(credentials_name))
    }
}
