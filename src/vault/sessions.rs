//! Cached session credentials, keyed by profile and MFA device.

use std::future::Future;
use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use tracing::{debug, warn};

use crate::aws::SessionCredentials;
use crate::constants::SESSION_EXPIRY_WINDOW;
use crate::error::CredentialError;
use crate::store::{self, SecretStore};

const SESSION_KEY_PREFIX: &str = "session";

#[derive(Clone)]
pub struct SessionCache {
    store: Arc<dyn SecretStore>,
}

impl SessionCache {
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self { store }
    }

    fn profile_prefix(profile: &str) -> String {
        format!(
            "{SESSION_KEY_PREFIX},{},",
            URL_SAFE_NO_PAD.encode(profile.as_bytes())
        )
    }

    fn key(profile: &str, mfa_serial: Option<&str>) -> String {
        format!(
            "{}{}",
            Self::profile_prefix(profile),
            URL_SAFE_NO_PAD.encode(mfa_serial.unwrap_or_default().as_bytes())
        )
    }

    /// An unexpired cached session, if any. Expired entries are removed.
    pub fn get(
        &self,
        profile: &str,
        mfa_serial: Option<&str>,
    ) -> Result<Option<SessionCredentials>, CredentialError> {
        let key = Self::key(profile, mfa_serial);
        let Some(session) = store::get_json::<SessionCredentials>(self.store.as_ref(), &key)?
        else {
            return Ok(None);
        };

        if session.is_expired(Utc::now(), SESSION_EXPIRY_WINDOW) {
            debug!("Cached session for '{}' expired at {}", profile, session.expiration);
            if let Err(e) = self.store.remove(&key) {
                warn!("Failed to remove expired session for '{}': {}", profile, e);
            }
            return Ok(None);
        }

        debug!("Using cached session for '{}'", profile);
        Ok(Some(session))
    }

    pub fn put(
        &self,
        profile: &str,
        mfa_serial: Option<&str>,
        session: &SessionCredentials,
    ) -> Result<(), CredentialError> {
        let key = Self::key(profile, mfa_serial);
        store::set_json(self.store.as_ref(), &key, session)?;
        debug!("Cached session for '{}' until {}", profile, session.expiration);
        Ok(())
    }

    /// Return the cached session or create, cache and return a new one
    pub async fn get_or_create<F, Fut>(
        &self,
        profile: &str,
        mfa_serial: Option<&str>,
        create: F,
    ) -> Result<SessionCredentials, CredentialError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<SessionCredentials, CredentialError>>,
    {
        if let Some(session) = self.get(profile, mfa_serial)? {
            return Ok(session);
        }

        let session = create().await?;
        if let Err(e) = self.put(profile, mfa_serial, &session) {
            warn!("Failed to cache session for '{}': {}", profile, e);
        }
        Ok(session)
    }

    /// Delete every cached session of a profile, for all MFA devices.
    /// Returns how many were deleted; an empty cache deletes zero.
    pub fn delete_all(&self, profile: &str) -> Result<usize, CredentialError> {
        let prefix = Self::profile_prefix(profile);
        let mut deleted = 0;

        for key in self.store.keys()? {
            if key.starts_with(&prefix) && self.store.remove(&key)? {
                deleted += 1;
            }
        }

        Ok(deleted)
    }

    /// Number of cached sessions for a profile, expired or not
    pub fn count(&self, profile: &str) -> Result<usize, CredentialError> {
        let prefix = Self::profile_prefix(profile);
        Ok(self
            .store
            .keys()?
            .iter()
            .filter(|key| key.starts_with(&prefix))
            .count())
    }
}
