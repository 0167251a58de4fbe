use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::{debug, info};

use super::master::MasterCredentialsProvider;
use super::prompt::MfaPrompt;
use super::sessions::SessionCache;
use crate::aws::{
    AssumeRoleRequest, IdentityApi, SessionCredentials, SessionTokenRequest, WorkingCredentials,
};
use crate::config::ProfileConfig;
use crate::constants::SESSION_EXPIRY_WINDOW;
use crate::error::CredentialError;

/// Produces the credentials API calls for a profile are signed with, derived
/// from the profile's long-term credentials.
///
/// - no role, `no_session`: the long-term credentials themselves
/// - no role: a GetSessionToken session, cached in the [`SessionCache`]
/// - role, `no_session`: AssumeRole signed with the long-term credentials
/// - role: AssumeRole signed with a cached GetSessionToken session
///
/// The last result is also kept in memory until it expires or
/// [`force_refresh`](Self::force_refresh) is called.
pub struct SessionCredentialsProvider {
    master: MasterCredentialsProvider,
    sessions: SessionCache,
    api: Arc<dyn IdentityApi>,
    prompt: Arc<dyn MfaPrompt>,
    config: ProfileConfig,
    current: Mutex<Option<WorkingCredentials>>,
}

impl SessionCredentialsProvider {
    pub fn new(
        master: MasterCredentialsProvider,
        sessions: SessionCache,
        api: Arc<dyn IdentityApi>,
        prompt: Arc<dyn MfaPrompt>,
        config: ProfileConfig,
    ) -> Self {
        Self {
            master,
            sessions,
            api,
            prompt,
            config,
            current: Mutex::new(None),
        }
    }

    pub async fn retrieve(&self) -> Result<WorkingCredentials, CredentialError> {
        if let Some(current) = self.current_unexpired() {
            return Ok(current);
        }

        let derived = self.derive().await?;
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = Some(derived.clone());
        Ok(derived)
    }

    /// Forget the in-memory credentials so the next retrieve derives them
    /// again from whatever long-term credentials are stored by then
    pub fn force_refresh(&self) {
        debug!("Dropping in-memory working credentials for '{}'", self.config.profile_name);
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    fn current_unexpired(&self) -> Option<WorkingCredentials> {
        let current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        match current.as_ref() {
            Some(WorkingCredentials::Session(session))
                if session.is_expired(Utc::now(), SESSION_EXPIRY_WINDOW) =>
            {
                None
            }
            other => other.cloned(),
        }
    }

    async fn derive(&self) -> Result<WorkingCredentials, CredentialError> {
        let master = WorkingCredentials::LongTerm(self.master.retrieve()?);

        match (self.config.role_arn.as_deref(), self.config.no_session) {
            (None, true) => {
                debug!("Sessions disabled, using long-term credentials directly");
                Ok(master)
            }
            (None, false) => Ok(WorkingCredentials::Session(
                self.session_token(&master).await?,
            )),
            (Some(role_arn), true) => Ok(WorkingCredentials::Session(
                self.assume_role(&master, role_arn, true).await?,
            )),
            (Some(role_arn), false) => {
                let session = WorkingCredentials::Session(self.session_token(&master).await?);
                Ok(WorkingCredentials::Session(
                    self.assume_role(&session, role_arn, false).await?,
                ))
            }
        }
    }

    fn mfa_token(&self) -> Result<Option<String>, CredentialError> {
        let Some(serial) = self.config.mfa_serial.as_deref() else {
            return Ok(None);
        };

        match &self.config.mfa_token {
            Some(token) => Ok(Some(token.clone())),
            None => self.prompt.mfa_token(serial).map(Some),
        }
    }

    async fn session_token(
        &self,
        master: &WorkingCredentials,
    ) -> Result<SessionCredentials, CredentialError> {
        let mfa_serial = self.config.mfa_serial.as_deref();

        self.sessions
            .get_or_create(self.master.credentials_name(), mfa_serial, || async {
                let request = SessionTokenRequest {
                    duration: self.config.session_duration,
                    mfa_serial: mfa_serial.map(String::from),
                    mfa_token: self.mfa_token()?,
                };
                let session = self.api.get_session_token(master, &request).await?;
                info!("Created new session for '{}'", self.master.credentials_name());
                Ok(session)
            })
            .await
    }

    async fn assume_role(
        &self,
        auth: &WorkingCredentials,
        role_arn: &str,
        with_mfa: bool,
    ) -> Result<SessionCredentials, CredentialError> {
        let (mfa_serial, mfa_token) = if with_mfa {
            (self.config.mfa_serial.clone(), self.mfa_token()?)
        } else {
            (None, None)
        };

        let request = AssumeRoleRequest {
            role_arn: role_arn.to_string(),
            session_name: format!("rotavault-{}", Utc::now().timestamp()),
            duration: self.config.assume_role_duration,
            mfa_serial,
            mfa_token,
        };

        let session = self.api.assume_role(auth, &request).await?;
        info!("Assumed role {} for profile '{}'", role_arn, self.config.profile_name);
        Ok(session)
    }
}
