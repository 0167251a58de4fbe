//! In-memory stand-ins for IAM/STS and for a misbehaving secret store.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rotavault::aws::{
    AssumeRoleRequest, Credentials, IdentityApi, SessionCredentials, SessionTokenRequest,
    WorkingCredentials,
};
use rotavault::config::ProfileConfig;
use rotavault::error::{ApiError, StoreError};
use rotavault::store::{MemoryStore, SecretStore};
use rotavault::vault::{VaultContext, prompt};
use rotavault::vault::PromptMethod;

pub const USER: &str = "alice";
pub const OLD_KEY: &str = "AKIAEXAMPLEOLD1";
pub const OLD_SECRET: &str = "old-secret";

#[derive(Debug, Clone)]
struct AccessKey {
    user: String,
    secret: String,
    /// Authentication attempts that fail before the key has propagated
    pending_failures: u32,
}

#[derive(Debug, Clone)]
struct Session {
    parent_key: String,
    secret: String,
    token: String,
    role: bool,
}

#[derive(Debug, Default)]
struct State {
    keys: BTreeMap<String, AccessKey>,
    sessions: BTreeMap<String, Session>,
    calls: Vec<String>,
    next_id: u32,
    new_key_failures: u32,
    fail_create: bool,
    used_mfa_tokens: HashSet<String>,
}

/// Fake IAM + STS. New access keys reject the first `new_key_failures`
/// authentications to model propagation delay.
#[derive(Debug, Default)]
pub struct FakeIam {
    state: Mutex<State>,
}

impl FakeIam {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(self, user: &str, access_key_id: &str, secret: &str) -> Self {
        self.state.lock().unwrap().keys.insert(
            access_key_id.to_string(),
            AccessKey {
                user: user.to_string(),
                secret: secret.to_string(),
                pending_failures: 0,
            },
        );
        self
    }

    pub fn set_new_key_failures(&self, failures: u32) {
        self.state.lock().unwrap().new_key_failures = failures;
    }

    /// Let every existing key authenticate immediately
    pub fn finish_propagation(&self) {
        for key in self.state.lock().unwrap().keys.values_mut() {
            key.pending_failures = 0;
        }
    }

    pub fn set_fail_create(&self, fail: bool) {
        self.state.lock().unwrap().fail_create = fail;
    }

    pub fn key_exists(&self, access_key_id: &str) -> bool {
        self.state.lock().unwrap().keys.contains_key(access_key_id)
    }

    pub fn key_ids(&self) -> Vec<String> {
        self.state.lock().unwrap().keys.keys().cloned().collect()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count_calls(&self, operation: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == operation).count()
    }

    fn authenticate(
        state: &mut State,
        operation: &'static str,
        auth: &WorkingCredentials,
    ) -> Result<(String, bool), ApiError> {
        let invalid = |message: &str| ApiError::Call {
            operation,
            message: message.to_string(),
        };

        let (key_id, secret, role) = match auth.session_token() {
            Some(token) => {
                let session = state
                    .sessions
                    .get(auth.access_key_id())
                    .ok_or_else(|| invalid("InvalidClientTokenId: unknown session"))?;
                if session.token != token || session.secret != auth.secret_access_key() {
                    return Err(invalid("SignatureDoesNotMatch"));
                }
                return state
                    .keys
                    .get(&session.parent_key)
                    .map(|key| (key.user.clone(), session.role))
                    .ok_or_else(|| invalid("InvalidClientTokenId: parent key deleted"));
            }
            None => (auth.access_key_id(), auth.secret_access_key(), false),
        };

        let key = state
            .keys
            .get_mut(key_id)
            .ok_or_else(|| invalid("InvalidClientTokenId: unknown access key"))?;
        if key.pending_failures > 0 {
            key.pending_failures -= 1;
            return Err(invalid("InvalidClientTokenId: key not yet propagated"));
        }
        if key.secret != secret {
            return Err(invalid("SignatureDoesNotMatch"));
        }
        Ok((key.user.clone(), role))
    }

    fn parent_key(state: &State, auth: &WorkingCredentials) -> String {
        match auth.session_token() {
            Some(_) => state.sessions[auth.access_key_id()].parent_key.clone(),
            None => auth.access_key_id().to_string(),
        }
    }

    fn issue_session(
        state: &mut State,
        parent_key: String,
        duration: std::time::Duration,
        role: bool,
        identity: Option<String>,
    ) -> SessionCredentials {
        state.next_id += 1;
        let id = format!("ASIAFAKE{:04}", state.next_id);
        let session = Session {
            parent_key,
            secret: format!("session-secret-{}", state.next_id),
            token: format!("token-{}", state.next_id),
            role,
        };
        state.sessions.insert(id.clone(), session.clone());

        SessionCredentials {
            access_key_id: id,
            secret_access_key: session.secret,
            session_token: session.token,
            expiration: Utc::now() + chrono::Duration::from_std(duration).unwrap(),
            identity,
        }
    }

    /// MFA codes are accepted once, like real TOTP codes
    fn check_mfa(
        state: &mut State,
        operation: &'static str,
        serial: &Option<String>,
        token: &Option<String>,
    ) -> Result<(), ApiError> {
        match (serial, token) {
            (Some(_), Some(token)) => {
                if state.used_mfa_tokens.insert(token.clone()) {
                    Ok(())
                } else {
                    Err(ApiError::Call {
                        operation,
                        message: "AccessDenied: MFA code already used".to_string(),
                    })
                }
            }
            (Some(_), None) | (None, Some(_)) => Err(ApiError::Call {
                operation,
                message: "AccessDenied: MFA serial and token must be given together".to_string(),
            }),
            (None, None) => Ok(()),
        }
    }
}

#[async_trait]
impl IdentityApi for FakeIam {
    async fn get_session_token(
        &self,
        auth: &WorkingCredentials,
        request: &SessionTokenRequest,
    ) -> Result<SessionCredentials, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("GetSessionToken".to_string());
        Self::authenticate(&mut state, "GetSessionToken", auth)?;
        Self::check_mfa(&mut state, "GetSessionToken", &request.mfa_serial, &request.mfa_token)?;

        let parent = Self::parent_key(&state, auth);
        Ok(Self::issue_session(&mut state, parent, request.duration, false, None))
    }

    async fn assume_role(
        &self,
        auth: &WorkingCredentials,
        request: &AssumeRoleRequest,
    ) -> Result<SessionCredentials, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("AssumeRole".to_string());
        Self::authenticate(&mut state, "AssumeRole", auth)?;
        Self::check_mfa(&mut state, "AssumeRole", &request.mfa_serial, &request.mfa_token)?;

        let parent = Self::parent_key(&state, auth);
        let identity = format!(
            "arn:aws:sts::222222222222:assumed-role/Admin/{}",
            request.session_name
        );
        Ok(Self::issue_session(
            &mut state,
            parent,
            request.duration,
            true,
            Some(identity),
        ))
    }

    async fn get_user_name(&self, auth: &WorkingCredentials) -> Result<String, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("GetCallerIdentity".to_string());
        let (user, role) = Self::authenticate(&mut state, "GetCallerIdentity", auth)?;
        if role {
            return Err(ApiError::Call {
                operation: "GetCallerIdentity",
                message: "caller is an assumed role".to_string(),
            });
        }
        Ok(user)
    }

    async fn create_access_key(
        &self,
        auth: &WorkingCredentials,
        user_name: Option<&str>,
    ) -> Result<Credentials, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("CreateAccessKey".to_string());
        let (caller, role) = Self::authenticate(&mut state, "CreateAccessKey", auth)?;

        if state.fail_create {
            return Err(ApiError::Call {
                operation: "CreateAccessKey",
                message: "LimitExceeded: too many access keys".to_string(),
            });
        }
        let user = match (user_name, role) {
            (Some(name), _) => name.to_string(),
            (None, false) => caller,
            (None, true) => {
                return Err(ApiError::Call {
                    operation: "CreateAccessKey",
                    message: "ValidationError: must specify userName when calling with non-User credentials".to_string(),
                });
            }
        };

        state.next_id += 1;
        let id = format!("AKIAEXAMPLENEW{}", state.next_id);
        let secret = format!("new-secret-{}", state.next_id);
        let pending_failures = state.new_key_failures;
        state.keys.insert(
            id.clone(),
            AccessKey {
                user,
                secret: secret.clone(),
                pending_failures,
            },
        );

        Ok(Credentials::new(id, secret))
    }

    async fn delete_access_key(
        &self,
        auth: &WorkingCredentials,
        access_key_id: &str,
        user_name: Option<&str>,
    ) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("DeleteAccessKey".to_string());
        let (_, role) = Self::authenticate(&mut state, "DeleteAccessKey", auth)?;

        if role && user_name.is_none() {
            return Err(ApiError::Call {
                operation: "DeleteAccessKey",
                message: "ValidationError: must specify userName when calling with non-User credentials".to_string(),
            });
        }

        match state.keys.remove(access_key_id) {
            Some(_) => Ok(()),
            None => Err(ApiError::NoSuchEntity {
                operation: "DeleteAccessKey",
                message: format!("The Access Key with id {access_key_id} cannot be found."),
            }),
        }
    }
}

/// A [`MemoryStore`] whose writes to chosen labels fail
#[derive(Debug, Default)]
pub struct FaultyStore {
    inner: MemoryStore,
    failing_writes: Mutex<HashSet<String>>,
}

impl FaultyStore {
    pub fn fail_writes_to(&self, key: &str) {
        self.failing_writes.lock().unwrap().insert(key.to_string());
    }
}

impl SecretStore for FaultyStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        if self.failing_writes.lock().unwrap().contains(key) {
            return Err(StoreError::Backend {
                key: key.to_string(),
                reason: "keychain is locked".to_string(),
            });
        }
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.remove(key)
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        self.inner.keys()
    }
}

pub fn context(store: Arc<dyn SecretStore>, api: Arc<FakeIam>) -> VaultContext {
    VaultContext::new(store, api, prompt::prompt_for(PromptMethod::None))
}

/// Config for rotating `base` with its own long-term key
pub fn base_config() -> ProfileConfig {
    let mut config = ProfileConfig::standalone("base");
    config.no_session = true;
    config
}
