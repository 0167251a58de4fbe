//! Zero-downtime rotation of a stored long-term access key.
//!
//! The protocol runs as a chain of typed states:
//!
//! `Snapshotted -> SessionDerived -> Minted -> Persisted -> Invalidated -> RotationReport`
//!
//! Each transition is a method consuming the previous state, so a failure is
//! always attributable to one boundary. Nothing is mutated before
//! [`Rotator::persist`]; from that point on the stored credential is the new
//! key and the rotator no longer stops on cancellation.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::VaultContext;
use super::checkpoint::{CheckpointStore, RotationCheckpoint};
use super::master::MasterCredentialsProvider;
use super::retry::{RetryPolicy, retry};
use super::session::SessionCredentialsProvider;
use super::sessions::SessionCache;
use crate::aws::{Credentials, IdentityApi, WorkingCredentials, mask_access_key};
use crate::config::ProfileConfig;
use crate::error::{ApiError, CredentialError, RotationError, RotationStage};

/// The current long-term credential, read before anything changes
#[derive(Debug)]
pub struct Snapshotted {
    pub old: Credentials,
}

/// A working session derived from the old credential
#[derive(Debug)]
pub struct SessionDerived {
    pub old: Credentials,
    pub working: WorkingCredentials,
    /// IAM user to target explicitly; set when working through a role
    pub user_name: Option<String>,
}

/// A new access key exists in IAM but is not stored yet
#[derive(Debug)]
pub struct Minted {
    pub old_access_key_id: String,
    pub user_name: Option<String>,
    pub new: Credentials,
}

/// The new key is the stored long-term credential
#[derive(Debug, Clone)]
pub struct Persisted {
    pub old_access_key_id: String,
    pub new_access_key_id: String,
    pub user_name: Option<String>,
    /// Reached by resuming an interrupted rotation rather than minting
    pub resumed: bool,
}

/// Sessions derived from the old key are gone
#[derive(Debug, Clone)]
pub struct Invalidated {
    pub persisted: Persisted,
    pub sessions_deleted: usize,
}

/// Outcome of a completed rotation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationReport {
    pub credentials_name: String,
    pub old_access_key_id: String,
    pub new_access_key_id: String,
    pub sessions_deleted: usize,
    pub resumed: bool,
}

pub struct Rotator {
    config: ProfileConfig,
    api: Arc<dyn IdentityApi>,
    master: MasterCredentialsProvider,
    working: SessionCredentialsProvider,
    sessions: SessionCache,
    checkpoints: CheckpointStore,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl Rotator {
    /// Build a rotator for `config.credentials_name`. Callers must not run two
    /// rotators for the same credentials at once.
    pub fn new(context: &VaultContext, config: ProfileConfig) -> Self {
        let master =
            MasterCredentialsProvider::new(context.store.clone(), config.credentials_name.clone());
        let sessions = SessionCache::new(context.store.clone());
        let working = SessionCredentialsProvider::new(
            master.clone(),
            sessions.clone(),
            context.api.clone(),
            context.prompt.clone(),
            config.clone(),
        );

        Self {
            api: context.api.clone(),
            checkpoints: CheckpointStore::new(context.store.clone()),
            master,
            working,
            sessions,
            config,
            policy: RetryPolicy::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn credentials_name(&self) -> &str {
        &self.config.credentials_name
    }

    /// Run the whole protocol, resuming an interrupted rotation if one was
    /// recorded for these credentials
    pub async fn rotate(&self) -> Result<RotationReport, RotationError> {
        if let Some(persisted) = self.resume_point()? {
            let invalidated = self.invalidate(persisted);
            return self.retire(invalidated).await;
        }

        let snapshot = self.snapshot()?;
        self.check_cancelled()?;
        let derived = self.derive_session(snapshot).await?;
        self.check_cancelled()?;
        let minted = self.mint(derived).await?;
        let persisted = self.persist(minted)?;
        let invalidated = self.invalidate(persisted);
        self.retire(invalidated).await
    }

    fn check_cancelled(&self) -> Result<(), RotationError> {
        if self.cancel.is_cancelled() {
            info!("Rotation of '{}' cancelled, nothing changed", self.credentials_name());
            return Err(RotationError::Cancelled);
        }
        Ok(())
    }

    /// A recorded rotation whose new key is still the stored credential
    fn resume_point(&self) -> Result<Option<Persisted>, RotationError> {
        let checkpoint = match self.checkpoints.load(self.credentials_name()) {
            Ok(Some(checkpoint)) => checkpoint,
            Ok(None) => return Ok(None),
            Err(e) => {
                warn!("Ignoring unreadable rotation checkpoint: {}", e);
                return Ok(None);
            }
        };

        let current = self.master.retrieve().map_err(|source| RotationError::Retrieve {
            name: self.credentials_name().to_string(),
            source,
        })?;

        if current.access_key_id != checkpoint.new_access_key_id {
            warn!(
                "Discarding rotation checkpoint from {}: stored key {} is not the recorded new key {}",
                checkpoint.created_at,
                mask_access_key(&current.access_key_id),
                mask_access_key(&checkpoint.new_access_key_id)
            );
            self.clear_checkpoint();
            return Ok(None);
        }

        info!(
            "Resuming rotation started at {}: old access key {} still to be deleted",
            checkpoint.created_at,
            mask_access_key(&checkpoint.old_access_key_id)
        );
        Ok(Some(Persisted {
            old_access_key_id: checkpoint.old_access_key_id,
            new_access_key_id: checkpoint.new_access_key_id,
            user_name: checkpoint.user_name,
            resumed: true,
        }))
    }

    pub fn snapshot(&self) -> Result<Snapshotted, RotationError> {
        let old = self.master.retrieve().map_err(|source| RotationError::Retrieve {
            name: self.credentials_name().to_string(),
            source,
        })?;
        info!("Found old access key {}", mask_access_key(&old.access_key_id));
        Ok(Snapshotted { old })
    }

    pub async fn derive_session(
        &self,
        snapshot: Snapshotted,
    ) -> Result<SessionDerived, RotationError> {
        let derive_error = |source: CredentialError| RotationError::Derive {
            name: self.credentials_name().to_string(),
            source,
        };

        let working = self.working.retrieve().await.map_err(derive_error)?;

        // Key management calls made through a role session must name the user
        let user_name = match self.config.role_arn {
            Some(_) => {
                let owner = WorkingCredentials::LongTerm(snapshot.old.clone());
                let name = self
                    .api
                    .get_user_name(&owner)
                    .await
                    .map_err(|e| derive_error(e.into()))?;
                info!("Found IAM username '{}'", name);
                Some(name)
            }
            None => None,
        };

        Ok(SessionDerived {
            old: snapshot.old,
            working,
            user_name,
        })
    }

    pub async fn mint(&self, derived: SessionDerived) -> Result<Minted, RotationError> {
        info!("Using old credentials to create a new access key");

        let new = self
            .api
            .create_access_key(&derived.working, derived.user_name.as_deref())
            .await
            .map_err(|source| RotationError::Mint { source })?;
        info!("Created new access key {}", mask_access_key(&new.access_key_id));

        Ok(Minted {
            old_access_key_id: derived.old.access_key_id.clone(),
            user_name: derived.user_name,
            new,
        })
    }

    /// Store the new key. Past this point at least one valid key is always
    /// stored, so the remaining steps never abort.
    pub fn persist(&self, minted: Minted) -> Result<Persisted, RotationError> {
        let checkpoint = RotationCheckpoint {
            credentials_name: self.credentials_name().to_string(),
            old_access_key_id: minted.old_access_key_id.clone(),
            new_access_key_id: minted.new.access_key_id.clone(),
            user_name: minted.user_name.clone(),
            created_at: Utc::now(),
        };
        if let Err(e) = self.checkpoints.save(&checkpoint) {
            warn!("Failed to record rotation checkpoint, an interrupted rotation will not resume: {}", e);
        }

        if let Err(source) = self.master.store(&minted.new) {
            self.clear_checkpoint();
            return Err(RotationError::Orphaned {
                access_key_id: minted.new.access_key_id.clone(),
                source,
            });
        }

        Ok(Persisted {
            old_access_key_id: minted.old_access_key_id,
            new_access_key_id: minted.new.access_key_id.clone(),
            user_name: minted.user_name,
            resumed: false,
        })
    }

    /// Drop every session derived from the old key, cached or in memory.
    /// Failures only warn: the new key is already stored.
    pub fn invalidate(&self, persisted: Persisted) -> Invalidated {
        let sessions_deleted = match self.sessions.delete_all(self.credentials_name()) {
            Ok(n) => n,
            Err(e) => {
                warn!(stage = %RotationStage::Invalidate, "Failed to delete cached sessions: {}", e);
                0
            }
        };
        if sessions_deleted > 0 {
            info!("Deleted {} existing sessions.", sessions_deleted);
        }

        self.working.force_refresh();

        Invalidated {
            persisted,
            sessions_deleted,
        }
    }

    /// Delete the old key, signed with the stored new key itself, retrying
    /// while it propagates. MFA codes are single use, so no session is
    /// derived; with a role, `user_name` names the key owner.
    pub async fn retire(&self, invalidated: Invalidated) -> Result<RotationReport, RotationError> {
        let persisted = &invalidated.persisted;
        let old_access_key_id = persisted.old_access_key_id.as_str();
        let user_name = persisted.user_name.as_deref();
        let master = &self.master;
        let api = &self.api;

        info!("Using new credentials to delete the old access key");
        info!("Waiting for new IAM credentials to propagate (takes up to 10 seconds)");

        let result = retry(&self.policy, &self.cancel, || async move {
            let auth = WorkingCredentials::LongTerm(master.retrieve()?);
            match api.delete_access_key(&auth, old_access_key_id, user_name).await {
                Ok(()) => Ok::<(), CredentialError>(()),
                Err(ApiError::NoSuchEntity { .. }) => {
                    info!(
                        "Old access key {} was already deleted",
                        mask_access_key(old_access_key_id)
                    );
                    Ok(())
                }
                Err(e) => Err(CredentialError::from(e)),
            }
        })
        .await;

        if let Err(source) = result {
            return Err(RotationError::OldKeyNotDeleted {
                access_key_id: old_access_key_id.to_string(),
                source,
            });
        }

        self.clear_checkpoint();
        info!("Rotated credentials '{}' in vault", self.credentials_name());

        Ok(RotationReport {
            credentials_name: self.credentials_name().to_string(),
            old_access_key_id: persisted.old_access_key_id.clone(),
            new_access_key_id: persisted.new_access_key_id.clone(),
            sessions_deleted: invalidated.sessions_deleted,
            resumed: persisted.resumed,
        })
    }

    fn clear_checkpoint(&self) {
        if let Err(e) = self.checkpoints.clear(self.credentials_name()) {
            warn!("Failed to clear rotation checkpoint: {}", e);
        }
    }
}
