//! Error types for credential storage, the identity API and rotation.

use std::fmt;

use thiserror::Error;

/// Errors raised by a [`crate::store::SecretStore`] backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend (OS keyring, file, ...) rejected the operation.
    #[error("secret store error for '{key}': {reason}")]
    Backend {
        /// Label of the secret being accessed.
        key: String,
        /// Backend-supplied reason.
        reason: String,
    },

    /// A stored value could not be decoded or encoded.
    #[error("malformed secret '{key}': {source}")]
    Serialization {
        /// Label of the secret being accessed.
        key: String,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },
}

/// Errors raised by the remote identity API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The requested entity (access key, user) does not exist.
    #[error("{operation}: no such entity: {message}")]
    NoSuchEntity {
        operation: &'static str,
        message: String,
    },

    /// The call failed for any other reason (auth, throttling, network).
    #[error("{operation} failed: {message}")]
    Call {
        operation: &'static str,
        message: String,
    },

    /// The call succeeded but the response lacked a required field.
    #[error("{operation} returned no {field}")]
    MissingField {
        operation: &'static str,
        field: &'static str,
    },
}

/// Errors raised by the credential providers and the session cache.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("no credentials stored for profile '{0}'. Add them with `rotavault store --profile {0}`")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("MFA token required for device {serial}: {reason}")]
    Mfa { serial: String, reason: String },

    #[error("cannot determine IAM user name from caller ARN '{0}'")]
    UnknownUser(String),
}

/// Failure of [`crate::vault::retry::retry`].
#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("after {attempts} attempts, last error: {last}")]
    Exhausted { attempts: u32, last: E },

    #[error("cancelled after {attempts} attempts, last error: {last}")]
    Cancelled { attempts: u32, last: E },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } | Self::Cancelled { attempts, .. } => *attempts,
        }
    }

    pub fn last_error(&self) -> &E {
        match self {
            Self::Exhausted { last, .. } | Self::Cancelled { last, .. } => last,
        }
    }
}

/// The protocol step at which a rotation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationStage {
    Snapshot,
    DeriveSession,
    Mint,
    Persist,
    Invalidate,
    Retire,
}

impl fmt::Display for RotationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Snapshot => "snapshot",
            Self::DeriveSession => "derive-session",
            Self::Mint => "mint",
            Self::Persist => "persist",
            Self::Invalidate => "invalidate",
            Self::Retire => "retire",
        };
        f.write_str(name)
    }
}

/// Errors that can end a credential rotation.
///
/// Variants before [`RotationError::Orphaned`] guarantee nothing changed,
/// locally or remotely. `Orphaned` means a new key exists remotely but was not
/// recorded. `OldKeyNotDeleted` means the new key is stored and active and
/// only the cleanup of the old key is outstanding.
#[derive(Debug, Error)]
pub enum RotationError {
    #[error("failed to retrieve credentials '{name}': {source}")]
    Retrieve {
        name: String,
        #[source]
        source: CredentialError,
    },

    #[error("failed to derive a working session for '{name}': {source}")]
    Derive {
        name: String,
        #[source]
        source: CredentialError,
    },

    #[error("failed to create a new access key: {source}")]
    Mint {
        #[source]
        source: ApiError,
    },

    #[error(
        "new access key {access_key_id} was created but could not be stored: {source}. \
         The key exists in IAM; store it manually or delete it"
    )]
    Orphaned {
        access_key_id: String,
        #[source]
        source: StoreError,
    },

    #[error(
        "can't delete old access key {access_key_id}: {source}. \
         The new key is stored and active; the old key may need manual deletion"
    )]
    OldKeyNotDeleted {
        access_key_id: String,
        #[source]
        source: RetryError<CredentialError>,
    },

    #[error("rotation cancelled before any changes were made")]
    Cancelled,
}

impl RotationError {
    /// The protocol step this error is attributed to.
    pub fn stage(&self) -> RotationStage {
        match self {
            Self::Retrieve { .. } | Self::Cancelled => RotationStage::Snapshot,
            Self::Derive { .. } => RotationStage::DeriveSession,
            Self::Mint { .. } => RotationStage::Mint,
            Self::Orphaned { .. } => RotationStage::Persist,
            Self::OldKeyNotDeleted { .. } => RotationStage::Retire,
        }
    }

    /// Whether the newly minted key is already the stored source of truth.
    pub fn new_credential_active(&self) -> bool {
        matches!(self, Self::OldKeyNotDeleted { .. })
    }
}
