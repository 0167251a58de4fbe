//! Credential providers, the session cache and the rotation engine.
//!
//! Everything lives in one [`SecretStore`] namespace:
//!
//! | label                               | value                  |
//! |-------------------------------------|------------------------|
//! | `<profile>`                         | long-term credentials  |
//! | `session,<b64 profile>,<b64 mfa>`   | cached session         |
//! | `rotation,<b64 profile>`            | rotation checkpoint    |

use std::sync::Arc;

use crate::aws::IdentityApi;
use crate::store::SecretStore;

pub mod checkpoint;
pub mod master;
pub mod prompt;
pub mod retry;
pub mod rotator;
pub mod session;
pub mod sessions;

pub use checkpoint::{CheckpointStore, RotationCheckpoint};
pub use master::MasterCredentialsProvider;
pub use prompt::{MfaPrompt, PromptMethod};
pub use retry::{RetryPolicy, retry};
pub use rotator::{RotationReport, Rotator};
pub use session::SessionCredentialsProvider;
pub use sessions::SessionCache;

/// Collaborators shared by the providers and the rotator
#[derive(Clone)]
pub struct VaultContext {
    pub store: Arc<dyn SecretStore>,
    pub api: Arc<dyn IdentityApi>,
    pub prompt: Arc<dyn MfaPrompt>,
}

impl VaultContext {
    pub fn new(
        store: Arc<dyn SecretStore>,
        api: Arc<dyn IdentityApi>,
        prompt: Arc<dyn MfaPrompt>,
    ) -> Self {
        Self { store, api, prompt }
    }
}
