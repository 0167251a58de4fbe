use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

pub mod api;
pub mod iam;
pub mod sts;

pub use api::{AssumeRoleRequest, AwsIdentityApi, IdentityApi, SessionTokenRequest};

/// Long-term IAM user access key
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl Credentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &mask_access_key(&self.access_key_id))
            .field("secret_access_key", &"[REDACTED]")
            .finish()
    }
}

/// AWS temporary credentials structure
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct SessionCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    #[zeroize(skip)]
    pub expiration: DateTime<Utc>,
    /// ARN of the assumed role user, when the session came from AssumeRole
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
}

impl SessionCredentials {
    /// True once `now + window` has reached the expiration time
    pub fn is_expired(&self, now: DateTime<Utc>, window: std::time::Duration) -> bool {
        let window = chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::zero());
        now + window >= self.expiration
    }
}

impl fmt::Debug for SessionCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCredentials")
            .field("access_key_id", &mask_access_key(&self.access_key_id))
            .field("secret_access_key", &"[REDACTED]")
            .field("session_token", &"[REDACTED]")
            .field("expiration", &self.expiration)
            .field("identity", &self.identity)
            .finish()
    }
}

/// Credentials used to sign an API call: either the long-term key itself or a
/// session derived from it
#[derive(Debug, Clone)]
pub enum WorkingCredentials {
    LongTerm(Credentials),
    Session(SessionCredentials),
}

impl WorkingCredentials {
    pub fn access_key_id(&self) -> &str {
        match self {
            Self::LongTerm(c) => &c.access_key_id,
            Self::Session(c) => &c.access_key_id,
        }
    }

    pub fn secret_access_key(&self) -> &str {
        match self {
            Self::LongTerm(c) => &c.secret_access_key,
            Self::Session(c) => &c.secret_access_key,
        }
    }

    pub fn session_token(&self) -> Option<&str> {
        match self {
            Self::LongTerm(_) => None,
            Self::Session(c) => Some(&c.session_token),
        }
    }

    pub fn expiration(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::LongTerm(_) => None,
            Self::Session(c) => Some(c.expiration),
        }
    }
}

/// Mask all but the last four characters of an access key id for logging
pub fn mask_access_key(access_key_id: &str) -> String {
    let chars: Vec<char> = access_key_id.chars().collect();
    let visible = chars.len().min(4);
    let tail: String = chars[chars.len() - visible..].iter().collect();
    format!("****************{tail}")
}
