use std::time::Duration;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_iam::Client as IamClient;
use aws_sdk_sts::Client as StsClient;
use aws_sdk_sts::config::Credentials as SdkCredentials;

use super::{Credentials, SessionCredentials, WorkingCredentials, iam, sts};
use crate::error::ApiError;

/// Parameters for STS GetSessionToken
#[derive(Debug, Clone, Default)]
pub struct SessionTokenRequest {
    pub duration: Duration,
    pub mfa_serial: Option<String>,
    pub mfa_token: Option<String>,
}

/// Parameters for STS AssumeRole
#[derive(Debug, Clone, Default)]
pub struct AssumeRoleRequest {
    pub role_arn: String,
    pub session_name: String,
    pub duration: Duration,
    pub mfa_serial: Option<String>,
    pub mfa_token: Option<String>,
}

/// The subset of STS and IAM the vault needs.
///
/// Every call is authenticated with the credentials passed in, so one instance
/// can be shared while the underlying access key changes mid-rotation.
#[async_trait]
pub trait IdentityApi: Send + Sync {
    async fn get_session_token(
        &self,
        auth: &WorkingCredentials,
        request: &SessionTokenRequest,
    ) -> Result<SessionCredentials, ApiError>;

    async fn assume_role(
        &self,
        auth: &WorkingCredentials,
        request: &AssumeRoleRequest,
    ) -> Result<SessionCredentials, ApiError>;

    /// Name of the IAM user that owns `auth`.
    async fn get_user_name(&self, auth: &WorkingCredentials) -> Result<String, ApiError>;

    /// Create an access key for `user_name`, or for the caller when `None`.
    async fn create_access_key(
        &self,
        auth: &WorkingCredentials,
        user_name: Option<&str>,
    ) -> Result<Credentials, ApiError>;

    async fn delete_access_key(
        &self,
        auth: &WorkingCredentials,
        access_key_id: &str,
        user_name: Option<&str>,
    ) -> Result<(), ApiError>;
}

/// [`IdentityApi`] backed by the AWS SDK
#[derive(Debug, Clone)]
pub struct AwsIdentityApi {
    region: String,
}

impl AwsIdentityApi {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
        }
    }

    fn sdk_credentials(auth: &WorkingCredentials) -> SdkCredentials {
        let expiry = auth.expiration().map(std::time::SystemTime::from);
        SdkCredentials::new(
            auth.access_key_id(),
            auth.secret_access_key(),
            auth.session_token().map(String::from),
            expiry,
            "rotavault",
        )
    }

    fn sts_client(&self, auth: &WorkingCredentials) -> StsClient {
        let config = aws_sdk_sts::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(self.region.clone()))
            .credentials_provider(Self::sdk_credentials(auth))
            .build();
        StsClient::from_conf(config)
    }

    fn iam_client(&self, auth: &WorkingCredentials) -> IamClient {
        let config = aws_sdk_iam::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(self.region.clone()))
            .credentials_provider(Self::sdk_credentials(auth))
            .build();
        IamClient::from_conf(config)
    }
}

#[async_trait]
impl IdentityApi for AwsIdentityApi {
    async fn get_session_token(
        &self,
        auth: &WorkingCredentials,
        request: &SessionTokenRequest,
    ) -> Result<SessionCredentials, ApiError> {
        sts::get_session_token(&self.sts_client(auth), request).await
    }

    async fn assume_role(
        &self,
        auth: &WorkingCredentials,
        request: &AssumeRoleRequest,
    ) -> Result<SessionCredentials, ApiError> {
        sts::assume_role(&self.sts_client(auth), request).await
    }

    async fn get_user_name(&self, auth: &WorkingCredentials) -> Result<String, ApiError> {
        let arn = sts::get_caller_arn(&self.sts_client(auth)).await?;
        user_name_from_arn(&arn).ok_or(ApiError::Call {
            operation: "GetCallerIdentity",
            message: format!("caller '{arn}' is not an IAM user"),
        })
    }

    async fn create_access_key(
        &self,
        auth: &WorkingCredentials,
        user_name: Option<&str>,
    ) -> Result<Credentials, ApiError> {
        iam::create_access_key(&self.iam_client(auth), user_name).await
    }

    async fn delete_access_key(
        &self,
        auth: &WorkingCredentials,
        access_key_id: &str,
        user_name: Option<&str>,
    ) -> Result<(), ApiError> {
        iam::delete_access_key(&self.iam_client(auth), access_key_id, user_name).await
    }
}

/// Extract the user name from an IAM user ARN
/// (arn:aws:iam::123456789012:user/path/UserName)
pub fn user_name_from_arn(arn: &str) -> Option<String> {
    let resource = arn.splitn(6, ':').nth(5)?;
    let path = resource.strip_prefix("user/")?;
    path.rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .map(String::from)
}
