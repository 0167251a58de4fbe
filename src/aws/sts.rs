use anyhow::Context;
use aws_sdk_sts::Client as StsClient;
use aws_sdk_sts::error::DisplayErrorContext;
use aws_smithy_types::DateTime;
use chrono::Utc;
use tracing::{debug, info};

use super::SessionCredentials;
use super::api::{AssumeRoleRequest, SessionTokenRequest};
use crate::error::ApiError;

fn duration_seconds(duration: std::time::Duration) -> i32 {
    i32::try_from(duration.as_secs()).unwrap_or(i32::MAX)
}

fn to_chrono(expiration: &DateTime) -> anyhow::Result<chrono::DateTime<Utc>> {
    chrono::DateTime::from_timestamp(expiration.secs(), expiration.subsec_nanos())
        .context("expiration out of range")
}

fn session_from_sts(
    operation: &'static str,
    sts_creds: Option<&aws_sdk_sts::types::Credentials>,
    identity: Option<String>,
) -> Result<SessionCredentials, ApiError> {
    let sts_creds = sts_creds.ok_or(ApiError::MissingField {
        operation,
        field: "credentials",
    })?;

    let expiration = to_chrono(sts_creds.expiration()).map_err(|e| ApiError::Call {
        operation,
        message: e.to_string(),
    })?;

    Ok(SessionCredentials {
        access_key_id: sts_creds.access_key_id().to_string(),
        secret_access_key: sts_creds.secret_access_key().to_string(),
        session_token: sts_creds.session_token().to_string(),
        expiration,
        identity,
    })
}

/// Get a session token, optionally authenticated with MFA
pub async fn get_session_token(
    client: &StsClient,
    request: &SessionTokenRequest,
) -> Result<SessionCredentials, ApiError> {
    info!("Calling AWS STS GetSessionToken");
    debug!("MFA serial: {:?}", request.mfa_serial);
    debug!("Duration: {} seconds", request.duration.as_secs());

    let response = client
        .get_session_token()
        .duration_seconds(duration_seconds(request.duration))
        .set_serial_number(request.mfa_serial.clone())
        .set_token_code(request.mfa_token.clone())
        .send()
        .await
        .map_err(|e| ApiError::Call {
            operation: "GetSessionToken",
            message: DisplayErrorContext(&e).to_string(),
        })?;

    session_from_sts("GetSessionToken", response.credentials(), None)
}

/// Assume a role, optionally authenticated with MFA
pub async fn assume_role(
    client: &StsClient,
    request: &AssumeRoleRequest,
) -> Result<SessionCredentials, ApiError> {
    info!("Calling AWS STS AssumeRole");
    debug!("Role ARN: {}", request.role_arn);
    debug!("Session name: {}", request.session_name);
    debug!("Duration: {} seconds", request.duration.as_secs());

    let response = client
        .assume_role()
        .role_arn(&request.role_arn)
        .role_session_name(&request.session_name)
        .duration_seconds(duration_seconds(request.duration))
        .set_serial_number(request.mfa_serial.clone())
        .set_token_code(request.mfa_token.clone())
        .send()
        .await
        .map_err(|e| ApiError::Call {
            operation: "AssumeRole",
            message: DisplayErrorContext(&e).to_string(),
        })?;

    let identity = response.assumed_role_user().map(|u| u.arn().to_string());
    session_from_sts("AssumeRole", response.credentials(), identity)
}

/// ARN of the identity the client is authenticated as
pub async fn get_caller_arn(client: &StsClient) -> Result<String, ApiError> {
    let response = client
        .get_caller_identity()
        .send()
        .await
        .map_err(|e| ApiError::Call {
            operation: "GetCallerIdentity",
            message: DisplayErrorContext(&e).to_string(),
        })?;

    response
        .arn()
        .map(String::from)
        .ok_or(ApiError::MissingField {
            operation: "GetCallerIdentity",
            field: "arn",
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_seconds_saturates() {
        assert_eq!(duration_seconds(std::time::Duration::from_secs(900)), 900);
        assert_eq!(
            duration_seconds(std::time::Duration::from_secs(u64::MAX)),
            i32::MAX
        );
    }

    #[test]
    fn test_to_chrono() {
        let dt = DateTime::from_secs(1_700_000_000);
        let converted = to_chrono(&dt).unwrap();
        assert_eq!(converted.timestamp(), 1_700_000_000);
    }
}
