use aws_sdk_iam::Client as IamClient;
use aws_sdk_iam::error::DisplayErrorContext;
use tracing::info;

use super::{Credentials, mask_access_key};
use crate::error::ApiError;

/// Create a new access key for the given user (or the caller)
pub async fn create_access_key(
    client: &IamClient,
    user_name: Option<&str>,
) -> Result<Credentials, ApiError> {
    info!("Calling AWS IAM CreateAccessKey");

    let response = client
        .create_access_key()
        .set_user_name(user_name.map(String::from))
        .send()
        .await
        .map_err(|e| ApiError::Call {
            operation: "CreateAccessKey",
            message: DisplayErrorContext(&e).to_string(),
        })?;

    let access_key = response.access_key().ok_or(ApiError::MissingField {
        operation: "CreateAccessKey",
        field: "access key",
    })?;

    Ok(Credentials::new(
        access_key.access_key_id(),
        access_key.secret_access_key(),
    ))
}

/// Delete an access key belonging to the given user (or the caller)
pub async fn delete_access_key(
    client: &IamClient,
    access_key_id: &str,
    user_name: Option<&str>,
) -> Result<(), ApiError> {
    info!(
        "Calling AWS IAM DeleteAccessKey for {}",
        mask_access_key(access_key_id)
    );

    client
        .delete_access_key()
        .access_key_id(access_key_id)
        .set_user_name(user_name.map(String::from))
        .send()
        .await
        .map_err(|e| {
            let message = DisplayErrorContext(&e).to_string();
            let not_found = e
                .as_service_error()
                .is_some_and(|se| se.is_no_such_entity_exception());
            if not_found {
                ApiError::NoSuchEntity {
                    operation: "DeleteAccessKey",
                    message,
                }
            } else {
                ApiError::Call {
                    operation: "DeleteAccessKey",
                    message,
                }
            }
        })?;

    Ok(())
}
