use std::{env, path::PathBuf, time::Duration};

use dirs;

/// Default keyring service name that namespaces every stored secret
pub const DEFAULT_KEYRING_SERVICE: &str = "rotavault";

/// Environment variable overriding the keyring service name
pub const KEYRING_SERVICE_ENV: &str = "ROTAVAULT_KEYRING_SERVICE";

/// AWS configuration directory name
pub const AWS_CONFIG_DIR_NAME: &str = ".aws";

/// AWS configuration file name
pub const AWS_CONFIG_FILE_NAME: &str = "config";

/// Default AWS region for STS and IAM calls when no region is configured
pub const DEFAULT_AWS_REGION: &str = "us-east-1";

/// Default lifetime of a GetSessionToken session
pub const DEFAULT_SESSION_DURATION: Duration = Duration::from_secs(4 * 60 * 60);

/// Default lifetime of an AssumeRole session
pub const DEFAULT_ASSUME_ROLE_DURATION: Duration = Duration::from_secs(15 * 60);

/// Sessions closer than this to expiry are treated as expired
pub const SESSION_EXPIRY_WINDOW: Duration = Duration::from_secs(60);

/// How long to keep retrying deletion of the old access key
pub const KEY_PROPAGATION_MAX_WAIT: Duration = Duration::from_secs(30);

/// Fixed delay between old access key deletion attempts
pub const KEY_PROPAGATION_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Get the keyring service name
/// Respects ROTAVAULT_KEYRING_SERVICE environment variable if set
pub fn keyring_service() -> String {
    env::var(KEYRING_SERVICE_ENV)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_KEYRING_SERVICE.to_string())
}

/// Get the AWS config file path
/// Respects AWS_CONFIG_FILE environment variable if set
pub fn get_aws_config_path() -> Option<PathBuf> {
    if let Ok(path) = env::var("AWS_CONFIG_FILE") {
        return Some(PathBuf::from(path));
    }

    dirs::home_dir().map(|home| home.join(AWS_CONFIG_DIR_NAME).join(AWS_CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_get_aws_config_path_with_env() {
        let original = env::var("AWS_CONFIG_FILE").ok();

        unsafe {
            env::set_var("AWS_CONFIG_FILE", "/custom/aws/config");
        }
        let path = get_aws_config_path();
        assert_eq!(path, Some(PathBuf::from("/custom/aws/config")));

        unsafe {
            match original {
                Some(val) => env::set_var("AWS_CONFIG_FILE", val),
                None => env::remove_var("AWS_CONFIG_FILE"),
            }
        }
    }

    #[test]
    #[serial]
    fn test_get_aws_config_path_default() {
        let original = env::var("AWS_CONFIG_FILE").ok();

        unsafe {
            env::remove_var("AWS_CONFIG_FILE");
        }
        let path = get_aws_config_path();

        if let Some(p) = path {
            let path_str = p.to_string_lossy();
            assert!(path_str.contains(AWS_CONFIG_DIR_NAME));
            assert!(path_str.contains(AWS_CONFIG_FILE_NAME));
        }

        unsafe {
            if let Some(val) = original {
                env::set_var("AWS_CONFIG_FILE", val);
            }
        }
    }

    #[test]
    #[serial]
    fn test_keyring_service_default_and_override() {
        let original = env::var(KEYRING_SERVICE_ENV).ok();

        unsafe {
            env::remove_var(KEYRING_SERVICE_ENV);
        }
        assert_eq!(keyring_service(), DEFAULT_KEYRING_SERVICE);

        unsafe {
            env::set_var(KEYRING_SERVICE_ENV, "rotavault-test");
        }
        assert_eq!(keyring_service(), "rotavault-test");

        unsafe {
            env::set_var(KEYRING_SERVICE_ENV, "");
        }
        assert_eq!(keyring_service(), DEFAULT_KEYRING_SERVICE);

        unsafe {
            match original {
                Some(val) => env::set_var(KEYRING_SERVICE_ENV, val),
                None => env::remove_var(KEYRING_SERVICE_ENV),
            }
        }
    }
}
