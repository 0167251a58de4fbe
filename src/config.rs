use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use ini::{Ini, Properties};
use tracing::debug;

use crate::constants::{
    self, DEFAULT_ASSUME_ROLE_DURATION, DEFAULT_AWS_REGION, DEFAULT_SESSION_DURATION,
};
use crate::vault::prompt::PromptMethod;

/// Resolved settings for one profile, including where its long-term
/// credentials come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileConfig {
    pub profile_name: String,
    /// Profile whose stored long-term credentials back this profile
    pub credentials_name: String,
    pub role_arn: Option<String>,
    pub mfa_serial: Option<String>,
    pub mfa_token: Option<String>,
    pub mfa_prompt: PromptMethod,
    pub region: String,
    pub no_session: bool,
    pub session_duration: Duration,
    pub assume_role_duration: Duration,
}

impl ProfileConfig {
    /// A profile with no config entry, sourcing its own credentials
    pub fn standalone(profile_name: &str) -> Self {
        Self {
            profile_name: profile_name.to_string(),
            credentials_name: profile_name.to_string(),
            role_arn: None,
            mfa_serial: None,
            mfa_token: None,
            mfa_prompt: PromptMethod::default(),
            region: DEFAULT_AWS_REGION.to_string(),
            no_session: false,
            session_duration: DEFAULT_SESSION_DURATION,
            assume_role_duration: DEFAULT_ASSUME_ROLE_DURATION,
        }
    }

    /// Whether credentials come from a different profile's stored key
    pub fn is_sourced_elsewhere(&self) -> bool {
        self.profile_name != self.credentials_name
    }
}

/// The AWS shared config file
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    ini: Ini,
}

impl ConfigFile {
    /// Load from `AWS_CONFIG_FILE` or `~/.aws/config`; a missing file is empty
    pub fn load() -> Result<Self> {
        let path = constants::get_aws_config_path().context("Failed to determine AWS config path")?;
        Self::load_from_path(&path)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("AWS config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path)
            .with_context(|| format!("Failed to load AWS config file: {}", path.display()))?;
        Ok(Self { ini })
    }

    pub fn parse(content: &str) -> Result<Self> {
        let ini = Ini::load_from_str(content).context("Failed to parse AWS config")?;
        Ok(Self { ini })
    }

    fn section(&self, profile: &str) -> Option<&Properties> {
        let section_name = if profile == "default" {
            profile.to_string()
        } else {
            format!("profile {profile}")
        };

        self.ini
            .section(Some(section_name.as_str()))
            .or_else(|| self.ini.section(Some(profile)))
    }

    /// Names of all profiles defined in the file
    pub fn profile_names(&self) -> Vec<String> {
        self.ini
            .sections()
            .flatten()
            .map(|name| name.strip_prefix("profile ").unwrap_or(name).to_string())
            .collect()
    }

    /// Resolve a profile, following `source_profile` to the profile that holds
    /// the long-term credentials
    pub fn resolve(&self, profile: &str) -> Result<ProfileConfig> {
        let mut config = ProfileConfig::standalone(profile);

        let Some(section) = self.section(profile) else {
            debug!("Profile '{}' not in config file, sourcing its own credentials", profile);
            return Ok(config);
        };

        config.role_arn = non_empty(section.get("role_arn"));
        config.mfa_serial = non_empty(section.get("mfa_serial"));
        let mut region = non_empty(section.get("region"));

        if let Some(seconds) = section.get("duration_seconds") {
            let seconds: u64 = seconds
                .trim()
                .parse()
                .with_context(|| format!("Invalid duration_seconds '{seconds}' in profile '{profile}'"))?;
            config.assume_role_duration = Duration::from_secs(seconds);
        }

        let mut visited = HashSet::from([profile.to_string()]);
        let mut current = section;
        while let Some(source) = non_empty(current.get("source_profile")) {
            if source == config.credentials_name {
                break;
            }
            if !visited.insert(source.clone()) {
                bail!("Profile '{profile}' has a source_profile cycle through '{source}'");
            }

            config.credentials_name = source.clone();
            let Some(source_section) = self.section(&source) else {
                break;
            };

            if config.mfa_serial.is_none() {
                config.mfa_serial = non_empty(source_section.get("mfa_serial"));
            }
            if region.is_none() {
                region = non_empty(source_section.get("region"));
            }
            current = source_section;
        }

        if let Some(region) = region {
            config.region = region;
        }

        debug!(
            "Resolved profile '{}' with credentials from '{}'",
            config.profile_name, config.credentials_name
        );
        Ok(config)
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}
