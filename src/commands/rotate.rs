use std::sync::Arc;

use anyhow::{Result, bail};
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    aws::AwsIdentityApi,
    config::{ConfigFile, ProfileConfig},
    constants,
    store::KeyringStore,
    vault::{PromptMethod, Rotator, VaultContext, prompt},
};

#[derive(Debug, Clone, Args)]
pub struct RotateCommand {
    #[arg(value_name = "PROFILE", help = "Name of the profile with credentials to rotate")]
    pub profile: String,

    #[arg(long, help = "Name of the profile to use while rotating the credentials")]
    pub use_profile: Option<String>,

    #[arg(short = 't', long, help = "The MFA token to use")]
    pub mfa_token: Option<String>,

    #[arg(long, help = "The identification number of the MFA device to use")]
    pub mfa_serial: Option<String>,

    #[arg(long, help = "Sign IAM calls with the long-term credentials instead of a session")]
    pub no_session: bool,
}

impl RotateCommand {
    /// Work out which stored credentials to rotate and how to authenticate.
    ///
    /// Refuses when the credentials belong to a different profile than the
    /// one named, pointing at the right one instead.
    pub fn resolve(&self, file: &ConfigFile, prompt: PromptMethod) -> Result<ProfileConfig> {
        let config_profile = self.use_profile.as_deref().unwrap_or(&self.profile);
        let mut config = file.resolve(config_profile)?;

        if let Some(serial) = &self.mfa_serial {
            config.mfa_serial = Some(serial.clone());
        }
        config.mfa_token = self.mfa_token.clone();
        config.mfa_prompt = prompt;

        match &self.use_profile {
            None => {
                if config.is_sourced_elsewhere() {
                    bail!(
                        "Credentials for profile '{}' are sourced from '{}'. Try 'rotavault rotate {}' instead",
                        config.profile_name,
                        config.credentials_name,
                        config.credentials_name
                    );
                }
                // Rotating a profile's own key: no role, and a session only
                // when MFA is needed to manage keys
                config.role_arn = None;
                config.no_session = self.no_session || config.mfa_serial.is_none();
            }
            Some(use_profile) => {
                if self.profile != config.credentials_name {
                    bail!(
                        "Credentials for profile '{}' are sourced from '{}'. Try 'rotavault rotate {}' instead",
                        use_profile,
                        config.credentials_name,
                        config.credentials_name
                    );
                }
                config.no_session = self.no_session;
            }
        }

        debug!("Rotation config: {:?}", config);
        Ok(config)
    }

    pub async fn execute(self, prompt: PromptMethod) -> Result<()> {
        let file = ConfigFile::load()?;
        let config = self.resolve(&file, prompt)?;

        if self.use_profile.is_some() {
            println!(
                "Rotating credentials '{}' using profile '{}' (takes 10-20 seconds)",
                config.credentials_name, config.profile_name
            );
        } else {
            println!(
                "Rotating credentials '{}' (takes 10-20 seconds)",
                config.credentials_name
            );
        }

        let context = VaultContext::new(
            Arc::new(KeyringStore::new(constants::keyring_service())),
            Arc::new(AwsIdentityApi::new(config.region.clone())),
            prompt::prompt_for(config.mfa_prompt),
        );

        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted; rotation stops only if no new key has been created yet");
                on_interrupt.cancel();
            }
        });

        let report = Rotator::new(&context, config)
            .with_cancellation(cancel)
            .rotate()
            .await?;

        if report.resumed {
            println!("Finished an interrupted rotation of '{}'", report.credentials_name);
        }
        println!("Done!");
        Ok(())
    }
}
