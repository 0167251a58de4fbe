use std::sync::Arc;

use clap::ValueEnum;
use dialoguer::{Input, theme::ColorfulTheme};

use crate::error::CredentialError;

/// How to obtain an MFA token code when none was given on the command line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum PromptMethod {
    /// Ask on the terminal
    #[default]
    Terminal,
    /// Never prompt; a missing token is an error
    None,
}

pub trait MfaPrompt: Send + Sync {
    fn mfa_token(&self, mfa_serial: &str) -> Result<String, CredentialError>;
}

pub struct TerminalPrompt;

impl MfaPrompt for TerminalPrompt {
    fn mfa_token(&self, mfa_serial: &str) -> Result<String, CredentialError> {
        Input::<String>::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("Enter token for {mfa_serial}"))
            .validate_with(|input: &String| {
                if input.len() == 6 && input.chars().all(|c| c.is_ascii_digit()) {
                    Ok(())
                } else {
                    Err("MFA token must be 6 digits")
                }
            })
            .interact_text()
            .map_err(|e| CredentialError::Mfa {
                serial: mfa_serial.to_string(),
                reason: e.to_string(),
            })
    }
}

pub struct NoPrompt;

impl MfaPrompt for NoPrompt {
    fn mfa_token(&self, mfa_serial: &str) -> Result<String, CredentialError> {
        Err(CredentialError::Mfa {
            serial: mfa_serial.to_string(),
            reason: "no token given and prompting is disabled (use --mfa-token)".to_string(),
        })
    }
}

pub fn prompt_for(method: PromptMethod) -> Arc<dyn MfaPrompt> {
    match method {
        PromptMethod::Terminal => Arc::new(TerminalPrompt),
        PromptMethod::None => Arc::new(NoPrompt),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_prompt_fails_with_serial() {
        let prompt = prompt_for(PromptMethod::None);
        let err = prompt
            .mfa_token("arn:aws:iam::111111111111:mfa/alice")
            .unwrap_err();
        assert!(err.to_string().contains("mfa/alice"));
        assert!(err.to_string().contains("--mfa-token"));
    }

    #[test]
    fn test_default_method_is_terminal() {
        assert_eq!(PromptMethod::default(), PromptMethod::Terminal);
    }
}
