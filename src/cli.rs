use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};

use crate::commands::{CompletionsCommand, RotateCommand, StoreCommand};
use crate::vault::PromptMethod;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "rotavault",
    version,
    about = "Store AWS access keys in the OS keyring and rotate them",
    long_about = None
)]
pub struct Cli {
    #[arg(short = 'v', long, global = true, action = ArgAction::Count, help = "Increase verbosity (-v debug, -vv trace)")]
    pub verbose: u8,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = PromptMethod::Terminal,
        help = "How to ask for MFA tokens"
    )]
    pub prompt: PromptMethod,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    #[command(about = "Rotate the access key stored for a profile")]
    Rotate(RotateCommand),
    #[command(about = "Store an access key for a profile via interactive prompts")]
    Store(StoreCommand),
    #[command(about = "Generate shell completion scripts for rotavault")]
    Completions(CompletionsCommand),
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Rotate(cmd) => cmd.execute(self.prompt).await,
            Commands::Store(cmd) => cmd.execute(),
            Commands::Completions(cmd) => {
                cmd.execute();
                Ok(())
            }
        }
    }
}
