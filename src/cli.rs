use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "textline", about = "Conversation sync engine for a hosted chat backend")]
pub struct Cli {
    /// Path to config file (default: ./config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Tail the conversation list, or one conversation's transcript
    Run {
        /// Conversation to open; omit to tail the conversation list
        #[arg(long)]
        conversation: Option<String>,
    },
    /// Send one message and wait for remote confirmation
    Send {
        #[arg(long)]
        conversation: String,

        /// Recipient phone number for the SMS dispatch
        #[arg(long)]
        to: Option<String>,

        /// Message text
        text: String,
    },
}

impl Cli {
    pub fn command_or_default(&self) -> Command {
        self.command
            .clone()
            .unwrap_or(Command::Run { conversation: None })
    }
}
