//! Argument definitions for the extension administration commands.

use clap::{Parser, Subcommand};

/// Administration commands for a host's extension deployment.
#[derive(Parser, Debug)]
#[command(name = "trellis", disable_help_subcommand = true)]
pub struct Cli {
    /// The administration command to run.
    #[command(subcommand)]
    pub command: CliCommand,
}

/// Extension administration commands.
#[derive(Subcommand, Debug, Clone)]
pub enum CliCommand {
    /// Installs extension static media into the shared media root.
    InstallMedia {
        /// Restricts installation to one extension id; all enabled
        /// extensions otherwise.
        #[arg(long)]
        extension_id: Option<String>,
        /// Re-copies media even when the installed version is current.
        #[arg(long)]
        force: bool,
    },
    /// Lists discoverable extensions and their state.
    List,
}
