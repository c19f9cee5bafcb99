use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub const DEFAULT_CONFIG: &str = "nodebox.toml";

#[derive(Parser, Debug)]
#[command(
    name = "nodebox",
    about = "Single-node cluster VM lifecycle via libvirt",
    after_help = "Generated XML and nodebox.log are kept in ~/.local/share/nodebox/<name>/ \
                  of the invoking user (/root/.local/share/nodebox/<name>/ under sudo).",
    arg_required_else_help = true
)]
pub struct Cli {
    /// Path to config file (defaults apply when nodebox.toml is absent)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Prepare the host and define network, volume and VM
    Create,
    /// Start the VM
    Start,
    /// Request a graceful shutdown of the VM
    Stop,
    /// Force-stop and remove the VM, its volume and its network
    Delete,
    /// Show the VM state
    Status,
}

impl Cli {
    /// Config path plus whether the user asked for it explicitly.
    pub fn config_path(&self) -> (PathBuf, bool) {
        match &self.config {
            Some(p) => (p.clone(), true),
            None => (PathBuf::from(DEFAULT_CONFIG), false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn parses_verbs() {
        let cli = Cli::try_parse_from(["nodebox", "create"]).unwrap();
        assert_eq!(cli.command, Command::Create);
        let cli = Cli::try_parse_from(["nodebox", "-v", "delete"]).unwrap();
        assert_eq!(cli.command, Command::Delete);
        assert!(cli.verbose);
    }

    #[test]
    fn default_config_is_optional() {
        let cli = Cli::try_parse_from(["nodebox", "start"]).unwrap();
        assert_eq!(cli.config_path(), (PathBuf::from("nodebox.toml"), false));
        let cli = Cli::try_parse_from(["nodebox", "-c", "lab.toml", "start"]).unwrap();
        assert_eq!(cli.config_path(), (PathBuf::from("lab.toml"), true));
    }

    #[test]
    fn no_args_shows_help() {
        let err = Cli::try_parse_from(["nodebox"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand);
    }

    #[test]
    fn unknown_verb_is_rejected() {
        let err = Cli::try_parse_from(["nodebox", "explode"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
    }
}
