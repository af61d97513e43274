use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// stackctl - install, run and cleanly uninstall host services
#[derive(Parser, Debug)]
#[command(name = "stackctl")]
#[command(about = "Trace-based lifecycle manager for host services such as MySQL")]
#[command(version)]
pub struct Cli {
    /// Stack configuration file (JSON)
    #[arg(short, long, global = true, default_value = "stack.json")]
    pub config: PathBuf,

    /// Action table replacing the builtin one (JSON)
    #[arg(long, global = true)]
    pub actions: Option<PathBuf>,

    /// Directory holding <distro>/<component>.json package lists
    #[arg(long, global = true, default_value = "packages")]
    pub packages: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Install the database component and trace every effect
    Install,
    /// Undo exactly what the install trace recorded
    Uninstall,
    /// Start the database service (requires a traced install)
    Start,
    /// Stop the database service (requires a traced install)
    Stop,
    /// Show traced packages and directories
    Status,
    /// Create a database with the configured service type's command
    CreateDb {
        /// Database name
        name: String,
    },
    /// Drop a database with the configured service type's command
    DropDb {
        /// Database name
        name: String,
    },
    /// Validate the configuration and action table
    Validate,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_create_db() {
        let cli = Cli::try_parse_from(["stackctl", "--config", "/etc/stack.json", "create-db", "nova"])
            .unwrap();
        assert_eq!(cli.config, PathBuf::from("/etc/stack.json"));
        assert!(matches!(cli.command, Commands::CreateDb { ref name } if name == "nova"));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["stackctl", "status", "--actions", "a.json"]).unwrap();
        assert_eq!(cli.actions, Some(PathBuf::from("a.json")));
        assert_eq!(cli.packages, PathBuf::from("packages"));
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["stackctl"]).is_err());
    }
}
