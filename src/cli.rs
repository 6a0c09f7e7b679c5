//! CLI argument parsing using clap v4
//!
//! Defines the command-line interface for the persona council.

use clap::{Parser, Subcommand};

/// Persona Council - multi-persona collaboration engine
///
/// Summons, searches and lists personas from resilient remote sources, and
/// runs collaborations in which several personas analyze one query and
/// their outputs are cross-validated, synthesized and turned into an
/// action plan.
#[derive(Parser, Debug)]
#[command(name = "persona-council")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to configuration file
    #[arg(short, long, env = "PERSONA_COUNCIL_CONFIG", global = true)]
    pub config: Option<String>,

    /// JSON file with local personas (highest merge priority)
    #[arg(long, env = "PERSONA_COUNCIL_PERSONAS", global = true)]
    pub personas: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show one persona by id or exact name
    Summon {
        /// Persona id or name
        name: String,
    },

    /// List personas, grouped by source
    List {
        /// Only personas whose category contains this text
        #[arg(long)]
        category: Option<String>,

        /// Only personas from this source (local, remote, default)
        #[arg(long)]
        source: Option<String>,
    },

    /// Rank personas against a free-text query
    Search {
        /// Search text (5-2000 characters)
        query: String,
    },

    /// Run a multi-persona collaboration on a query
    Collaborate {
        /// Query to analyze (5-2000 characters)
        query: String,

        /// Persona id to include (repeatable; omit for automatic selection)
        #[arg(short, long = "persona")]
        persona_ids: Vec<String>,

        /// Collaboration mode: parallel, sequential or intelligent
        #[arg(short, long)]
        mode: Option<String>,
    },

    /// Remote persona configuration sync
    Configs {
        #[command(subcommand)]
        subcommand: ConfigsSubcommand,
    },

    /// Show tool usage statistics for this process
    Stats {
        /// Restrict to one tool
        #[arg(long)]
        tool: Option<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Display version and build information
    Version,
}

/// Remote config subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigsSubcommand {
    /// List configs available to the configured credential
    List,

    /// Download a config and apply its personas
    Download {
        /// Config id (letters, digits, '_' and '-')
        id: String,
    },

    /// Show sync state
    Status,
}

/// Configuration subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigSubcommand {
    /// Display the effective configuration
    Show,

    /// Initialize a new configuration file
    Init {
        /// Path where to create the config file
        #[arg(short, long)]
        path: Option<String>,

        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Validate the configuration
    Validate,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        // Verifies that the CLI definition is valid
        Cli::command().debug_assert();
    }

    #[test]
    fn test_summon_command() {
        let cli = Cli::parse_from(["persona-council", "summon", "grumpy-critic"]);
        match cli.command {
            Commands::Summon { name } => assert_eq!(name, "grumpy-critic"),
            _ => panic!("Expected Summon command"),
        }
    }

    #[test]
    fn test_list_with_filters() {
        let cli = Cli::parse_from([
            "persona-council",
            "list",
            "--category",
            "support",
            "--source",
            "default",
        ]);
        match cli.command {
            Commands::List { category, source } => {
                assert_eq!(category.as_deref(), Some("support"));
                assert_eq!(source.as_deref(), Some("default"));
            }
            _ => panic!("Expected List command"),
        }
    }

    #[test]
    fn test_collaborate_with_personas() {
        let cli = Cli::parse_from([
            "persona-council",
            "collaborate",
            "Should we rewrite the billing service?",
            "--persona",
            "grumpy-critic",
            "-p",
            "warm-sister",
            "--mode",
            "parallel",
        ]);
        match cli.command {
            Commands::Collaborate { query, persona_ids, mode } => {
                assert!(query.starts_with("Should"));
                assert_eq!(persona_ids, vec!["grumpy-critic", "warm-sister"]);
                assert_eq!(mode.as_deref(), Some("parallel"));
            }
            _ => panic!("Expected Collaborate command"),
        }
    }

    #[test]
    fn test_configs_download() {
        let cli = Cli::parse_from(["persona-council", "configs", "download", "team-a"]);
        match cli.command {
            Commands::Configs { subcommand: ConfigsSubcommand::Download { id } } => {
                assert_eq!(id, "team-a");
            }
            _ => panic!("Expected Configs Download command"),
        }
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::parse_from([
            "persona-council",
            "-vv",
            "--config",
            "/tmp/council.toml",
            "--personas",
            "mine.json",
            "version",
        ]);
        assert_eq!(cli.verbose, 2);
        assert!(!cli.quiet);
        assert_eq!(cli.config.as_deref(), Some("/tmp/council.toml"));
        assert_eq!(cli.personas.as_deref(), Some("mine.json"));
    }

    #[test]
    fn test_quiet_flag() {
        let cli = Cli::parse_from(["persona-council", "--quiet", "version"]);
        assert!(cli.quiet);
    }

    #[test]
    fn test_config_init() {
        let cli = Cli::parse_from(["persona-council", "config", "init", "--force"]);
        match cli.command {
            Commands::Config { subcommand: ConfigSubcommand::Init { path, force } } => {
                assert!(path.is_none());
                assert!(force);
            }
            _ => panic!("Expected Config Init command"),
        }
    }
}
