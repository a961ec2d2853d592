//! CLI argument parsing definitions

use clap::{Parser, Subcommand};
use stampede_config::parse_key_value;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "stampede", author, version, about, long_about = None)]
pub struct Cli {
    /// Set the log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the scenarios of a configuration file against the target
    Run {
        /// Path to the run configuration (YAML or JSON)
        #[arg(long, short, value_name = "PATH")]
        config: PathBuf,

        /// Run only this scenario, starting immediately
        #[arg(long, value_name = "NAME")]
        scenario: Option<String>,

        /// Environment override, repeatable (example: --env BASE_URL=http://staging:8080)
        #[arg(long = "env", short = 'e', value_name = "KEY=VALUE", value_parser = parse_key_value)]
        env: Vec<(String, String)>,

        /// Write the JSON summary to this file
        #[arg(long, value_name = "PATH")]
        summary_export: Option<PathBuf>,

        /// Seed for reproducible think times and request randomisation
        #[arg(long, value_name = "SEED")]
        seed: Option<u64>,

        /// Do not print the end-of-run report
        #[arg(long)]
        quiet: bool,
    },

    /// Check a configuration file without generating traffic
    Validate {
        /// Path to the configuration file
        #[arg(long, short, value_name = "PATH")]
        config: PathBuf,
    },

    /// Configuration management commands
    Config {
        #[command(subcommand)]
        config_cmd: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Generate a sample configuration (smoke, load, stress, spike, soak)
    Generate {
        /// Output file path; printed to stdout when omitted
        #[arg(long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },

    /// Show a configuration after defaults and environment overrides
    Show {
        /// Path to the configuration file
        #[arg(long, short, value_name = "PATH")]
        config: PathBuf,

        /// Output format: yaml, json
        #[arg(long, value_name = "FORMAT", default_value = "yaml")]
        format: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_arguments() {
        let cli = Cli::try_parse_from([
            "stampede",
            "run",
            "--config",
            "plan.yaml",
            "--scenario",
            "smoke",
            "-e",
            "BASE_URL=http://staging:8080",
            "--env",
            "API_VERSION=v3",
            "--seed",
            "42",
            "--log-level",
            "debug",
        ])
        .unwrap();

        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        match cli.command {
            Commands::Run {
                config,
                scenario,
                env,
                summary_export,
                seed,
                quiet,
            } => {
                assert_eq!(config, PathBuf::from("plan.yaml"));
                assert_eq!(scenario.as_deref(), Some("smoke"));
                assert_eq!(
                    env,
                    vec![
                        ("BASE_URL".to_string(), "http://staging:8080".to_string()),
                        ("API_VERSION".to_string(), "v3".to_string()),
                    ]
                );
                assert!(summary_export.is_none());
                assert_eq!(seed, Some(42));
                assert!(!quiet);
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn test_malformed_env_is_rejected() {
        assert!(Cli::try_parse_from(["stampede", "run", "-c", "plan.yaml", "-e", "BASE_URL"]).is_err());
        assert!(Cli::try_parse_from(["stampede", "run"]).is_err());
    }

    #[test]
    fn test_config_generate_defaults() {
        let cli = Cli::try_parse_from(["stampede", "config", "generate"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                config_cmd: ConfigCommands::Generate {
                    output: None,
                    force: false
                }
            }
        ));
    }
}
