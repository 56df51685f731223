//! # Command-Line Interface Module
//!
//! Bootstrap-layer CLI handling with security-first design.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │  1. clap::Parser::parse()           │  Parse CLI with clap
//! └─────────────────┬───────────────────┘
//!                   ↓
//! ┌─────────────────────────────────────┐
//! │  2. validate_cli()                  │  Security validation
//! └─────────────────┬───────────────────┘
//!                   ↓
//! ┌─────────────────────────────────────┐
//! │  3. ValidatedCli                    │  Safe, validated config
//! └─────────────────────────────────────┘
//! ```
//!
//! Exactly four top-level commands are exposed: `config validate`, `init`,
//! `plugins list`, and `web serve`. Every handler returns `Result<_,
//! OrchestratorError>`-shaped JSON on stdout and maps to exit code 0 on
//! success, 1 on recoverable error (see `exit_code`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use thiserror::Error;

/// Top-level CLI definition, parsed by clap
#[derive(Parser, Debug)]
#[command(name = "orchestrator", version, about = "Inference-pipeline orchestrator")]
pub struct Cli {
    /// Enable verbose (debug-level) logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve and print the merged configuration descriptor
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Resolve the runtime descriptor and print its final state
    Init {
        /// Configuration file path
        #[arg(short = 'c', long = "config")]
        config: Option<PathBuf>,
        /// Override a single descriptor field, format KEY=VALUE
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,
        /// Skip the environment-variable resolution layer
        #[arg(long)]
        no_env: bool,
    },
    /// Enumerate registered backend/patch/workflow plugins
    Plugins {
        #[command(subcommand)]
        action: PluginsAction,
    },
    /// Start the supervisor and serve the wire-protocol RPC surface
    Web {
        #[command(subcommand)]
        action: WebAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the merged descriptor without starting any pipeline
    Validate {
        #[arg(short = 'c', long = "config")]
        config: Option<PathBuf>,
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,
        #[arg(long)]
        no_env: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum PluginsAction {
    /// List the static backend registry, grouped by kind
    List {
        #[arg(long, value_enum)]
        group: Option<PluginGroup>,
    },
}

#[derive(clap::ValueEnum, Clone, Debug, PartialEq, Eq)]
pub enum PluginGroup {
    Backends,
    Patches,
    Workflows,
}

#[derive(Subcommand, Debug)]
pub enum WebAction {
    /// Initialize the runtime and serve the orchestrator's socket listener
    Serve {
        #[arg(short = 'c', long = "config")]
        config: Option<PathBuf>,
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        #[arg(long, default_value_t = 9001)]
        port: u16,
        /// Restart the supervisor when the config file changes (development only)
        #[arg(long)]
        reload: bool,
        /// Override module:attr that resolves the ASGI-style app (unused by
        /// this binary; accepted for command-line compatibility with the
        /// original deployment tooling)
        #[arg(long)]
        app: Option<String>,
    },
}

/// Parse raw CLI arguments via clap
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Errors raised while validating parsed CLI arguments
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid value for --{arg}: {reason}")]
    InvalidValue { arg: String, reason: String },

    #[error("path does not exist: {0}")]
    PathNotFound(PathBuf),

    #[error("argument contains disallowed characters: {0}")]
    UnsafeArgument(String),

    #[error("malformed --set override '{0}', expected KEY=VALUE")]
    MalformedOverride(String),
}

/// Security validation for CLI arguments
///
/// Centralizes the checks the original deployment's entry-point script
/// applied ad hoc: reject path traversal and shell-metacharacter payloads
/// before they reach configuration resolution or file I/O.
pub struct SecureArgParser;

impl SecureArgParser {
    const DISALLOWED: &'static [char] = &[';', '|', '&', '$', '`', '\n', '\0'];

    /// Validate a free-form string argument (pipeline names, KEY=VALUE
    /// overrides, module specifiers) contains no shell-injection payloads.
    pub fn validate_argument(value: &str) -> Result<(), ParseError> {
        if value.chars().any(|c| Self::DISALLOWED.contains(&c)) {
            return Err(ParseError::UnsafeArgument(value.to_string()));
        }
        if value.contains("..") {
            return Err(ParseError::UnsafeArgument(value.to_string()));
        }
        Ok(())
    }

    /// Validate a path argument that is expected to already exist on disk.
    pub fn validate_path(value: &str) -> Result<PathBuf, ParseError> {
        Self::validate_argument(value)?;
        let path = PathBuf::from(value);
        if !path.exists() {
            return Err(ParseError::PathNotFound(path));
        }
        Ok(path)
    }

    /// Validate a single `--set KEY=VALUE` override string.
    pub fn validate_set_override(value: &str) -> Result<(String, String), ParseError> {
        Self::validate_argument(value)?;
        match value.split_once('=') {
            Some((k, v)) if !k.is_empty() => Ok((k.to_string(), v.to_string())),
            _ => Err(ParseError::MalformedOverride(value.to_string())),
        }
    }
}

/// Validated CLI configuration, ready for the application layer
#[derive(Debug, Clone)]
pub struct ValidatedCli {
    pub command: ValidatedCommand,
    pub verbose: bool,
}

/// Validated, security-checked command variants
#[derive(Debug, Clone)]
pub enum ValidatedCommand {
    ConfigValidate {
        config: Option<PathBuf>,
        overrides: Vec<(String, String)>,
        no_env: bool,
    },
    Init {
        config: Option<PathBuf>,
        overrides: Vec<(String, String)>,
        no_env: bool,
    },
    PluginsList {
        group: Option<PluginGroup>,
    },
    WebServe {
        config: Option<PathBuf>,
        host: String,
        port: u16,
        reload: bool,
    },
}

/// Parse and validate CLI arguments in one step
pub fn parse_and_validate() -> Result<ValidatedCli, ParseError> {
    let cli = parse_cli();
    validate_cli(cli)
}

fn validate_config_path(config: &Option<PathBuf>) -> Result<(), ParseError> {
    if let Some(path) = config {
        SecureArgParser::validate_path(&path.to_string_lossy())?;
    }
    Ok(())
}

fn validate_overrides(set: &[String]) -> Result<Vec<(String, String)>, ParseError> {
    set.iter().map(|s| SecureArgParser::validate_set_override(s)).collect()
}

fn validate_cli(cli: Cli) -> Result<ValidatedCli, ParseError> {
    let command = match cli.command {
        Commands::Config { action: ConfigAction::Validate { config, set, no_env } } => {
            validate_config_path(&config)?;
            let overrides = validate_overrides(&set)?;
            ValidatedCommand::ConfigValidate { config, overrides, no_env }
        }
        Commands::Init { config, set, no_env } => {
            validate_config_path(&config)?;
            let overrides = validate_overrides(&set)?;
            ValidatedCommand::Init { config, overrides, no_env }
        }
        Commands::Plugins { action: PluginsAction::List { group } } => {
            ValidatedCommand::PluginsList { group }
        }
        Commands::Web { action: WebAction::Serve { config, host, port, reload, app: _ } } => {
            validate_config_path(&config)?;
            SecureArgParser::validate_argument(&host)?;
            if port == 0 {
                return Err(ParseError::InvalidValue {
                    arg: "port".to_string(),
                    reason: "must be between 1 and 65535".to_string(),
                });
            }
            ValidatedCommand::WebServe { config, host, port, reload }
        }
    };

    Ok(ValidatedCli { command, verbose: cli.verbose })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_argument_rejects_shell_metacharacters() {
        assert!(SecureArgParser::validate_argument("pipeline; rm -rf /").is_err());
        assert!(SecureArgParser::validate_argument("safe_pipeline_name").is_ok());
    }

    #[test]
    fn test_validate_argument_rejects_path_traversal() {
        assert!(SecureArgParser::validate_argument("../../etc/passwd").is_err());
    }

    #[test]
    fn test_validate_set_override() {
        let (k, v) = SecureArgParser::validate_set_override("enable_webrtc_patch=true").unwrap();
        assert_eq!(k, "enable_webrtc_patch");
        assert_eq!(v, "true");

        assert!(SecureArgParser::validate_set_override("no-equals-sign").is_err());
        assert!(SecureArgParser::validate_set_override("=missing_key").is_err());
    }

    #[test]
    fn test_validate_path_missing_file() {
        let result = SecureArgParser::validate_path("/this/path/does/not/exist/anywhere");
        assert!(matches!(result, Err(ParseError::PathNotFound(_))));
    }
}
