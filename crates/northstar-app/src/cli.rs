//! CLI argument definitions for the NorthStar binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// NorthStar - an insurance assistant grounded in policy and claim records.
#[derive(Parser, Debug)]
#[command(name = "northstar", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// API server port.
    #[arg(short = 'p', long = "port", global = true)]
    pub port: Option<u16>,

    /// Data directory for conversations, records and documents.
    #[arg(short = 'd', long = "data-dir", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    /// Keep conversation history in memory only.
    #[arg(long = "ephemeral", global = true)]
    pub ephemeral: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Run the HTTP API (default).
    Serve,
    /// Answer a single query and exit.
    Ask {
        query: String,
        /// Continue an existing session.
        #[arg(short = 's', long = "session")]
        session: Option<String>,
    },
}

impl CliArgs {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve)
    }

    /// Priority: --config flag > NORTHSTAR_CONFIG env var > ~/.northstar/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("NORTHSTAR_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Priority: --port flag > NORTHSTAR_PORT env var > config file value > 3040.
    pub fn resolve_port(&self, config_port: u16) -> u16 {
        let env = std::env::var("NORTHSTAR_PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok());
        let resolved = self.port.or(env).unwrap_or(config_port);
        if resolved == 0 {
            3040
        } else {
            resolved
        }
    }

    /// Priority: --data-dir flag > NORTHSTAR_DATA_DIR env var > config file value.
    pub fn resolve_data_dir(&self, config_dir: &str) -> String {
        pick(
            self.data_dir.as_ref().map(|p| p.to_string_lossy().to_string()),
            std::env::var("NORTHSTAR_DATA_DIR").ok(),
            config_dir,
        )
    }

    /// Priority: --log-level flag > NORTHSTAR_LOG_LEVEL env var > config file value.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        pick(
            self.log_level.clone(),
            std::env::var("NORTHSTAR_LOG_LEVEL").ok(),
            config_level,
        )
    }
}

fn pick(cli: Option<String>, env: Option<String>, config: &str) -> String {
    cli.or(env.filter(|v| !v.trim().is_empty()))
        .unwrap_or_else(|| config.to_string())
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".northstar").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".northstar").join("config.toml");
    }
    PathBuf::from("config.toml")
}
