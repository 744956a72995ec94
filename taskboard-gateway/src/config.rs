//! Configuration system for the `Taskboard` gateway.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/taskboard/config.toml`)
//! 4. Compiled defaults

use std::path::PathBuf;
use std::time::Duration;

/// Errors that can occur when loading gateway configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure for the gateway.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct GatewayConfigFile {
    server: ServerFileConfig,
    backend: BackendFileConfig,
}

/// `[server]` section of the gateway config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    bind_addr: Option<String>,
    board_id: Option<String>,
}

/// `[backend]` section of the gateway config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct BackendFileConfig {
    primary_addr: Option<String>,
    standby_addr: Option<String>,
    call_timeout_ms: Option<u64>,
}

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// CLI arguments for the gateway.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Taskboard gateway")]
pub struct GatewayCliArgs {
    /// Address to bind the event server to.
    #[arg(short, long, env = "TASKBOARD_ADDR")]
    pub bind: Option<String>,

    /// Primary backend address (host:port).
    #[arg(long, env = "TASKBOARD_PRIMARY")]
    pub primary: Option<String>,

    /// Standby backend address (host:port).
    #[arg(long, env = "TASKBOARD_STANDBY")]
    pub standby: Option<String>,

    /// Backend call timeout in milliseconds.
    #[arg(long)]
    pub call_timeout_ms: Option<u64>,

    /// Default board id served by this gateway.
    #[arg(long)]
    pub board_id: Option<String>,

    /// Path to config file (default: `~/.config/taskboard/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "TASKBOARD_LOG")]
    pub log_level: String,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Address to bind the event server to (e.g., `0.0.0.0:8080`).
    pub bind_addr: String,
    /// Primary backend address.
    pub primary_addr: String,
    /// Standby backend address.
    pub standby_addr: String,
    /// Bound on one backend exchange.
    pub call_timeout: Duration,
    /// Default board id.
    pub board_id: String,
    /// Log level filter string.
    pub log_level: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            primary_addr: "127.0.0.1:12345".to_string(),
            standby_addr: "127.0.0.1:12346".to_string(),
            call_timeout: Duration::from_secs(5),
            board_id: "board-1".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an error.
    /// If no `--config` is given, the default path is tried and a missing
    /// file is treated as empty config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed.
    pub fn load(cli: &GatewayCliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Resolve a `GatewayConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    #[must_use]
    fn resolve(cli: &GatewayCliArgs, file: &GatewayConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            bind_addr: cli
                .bind
                .clone()
                .or_else(|| file.server.bind_addr.clone())
                .unwrap_or(defaults.bind_addr),
            primary_addr: cli
                .primary
                .clone()
                .or_else(|| file.backend.primary_addr.clone())
                .unwrap_or(defaults.primary_addr),
            standby_addr: cli
                .standby
                .clone()
                .or_else(|| file.backend.standby_addr.clone())
                .unwrap_or(defaults.standby_addr),
            call_timeout: cli
                .call_timeout_ms
                .or(file.backend.call_timeout_ms)
                .map_or(defaults.call_timeout, Duration::from_millis),
            board_id: cli
                .board_id
                .clone()
                .or_else(|| file.server.board_id.clone())
                .unwrap_or(defaults.board_id),
            log_level: cli.log_level.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file for the gateway.
fn load_config_file(
    explicit_path: Option<&std::path::Path>,
) -> Result<GatewayConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(GatewayConfigFile::default());
        };
        config_dir.join("taskboard").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(GatewayConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
