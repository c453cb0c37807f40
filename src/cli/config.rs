//! clustertrust configuration file handling
//!
//! Provides default configuration generation and loading for the daemon.
//! Configuration files are TOML and live under the user config directory
//! unless `--config` points elsewhere.
//!
//! Subnet id and minimum stake have no defaults: the operator must set them,
//! either in the file or with `--netuid` / `--min-stake`.

use clap::Args;
use clustertrust::cluster::DEFAULT_TRUSTED_PEERS_PATH;
use clustertrust::trust::{EngineSettings, FailurePolicy, TrustPolicy};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default log level
const DEFAULT_LOG_LEVEL: &str = "info";

const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:9944";
const DEFAULT_POLL_INTERVAL_MS: u64 = 6_000;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_TIME_WINDOW: u64 = 100;
const DEFAULT_RESYNC_INTERVAL_BLOCKS: u64 = 100;
const DEFAULT_MAX_CONCURRENT_QUERIES: usize = 16;

/// Daemon configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClusterTrustConfig {
    /// Chain gateway connection
    #[serde(default)]
    pub chain: ChainConfig,

    /// Trust policy
    #[serde(default)]
    pub trust: TrustConfig,

    /// IPFS-Cluster integration
    #[serde(default)]
    pub cluster: ClusterConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Chain gateway configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    /// JSON-RPC endpoint of the chain gateway
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// How often to poll for a new finalized head
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Per-request timeout
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

/// Trust policy configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TrustConfig {
    /// Subnet whose commitments and validators are trusted (required)
    pub netuid: Option<u16>,

    /// Minimum total stake in TAO (required)
    pub min_stake: Option<f64>,

    /// Blocks an inscription stays valid for
    #[serde(default = "default_time_window")]
    pub time_window: u64,

    /// Record commitments whose extrinsic failed or has no outcome event
    #[serde(default)]
    pub allow_unsuccessful_commitments: bool,

    /// "closed" (default): a failed chain read distrusts the participant.
    /// "open": a failed chain read passes that check.
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Re-read all commitment storage every N blocks (0 disables)
    #[serde(default = "default_resync_interval_blocks")]
    pub resync_interval_blocks: u64,

    /// Participants evaluated concurrently
    #[serde(default = "default_max_concurrent_queries")]
    pub max_concurrent_queries: usize,
}

/// IPFS-Cluster configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterConfig {
    /// Path to the cluster `service.json`
    #[serde(default = "default_cluster_config_path")]
    pub config_path: PathBuf,

    /// Dotted path of the trusted peers list inside `service.json`
    #[serde(default = "default_trusted_peers_path")]
    pub trusted_peers_path: String,

    /// Command run after the peer list is rewritten (optional)
    pub reload_command: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default, Args)]
pub struct TrustOverrides {
    /// Subnet id
    #[arg(long)]
    pub netuid: Option<u16>,

    /// Minimum total stake in TAO
    #[arg(long)]
    pub min_stake: Option<f64>,

    /// Inscription validity window in blocks
    #[arg(long)]
    pub time_window: Option<u64>,

    /// Record commitments from failed extrinsics
    #[arg(long)]
    pub allow_unsuccessful: bool,

    /// Chain gateway endpoint
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Path to the cluster service.json
    #[arg(long)]
    pub cluster_config: Option<String>,
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("trust.netuid is not set (add it to the config file or pass --netuid)")]
    MissingNetuid,

    #[error("trust.min_stake is not set (add it to the config file or pass --min-stake)")]
    MissingMinStake,

    #[error("trust.min_stake must be a non-negative number, got {0}")]
    InvalidMinStake(f64),

    #[error("chain.poll_interval_ms must be greater than zero")]
    ZeroPollInterval,

    #[error("trust.max_concurrent_queries must be greater than zero")]
    ZeroConcurrency,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

fn default_time_window() -> u64 {
    DEFAULT_TIME_WINDOW
}

fn default_resync_interval_blocks() -> u64 {
    DEFAULT_RESYNC_INTERVAL_BLOCKS
}

fn default_max_concurrent_queries() -> usize {
    DEFAULT_MAX_CONCURRENT_QUERIES
}

fn default_trusted_peers_path() -> String {
    DEFAULT_TRUSTED_PEERS_PATH.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

/// IPFS-Cluster's own default location.
pub fn default_cluster_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ipfs-cluster")
        .join("service.json")
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            netuid: None,
            min_stake: None,
            time_window: DEFAULT_TIME_WINDOW,
            allow_unsuccessful_commitments: false,
            failure_policy: FailurePolicy::default(),
            resync_interval_blocks: DEFAULT_RESYNC_INTERVAL_BLOCKS,
            max_concurrent_queries: DEFAULT_MAX_CONCURRENT_QUERIES,
        }
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            config_path: default_cluster_config_path(),
            trusted_peers_path: default_trusted_peers_path(),
            reload_command: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            file: None,
        }
    }
}

impl ClusterTrustConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file '{}': {}", path.display(), e))?;

        let config: ClusterTrustConfig = toml::from_str(&contents)
            .map_err(|e| format!("Failed to parse config file '{}': {}", path.display(), e))?;

        Ok(config)
    }

    /// Load `path` if it exists, otherwise write a default one first.
    pub fn load_or_create(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if !path.exists() {
            println!("📝 No config file found. Creating default configuration...");
            Self::create_default(path, &default_cluster_config_path())?;
            println!("   Created: {}", path.display());
        }
        Self::load(path)
    }

    /// Apply command-line overrides on top of the file values.
    pub fn apply_overrides(&mut self, overrides: &TrustOverrides) {
        if let Some(netuid) = overrides.netuid {
            self.trust.netuid = Some(netuid);
        }
        if let Some(min_stake) = overrides.min_stake {
            self.trust.min_stake = Some(min_stake);
        }
        if let Some(time_window) = overrides.time_window {
            self.trust.time_window = time_window;
        }
        if overrides.allow_unsuccessful {
            self.trust.allow_unsuccessful_commitments = true;
        }
        if let Some(endpoint) = &overrides.endpoint {
            self.chain.endpoint = endpoint.clone();
        }
        if let Some(path) = &overrides.cluster_config {
            self.cluster.config_path = PathBuf::from(path);
        }
    }

    /// Check required values and build the engine settings from them.
    pub fn engine_settings(&self) -> Result<EngineSettings, ConfigError> {
        let netuid = self.trust.netuid.ok_or(ConfigError::MissingNetuid)?;
        let min_stake = self.trust.min_stake.ok_or(ConfigError::MissingMinStake)?;
        if !min_stake.is_finite() || min_stake < 0.0 {
            return Err(ConfigError::InvalidMinStake(min_stake));
        }
        if self.chain.poll_interval_ms == 0 {
            return Err(ConfigError::ZeroPollInterval);
        }
        if self.trust.max_concurrent_queries == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }

        Ok(EngineSettings {
            policy: TrustPolicy {
                netuid,
                min_stake,
                time_window: self.trust.time_window,
                failure_policy: self.trust.failure_policy,
            },
            allow_unsuccessful_commitments: self.trust.allow_unsuccessful_commitments,
            resync_interval_blocks: self.trust.resync_interval_blocks,
            max_concurrent_queries: self.trust.max_concurrent_queries,
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.chain.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.chain.request_timeout_ms)
    }

    /// Generate default configuration content as a string with comments
    pub fn generate_default_toml(cluster_config_path: &Path) -> String {
        format!(
            r#"# clustertrust configuration
#
# Derives the IPFS-Cluster trusted peer set from subnet commitments and
# keeps the cluster's service.json in sync with it.

[chain]
# JSON-RPC endpoint of the chain gateway
endpoint = "{endpoint}"

# Finalized head poll interval and per-request timeout (milliseconds)
poll_interval_ms = {poll_interval_ms}
request_timeout_ms = {request_timeout_ms}

[trust]
# REQUIRED: subnet id and minimum total stake (TAO)
# netuid = 21
# min_stake = 1000.0

# Inscriptions older than this many blocks are no longer honored
time_window = {time_window}

# Record commitments whose extrinsic failed or has no outcome event
allow_unsuccessful_commitments = false

# What a failed chain read means: "closed" distrusts, "open" passes the check
failure_policy = "closed"

# Re-read all commitment storage every N blocks (0 disables)
resync_interval_blocks = {resync_interval_blocks}

# Participants evaluated concurrently
max_concurrent_queries = {max_concurrent_queries}

[cluster]
# IPFS-Cluster service.json to keep in sync
config_path = {cluster_config_path}

# Location of the trusted peers list inside service.json
trusted_peers_path = "{trusted_peers_path}"

# Command run after the list changes (optional)
# reload_command = "systemctl restart ipfs-cluster"

[logging]
# Log level: trace, debug, info, warn, error (RUST_LOG takes precedence)
level = "info"

# Log file path (optional, logs to stderr if not specified)
# file = "/var/log/clustertrust/clustertrust.log"
"#,
            endpoint = DEFAULT_ENDPOINT,
            poll_interval_ms = DEFAULT_POLL_INTERVAL_MS,
            request_timeout_ms = DEFAULT_REQUEST_TIMEOUT_MS,
            time_window = DEFAULT_TIME_WINDOW,
            resync_interval_blocks = DEFAULT_RESYNC_INTERVAL_BLOCKS,
            max_concurrent_queries = DEFAULT_MAX_CONCURRENT_QUERIES,
            cluster_config_path = toml::Value::String(cluster_config_path.display().to_string()),
            trusted_peers_path = DEFAULT_TRUSTED_PEERS_PATH,
        )
    }

    /// Create and save a default configuration file
    pub fn create_default(
        config_path: &Path,
        cluster_config_path: &Path,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let contents = Self::generate_default_toml(cluster_config_path);

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }

        fs::write(config_path, contents).map_err(|e| {
            format!(
                "Failed to write config file '{}': {}",
                config_path.display(),
                e
            )
        })?;

        Ok(())
    }
}

/// Get the default config file path
///
/// - Linux: ~/.config/clustertrust/config.toml
/// - macOS: ~/Library/Application Support/clustertrust/config.toml
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("clustertrust")
        .join("config.toml")
}

/// Resolve `--config` against the default location.
pub fn resolve_config_path(config_path: Option<String>) -> PathBuf {
    config_path
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path)
}
