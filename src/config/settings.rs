//! Edge node settings loaded from the environment.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_CLOUD_API_URL: &str = "https://api.settler.dev";
pub const DEFAULT_DATA_DIR: &str = "./data";
pub const DATABASE_FILE: &str = "edge-node.db";
pub const NODE_KEY_FILE: &str = ".node-key";

const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 30_000;
const DEFAULT_SYNC_INTERVAL_MS: u64 = 60_000;
const DEFAULT_BATCH_SIZE: usize = 100;
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_FLUSH_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_IN_FLIGHT_LEASE_MS: u64 = 300_000;
const DEFAULT_JOB_RETENTION_MS: u64 = 7 * 24 * 60 * 60 * 1000;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("required setting {0} is missing")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Runtime configuration for the edge node.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeConfig {
    pub cloud_api_url: String,
    pub data_dir: PathBuf,
    pub node_key: String,
    pub heartbeat_interval: Duration,
    pub sync_interval: Duration,
    pub batch_size: usize,
    pub offline_mode: bool,
    pub max_attempts: u32,
    pub request_timeout: Duration,
    pub flush_timeout: Duration,
    /// How long an entry may stay in-flight before a sweep reclaims it.
    pub in_flight_lease: Duration,
    /// Redaction map lifetime; `None` keeps tokens until an explicit clear.
    pub pii_retention: Option<Duration>,
    /// Finished job ledger rows older than this are pruned by the run loop.
    pub job_retention: Duration,
    pub log_level: String,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            cloud_api_url: DEFAULT_CLOUD_API_URL.to_string(),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            node_key: String::new(),
            heartbeat_interval: Duration::from_millis(DEFAULT_HEARTBEAT_INTERVAL_MS),
            sync_interval: Duration::from_millis(DEFAULT_SYNC_INTERVAL_MS),
            batch_size: DEFAULT_BATCH_SIZE,
            offline_mode: false,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            flush_timeout: Duration::from_millis(DEFAULT_FLUSH_TIMEOUT_MS),
            in_flight_lease: Duration::from_millis(DEFAULT_IN_FLIGHT_LEASE_MS),
            pii_retention: None,
            job_retention: Duration::from_millis(DEFAULT_JOB_RETENTION_MS),
            log_level: "info".to_string(),
        }
    }
}

impl EdgeConfig {
    /// Load from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load a `.env` file (if present) and then the process environment.
    pub fn load_with_dotenv() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                log::warn!("DOTENV_LOAD_FAILED error={}", e);
            }
        }
        Self::from_env()
    }

    /// Build a config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let data_dir = get("EDGENODE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);

        let node_key = match get("EDGENODE_NODE_KEY") {
            Some(key) => key.trim().to_string(),
            None => read_node_key_file(&data_dir).unwrap_or_default(),
        };

        let batch_size = parse_or(&get, "EDGENODE_BATCH_SIZE", defaults.batch_size)?;
        if batch_size == 0 {
            return Err(ConfigError::Invalid {
                var: "EDGENODE_BATCH_SIZE",
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        let max_attempts = parse_or(&get, "EDGENODE_MAX_ATTEMPTS", defaults.max_attempts)?;
        if max_attempts == 0 {
            return Err(ConfigError::Invalid {
                var: "EDGENODE_MAX_ATTEMPTS",
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        let pii_retention = match get("EDGENODE_PII_RETENTION_MS") {
            Some(raw) => Some(Duration::from_millis(parse_value(
                "EDGENODE_PII_RETENTION_MS",
                &raw,
            )?)),
            None => None,
        };

        Ok(Self {
            cloud_api_url: get("EDGENODE_CLOUD_API_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.cloud_api_url),
            data_dir,
            node_key,
            heartbeat_interval: millis_or(
                &get,
                "EDGENODE_HEARTBEAT_INTERVAL_MS",
                defaults.heartbeat_interval,
            )?,
            sync_interval: millis_or(&get, "EDGENODE_SYNC_INTERVAL_MS", defaults.sync_interval)?,
            batch_size,
            offline_mode: get("EDGENODE_OFFLINE_MODE")
                .map(|v| parse_flag(&v))
                .unwrap_or(defaults.offline_mode),
            max_attempts,
            request_timeout: millis_or(
                &get,
                "EDGENODE_REQUEST_TIMEOUT_MS",
                defaults.request_timeout,
            )?,
            flush_timeout: millis_or(&get, "EDGENODE_FLUSH_TIMEOUT_MS", defaults.flush_timeout)?,
            in_flight_lease: millis_or(
                &get,
                "EDGENODE_IN_FLIGHT_LEASE_MS",
                defaults.in_flight_lease,
            )?,
            pii_retention,
            job_retention: millis_or(&get, "EDGENODE_JOB_RETENTION_MS", defaults.job_retention)?,
            log_level: get("LOG_LEVEL").unwrap_or(defaults.log_level),
        })
    }

    /// Path of the embedded database holding the queue and job ledger.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }
}

fn read_node_key_file(data_dir: &Path) -> Option<String> {
    let contents = std::fs::read_to_string(data_dir.join(NODE_KEY_FILE)).ok()?;
    let key = contents.trim();
    (!key.is_empty()).then(|| key.to_string())
}

/// Persist an issued node key under `data_dir`, readable by the owner only.
///
/// `from_lookup` falls back to this file when `EDGENODE_NODE_KEY` is unset.
pub fn write_node_key_file(data_dir: &Path, node_key: &str) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(data_dir)?;
    let path = data_dir.join(NODE_KEY_FILE);

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(&path)?;
    // `mode` only applies on create; tighten a pre-existing file too.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(node_key.as_bytes())?;
    file.sync_all()?;
    Ok(path)
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "yes")
}

fn parse_value<T>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
        var,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn parse_or<T, G>(get: &G, var: &'static str, default: T) -> Result<T, ConfigError>
where
    G: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get(var) {
        Some(raw) => parse_value(var, &raw),
        None => Ok(default),
    }
}

fn millis_or<G>(get: &G, var: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(var) {
        Some(raw) => parse_value::<u64>(var, &raw).map(Duration::from_millis),
        None => Ok(default),
    }
}
