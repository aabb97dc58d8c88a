//! Configuration resolution for MeterVPN.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/metervpn/settings.json)
//! 3. Explicit config file (`--config`)
//! 4. Environment variables
//! 5. CLI arguments (highest priority, applied by the binary)
//!
//! Files are merged key by key, so a file only needs to name the values it
//! changes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use metervpn_crypto::DeploymentPeer;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::poll::PollPolicy;
use crate::pricing::PriceTable;

/// Complete MeterVPN client configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub polling: PollConfig,
    #[serde(default)]
    pub lease: LeaseConfig,
    #[serde(default)]
    pub tunnel: TunnelSettings,
    #[serde(default)]
    pub pricing: PricingConfig,
}

/// Where the metering server lives and how long to wait for it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    pub base_url: String,
    /// Per-request timeout. Must exceed the server's 60s settlement long-poll.
    pub request_timeout_secs: u64,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            request_timeout_secs: 75,
            log_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Settlement polling schedule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PollConfig {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    /// Give up on an unpaid invoice after this long.
    pub max_wait_secs: u64,
    pub max_attempts: Option<u32>,
}

impl Default for PollConfig {
    fn default() -> Self {
        let policy = PollPolicy::default();
        Self {
            initial_delay_ms: duration_ms(policy.initial_delay),
            max_delay_ms: duration_ms(policy.max_delay),
            multiplier: policy.multiplier,
            max_wait_secs: policy.max_wait.as_secs(),
            max_attempts: policy.max_attempts,
        }
    }
}

impl From<&PollConfig> for PollPolicy {
    fn from(config: &PollConfig) -> Self {
        Self {
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            multiplier: config.multiplier,
            max_wait: Duration::from_secs(config.max_wait_secs),
            max_attempts: config.max_attempts,
        }
    }
}

/// Lease countdown refresh.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LeaseConfig {
    pub refresh_interval_secs: u64,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 15,
        }
    }
}

impl LeaseConfig {
    pub const fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

/// Which assigned address goes into the tunnel config.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    #[default]
    Ipv4,
    Ipv6,
}

/// Tunnel deployment constants and bundle naming.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TunnelSettings {
    pub peer: DeploymentPeer,
    /// Name of the `.conf` entry inside the archive.
    pub config_file_name: String,
    /// Suggested file name for the archive itself.
    pub archive_file_name: String,
    pub address_family: AddressFamily,
}

impl Default for TunnelSettings {
    fn default() -> Self {
        Self {
            peer: DeploymentPeer::default(),
            config_file_name: "MeterVPN-toronto-ca.conf".to_string(),
            archive_file_name: "wireguard-config.zip".to_string(),
            address_family: AddressFamily::Ipv4,
        }
    }
}

/// Quote settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct PricingConfig {
    /// Used only when the server price table cannot be fetched.
    pub fallback: Option<PriceTable>,
}

/// Load configuration with hierarchical resolution.
pub fn load_config(explicit_path: Option<&Path>) -> Result<Config> {
    let mut merged = serde_json::to_value(Config::default())?;

    if let Some(global_path) = global_config_path() {
        if global_path.exists() {
            merge_json(&mut merged, read_config_value(&global_path)?);
        }
    }

    if let Some(path) = explicit_path {
        merge_json(&mut merged, read_config_value(path)?);
    }

    let mut config: Config = serde_json::from_value(merged)
        .map_err(|e| Error::Config(format!("Invalid configuration: {e}")))?;

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .ok()
            .map(|h| PathBuf::from(h).join(".metervpn").join("settings.json"))
    }
    #[cfg(target_os = "macos")]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join("Library/Application Support/metervpn/settings.json"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config")))
            .map(|p| p.join("metervpn").join("settings.json"))
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        None
    }
}

impl Config {
    /// Reject values that would make the client misbehave at runtime.
    pub fn validate(&self) -> Result<()> {
        let url = reqwest::Url::parse(&self.server.base_url)
            .map_err(|e| Error::Config(format!("server.base_url: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "server.base_url must be http or https, got {}",
                url.scheme()
            )));
        }
        if self.server.request_timeout_secs == 0 {
            return Err(Error::Config(
                "server.request_timeout_secs must be positive".into(),
            ));
        }
        if self.polling.initial_delay_ms == 0 || self.polling.max_delay_ms == 0 {
            return Err(Error::Config("polling delays must be positive".into()));
        }
        if !(self.polling.multiplier.is_finite() && self.polling.multiplier >= 1.0) {
            return Err(Error::Config("polling.multiplier must be >= 1.0".into()));
        }
        if self.lease.refresh_interval_secs == 0 {
            return Err(Error::Config(
                "lease.refresh_interval_secs must be positive".into(),
            ));
        }
        self.tunnel
            .peer
            .validate()
            .map_err(|e| Error::Config(format!("tunnel.peer.public_key: {e}")))?;
        if let Some(fallback) = &self.pricing.fallback {
            fallback
                .validate()
                .map_err(|e| Error::Config(format!("pricing.fallback: {e}")))?;
        }
        Ok(())
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy::from(&self.polling)
    }
}

fn read_config_value(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

/// Recursively overlay `overlay` onto `base`; objects merge, everything else replaces.
fn merge_json(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(slot) => merge_json(slot, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Apply `METERVPN_*` overrides, reading variables through `lookup`.
pub fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(val) = lookup("METERVPN_SERVER_URL") {
        config.server.base_url = val;
    }
    if let Some(val) = lookup("METERVPN_LOG_LEVEL") {
        config.server.log_level = val;
    }
    // Sets the first delay; the backoff cap is raised so it is never below it.
    if let Some(n) = lookup("METERVPN_POLL_INTERVAL_SECS").and_then(|v| v.parse::<u64>().ok()) {
        let interval_ms = n.saturating_mul(1000);
        config.polling.initial_delay_ms = interval_ms;
        config.polling.max_delay_ms = config.polling.max_delay_ms.max(interval_ms);
    }
    if let Some(n) = lookup("METERVPN_POLL_MAX_WAIT_SECS").and_then(|v| v.parse().ok()) {
        config.polling.max_wait_secs = n;
    }
    if let Some(n) = lookup("METERVPN_REFRESH_INTERVAL_SECS").and_then(|v| v.parse().ok()) {
        config.lease.refresh_interval_secs = n;
    }
}

#[allow(clippy::cast_possible_truncation)]
const fn duration_ms(d: Duration) -> u64 {
    d.as_millis() as u64
}
