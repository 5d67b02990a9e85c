use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("missing required env var: {0}")]
    MissingEnv(String),
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error("chain {0} uses contract governance but has no contract normalizer")]
    MissingNormalizer(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub registry: RegistryConfig,
    /// Chain keys (registry directory name or chain id) to monitor.
    #[serde(default)]
    pub chains: Vec<String>,
    /// Hand-pinned REST endpoints per chain key. Bypasses health probing.
    #[serde(default)]
    pub overrides: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    /// Directory holding an unpacked chain registry (`<chain>/chain.json`).
    #[serde(default = "default_registry_path")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    pub id: String,
    /// Chains this channel wants to hear about. Empty = every monitored chain.
    #[serde(default)]
    pub chains: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Sleep between polling cycles.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Chains retrieved per chunk. Chunks run one after another.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Concurrent chain retrievals inside a chunk.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Pause between successive deliveries to the sink.
    #[serde(default = "default_notify_delay_ms")]
    pub notify_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProbeConfig {
    /// Concurrent probes against the endpoints of one chain.
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_probe_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_fetch_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerBackend {
    Memory,
    Redis,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_backend")]
    pub backend: LedgerBackend,
    /// Redis/Valkey URL - loaded from env GOVWATCH_REDIS_URL
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_registry_path() -> PathBuf {
    PathBuf::from("./chain-registry")
}
fn default_interval_secs() -> u64 {
    300
}
fn default_chunk_size() -> usize {
    10
}
fn default_workers() -> usize {
    10
}
fn default_notify_delay_ms() -> u64 {
    1000
}
fn default_probe_timeout_ms() -> u64 {
    3000
}
fn default_fetch_timeout_secs() -> u64 {
    20
}
fn default_backend() -> LedgerBackend {
    LedgerBackend::Memory
}
fn default_prefix() -> String {
    "govwatch".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: default_registry_path(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            chunk_size: default_chunk_size(),
            workers: default_workers(),
            notify_delay_ms: default_notify_delay_ms(),
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            timeout_ms: default_probe_timeout_ms(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            url: String::new(),
            prefix: default_prefix(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Config {
    /// Load config from a TOML file, then overlay environment variables for secrets.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(contents)?;

        // Secrets never live in the config file
        if let Ok(url) = std::env::var("GOVWATCH_REDIS_URL") {
            config.ledger.url = url;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load a default config driven by env vars only (no file needed).
    pub fn from_env() -> Result<Self, ConfigError> {
        let chains = std::env::var("GOVWATCH_CHAINS")
            .map(|s| split_list(&s))
            .unwrap_or_default();
        let channels = std::env::var("GOVWATCH_CHANNELS")
            .map(|s| {
                split_list(&s)
                    .into_iter()
                    .map(|id| ChannelConfig {
                        id,
                        chains: Vec::new(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        let url = std::env::var("GOVWATCH_REDIS_URL").unwrap_or_default();
        let backend = if url.is_empty() {
            LedgerBackend::Memory
        } else {
            LedgerBackend::Redis
        };

        let config = Config {
            registry: RegistryConfig {
                path: std::env::var("GOVWATCH_REGISTRY_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| default_registry_path()),
            },
            chains,
            overrides: HashMap::new(),
            channels,
            scheduler: SchedulerConfig::default(),
            probe: ProbeConfig::default(),
            fetch: FetchConfig::default(),
            ledger: LedgerConfig {
                backend,
                url,
                prefix: default_prefix(),
            },
            logging: LoggingConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.ledger.backend == LedgerBackend::Redis && self.ledger.url.is_empty() {
            return Err(ConfigError::MissingEnv("GOVWATCH_REDIS_URL".to_string()));
        }
        if self.scheduler.chunk_size == 0 {
            return Err(ConfigError::Invalid("scheduler.chunk_size must be > 0".into()));
        }
        if self.scheduler.workers == 0 || self.probe.workers == 0 {
            return Err(ConfigError::Invalid("worker counts must be > 0".into()));
        }
        Ok(())
    }

    /// Chains a channel subscribes to, resolved against the monitored set.
    pub fn channel_chains<'a>(&'a self, channel: &'a ChannelConfig) -> Vec<&'a str> {
        if channel.chains.is_empty() {
            self.chains.iter().map(String::as_str).collect()
        } else {
            channel.chains.iter().map(String::as_str).collect()
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
