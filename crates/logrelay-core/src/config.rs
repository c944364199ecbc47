//! Configuration types for logrelay.
//!
//! [`Config::load`] layers, in increasing precedence: the embedded defaults,
//! a TOML file (explicit path, or `~/.config/logrelay/config.toml` when it
//! exists), `LOGRELAY__SECTION__KEY` environment variables and finally
//! `LOG_STREAM_PORT`. [`Config::defaults`] returns the embedded defaults
//! without touching the filesystem or the environment (useful in tests).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::bus::FailurePolicy;
use crate::error::{Error, Result};
use crate::query::MAX_PAGE_SIZE;

/// Environment variable overriding `stream.port`.
pub const PORT_ENV: &str = "LOG_STREAM_PORT";

// ---------------------------------------------------------------------------
// Embedded defaults
// ---------------------------------------------------------------------------

const DEFAULT_CONFIG: &str = r#"
[stream]
host = "0.0.0.0"
port = 8080

[bus]
failure_policy = "first_error"
sink_priority  = 1000
relay_priority = 500

[query]
cache_ttl_ms      = 5000
default_page_size = 20

[store]
capacity = 10000
agent_id = "logrelay"
"#;

// ---------------------------------------------------------------------------
// Public config types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub stream: StreamConfig,
    pub bus: BusConfig,
    pub query: QueryConfig,
    pub store: StoreConfig,
}

/// `[stream]` section: where the WebSocket + HTTP listener binds.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    pub host: String,
    pub port: u16,
}

impl StreamConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// `[bus]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct BusConfig {
    pub failure_policy: FailurePolicy,
    /// Priority of the persistence listener. Must exceed `relay_priority`.
    pub sink_priority: i32,
    pub relay_priority: i32,
}

/// `[query]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    pub cache_ttl_ms: u64,
    pub default_page_size: u32,
}

impl QueryConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }
}

/// `[store]` section, used by the in-memory store the binary runs with.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub capacity: usize,
    /// Fallback `agentId` for events that do not carry one.
    pub agent_id: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::defaults()
    }
}

impl Config {
    /// Load the layered configuration. `path` is required to exist when given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_layered(path, std::env::var(PORT_ENV).ok().as_deref())
    }

    /// Like [`Config::load`], with the `LOG_STREAM_PORT` value passed in.
    pub fn load_layered(path: Option<&Path>, port_override: Option<&str>) -> Result<Self> {
        let file = match path {
            Some(p) => config::File::from(p).required(true),
            None => config::File::from(config_path().as_path()).required(false),
        };

        let mut cfg: Config = config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml))
            .add_source(file)
            .add_source(
                config::Environment::with_prefix("LOGRELAY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        // An empty value counts as unset.
        if let Some(raw) = port_override.filter(|raw| !raw.trim().is_empty()) {
            cfg.stream.port = parse_port(raw)?;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Return the built-in defaults without touching the filesystem.
    pub fn defaults() -> Self {
        config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml))
            .build()
            .expect("built-in default config must be valid TOML")
            .try_deserialize()
            .expect("built-in default config must deserialize correctly")
    }

    pub fn validate(&self) -> Result<()> {
        if self.bus.relay_priority >= self.bus.sink_priority {
            return Err(Error::Config(format!(
                "bus.relay_priority ({}) must be lower than bus.sink_priority ({})",
                self.bus.relay_priority, self.bus.sink_priority
            )));
        }
        if self.store.capacity == 0 {
            return Err(Error::Config("store.capacity must be at least 1".into()));
        }
        if self.query.cache_ttl_ms == 0 {
            return Err(Error::Config("query.cache_ttl_ms must be at least 1".into()));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&self.query.default_page_size) {
            return Err(Error::Config(format!(
                "query.default_page_size must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        Ok(())
    }
}

/// Parse a listening port. Non-numeric or out-of-range input is fatal.
pub fn parse_port(raw: &str) -> Result<u16> {
    raw.trim()
        .parse::<u16>()
        .map_err(|_| Error::Config(format!("invalid {PORT_ENV} configuration: {raw:?}")))
}

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

fn config_path() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".to_string()))
                .join(".config")
        })
        .join("logrelay")
        .join("config.toml")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
