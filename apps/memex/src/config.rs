//! # Configuration
//!
//! Settings come from four layers, later ones winning:
//!
//! 1. Built-in defaults
//! 2. `memex.toml` (path via `--config`)
//! 3. Environment (`MEMEX_DB`, `MEMEX_BACKEND`, `MEMEX_RATE_LIMIT`,
//!    `MEMEX_API_KEY`, `MEMEX_CORS_ORIGINS`)
//! 4. CLI flags
//!
//! ```toml
//! [storage]
//! backend = "redb"
//! path = "memex.redb"
//!
//! [server]
//! host = "127.0.0.1"
//! port = 8080
//! rate_limit = 100
//!
//! [engine]
//! max_traversal_depth = 10
//! ```

use memex_core::{EngineConfig, MemexError, StorageBackend};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Default database file.
pub const DEFAULT_DB_PATH: &str = "memex.redb";

/// Default requests per second.
pub const DEFAULT_RATE_LIMIT: u32 = 100;

// =============================================================================
// BACKEND
// =============================================================================

/// Which `StorageBackend` to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Persistent redb database file.
    #[default]
    Redb,
    /// Volatile BTreeMap tables. Nothing survives the process.
    Memory,
}

impl Backend {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Redb => "redb",
            Self::Memory => "memory",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = MemexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redb" => Ok(Self::Redb),
            "memory" => Ok(Self::Memory),
            other => Err(MemexError::Validation(format!(
                "unknown backend '{}' (expected redb or memory)",
                other
            ))),
        }
    }
}

// =============================================================================
// SECTIONS
// =============================================================================

/// `[storage]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub backend: Backend,
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Redb,
            path: PathBuf::from(DEFAULT_DB_PATH),
        }
    }
}

impl StorageConfig {
    /// Open the configured backend.
    pub fn open(&self) -> Result<StorageBackend, MemexError> {
        match self.backend {
            Backend::Redb => StorageBackend::open_redb(&self.path),
            Backend::Memory => Ok(StorageBackend::in_memory()),
        }
    }
}

/// `[server]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Requests per second. `0` disables the limiter.
    pub rate_limit: u32,
    /// Bearer token required on every route but `/health`.
    pub api_key: Option<String>,
    /// Allowed CORS origins; `["*"]` allows any. Empty means localhost only.
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            rate_limit: DEFAULT_RATE_LIMIT,
            api_key: None,
            cors_origins: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// `host:port`
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// =============================================================================
// MEMEX CONFIG
// =============================================================================

/// Full application configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MemexConfig {
    pub storage: StorageConfig,
    pub server: ServerConfig,
    pub engine: EngineConfig,
}

impl MemexConfig {
    /// Defaults overlaid with `path`, if given.
    pub fn load(path: Option<&Path>) -> Result<Self, MemexError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path).map_err(|e| {
            MemexError::Io(format!("cannot read config '{}': {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), "configuration file loaded");
        Ok(config)
    }

    /// Parse a `memex.toml` document. Missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, MemexError> {
        toml::from_str(text).map_err(|e| MemexError::Validation(format!("invalid config: {}", e)))
    }

    /// Overlay the process environment.
    pub fn apply_env(&mut self) -> Result<(), MemexError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Overlay variables from `lookup`. Empty values are ignored.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), MemexError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(path) = var("MEMEX_DB") {
            self.storage.path = PathBuf::from(path);
        }
        if let Some(backend) = var("MEMEX_BACKEND") {
            self.storage.backend = backend.parse()?;
        }
        if let Some(rate) = var("MEMEX_RATE_LIMIT") {
            match rate.trim().parse() {
                Ok(rps) => self.server.rate_limit = rps,
                Err(_) => tracing::warn!(
                    value = %rate,
                    "ignoring MEMEX_RATE_LIMIT: not a non-negative integer"
                ),
            }
        }
        if let Some(key) = var("MEMEX_API_KEY") {
            self.server.api_key = Some(key);
        }
        if let Some(origins) = var("MEMEX_CORS_ORIGINS") {
            self.server.cors_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect();
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
