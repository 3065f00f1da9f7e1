//! Configuration management.
//!
//! Supports configuration from:
//! - TOML config files
//! - Environment variables
//! - CLI arguments (for the server and single runs)

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::SimulationConfig;
use crate::error::{FulcrumError, Result};
use crate::llm::RetryPolicy;

/// Main configuration struct
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerSection,

    /// LLM provider configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Default simulation knobs
    #[serde(default)]
    pub simulation: SimulationConfig,

    /// Persistence configuration
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| FulcrumError::Config(format!("Failed to read config file: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| FulcrumError::Config(format!("Failed to parse config: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // Server settings
        if let Ok(host) = std::env::var("FULCRUM_HOST") {
            config.server.host = host;
        }
        if let Ok(port) = std::env::var("FULCRUM_PORT") {
            if let Ok(port) = port.parse() {
                config.server.port = port;
            }
        }

        // Simulation defaults
        if let Ok(val) = std::env::var("FULCRUM_MAX_ROUNDS") {
            if let Ok(val) = val.parse() {
                config.simulation.max_rounds = val;
            }
        }
        if let Ok(val) = std::env::var("FULCRUM_MIN_ROUNDS") {
            if let Ok(val) = val.parse() {
                config.simulation.min_rounds = val;
            }
        }
        if let Ok(val) = std::env::var("FULCRUM_STABILIZATION_THRESHOLD") {
            if let Ok(val) = val.parse() {
                config.simulation.stabilization_threshold = val;
            }
        }
        if let Ok(val) = std::env::var("FULCRUM_PARALLEL_BATCH_SIZE") {
            if let Ok(val) = val.parse() {
                config.simulation.parallel_batch_size = val;
            }
        }
        if let Ok(val) = std::env::var("FULCRUM_ENTITY_TIMEOUT_MS") {
            if let Ok(val) = val.parse() {
                config.simulation.entity_timeout_ms = val;
            }
        }

        // Analyzer selection
        if let Ok(val) = std::env::var("FULCRUM_ANALYZER") {
            if let Ok(kind) = val.parse() {
                config.llm.analyzer = kind;
            }
        }

        // Storage
        if let Ok(dir) = std::env::var("FULCRUM_DATA_DIR") {
            config.storage.data_dir = Some(PathBuf::from(dir));
        }

        config
    }

    /// Merge with another config (other takes precedence where it differs from defaults)
    pub fn merge(self, other: Self) -> Self {
        let default_server = ServerSection::default();
        let default_llm = LlmConfig::default();
        let default_storage = StorageConfig::default();
        let default_simulation = SimulationConfig::default();

        Self {
            server: ServerSection {
                host: if other.server.host != default_server.host {
                    other.server.host
                } else {
                    self.server.host
                },
                port: if other.server.port != default_server.port {
                    other.server.port
                } else {
                    self.server.port
                },
                cors_enabled: other.server.cors_enabled && self.server.cors_enabled,
            },
            llm: LlmConfig {
                providers: if other.llm.providers != default_llm.providers {
                    other.llm.providers
                } else {
                    self.llm.providers
                },
                retry: if other.llm.retry != default_llm.retry {
                    other.llm.retry
                } else {
                    self.llm.retry
                },
                analyzer: if other.llm.analyzer != default_llm.analyzer {
                    other.llm.analyzer
                } else {
                    self.llm.analyzer
                },
            },
            simulation: SimulationConfig {
                max_rounds: prefer(
                    other.simulation.max_rounds,
                    self.simulation.max_rounds,
                    default_simulation.max_rounds,
                ),
                min_rounds: prefer(
                    other.simulation.min_rounds,
                    self.simulation.min_rounds,
                    default_simulation.min_rounds,
                ),
                stabilization_threshold: prefer(
                    other.simulation.stabilization_threshold,
                    self.simulation.stabilization_threshold,
                    default_simulation.stabilization_threshold,
                ),
                parallel_batch_size: prefer(
                    other.simulation.parallel_batch_size,
                    self.simulation.parallel_batch_size,
                    default_simulation.parallel_batch_size,
                ),
                entity_timeout_ms: prefer(
                    other.simulation.entity_timeout_ms,
                    self.simulation.entity_timeout_ms,
                    default_simulation.entity_timeout_ms,
                ),
            },
            storage: StorageConfig {
                data_dir: other.storage.data_dir.or(self.storage.data_dir),
                persist: if other.storage.persist != default_storage.persist {
                    other.storage.persist
                } else {
                    self.storage.persist
                },
            },
        }
    }

    /// Validate the pieces a run depends on
    pub fn validate(&self) -> Result<()> {
        self.simulation.validate()?;
        if self.llm.retry.max_attempts == 0 {
            return Err(FulcrumError::Config("llm.retry.max_attempts must be >= 1".into()));
        }
        Ok(())
    }
}

/// `other` when it differs from the default, else `base`.
fn prefer<T: PartialEq>(other: T, base: T, default: T) -> T {
    if other != default {
        other
    } else {
        base
    }
}

/// HTTP server section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Enable permissive CORS
    pub cors_enabled: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            cors_enabled: true,
        }
    }
}

impl ServerSection {
    /// Get the full listen address
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// One completion provider endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Name used in logs
    pub name: String,

    /// Base URL of an OpenAI-compatible API
    pub base_url: String,

    /// Model id
    pub model: String,

    /// Environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
}

fn default_provider_timeout() -> u64 {
    60
}

/// Which cross-entity analyzer a run uses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalyzerKind {
    /// Generative analysis through the gateway
    #[default]
    Llm,
    /// Deterministic, offline analysis
    Heuristic,
}

impl std::str::FromStr for AnalyzerKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "llm" | "ai" => Ok(Self::Llm),
            "heuristic" | "offline" => Ok(Self::Heuristic),
            _ => Err(format!("Unknown analyzer kind: {s}")),
        }
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Providers in fallback order
    pub providers: Vec<ProviderConfig>,

    /// Retry policy applied by every provider
    pub retry: RetryPolicy,

    /// Analyzer used for cross-entity analysis
    pub analyzer: AnalyzerKind,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            providers: vec![
                ProviderConfig {
                    name: "openrouter".to_string(),
                    base_url: "https://openrouter.ai/api/v1".to_string(),
                    model: "meta-llama/llama-3.3-70b-instruct".to_string(),
                    api_key_env: Some("OPENROUTER_API_KEY".to_string()),
                    timeout_secs: default_provider_timeout(),
                },
                ProviderConfig {
                    name: "openai".to_string(),
                    base_url: "https://api.openai.com/v1".to_string(),
                    model: "gpt-4o-mini".to_string(),
                    api_key_env: Some("OPENAI_API_KEY".to_string()),
                    timeout_secs: default_provider_timeout(),
                },
            ],
            retry: RetryPolicy::default(),
            analyzer: AnalyzerKind::default(),
        }
    }
}

/// Persistence configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for simulation records (default: platform data dir)
    pub data_dir: Option<PathBuf>,

    /// Write records to disk (false = in-memory only)
    pub persist: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            persist: true,
        }
    }
}

impl StorageConfig {
    /// Effective data directory
    pub fn resolved_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("fulcrum")
        })
    }
}
