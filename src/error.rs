//! Fulcrum error types.
//!
//! # Error Classification
//!
//! - **Input errors** (`InvalidInput`, `ScenarioNotFound`, `NoEntities`,
//!   `InvalidConfig`): the run is never created, surfaced as client errors.
//! - **Provider errors** (`Provider`, `RateLimited`, `Network`, `Timeout`,
//!   `AllProvidersFailed`): produced beneath the orchestration layers, after
//!   retries and fallback were exhausted.
//! - **Run errors** (`Analyzer`, `Storage`): fatal to a run, recorded as
//!   `failed` status rather than bubbled to the request boundary.

use axum::http::StatusCode;
use thiserror::Error;

/// Fulcrum errors.
#[derive(Error, Debug)]
pub enum FulcrumError {
    /// Request failed validation.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Scenario id is unknown to the catalog.
    #[error("Scenario not found: {0}")]
    ScenarioNotFound(String),

    /// Entity resolution produced nothing to simulate.
    #[error("No entities could be resolved for scenario {0}")]
    NoEntities(String),

    /// Simulation config is out of range.
    #[error("Invalid simulation config: {0}")]
    InvalidConfig(String),

    /// Provider answered with a non-success status.
    #[error("Provider {provider} returned {status}: {body}")]
    Provider {
        /// Provider name.
        provider: String,
        /// HTTP status code.
        status: u16,
        /// Response body (truncated).
        body: String,
    },

    /// Provider rate limited every attempt.
    #[error("Rate limited by {provider} after {attempts} attempts")]
    RateLimited {
        /// Provider name.
        provider: String,
        /// Attempts made.
        attempts: u32,
    },

    /// Network communication error.
    #[error("Network error: {0}")]
    Network(String),

    /// Operation exceeded its deadline.
    #[error("Timed out after {0}ms")]
    Timeout(u64),

    /// No JSON value could be recovered from model output.
    #[error("JSON extraction failed: {0}")]
    JsonExtraction(String),

    /// Every configured provider failed.
    #[error("All providers failed: {}", .0.join("; "))]
    AllProvidersFailed(Vec<String>),

    /// Cross-entity analysis failed for a round.
    #[error("Analyzer error: {0}")]
    Analyzer(String),

    /// Fulcrum synthesis failed.
    #[error("Synthesis error: {0}")]
    Synthesis(String),

    /// Persistence collaborator failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Server-side error.
    #[error("Server error: {0}")]
    Server(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Fulcrum operations
pub type Result<T> = std::result::Result<T, FulcrumError>;

impl FulcrumError {
    /// HTTP status the trigger boundary reports for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            FulcrumError::InvalidInput(_)
            | FulcrumError::NoEntities(_)
            | FulcrumError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
            FulcrumError::ScenarioNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the error is the caller's fault (run never created).
    pub fn is_input_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

impl From<reqwest::Error> for FulcrumError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FulcrumError::Network(format!("request timed out: {err}"))
        } else {
            FulcrumError::Network(err.to_string())
        }
    }
}

impl From<toml::de::Error> for FulcrumError {
    fn from(err: toml::de::Error) -> Self {
        FulcrumError::Config(err.to_string())
    }
}
