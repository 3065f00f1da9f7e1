//! Fulcrum HTTP server.
//!
//! | Method | Path                          | Purpose                          |
//! |--------|-------------------------------|----------------------------------|
//! | POST   | `/simulations`                | Run a simulation, return result  |
//! | GET    | `/simulations/:id`            | Persisted simulation record      |
//! | GET    | `/simulations/:id/rounds`     | Persisted round history          |
//! | GET    | `/health`                     | Liveness                         |
//! | GET    | `/stats`                      | Run and gateway counters         |
//!
//! Every error path answers with `{"success": false, "error": "..."}`.

mod config;
mod handlers;
mod state;

use std::sync::Arc;

use tokio::net::TcpListener;

pub use config::ServerConfig;
pub use handlers::{create_router, health_check};
pub use state::{AppState, RunStats, RunStatsSummary};

use crate::error::{FulcrumError, Result};

/// Bind `state.config.addr` and serve until the listener fails.
pub async fn serve(state: Arc<AppState>) -> Result<()> {
    let addr = state.config.addr;
    let router = create_router(state);

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| FulcrumError::Server(format!("Failed to bind {addr}: {e}")))?;
    tracing::info!("Fulcrum server listening on http://{addr}");

    axum::serve(listener, router)
        .await
        .map_err(|e| FulcrumError::Server(format!("Server error: {e}")))
}
