//! HTTP request handlers.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::state::{AppState, RunStatsSummary};
use crate::domain::TriggerRequest;
use crate::error::FulcrumError;
use crate::llm::GatewayStatsSummary;

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        // Health and status
        .route("/health", get(health_check))
        .route("/stats", get(stats))
        // Simulations
        .route("/simulations", post(trigger_simulation))
        .route("/simulations/:id", get(get_simulation))
        .route("/simulations/:id/rounds", get(get_rounds))
        .layer(DefaultBodyLimit::max(state.config.max_body_size));

    if state.config.cors_enabled {
        router = router.layer(CorsLayer::permissive());
    }
    if state.config.logging {
        router = router.layer(TraceLayer::new_for_http());
    }

    router.with_state(state)
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({"success": false, "error": message.into()})),
    )
        .into_response()
}

impl IntoResponse for FulcrumError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        error_response(status, self.to_string())
    }
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    /// Always `ok`
    pub status: &'static str,
    /// Crate version
    pub version: &'static str,
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Stats response
#[derive(Serialize)]
pub struct StatsResponse {
    /// Seconds since start
    pub uptime_secs: u64,
    /// Trigger outcome counters
    pub runs: RunStatsSummary,
    /// Gateway counters, absent for offline engines
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<GatewayStatsSummary>,
}

async fn stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(StatsResponse {
        uptime_secs: state.uptime().as_secs(),
        runs: state.runs.summary(),
        gateway: state.gateway_stats(),
    })
}

/// Run a simulation to completion and return its result.
async fn trigger_simulation(
    State(state): State<Arc<AppState>>,
    body: Result<Json<TriggerRequest>, JsonRejection>,
) -> Response {
    state.runs.record_trigger();

    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => {
            state.runs.record_rejected();
            return error_response(StatusCode::BAD_REQUEST, rejection.body_text());
        },
    };

    match state.engine.trigger(&request).await {
        Ok(result) => {
            state.runs.record_outcome(result.success);
            (StatusCode::OK, Json(result)).into_response()
        },
        Err(e) => {
            if e.is_input_error() {
                state.runs.record_rejected();
            }
            e.into_response()
        },
    }
}

async fn get_simulation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.engine.store().get_simulation(&id).await {
        Ok(Some(record)) => Json(record).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, format!("Simulation not found: {id}")),
        Err(e) => e.into_response(),
    }
}

async fn get_rounds(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let store = state.engine.store();
    match store.get_simulation(&id).await {
        Ok(Some(_)) => match store.get_rounds(&id).await {
            Ok(rounds) => Json(rounds).into_response(),
            Err(e) => e.into_response(),
        },
        Ok(None) => error_response(StatusCode::NOT_FOUND, format!("Simulation not found: {id}")),
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::domain::{EntityProfile, EntityType, Scenario, SimulationConfig};
    use crate::engine::SimulationEngine;
    use crate::server::ServerConfig;
    use crate::store::{CatalogData, InMemoryCatalog, InMemorySimulationStore};

    fn profile(id: &str, name: &str, entity_type: EntityType) -> EntityProfile {
        EntityProfile {
            id: id.into(),
            name: name.into(),
            entity_type,
            industry: Some("retail".into()),
            description: String::new(),
            relevance_score: 0.6,
        }
    }

    fn state() -> Arc<AppState> {
        let catalog = InMemoryCatalog::new(CatalogData {
            scenarios: vec![Scenario {
                id: "price-cut".into(),
                title: "Price cut".into(),
                scenario_type: "announcement".into(),
                action: "Cut prices 20%".into(),
                industry: Some("retail".into()),
                stakeholders: vec!["MegaMart".into(), "Trade Board".into(), "Daily Ledger".into()],
            }],
            entities: vec![
                profile("mm", "MegaMart", EntityType::Company),
                profile("tb", "Trade Board", EntityType::Regulator),
                profile("dl", "Daily Ledger", EntityType::Media),
            ],
            organizations: Vec::new(),
        });
        let engine = SimulationEngine::offline(
            Arc::new(catalog),
            Arc::new(InMemorySimulationStore::new()),
            SimulationConfig {
                max_rounds: 3,
                ..Default::default()
            },
        );
        Arc::new(AppState::new(ServerConfig::default().without_logging(), engine))
    }

    async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn post(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/simulations")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(create_router(state()), get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_trigger_and_fetch() {
        let state = state();
        let router = create_router(state.clone());

        let (status, result) = send(router.clone(), post(r#"{"scenario_id":"price-cut"}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(result["success"], true);
        let rounds = result["rounds_completed"].as_u64().unwrap();
        assert!((2..=3).contains(&rounds));
        assert!(result["fulcrums"].as_array().unwrap().len() <= 8);

        let id = result["simulation_id"].as_str().unwrap().to_string();
        let (status, record) = send(router.clone(), get(&format!("/simulations/{id}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(record["status"], result["status"]);
        assert!(record["completed_at"].is_string());

        let (status, history) = send(router.clone(), get(&format!("/simulations/{id}/rounds"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(history.as_array().unwrap().len() as u64, rounds);

        let (_, stats) = send(router, get("/stats")).await;
        assert_eq!(stats["runs"]["triggered"], 1);
        assert_eq!(stats["runs"]["succeeded"], 1);
        assert!(stats.get("gateway").is_none());
    }

    #[tokio::test]
    async fn test_trigger_errors_are_structured() {
        let state = state();
        let router = create_router(state.clone());

        let (status, body) = send(router.clone(), post("{}")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("scenario_id"));

        let (status, body) = send(router.clone(), post(r#"{"scenario_id":"unknown"}"#)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);

        let (status, _) = send(
            router.clone(),
            post(r#"{"scenario_id":"price-cut","entity_ids":["nobody"]}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(router, post("not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        assert_eq!(state.runs.summary().rejected, 4);
    }

    #[tokio::test]
    async fn test_unknown_simulation() {
        let router = create_router(state());
        let (status, _) = send(router.clone(), get("/simulations/missing")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(router, get("/simulations/missing/rounds")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
