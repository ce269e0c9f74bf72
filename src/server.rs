use anyhow::Context;
use axum::Json;
use axum::Router;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::LoadRunnerBuilder;
use crate::actuator::MetricsRelay;
use crate::attack::LoadRunner;
use crate::config::{MAX_REQUESTS, MIN_REQUESTS, ServerConfig};
use crate::error::AppError;
use crate::models::{MetricValue, RequestLog, RunSummary, RunTestRequest, TestRunRecord};
use crate::storage::ResultStore;
use crate::utils::parse_target_url;

/// State shared by the dashboard routes
pub struct AppState {
    pub runner: LoadRunner,
    pub store: ResultStore,
    pub relay: MetricsRelay,
    /// Actuator URL used when a metric request names none
    pub actuator_url: String,
    pub history_limit: usize,
}

impl AppState {
    pub fn new(config: &ServerConfig) -> anyhow::Result<Self> {
        let runner = LoadRunnerBuilder::new()
            .timeout(config.probe.timeout)
            .max_idle_connections(config.probe.max_idle_connections)
            .build()?;

        Ok(Self {
            runner,
            store: ResultStore::new(),
            relay: MetricsRelay::new(config.actuator_timeout)?,
            actuator_url: config.actuator_url.clone(),
            history_limit: config.history_limit,
        })
    }
}

pub type SharedState = Arc<AppState>;

pub fn build_router(state: SharedState, config: &ServerConfig) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut router = Router::new()
        .route("/health", get(health))
        // Load runs
        .route("/api/test/run", post(run_test))
        .route("/api/test/history", get(test_history))
        .route("/api/test/history/{id}/requests", get(request_logs))
        // Actuator relay
        .route("/api/metrics/list", get(metrics_list))
        .route("/api/metrics/{name}", get(metric))
        .with_state(state);

    if let Some(dir) = &config.static_dir {
        router = router.fallback_service(ServeDir::new(dir));
    }

    router.layer(cors).layer(TraceLayer::new_for_http())
}

/// Run the dashboard API until Ctrl+C
pub async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    let state = Arc::new(AppState::new(&config)?);
    let router = build_router(state, &config);

    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .context(format!("Failed to bind {}", config.addr))?;
    info!("Dashboard listening on http://{}", config.addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Dashboard shutting down");
    Ok(())
}

pub(crate) async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// A run request that passed validation
#[derive(Debug, PartialEq)]
pub struct ValidRun {
    pub url: String,
    pub num_requests: usize,
    pub kind: String,
}

/// Check a run request
pub fn validate_run(request: RunTestRequest) -> Result<ValidRun, AppError> {
    let missing = || AppError::BadRequest("Missing required parameters".to_string());

    let url = request.url.filter(|u| !u.trim().is_empty()).ok_or_else(missing)?;
    let num_requests = request.num_requests.filter(|n| *n != 0).ok_or_else(missing)?;
    let kind = request.kind.filter(|k| !k.trim().is_empty()).ok_or_else(missing)?;

    if !(MIN_REQUESTS..=MAX_REQUESTS).contains(&num_requests) {
        return Err(AppError::BadRequest(format!(
            "Number of requests must be between {} and {}",
            MIN_REQUESTS, MAX_REQUESTS
        )));
    }

    parse_target_url(&url).map_err(|e| AppError::BadRequest(e.to_string()))?;

    Ok(ValidRun {
        url: url.trim().to_string(),
        num_requests: num_requests as usize,
        kind: kind.trim().to_string(),
    })
}

async fn run_test(
    State(state): State<SharedState>,
    payload: Result<Json<RunTestRequest>, JsonRejection>,
) -> Result<Json<RunSummary>, AppError> {
    let Json(request) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let run = validate_run(request)?;

    let summary = state
        .runner
        .run(&run.url, run.num_requests, &run.kind)
        .await
        .map_err(|e| {
            error!(event = "run_failed", url = run.url.as_str(), error = %e, "Error running test");
            AppError::Internal("Failed to run test".to_string())
        })?;

    state.store.save_test_run(&summary).await;

    Ok(Json(summary))
}

async fn test_history(State(state): State<SharedState>) -> Json<Vec<TestRunRecord>> {
    Json(state.store.recent_test_runs(state.history_limit).await)
}

async fn request_logs(
    State(state): State<SharedState>,
    Path(id): Path<u64>,
) -> Result<Json<Vec<RequestLog>>, AppError> {
    state
        .store
        .request_logs(id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Test run {} not found", id)))
}

#[derive(Debug, Deserialize)]
struct ActuatorQuery {
    url: Option<String>,
    tag: Option<String>,
}

async fn metrics_list(
    State(state): State<SharedState>,
    Query(query): Query<ActuatorQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let url = query
        .url
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("Actuator URL is required".to_string()))?;

    Ok(Json(state.relay.list(&url).await?))
}

async fn metric(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    Query(query): Query<ActuatorQuery>,
) -> Result<Json<MetricValue>, AppError> {
    let url = query
        .url
        .filter(|u| !u.trim().is_empty())
        .unwrap_or_else(|| state.actuator_url.clone());
    let tag = query.tag.as_deref().filter(|t| !t.trim().is_empty());

    Ok(Json(state.relay.metric(&name, &url, tag).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(url: Option<&str>, num_requests: Option<i64>, kind: Option<&str>) -> RunTestRequest {
        RunTestRequest {
            url: url.map(str::to_string),
            num_requests,
            kind: kind.map(str::to_string),
        }
    }

    #[test]
    fn test_validate_accepts_bounds() {
        for n in [1, 1000] {
            let run = validate_run(request(Some("http://localhost:8080/demo"), Some(n), Some("protected"))).unwrap();
            assert_eq!(run.num_requests, n as usize);
            assert_eq!(run.kind, "protected");
        }
    }

    #[test]
    fn test_validate_rejects_missing_fields() {
        let cases = [
            request(None, Some(10), Some("protected")),
            request(Some(""), Some(10), Some("protected")),
            request(Some("http://localhost"), None, Some("protected")),
            request(Some("http://localhost"), Some(0), Some("protected")),
            request(Some("http://localhost"), Some(10), None),
            request(Some("http://localhost"), Some(10), Some(" ")),
        ];

        for case in cases {
            match validate_run(case) {
                Err(AppError::BadRequest(msg)) => assert_eq!(msg, "Missing required parameters"),
                other => panic!("expected bad request, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        for n in [-5, 1001] {
            match validate_run(request(Some("http://localhost"), Some(n), Some("protected"))) {
                Err(AppError::BadRequest(msg)) => assert!(msg.contains("between 1 and 1000")),
                other => panic!("expected bad request, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_validate_trims_fields() {
        let run = validate_run(request(Some(" http://localhost:8080/demo "), Some(3), Some(" protected "))).unwrap();
        assert_eq!(run.url, "http://localhost:8080/demo");
        assert_eq!(run.kind, "protected");
        assert!(ResultStore::records(&run.kind));
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let result = validate_run(request(Some("localhost:8080"), Some(5), Some("protected")));
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }
}
