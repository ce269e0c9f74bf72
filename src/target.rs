//! Demo backend with one guarded and one unguarded endpoint.

use anyhow::Context;
use axum::Json;
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::config::TargetConfig;
use crate::error::AppError;
use crate::limiter::{METRIC_NAMES, PolicyRegistry, ResiliencePolicy};
use crate::models::{ActuatorMetric, AvailableTag, Measurement, MetricNames};

const POLICY_TAG: &str = "policy";

pub struct TargetState {
    registry: PolicyRegistry,
    work: Duration,
}

impl TargetState {
    pub fn new(config: &TargetConfig) -> Self {
        Self {
            registry: PolicyRegistry::from_config(config),
            work: config.work,
        }
    }

    pub fn registry(&self) -> &PolicyRegistry {
        &self.registry
    }
}

pub type SharedTargetState = Arc<TargetState>;

pub fn build_router(state: SharedTargetState) -> Router {
    Router::new()
        .route("/demo/protected", get(protected))
        .route("/demo/protected/{policy}", get(protected_by))
        .route("/demo/unprotected", get(unprotected))
        .route("/actuator/metrics", get(metric_names))
        .route("/actuator/metrics/{name}", get(metric))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the demo target until Ctrl+C
pub async fn serve(config: TargetConfig) -> anyhow::Result<()> {
    let state = Arc::new(TargetState::new(&config));
    let router = build_router(state.clone());

    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .context(format!("Failed to bind {}", config.addr))?;
    info!(
        "Demo target listening on http://{} (policies: {})",
        config.addr,
        state.registry.names().join(", "),
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(crate::server::shutdown_signal())
        .await?;

    info!("Demo target shutting down");
    Ok(())
}

async fn simulate_work(work: Duration) {
    if !work.is_zero() {
        tokio::time::sleep(work).await;
    }
}

async fn protected(State(state): State<SharedTargetState>) -> Response {
    guarded(&state, state.registry.default_policy()).await
}

/// Guarded by the named policy, or the default one if it does not exist
async fn protected_by(
    State(state): State<SharedTargetState>,
    Path(policy): Path<String>,
) -> Response {
    guarded(&state, state.registry.get_or_default(&policy)).await
}

async fn guarded(state: &TargetState, policy: Arc<ResiliencePolicy>) -> Response {
    let work = state.work;
    let outcome = policy
        .execute(async move {
            simulate_work(work).await;
            Ok::<_, Infallible>(())
        })
        .await;

    match outcome {
        Ok(_) => (
            StatusCode::OK,
            format!("PROTECTED (bulkhead + rate limit on {})", policy.name()),
        )
            .into_response(),
        Err(e) if e.is_bulkhead() => {
            debug!(event = "bulkhead_rejected", policy = policy.name(), reason = %e, "Rejected protected call");
            (StatusCode::SERVICE_UNAVAILABLE, "Service busy, try again later.").into_response()
        }
        Err(e) => {
            debug!(event = "rate_limited", policy = policy.name(), reason = %e, "Rejected protected call");
            (StatusCode::TOO_MANY_REQUESTS, "Too many requests, try again later.").into_response()
        }
    }
}

async fn unprotected(State(state): State<SharedTargetState>) -> &'static str {
    simulate_work(state.work).await;
    "UNPROTECTED"
}

async fn metric_names() -> Json<MetricNames> {
    Json(MetricNames {
        names: METRIC_NAMES.iter().map(|n| n.to_string()).collect(),
    })
}

#[derive(Debug, Deserialize)]
struct MetricQuery {
    /// `key:value`, e.g. `policy:default`
    tag: Option<String>,
}

async fn metric(
    State(state): State<SharedTargetState>,
    Path(name): Path<String>,
    Query(query): Query<MetricQuery>,
) -> Result<Json<ActuatorMetric>, AppError> {
    let policy = match query.tag.as_deref() {
        None => None,
        Some(tag) => {
            let (key, value) = tag
                .split_once(':')
                .ok_or_else(|| AppError::BadRequest(format!("Invalid tag: {}", tag)))?;
            if key != POLICY_TAG {
                return Err(AppError::NotFound(format!("Unknown tag: {}", key)));
            }
            Some(value)
        }
    };

    let value = state
        .registry
        .metric(&name, policy)
        .ok_or_else(|| match policy {
            Some(p) if state.registry.get(p).is_err() => AppError::NotFound(format!("Unknown policy: {}", p)),
            _ => AppError::NotFound(format!("Unknown metric: {}", name)),
        })?;

    // Tags already used as a filter are not offered again
    let available_tags = match policy {
        Some(_) => Vec::new(),
        None => vec![AvailableTag {
            tag: POLICY_TAG.to_string(),
            values: state.registry.names(),
        }],
    };

    Ok(Json(ActuatorMetric {
        name,
        measurements: vec![Measurement {
            statistic: "VALUE".to_string(),
            value: serde_json::json!(value),
        }],
        available_tags,
    }))
}
