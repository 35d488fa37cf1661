//! HTTP routes wrapping the orchestrator and the sentry.
//!
//! Gate rejections are ordinary `200` responses carrying the decision. Only
//! malformed requests (`400`) and a faulted sentry (`503`) are errors, and
//! those come back as structured JSON too.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use gate_common::error::ResultExt;
use gate_common::logging::generate_trace_id;
use serde::{Deserialize, Serialize};

use crate::error::GateError;
use crate::pipeline::{Candidate, Evaluation, Orchestrator};
use crate::sentry::{SentryCheck, SentrySessionState, SentryState, TradeOutcome};

/// Application state.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
        }
    }
}

/// Build the application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Gate evaluation
        .route("/api/v1/risk/evaluate", post(evaluate))
        .route("/api/v1/risk/admit", post(admit))
        // Sentry
        .route("/api/v1/sentry", get(sentry_status))
        .route("/api/v1/sentry/outcome", post(record_outcome))
        .route("/api/v1/sentry/session", post(begin_session))
        .route("/api/v1/sentry/reset", post(operator_reset))
        .with_state(state)
}

// ============================================================================
// Errors
// ============================================================================

/// Error body: `{"error": {"code": ..., "message": ...}}`.
#[derive(Debug)]
pub struct ApiError(gate_common::Error);

impl From<GateError> for ApiError {
    fn from(err: GateError) -> Self {
        Self(err.into())
    }
}

impl From<gate_common::Error> for ApiError {
    fn from(err: gate_common::Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let code = self.0.code();
        if status.is_server_error() {
            tracing::error!(code, error = %self.0, "Request failed");
        } else {
            tracing::warn!(code, error = %self.0, "Request rejected");
        }
        let body = Json(serde_json::json!({
            "error": {
                "code": code,
                "message": self.0.to_string(),
            }
        }));
        (status, body).into_response()
    }
}

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct SentryStatusResponse {
    pub session: SentrySessionState,
    /// Absent while a fault is latched
    pub check: Option<SentryCheck>,
}

#[derive(Debug, Serialize)]
pub struct SentryStateResponse {
    pub state: SentryState,
}

#[derive(Debug, Deserialize)]
pub struct SessionRequest {
    pub date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    pub date: NaiveDate,
    /// Who reviewed the halt
    pub operator: String,
}

// ============================================================================
// Route Handlers
// ============================================================================

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "gate-engine",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Dry-run evaluation; the sentry is only read.
async fn evaluate(
    State(state): State<AppState>,
    Json(candidate): Json<Candidate>,
) -> Result<Json<Evaluation>, ApiError> {
    let trace_id = generate_trace_id();
    tracing::debug!(trace_id = %trace_id, symbol = %candidate.symbol, "Evaluate request");
    let evaluation = state
        .orchestrator
        .evaluate(&candidate)
        .context(format!("evaluating {}", candidate.symbol))?;
    Ok(Json(evaluation))
}

/// Evaluation that reserves risk with the sentry on approval.
async fn admit(
    State(state): State<AppState>,
    Json(candidate): Json<Candidate>,
) -> Result<Json<Evaluation>, ApiError> {
    let trace_id = generate_trace_id();
    tracing::debug!(trace_id = %trace_id, symbol = %candidate.symbol, "Admit request");
    let evaluation = state
        .orchestrator
        .admit(&candidate)
        .context(format!("admitting {}", candidate.symbol))?;
    Ok(Json(evaluation))
}

async fn sentry_status(State(state): State<AppState>) -> Result<Json<SentryStatusResponse>, ApiError> {
    let sentry = state.orchestrator.sentry();
    let session = sentry.snapshot()?;
    let check = sentry.check().ok();
    Ok(Json(SentryStatusResponse { session, check }))
}

async fn record_outcome(
    State(state): State<AppState>,
    Json(outcome): Json<TradeOutcome>,
) -> Result<Json<SentryStateResponse>, ApiError> {
    let state = state.orchestrator.sentry().record_outcome(&outcome)?;
    Ok(Json(SentryStateResponse { state }))
}

async fn begin_session(
    State(state): State<AppState>,
    Json(request): Json<SessionRequest>,
) -> Result<Json<SentryStateResponse>, ApiError> {
    let state = state.orchestrator.sentry().begin_session(request.date)?;
    Ok(Json(SentryStateResponse { state }))
}

async fn operator_reset(
    State(state): State<AppState>,
    Json(request): Json<ResetRequest>,
) -> Result<Json<SentrySessionState>, ApiError> {
    if request.operator.trim().is_empty() {
        return Err(GateError::input("operator is required for a reset").into());
    }
    tracing::warn!(operator = %request.operator, session = %request.date, "Operator reset requested");
    Ok(Json(state.orchestrator.sentry().operator_reset(request.date)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::fixtures::candidate;
    use crate::sentry::Sentry;
    use axum::body::Body;
    use axum::http::Request;
    use gate_common::config::ThresholdsConfig;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let thresholds = ThresholdsConfig::default();
        let sentry = Arc::new(Sentry::new(
            thresholds.sentry.clone(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        ));
        AppState::new(Orchestrator::new(thresholds, sentry).unwrap())
    }

    fn post_json(uri: &str, body: &serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let response = build_router(test_state())
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_evaluate_returns_decision() {
        let body = serde_json::to_value(candidate()).unwrap();
        let response = build_router(test_state())
            .oneshot(post_json("/api/v1/risk/evaluate", &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["decision"]["decision"], "EXECUTE");
        assert_eq!(json["decision"]["shares"], 1900);
    }

    #[tokio::test]
    async fn test_rejection_is_structured() {
        let mut c = candidate();
        c.snapshot.fear_index = Some(35.0);
        let body = serde_json::to_value(c).unwrap();
        let response = build_router(test_state())
            .oneshot(post_json("/api/v1/risk/evaluate", &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["decision"]["decision"], "REJECT");
        assert_eq!(json["decision"]["stage"], "macro");
        assert_eq!(json["decision"]["reason"], "macro:fear_index");
    }

    #[tokio::test]
    async fn test_halt_and_session_over_http() {
        let state = test_state();
        let app = build_router(state.clone());

        let response = app
            .clone()
            .oneshot(post_json("/api/v1/sentry/outcome", &serde_json::json!({"pnl_pct": -2.1})))
            .await
            .unwrap();
        assert_eq!(json_body(response).await["state"], "DAILY_HALT");

        let body = serde_json::to_value(candidate()).unwrap();
        let response = app.clone().oneshot(post_json("/api/v1/risk/evaluate", &body)).await.unwrap();
        assert_eq!(json_body(response).await["decision"]["reason"], "sentry:halt");

        let response = app
            .clone()
            .oneshot(post_json("/api/v1/sentry/session", &serde_json::json!({"date": "2024-02-01"})))
            .await
            .unwrap();
        assert_eq!(json_body(response).await["state"], "NORMAL");

        let response = app
            .oneshot(Request::builder().uri("/api/v1/sentry").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = json_body(response).await;
        assert_eq!(json["session"]["session_date"], "2024-02-01");
        assert_eq!(json["check"]["state"], "NORMAL");
    }

    #[tokio::test]
    async fn test_fault_maps_to_service_unavailable() {
        let state = test_state();
        state
            .orchestrator
            .sentry()
            .with_state(|s| s.fault = Some("corrupted".into()));
        let app = build_router(state);

        let body = serde_json::to_value(candidate()).unwrap();
        let response = app.clone().oneshot(post_json("/api/v1/risk/admit", &body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json_body(response).await["error"]["code"], "SENTRY_FAULT");

        let response = app
            .clone()
            .oneshot(post_json(
                "/api/v1/sentry/reset",
                &serde_json::json!({"date": "2024-02-01", "operator": ""}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(post_json(
                "/api/v1/sentry/reset",
                &serde_json::json!({"date": "2024-02-01", "operator": "risk-desk"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["state"], "NORMAL");
    }
}
