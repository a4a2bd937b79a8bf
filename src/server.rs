//! HTTP interface
//!
//! `POST /api/analyze` with `{"code": "..."}` runs one analysis and answers
//! with the response envelope. The analysis runs on the blocking pool; if
//! the client goes away the handler future is dropped, which cancels the
//! run and removes its staged file.

use crate::engine::{AnalysisEngine, AnalysisError, AnalysisResponse, ResultProjector};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Request body of `POST /api/analyze`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub code: String,
}

/// Shared state of the HTTP handlers
#[derive(Clone)]
pub struct AppState {
    engine: Arc<AnalysisEngine>,
    projector: ResultProjector,
}

impl AppState {
    pub fn new(engine: AnalysisEngine, projector: ResultProjector) -> Self {
        Self {
            engine: Arc::new(engine),
            projector,
        }
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/analyze", post(analyze))
        .with_state(state)
}

/// Status code for a run-level failure
fn status_for(error: &AnalysisError) -> StatusCode {
    match error {
        AnalysisError::AllRulesFailed { .. } => StatusCode::BAD_REQUEST,
        AnalysisError::Staging(_) | AnalysisError::Cancelled => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn analyze(
    State(state): State<AppState>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> (StatusCode, Json<AnalysisResponse>) {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            let detail = rejection.body_text();
            tracing::debug!(error = %detail, "rejected request body");
            return (
                StatusCode::BAD_REQUEST,
                Json(state.projector.invalid_request(&detail)),
            );
        }
    };

    let start = Instant::now();
    let bytes = request.code.len();

    // Dropped together with this future, which disconnects the receiver
    let (_cancel, cancel_rx) = crossbeam_channel::bounded::<()>(1);
    let engine = Arc::clone(&state.engine);
    let joined = tokio::task::spawn_blocking(move || {
        engine.analyze_with_cancel(&request.code, &cancel_rx)
    })
    .await;

    match joined {
        Ok(Ok(report)) => {
            tracing::info!(
                bytes,
                findings = report.findings.len(),
                rule_errors = report.rule_errors.len(),
                duration_ms = start.elapsed().as_millis() as u64,
                "analyzed snippet"
            );
            (StatusCode::OK, Json(state.projector.success(&report)))
        }
        Ok(Err(error)) => {
            tracing::warn!(bytes, error = %error, "analysis failed");
            (status_for(&error), Json(state.projector.failure(&error)))
        }
        Err(error) => {
            tracing::error!(error = %error, "analysis task failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(state.projector.failure(&error)),
            )
        }
    }
}

/// Bind and serve until Ctrl+C
pub async fn serve(host: &str, port: u16, state: AppState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    tracing::info!(address = %listener.local_addr()?, "server is running");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
