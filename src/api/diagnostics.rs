//! 诊断与健康检查 API
//!
//! 包含 /, /test_import, /health 端点

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

use crate::config::env::constants::{SERVICE_NAME, VERSION};
use crate::state::AppState;

/// 健康检查响应
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    engine: &'static str,
    started_at: String,
    timestamp: String,
}

/// 创建诊断路由
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(test_import))
        .route("/test_import", get(test_import))
        .route("/health", get(health_check))
}

/// 引擎自检
///
/// GET /, GET /test_import
/// 自检失败时返回 500 和 `{"error": ...}`
async fn test_import(State(state): State<Arc<AppState>>) -> Response {
    let engine = state.engine.clone();
    let result = tokio::task::spawn_blocking(move || engine.self_check())
        .await
        .unwrap_or_else(|e| Err(format!("self-check task failed: {}", e)));

    match result {
        Ok(()) => Json(serde_json::json!({ "message": "WNTR imported successfully" })).into_response(),
        Err(error) => {
            tracing::error!(engine = state.engine.name(), "Engine self-check failed: {}", error);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": error })),
            )
                .into_response()
        }
    }
}

/// 健康检查
///
/// GET /health
async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        service: SERVICE_NAME,
        version: VERSION,
        engine: state.engine.name(),
        started_at: state.started_at.to_rfc3339(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}
