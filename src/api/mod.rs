//! API 模块
//!
//! HTTP handlers 和路由组装

pub mod diagnostics;
pub mod simulate;

use axum::{extract::DefaultBodyLimit, Router};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::error::ApiError;
use crate::state::AppState;

/// 构建完整的 API 路由
///
/// 静态目录只在构建时检查一次，之后新建的目录不会被挂载。
pub fn router(state: Arc<AppState>) -> Router {
    let config = &state.config;
    let mut router = Router::new()
        // Diagnostics & Health
        .merge(diagnostics::router())
        // Simulation
        .merge(simulate::router());

    if config.static_dir.is_dir() {
        tracing::info!(dir = %config.static_dir.display(), "Mounting /static");
        router = router.nest_service("/static", ServeDir::new(&config.static_dir));
    }
    if config.well_known_dir.is_dir() {
        tracing::info!(dir = %config.well_known_dir.display(), "Mounting /well-known");
        router = router.nest_service("/well-known", ServeDir::new(&config.well_known_dir));
    }

    let body_limit = config.max_upload_bytes;
    router
        .fallback(not_found)
        // Middleware
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn not_found() -> ApiError {
    ApiError::not_found("Not Found")
}
