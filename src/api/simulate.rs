//! 模拟 API
//!
//! 包含 /simulate 端点

use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    routing::post,
    Json, Router,
};
use std::sync::Arc;

use crate::config::env::constants::UPLOAD_FIELD;
use crate::domain::SimulateResponse;
use crate::error::{ApiError, ApiResult};
use crate::services::run_pipeline;
use crate::state::AppState;

/// 创建模拟路由
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/simulate", post(simulate))
}

/// 上传 INP 文件并运行模拟
///
/// POST /simulate (multipart/form-data, 字段 `inp_file`)
async fn simulate(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<SimulateResponse>> {
    let mut multipart = multipart.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let bytes = read_upload(&mut multipart).await?;

    let engine = state.engine.clone();
    let upload_dir = state.config.upload_dir.clone();
    let response = tokio::task::spawn_blocking(move || {
        run_pipeline(engine.as_ref(), &bytes, &upload_dir)
    })
    .await
    .map_err(|e| ApiError::internal(format!("Simulation error: {}", e)))??;

    Ok(Json(response))
}

/// 读取 `inp_file` 字段的全部内容，忽略其他字段
async fn read_upload(multipart: &mut Multipart) -> ApiResult<Vec<u8>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed multipart body: {}", e.body_text())))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        tracing::debug!(file_name = ?field.file_name(), "Receiving upload");
        let bytes = field.bytes().await.map_err(|e| {
            ApiError::bad_request(format!("Failed to read upload: {}", e.body_text()))
        })?;
        return Ok(bytes.to_vec());
    }
    Err(ApiError::missing_field(UPLOAD_FIELD))
}
