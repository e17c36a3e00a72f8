use axum::{
    extract::{Path, State},
    Json,
};
use tracing::info;

use orchestrator_core::OrchestratorError;
use orchestrator_domain::entities::{ResultStatus, TaskResult};

use crate::{
    error::{ApiError, ApiResult},
    response::success,
    routes::AppState,
};

pub async fn get_result(
    State(state): State<AppState>,
    Path((module, file_hash)): Path<(String, String)>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let result = state
        .store
        .get_result(&module, &file_hash)
        .await?
        .ok_or(OrchestratorError::ResultNotFound {
            module_name: module,
            file_hash,
        })?;
    Ok(success(result))
}

/// 外部模块回写分析结果
///
/// 结果时间戳以服务端为准，避免远端时钟偏差影响结果归属判断。
pub async fn put_result(
    State(state): State<AppState>,
    Path((module, file_hash)): Path<(String, String)>,
    Json(mut result): Json<TaskResult>,
) -> ApiResult<impl axum::response::IntoResponse> {
    if state.registry.route(&module).await.is_none() {
        return Err(OrchestratorError::module_not_found(&module).into());
    }
    if result.status == ResultStatus::Error && result.error.is_none() {
        return Err(ApiError::BadRequest(
            "error results must carry an error message".to_string(),
        ));
    }

    result.updated_at = chrono::Utc::now();
    state.store.put_result(&module, &file_hash, &result).await?;
    info!(
        module = %module,
        file_hash = %file_hash,
        status = result.status.as_str(),
        "Result stored via API"
    );
    Ok(success(result))
}
