use axum::extract::{Path, State};

use orchestrator_core::OrchestratorError;

use crate::{error::ApiResult, response::success, routes::AppState};

/// 获取任务记录
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let task = state
        .store
        .get_task(&task_id)
        .await?
        .ok_or_else(|| OrchestratorError::task_not_found(&task_id))?;
    Ok(success(task))
}
