use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use tracing::info;

use orchestrator_core::OrchestratorError;

use crate::{
    error::ApiResult,
    response::{accepted, success},
    routes::AppState,
};

/// 直接触发单个模块的请求
#[derive(Debug, Deserialize)]
pub struct RunModuleRequest {
    pub file_hash: String,
    #[serde(default)]
    pub parameters: Option<serde_json::Value>,
}

/// 列出内置与外部模块
pub async fn list_modules(
    State(state): State<AppState>,
) -> ApiResult<impl axum::response::IntoResponse> {
    Ok(success(state.registry.modules().await))
}

pub async fn run_module(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<RunModuleRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let file = state
        .file_storage
        .resolve(&request.file_hash)
        .await?
        .ok_or_else(|| OrchestratorError::FileNotFound {
            file_id: request.file_hash.clone(),
        })?;

    let parameters = request
        .parameters
        .unwrap_or_else(|| serde_json::Value::Object(Default::default()));
    let task = state.dispatcher.dispatch(&name, &file, parameters).await?;
    info!(module = %name, task_id = %task.task_id, "Module run requested via API");

    Ok(accepted(task, "task dispatched"))
}
