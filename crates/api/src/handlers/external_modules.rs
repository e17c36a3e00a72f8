use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use orchestrator_core::OrchestratorError;
use orchestrator_dispatcher::ARCHIVE_CONTENT_TYPE;
use orchestrator_domain::entities::ExternalModuleRegistration;

use crate::{
    error::{ApiError, ApiResult},
    response::{created, success},
    routes::AppState,
};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub active_only: bool,
}

#[derive(Debug, Deserialize)]
pub struct FilesQuery {
    /// 逗号分隔的文件ID
    pub file_ids: Option<String>,
}

pub async fn register_external_module(
    State(state): State<AppState>,
    Json(registration): Json<ExternalModuleRegistration>,
) -> ApiResult<impl IntoResponse> {
    Ok(created(state.registry.register(registration).await?))
}

pub async fn list_external_modules(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<impl IntoResponse> {
    Ok(success(state.registry.list(query.active_only).await))
}

pub async fn get_external_module(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(success(state.registry.get(&id).await?))
}

pub async fn heartbeat_external_module(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    if !state.registry.heartbeat(&id).await {
        return Err(OrchestratorError::module_not_found(&id).into());
    }
    Ok(success(json!({"status": "ok"})))
}

pub async fn deregister_external_module(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    if !state.registry.deregister(&id).await {
        return Err(OrchestratorError::module_not_found(&id).into());
    }
    Ok(success(json!({"module_id": id, "deleted": true})))
}

/// 以 gzip 压缩的 tar 归档返回请求的文件
pub async fn get_external_module_files(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<FilesQuery>,
) -> ApiResult<impl IntoResponse> {
    let file_ids: Vec<String> = query
        .file_ids
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if file_ids.is_empty() {
        return Err(ApiError::BadRequest(
            "file_ids query parameter is required".to_string(),
        ));
    }

    let archive = state.bridge.get_files_for_module(&id, &file_ids).await?;
    let disposition = format!("attachment; filename=\"{}\"", archive.file_name(&id));

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, ARCHIVE_CONTENT_TYPE.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        archive.bytes,
    ))
}
