use axum::{extract::State, Json};

use orchestrator_domain::entities::StoredFile;

use crate::{error::ApiResult, response::created, routes::AppState};

/// 登记已上传文件的存储元数据
pub async fn register_file(
    State(state): State<AppState>,
    Json(file): Json<StoredFile>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let file = state.file_storage.register(file).await?;
    Ok(created(file))
}
