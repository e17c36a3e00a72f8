use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;

use orchestrator_domain::entities::Chain;

use crate::{
    error::ApiResult,
    response::{accepted, created, success},
    routes::AppState,
};

/// 链触发请求
#[derive(Debug, Deserialize)]
pub struct RunChainRequest {
    pub file_hash: String,
}

pub async fn list_chains(
    State(state): State<AppState>,
) -> ApiResult<impl axum::response::IntoResponse> {
    Ok(success(state.chain_engine.list_chains().await?))
}

pub async fn create_chain(
    State(state): State<AppState>,
    Json(chain): Json<Chain>,
) -> ApiResult<impl axum::response::IntoResponse> {
    Ok(created(state.chain_engine.register_chain(chain).await?))
}

pub async fn get_chain(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<impl axum::response::IntoResponse> {
    Ok(success(state.chain_engine.get_chain(&name).await?))
}

/// 触发链执行，立即返回 pending 状态的执行记录
pub async fn run_chain(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<RunChainRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let execution = state
        .chain_engine
        .trigger(&name, &request.file_hash)
        .await?;
    Ok(accepted(execution, "chain execution started"))
}

pub async fn get_chain_execution(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl axum::response::IntoResponse> {
    Ok(success(state.chain_engine.get_execution(&id).await?))
}
