//! # Orchestrator API
//!
//! 分析模块编排系统的 REST 接口，基于 Axum 构建。
//!
//! ## API 端点
//!
//! ### 模块与任务
//! - `GET /api/modules` - 内置模块与外部模块列表
//! - `POST /api/modules/{name}/run` - 直接触发单个模块
//! - `GET /api/tasks/{task_id}` - 任务记录
//! - `GET|PUT /api/results/{module}/{file_hash}` - 读取或回写分析结果
//! - `POST /api/files` - 登记文件存储元数据
//!
//! ### 链
//! - `GET|POST /api/chains`, `GET /api/chains/{name}`
//! - `POST /api/chains/{name}/run` - 触发链执行
//! - `GET /api/chain-executions/{id}` - 执行记录及各步骤
//!
//! ### 外部模块
//! - `POST /api/external-modules/register`
//! - `GET /api/external-modules?active_only=`
//! - `GET|DELETE /api/external-modules/{id}`
//! - `POST /api/external-modules/{id}/heartbeat`
//! - `GET /api/external-modules/{id}/files?file_ids=a,b` - 文件归档
//!
//! 所有 JSON 响应使用 `{success, data, message?, timestamp}` 封装，
//! 错误使用 `{"error": {message, type, code, timestamp}}`。

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;

use axum::Router;
use tower::ServiceBuilder;

use orchestrator_core::config::ApiConfig;

use crate::middleware::{cors_layer, request_logging, trace_layer};
pub use crate::routes::{create_routes, AppState};

/// 创建完整的API应用
pub fn create_app(state: AppState, api_config: &ApiConfig) -> Router {
    let router = create_routes(state).layer(
        ServiceBuilder::new()
            .layer(trace_layer())
            .layer(axum::middleware::from_fn(request_logging)),
    );

    if api_config.cors_enabled {
        router.layer(cors_layer())
    } else {
        router
    }
}
