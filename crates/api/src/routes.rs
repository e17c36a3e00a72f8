use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use orchestrator_dispatcher::{ChainEngine, ExternalModuleBridge, ModuleDispatcher, ModuleRegistry};
use orchestrator_domain::ports::{FileStorage, TaskStore};

use crate::handlers::{
    chains::{create_chain, get_chain, get_chain_execution, list_chains, run_chain},
    external_modules::{
        deregister_external_module, get_external_module, get_external_module_files,
        heartbeat_external_module, list_external_modules, register_external_module,
    },
    files::register_file,
    health::health_check,
    modules::{list_modules, run_module},
    results::{get_result, put_result},
    tasks::get_task,
};

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TaskStore>,
    pub file_storage: Arc<dyn FileStorage>,
    pub registry: Arc<ModuleRegistry>,
    pub dispatcher: Arc<ModuleDispatcher>,
    pub bridge: Arc<ExternalModuleBridge>,
    pub chain_engine: Arc<ChainEngine>,
}

/// 创建API路由
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        // 健康检查
        .route("/health", get(health_check))
        // 模块与任务
        .route("/api/modules", get(list_modules))
        .route("/api/modules/{name}/run", post(run_module))
        .route("/api/tasks/{task_id}", get(get_task))
        .route(
            "/api/results/{module}/{file_hash}",
            get(get_result).put(put_result),
        )
        .route("/api/files", post(register_file))
        // 链
        .route("/api/chains", get(list_chains).post(create_chain))
        .route("/api/chains/{name}", get(get_chain))
        .route("/api/chains/{name}/run", post(run_chain))
        .route("/api/chain-executions/{id}", get(get_chain_execution))
        // 外部模块
        .route(
            "/api/external-modules/register",
            post(register_external_module),
        )
        .route("/api/external-modules", get(list_external_modules))
        .route(
            "/api/external-modules/{id}",
            get(get_external_module).delete(deregister_external_module),
        )
        .route(
            "/api/external-modules/{id}/heartbeat",
            post(heartbeat_external_module),
        )
        .route(
            "/api/external-modules/{id}/files",
            get(get_external_module_files),
        )
        .with_state(state)
}
