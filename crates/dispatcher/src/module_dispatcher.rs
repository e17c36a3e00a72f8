use std::sync::Arc;

use tracing::{info, warn};

use orchestrator_core::{OrchestratorError, OrchestratorResult};
use orchestrator_domain::entities::{StoredFile, Task};
use orchestrator_domain::ports::{ExternalDispatcher, TaskStore};

use crate::registry::{ModuleRegistry, ModuleRoute};

/// 创建任务并把它路由到内置模块队列或外部模块
pub struct ModuleDispatcher {
    store: Arc<dyn TaskStore>,
    registry: Arc<ModuleRegistry>,
    external: Arc<dyn ExternalDispatcher>,
    public_url: String,
}

impl ModuleDispatcher {
    pub fn new(
        store: Arc<dyn TaskStore>,
        registry: Arc<ModuleRegistry>,
        external: Arc<dyn ExternalDispatcher>,
        public_url: &str,
    ) -> Self {
        Self {
            store,
            registry,
            external,
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    /// 外部模块拉取归档的地址
    pub fn files_url(&self, module_id: &str, file_hash: &str) -> String {
        format!(
            "{}/api/external-modules/{module_id}/files?file_ids={file_hash}",
            self.public_url
        )
    }

    pub async fn dispatch(
        &self,
        module_name: &str,
        file: &StoredFile,
        parameters: serde_json::Value,
    ) -> OrchestratorResult<Task> {
        let route = self
            .registry
            .route(module_name)
            .await
            .ok_or_else(|| OrchestratorError::module_not_found(module_name))?;

        match route {
            ModuleRoute::Builtin(_) => {
                let task = Task::new(module_name, file, parameters);
                self.store.create_task(&task).await?;
                self.store.enqueue(module_name, &task.task_id).await?;
                metrics::counter!("orchestrator_tasks_enqueued_total").increment(1);
                info!(
                    module = %module_name,
                    task_id = %task.task_id,
                    file_hash = %task.file_hash,
                    queue = %task.queue_name(),
                    "Task enqueued"
                );
                Ok(task)
            }
            ModuleRoute::External(_) => {
                let module = self.registry.ensure_deliverable(module_name).await?;
                let task = Task::new(module_name, file, parameters);
                self.store.create_task(&task).await?;

                let files_url = self.files_url(&module.module_id, &task.file_hash);
                if let Err(e) = self.external.dispatch(&module, &task, &files_url).await {
                    warn!(
                        module = %module_name,
                        task_id = %task.task_id,
                        "External dispatch failed: {}",
                        e
                    );
                    self.registry
                        .mark_error(module_name, &format!("dispatch failed: {e}"))
                        .await;
                    return Err(e);
                }
                info!(
                    module = %module_name,
                    task_id = %task.task_id,
                    file_hash = %task.file_hash,
                    "Task handed to external module"
                );
                Ok(task)
            }
        }
    }
}
