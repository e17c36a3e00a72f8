use async_trait::async_trait;
use orchestrator_core::OrchestratorResult;

use crate::entities::{ExternalModule, Task};

/// 将任务交给外部模块，外部模块通过 `files_url` 拉取文件归档
#[async_trait]
pub trait ExternalDispatcher: Send + Sync {
    async fn dispatch(
        &self,
        module: &ExternalModule,
        task: &Task,
        files_url: &str,
    ) -> OrchestratorResult<()>;

    async fn check_health(&self, healthcheck_url: &str) -> OrchestratorResult<()>;
}
