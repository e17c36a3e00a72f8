use std::time::Duration;

use async_trait::async_trait;
use orchestrator_core::OrchestratorResult;

use crate::entities::{Task, TaskResult};

/// 任务存储与模块队列
///
/// `dequeue` 必须是原子的：同一个任务ID只会交给一个调用方。
/// `put_result` 按 (module_name, file_hash) 覆盖写入。
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn create_task(&self, task: &Task) -> OrchestratorResult<String>;
    async fn enqueue(&self, module_name: &str, task_id: &str) -> OrchestratorResult<()>;
    async fn dequeue(&self, module_name: &str) -> OrchestratorResult<Option<String>>;
    async fn get_task(&self, task_id: &str) -> OrchestratorResult<Option<Task>>;
    async fn put_result(
        &self,
        module_name: &str,
        file_hash: &str,
        result: &TaskResult,
    ) -> OrchestratorResult<()>;
    async fn get_result(
        &self,
        module_name: &str,
        file_hash: &str,
    ) -> OrchestratorResult<Option<TaskResult>>;
    async fn queue_len(&self, module_name: &str) -> OrchestratorResult<usize>;

    /// 等待存储发生变化，最长等待 `max_wait`
    ///
    /// 不支持通知的后端直接休眠 `max_wait`。
    async fn wait_for_activity(&self, max_wait: Duration) {
        tokio::time::sleep(max_wait).await;
    }

    fn backend_name(&self) -> &'static str;
}
