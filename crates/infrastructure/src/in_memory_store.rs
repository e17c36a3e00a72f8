use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use orchestrator_core::OrchestratorResult;
use orchestrator_domain::entities::{module_queue_name, Task, TaskResult};
use orchestrator_domain::ports::TaskStore;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::debug;

const DEFAULT_TASK_TTL: Duration = Duration::from_secs(86_400);

#[derive(Debug, Default)]
struct StoreState {
    /// 任务ID -> (任务, 过期时刻)
    tasks: HashMap<String, (Task, Option<Instant>)>,
    /// 队列名 -> 任务ID
    queues: HashMap<String, VecDeque<String>>,
    /// (module_name, file_hash) -> 当前结果
    results: HashMap<(String, String), TaskResult>,
}

/// 内存任务存储
///
/// 适用于单进程部署和测试。入队和写结果都会唤醒 `wait_for_activity` 的等待者，
/// 轮询方因此可以在状态变化后立即醒来。
///
/// 任务记录与 Redis 后端一样带过期时间，结果槽不过期。
#[derive(Debug)]
pub struct InMemoryTaskStore {
    state: Mutex<StoreState>,
    activity: Notify,
    task_ttl: Duration,
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::with_ttl(DEFAULT_TASK_TTL)
    }
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(task_ttl: Duration) -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            activity: Notify::new(),
            task_ttl,
        }
    }

    /// 未过期的任务记录数
    pub async fn task_count(&self) -> usize {
        let mut state = self.state.lock().await;
        Self::evict_expired(&mut state);
        state.tasks.len()
    }

    fn evict_expired(state: &mut StoreState) {
        let now = Instant::now();
        let before = state.tasks.len();
        state
            .tasks
            .retain(|_, (_, expires_at)| expires_at.map_or(true, |at| at > now));
        let evicted = before - state.tasks.len();
        if evicted > 0 {
            debug!(evicted, "Expired task records evicted");
        }
    }

    pub async fn result_count(&self) -> usize {
        self.state.lock().await.results.len()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create_task(&self, task: &Task) -> OrchestratorResult<String> {
        let mut state = self.state.lock().await;
        Self::evict_expired(&mut state);
        let expires_at = Instant::now().checked_add(self.task_ttl);
        state
            .tasks
            .insert(task.task_id.clone(), (task.clone(), expires_at));
        debug!(task_id = %task.task_id, module = %task.module_name, "Task created");
        Ok(task.task_id.clone())
    }

    async fn enqueue(&self, module_name: &str, task_id: &str) -> OrchestratorResult<()> {
        {
            let mut state = self.state.lock().await;
            state
                .queues
                .entry(module_queue_name(module_name))
                .or_default()
                .push_back(task_id.to_string());
        }
        self.activity.notify_waiters();
        Ok(())
    }

    async fn dequeue(&self, module_name: &str) -> OrchestratorResult<Option<String>> {
        let mut state = self.state.lock().await;
        Ok(state
            .queues
            .get_mut(&module_queue_name(module_name))
            .and_then(|queue| queue.pop_front()))
    }

    async fn get_task(&self, task_id: &str) -> OrchestratorResult<Option<Task>> {
        let state = self.state.lock().await;
        let now = Instant::now();
        Ok(state
            .tasks
            .get(task_id)
            .filter(|(_, expires_at)| expires_at.map_or(true, |at| at > now))
            .map(|(task, _)| task.clone()))
    }

    async fn put_result(
        &self,
        module_name: &str,
        file_hash: &str,
        result: &TaskResult,
    ) -> OrchestratorResult<()> {
        {
            let mut state = self.state.lock().await;
            state.results.insert(
                (module_name.to_string(), file_hash.to_string()),
                result.clone(),
            );
        }
        self.activity.notify_waiters();
        Ok(())
    }

    async fn get_result(
        &self,
        module_name: &str,
        file_hash: &str,
    ) -> OrchestratorResult<Option<TaskResult>> {
        let state = self.state.lock().await;
        Ok(state
            .results
            .get(&(module_name.to_string(), file_hash.to_string()))
            .cloned())
    }

    async fn queue_len(&self, module_name: &str) -> OrchestratorResult<usize> {
        let state = self.state.lock().await;
        Ok(state
            .queues
            .get(&module_queue_name(module_name))
            .map_or(0, VecDeque::len))
    }

    async fn wait_for_activity(&self, max_wait: Duration) {
        let _ = tokio::time::timeout(max_wait, self.activity.notified()).await;
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
