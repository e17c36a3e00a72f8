use std::sync::Arc;
use std::time::Duration;

use orchestrator_core::OrchestratorResult;
use orchestrator_domain::entities::{ResultStatus, Task, TaskResult};
use orchestrator_domain::ports::{FileStorage, TaskStore};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::analyzer::{AnalysisContext, ModuleAnalyzer};

/// 一次轮询的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// 队列为空
    Idle,
    /// 任务记录已不存在，跳过
    Skipped,
    Processed(ResultStatus),
}

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub idle_interval: Duration,
    pub backoff_interval: Duration,
}

impl WorkerSettings {
    pub fn new(idle_interval_ms: u64, backoff_multiplier: u32) -> Self {
        let idle_interval = Duration::from_millis(idle_interval_ms);
        Self {
            idle_interval,
            backoff_interval: idle_interval * backoff_multiplier,
        }
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self::new(1000, 5)
    }
}

/// 单个模块实例的工作循环：出队、取任务、分析、写结果
pub struct ModuleWorker {
    worker_id: String,
    analyzer: Arc<dyn ModuleAnalyzer>,
    store: Arc<dyn TaskStore>,
    file_storage: Arc<dyn FileStorage>,
    settings: WorkerSettings,
}

impl ModuleWorker {
    pub fn new(
        worker_id: String,
        analyzer: Arc<dyn ModuleAnalyzer>,
        store: Arc<dyn TaskStore>,
        file_storage: Arc<dyn FileStorage>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            worker_id,
            analyzer,
            store,
            file_storage,
            settings,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn module_name(&self) -> &str {
        self.analyzer.name()
    }

    /// 执行一次循环。只有存储层错误会返回 Err，分析错误会变成 error 结果
    pub async fn process_next(&self) -> OrchestratorResult<PollOutcome> {
        let module = self.analyzer.name();
        let Some(task_id) = self.store.dequeue(module).await? else {
            return Ok(PollOutcome::Idle);
        };

        let Some(task) = self.store.get_task(&task_id).await? else {
            warn!(module, task_id = %task_id, "Task record missing after dequeue, skipping");
            return Ok(PollOutcome::Skipped);
        };

        let result = self.execute(&task).await;
        self.store
            .put_result(&task.module_name, &task.file_hash, &result)
            .await?;

        metrics::counter!(
            "orchestrator_results_published_total",
            "status" => result.status.as_str()
        )
        .increment(1);

        Ok(PollOutcome::Processed(result.status))
    }

    async fn execute(&self, task: &Task) -> TaskResult {
        let module = self.analyzer.name();
        let task_id = Some(task.task_id.clone());

        if !self.analyzer.supports(&task.file_type) {
            warn!(
                module,
                task_id = %task.task_id,
                file_type = %task.file_type,
                "Unsupported file type"
            );
            return TaskResult::error(
                task_id,
                format!(
                    "module '{}' does not support file type '{}' (supported: {})",
                    module,
                    task.file_type,
                    self.analyzer.supported_file_types().join(", ")
                ),
            );
        }

        let artifact_path = self.file_storage.absolute_path(&task.stored_file());
        let context = AnalysisContext::new(task.clone(), artifact_path);
        let started = std::time::Instant::now();

        match self.analyzer.analyze(&context).await {
            Ok(results) => {
                info!(
                    module,
                    task_id = %task.task_id,
                    file_hash = %task.file_hash,
                    "Analysis completed in {:?}",
                    started.elapsed()
                );
                TaskResult::success(task_id, results)
            }
            Err(e) => {
                warn!(
                    module,
                    task_id = %task.task_id,
                    file_hash = %task.file_hash,
                    "Analysis failed: {}",
                    e
                );
                TaskResult::error(task_id, e.to_string())
            }
        }
    }

    /// 持续运行直到收到关闭信号
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            worker_id = %self.worker_id,
            module = %self.analyzer.name(),
            "Module worker started"
        );

        loop {
            let pause = match self.process_next().await {
                Ok(PollOutcome::Idle) => Some(self.settings.idle_interval),
                Ok(outcome) => {
                    debug!(worker_id = %self.worker_id, ?outcome, "Task handled");
                    None
                }
                Err(e) => {
                    error!(
                        worker_id = %self.worker_id,
                        module = %self.analyzer.name(),
                        "Worker iteration failed, backing off {:?}: {}",
                        self.settings.backoff_interval,
                        e
                    );
                    Some(self.settings.backoff_interval)
                }
            };

            match pause {
                Some(pause) => {
                    tokio::select! {
                        _ = shutdown_rx.recv() => break,
                        _ = self.wait(pause) => {}
                    }
                }
                None => {
                    if !matches!(
                        shutdown_rx.try_recv(),
                        Err(broadcast::error::TryRecvError::Empty)
                    ) {
                        break;
                    }
                }
            }
        }

        info!(worker_id = %self.worker_id, "Module worker stopped");
    }

    async fn wait(&self, pause: Duration) {
        if pause == self.settings.idle_interval {
            // 空闲时可以被入队提前唤醒
            self.store.wait_for_activity(pause).await;
        } else {
            tokio::time::sleep(pause).await;
        }
    }
}
