//! 链执行引擎
//!
//! 一次链执行内的步骤严格串行：上一步的结果被观察到之后才会创建
//! 下一步的任务。不同的链执行之间互不阻塞。

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use orchestrator_core::config::{ChainConfig, ChainEngineConfig};
use orchestrator_core::{OrchestratorError, OrchestratorResult};
use orchestrator_domain::entities::{
    AbortPolicy, Chain, ChainExecution, ChainStep, ExecutionStatus, ModuleExecution, StoredFile,
};
use orchestrator_domain::ports::{FileStorage, TaskStore};
use orchestrator_domain::repositories::{ChainRepository, ExecutionRepository};

use crate::module_dispatcher::ModuleDispatcher;

#[derive(Debug, Clone)]
pub struct ChainEngineSettings {
    pub poll_interval: Duration,
    pub step_timeout: Duration,
}

impl From<&ChainEngineConfig> for ChainEngineSettings {
    fn from(config: &ChainEngineConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            step_timeout: Duration::from_secs(config.step_timeout_seconds),
        }
    }
}

/// 链执行及其各步骤
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionDetails {
    #[serde(flatten)]
    pub execution: ChainExecution,
    pub module_executions: Vec<ModuleExecution>,
}

pub struct ChainEngine {
    dispatcher: Arc<ModuleDispatcher>,
    store: Arc<dyn TaskStore>,
    file_storage: Arc<dyn FileStorage>,
    chains: Arc<dyn ChainRepository>,
    executions: Arc<dyn ExecutionRepository>,
    settings: ChainEngineSettings,
}

impl ChainEngine {
    pub fn new(
        dispatcher: Arc<ModuleDispatcher>,
        store: Arc<dyn TaskStore>,
        file_storage: Arc<dyn FileStorage>,
        chains: Arc<dyn ChainRepository>,
        executions: Arc<dyn ExecutionRepository>,
        settings: ChainEngineSettings,
    ) -> Self {
        Self {
            dispatcher,
            store,
            file_storage,
            chains,
            executions,
            settings,
        }
    }

    pub async fn register_chain(&self, chain: Chain) -> OrchestratorResult<Chain> {
        let chain = self.chains.save(&chain.normalized()?).await?;
        info!(
            chain = %chain.name,
            steps = chain.steps.len(),
            "Registered chain: {}",
            chain.module_names().join(" -> ")
        );
        Ok(chain)
    }

    /// 加载配置文件中的静态链定义
    pub async fn load_chains(&self, configs: &[ChainConfig]) -> OrchestratorResult<usize> {
        for config in configs {
            self.register_chain(Chain::try_from(config)?).await?;
        }
        Ok(configs.len())
    }

    pub async fn get_chain(&self, name: &str) -> OrchestratorResult<Chain> {
        self.chains
            .find_by_name(name)
            .await?
            .ok_or_else(|| OrchestratorError::chain_not_found(name))
    }

    pub async fn list_chains(&self) -> OrchestratorResult<Vec<Chain>> {
        self.chains.find_all().await
    }

    pub async fn get_execution(&self, id: &str) -> OrchestratorResult<ExecutionDetails> {
        let execution = self
            .executions
            .find_by_id(id)
            .await?
            .ok_or_else(|| OrchestratorError::execution_not_found(id))?;
        let module_executions = self.executions.find_module_executions(id).await?;
        Ok(ExecutionDetails {
            execution,
            module_executions,
        })
    }

    pub async fn list_executions(
        &self,
        chain_name: &str,
    ) -> OrchestratorResult<Vec<ChainExecution>> {
        self.executions.find_by_chain(chain_name).await
    }

    /// 创建执行记录后在后台运行，立即返回 pending 状态的执行
    pub async fn trigger(
        self: &Arc<Self>,
        chain_name: &str,
        file_hash: &str,
    ) -> OrchestratorResult<ChainExecution> {
        let (chain, file, execution) = self.prepare(chain_name, file_hash).await?;
        let pending = execution.clone();

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let execution_id = execution.id.clone();
            let runner = Arc::clone(&engine);
            let handle = tokio::spawn(async move { runner.run(execution, chain, file).await });
            match handle.await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    error!(execution_id = %execution_id, "Chain execution aborted: {}", e);
                }
                Err(e) => {
                    // 后台任务崩溃时执行记录同样要落到终态
                    error!(execution_id = %execution_id, "Chain execution panicked: {}", e);
                    let reason = format!("chain execution panicked: {e}");
                    engine.finalize_interrupted(&execution_id, &reason).await;
                }
            }
        });

        Ok(pending)
    }

    /// 运行链直到终态
    pub async fn execute(
        &self,
        chain_name: &str,
        file_hash: &str,
    ) -> OrchestratorResult<ChainExecution> {
        let (chain, file, execution) = self.prepare(chain_name, file_hash).await?;
        self.run(execution, chain, file).await
    }

    async fn prepare(
        &self,
        chain_name: &str,
        file_hash: &str,
    ) -> OrchestratorResult<(Chain, StoredFile, ChainExecution)> {
        let chain = self.get_chain(chain_name).await?;
        let file = self
            .file_storage
            .resolve(file_hash)
            .await?
            .ok_or_else(|| OrchestratorError::FileNotFound {
                file_id: file_hash.to_string(),
            })?;
        let execution = self
            .executions
            .create(&ChainExecution::new(&chain.name, &file.file_hash))
            .await?;
        Ok((chain, file, execution))
    }

    async fn run(
        &self,
        mut execution: ChainExecution,
        chain: Chain,
        file: StoredFile,
    ) -> OrchestratorResult<ChainExecution> {
        match self.run_steps(&mut execution, &chain, &file).await {
            Ok(()) => {}
            Err(e) => {
                // 存储层故障时执行不能停留在 running
                error!(
                    chain = %chain.name,
                    execution_id = %execution.id,
                    "Chain execution interrupted: {}",
                    e
                );
                let reason = format!("chain execution interrupted: {e}");
                self.fail_unfinished_steps(&execution.id, &reason).await;
                execution.fail(reason);
                self.executions.update(&execution).await?;
            }
        }

        metrics::counter!(
            "orchestrator_chain_executions_total",
            "status" => execution.status.as_str()
        )
        .increment(1);
        Ok(execution)
    }

    /// 把执行及其未结束的步骤标记为失败，用于运行被意外中断的情况
    async fn finalize_interrupted(&self, execution_id: &str, reason: &str) {
        self.fail_unfinished_steps(execution_id, reason).await;
        match self.executions.find_by_id(execution_id).await {
            Ok(Some(mut execution)) if !execution.status.is_terminal() => {
                execution.fail(reason);
                if let Err(e) = self.executions.update(&execution).await {
                    error!(execution_id = %execution_id, "Failed to finalize execution: {}", e);
                    return;
                }
                metrics::counter!(
                    "orchestrator_chain_executions_total",
                    "status" => execution.status.as_str()
                )
                .increment(1);
            }
            Ok(_) => {}
            Err(e) => {
                error!(execution_id = %execution_id, "Failed to load execution: {}", e);
            }
        }
    }

    async fn fail_unfinished_steps(&self, execution_id: &str, reason: &str) {
        let steps = match self.executions.find_module_executions(execution_id).await {
            Ok(steps) => steps,
            Err(e) => {
                warn!(execution_id = %execution_id, "Failed to load steps: {}", e);
                return;
            }
        };
        for mut step in steps.into_iter().filter(|s| !s.status.is_terminal()) {
            step.fail(reason);
            if let Err(e) = self.executions.update_module_execution(&step).await {
                warn!(
                    execution_id = %execution_id,
                    module = %step.module_name,
                    "Failed to mark step {} failed: {}",
                    step.order,
                    e
                );
            }
        }
    }

    async fn run_steps(
        &self,
        execution: &mut ChainExecution,
        chain: &Chain,
        file: &StoredFile,
    ) -> OrchestratorResult<()> {
        execution.update_status(ExecutionStatus::Running);
        self.executions.update(execution).await?;
        info!(
            chain = %chain.name,
            execution_id = %execution.id,
            file_hash = %file.file_hash,
            "Chain execution started"
        );

        let mut first_failure: Option<String> = None;
        let mut previous: Option<(String, serde_json::Value)> = None;

        for step in &chain.steps {
            if first_failure.is_some() && chain.abort_policy == AbortPolicy::AbortRemaining {
                debug!(
                    execution_id = %execution.id,
                    "Skipping step {} ({}) after failure",
                    step.order, step.module_name
                );
                break;
            }

            let parameters = step_parameters(step, previous.as_ref());
            let mut module_execution = self
                .executions
                .create_module_execution(&ModuleExecution::new(
                    &execution.id,
                    &step.module_name,
                    step.order,
                    parameters.clone(),
                ))
                .await?;

            match self
                .run_step(&mut module_execution, step, file, parameters)
                .await?
            {
                Ok(results) => {
                    module_execution.complete(results.clone());
                    info!(
                        execution_id = %execution.id,
                        module = %step.module_name,
                        duration_ms = module_execution.execution_duration_ms().unwrap_or_default(),
                        "Step {} completed",
                        step.order
                    );
                    previous = Some((step.module_name.clone(), results));
                }
                Err(message) => {
                    warn!(
                        execution_id = %execution.id,
                        module = %step.module_name,
                        "Step {} failed: {}",
                        step.order,
                        message
                    );
                    first_failure.get_or_insert_with(|| {
                        format!(
                            "step {} ({}) failed: {}",
                            step.order, step.module_name, message
                        )
                    });
                    module_execution.fail(message);
                }
            }
            self.executions
                .update_module_execution(&module_execution)
                .await?;
        }

        match first_failure {
            Some(message) => execution.fail(message),
            None => execution.update_status(ExecutionStatus::Completed),
        }
        self.executions.update(execution).await?;
        info!(
            chain = %chain.name,
            execution_id = %execution.id,
            status = execution.status.as_str(),
            "Chain execution finished"
        );
        Ok(())
    }

    /// 派发一步并等待它的结果
    ///
    /// 外层 `Err` 是存储故障，内层 `Err` 是该步骤的失败信息。
    async fn run_step(
        &self,
        module_execution: &mut ModuleExecution,
        step: &ChainStep,
        file: &StoredFile,
        parameters: serde_json::Value,
    ) -> OrchestratorResult<Result<serde_json::Value, String>> {
        let task = match self
            .dispatcher
            .dispatch(&step.module_name, file, parameters)
            .await
        {
            Ok(task) => task,
            // 派发失败只影响本步骤，由中止策略决定后续
            Err(e) => return Ok(Err(e.to_string())),
        };

        module_execution.mark_running(&task.task_id);
        self.executions
            .update_module_execution(module_execution)
            .await?;

        let timeout = step
            .timeout_seconds
            .map(Duration::from_secs)
            .unwrap_or(self.settings.step_timeout);
        Ok(self
            .await_result(
                &step.module_name,
                &file.file_hash,
                &task.task_id,
                task.created_at,
                timeout,
            )
            .await)
    }

    async fn await_result(
        &self,
        module_name: &str,
        file_hash: &str,
        task_id: &str,
        dispatched_at: DateTime<Utc>,
        timeout: Duration,
    ) -> Result<serde_json::Value, String> {
        // 超出 Instant 表示范围时视为不设上限
        let deadline = Instant::now().checked_add(timeout);
        loop {
            match self.store.get_result(module_name, file_hash).await {
                Ok(Some(result)) if result.written_since(dispatched_at) => {
                    if result.task_id.as_deref().is_some_and(|id| id != task_id) {
                        debug!(
                            module = %module_name,
                            task_id = %task_id,
                            "Accepting result written by concurrent task {:?}",
                            result.task_id
                        );
                    }
                    return if result.is_success() {
                        Ok(result.results)
                    } else {
                        Err(result
                            .error
                            .unwrap_or_else(|| "module reported an error".to_string()))
                    };
                }
                Ok(_) => {}
                Err(e) if e.is_retryable() => {
                    warn!(
                        module = %module_name,
                        task_id = %task_id,
                        "Result lookup failed, retrying: {}",
                        e
                    );
                }
                Err(e) => return Err(format!("result lookup failed: {e}")),
            }

            let now = Instant::now();
            let wait = match deadline {
                Some(deadline) if now >= deadline => {
                    return Err(format!(
                        "no result within {}s",
                        timeout.as_secs_f64().round() as u64
                    ));
                }
                Some(deadline) => self.settings.poll_interval.min(deadline - now),
                None => self.settings.poll_interval,
            };
            self.store.wait_for_activity(wait).await;
        }
    }
}

/// 步骤参数，按需注入上一步的结果
fn step_parameters(
    step: &ChainStep,
    previous: Option<&(String, serde_json::Value)>,
) -> serde_json::Value {
    let mut parameters = match &step.parameters {
        serde_json::Value::Object(map) => map.clone(),
        serde_json::Value::Null => serde_json::Map::new(),
        other => {
            let mut map = serde_json::Map::new();
            map.insert("value".to_string(), other.clone());
            map
        }
    };
    if step.inject_previous_results {
        if let Some((module_name, results)) = previous {
            parameters.insert(
                "previous_module".to_string(),
                serde_json::Value::String(module_name.clone()),
            );
            parameters.insert("previous_results".to_string(), results.clone());
        }
    }
    serde_json::Value::Object(parameters)
}
