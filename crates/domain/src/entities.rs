use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use orchestrator_core::config::{ChainConfig, ValidationUtils};
use orchestrator_core::{OrchestratorError, OrchestratorResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 模块队列名由模块名确定性派生
pub fn module_queue_name(module_name: &str) -> String {
    format!("queue:{module_name}")
}

/// 文件存储中一个已上传制品的元数据
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredFile {
    pub file_hash: String,
    pub folder_path: String,
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub file_type: String,
}

impl StoredFile {
    /// 相对于存储根目录的路径
    pub fn relative_path(&self) -> PathBuf {
        let folder = PathBuf::from(self.folder_path.trim_matches('/'));
        if self.file_name.is_empty() {
            folder
        } else {
            folder.join(&self.file_name)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub task_id: String,
    pub module_name: String,
    pub file_hash: String,
    pub folder_path: String,
    pub file_name: String,
    pub file_type: String,
    pub parameters: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(module_name: &str, file: &StoredFile, parameters: serde_json::Value) -> Self {
        Self {
            task_id: Uuid::new_v4().to_string(),
            module_name: module_name.to_string(),
            file_hash: file.file_hash.clone(),
            folder_path: file.folder_path.clone(),
            file_name: file.file_name.clone(),
            file_type: file.file_type.clone(),
            parameters,
            created_at: Utc::now(),
        }
    }

    pub fn stored_file(&self) -> StoredFile {
        StoredFile {
            file_hash: self.file_hash.clone(),
            folder_path: self.folder_path.clone(),
            file_name: self.file_name.clone(),
            file_type: self.file_type.clone(),
        }
    }

    pub fn queue_name(&self) -> String {
        module_queue_name(&self.module_name)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Success,
    Error,
}

impl ResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultStatus::Success => "success",
            ResultStatus::Error => "error",
        }
    }
}

/// 分析结果，按 (module_name, file_hash) 存储，后写覆盖先写
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskResult {
    pub status: ResultStatus,
    #[serde(default)]
    pub results: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// 产生该结果的任务，外部模块可能不回传
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl TaskResult {
    pub fn success(task_id: Option<String>, results: serde_json::Value) -> Self {
        Self {
            status: ResultStatus::Success,
            results,
            error: None,
            task_id,
            updated_at: Utc::now(),
        }
    }

    pub fn error<S: Into<String>>(task_id: Option<String>, message: S) -> Self {
        Self {
            status: ResultStatus::Error,
            results: serde_json::Value::Null,
            error: Some(message.into()),
            task_id,
            updated_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResultStatus::Success
    }

    /// 结果是否在某次派发之后写入
    ///
    /// 同一 (module, file_hash) 上的并发派发共享一条结果，谁写的都算；
    /// `task_id` 只用于诊断。
    pub fn written_since(&self, dispatched_at: DateTime<Utc>) -> bool {
        self.updated_at >= dispatched_at
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ModuleKind {
    Builtin,
    External,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Module {
    pub name: String,
    pub version: String,
    pub description: String,
    #[serde(default)]
    pub config: serde_json::Value,
    pub kind: ModuleKind,
    #[serde(default)]
    pub file_types: Vec<String>,
}

impl Module {
    pub fn builtin(name: &str, version: &str, description: &str, file_types: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            description: description.to_string(),
            config: serde_json::Value::Null,
            kind: ModuleKind::Builtin,
            file_types: file_types.iter().map(|t| t.to_string()).collect(),
        }
    }

    /// 内置模块才有队列，外部模块通过注册表访问
    pub fn queue_name(&self) -> Option<String> {
        match self.kind {
            ModuleKind::Builtin => Some(module_queue_name(&self.name)),
            ModuleKind::External => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExternalModuleStatus {
    Active,
    Inactive,
    Error,
}

/// 外部模块的注册请求
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExternalModuleRegistration {
    #[serde(default)]
    pub module_id: Option<String>,
    pub base_url: String,
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default)]
    pub healthcheck_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExternalModule {
    pub module_id: String,
    pub base_url: String,
    pub config: serde_json::Value,
    pub healthcheck_url: Option<String>,
    pub status: ExternalModuleStatus,
    pub registered_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub error_message: Option<String>,
}

impl ExternalModule {
    pub fn new(module_id: String, registration: ExternalModuleRegistration) -> Self {
        let now = Utc::now();
        Self {
            module_id,
            base_url: registration.base_url,
            config: registration.config,
            healthcheck_url: registration.healthcheck_url,
            status: ExternalModuleStatus::Active,
            registered_at: now,
            last_heartbeat: now,
            error_message: None,
        }
    }

    pub fn is_heartbeat_expired(&self, staleness_window_seconds: i64, now: DateTime<Utc>) -> bool {
        (now - self.last_heartbeat).num_seconds() > staleness_window_seconds
    }

    /// 心跳过期的模块一律视为 inactive
    pub fn effective_status(
        &self,
        staleness_window_seconds: i64,
        now: DateTime<Utc>,
    ) -> ExternalModuleStatus {
        if self.is_heartbeat_expired(staleness_window_seconds, now) {
            ExternalModuleStatus::Inactive
        } else {
            self.status
        }
    }

    pub fn record_heartbeat(&mut self, now: DateTime<Utc>) {
        self.last_heartbeat = now;
        self.status = ExternalModuleStatus::Active;
        self.error_message = None;
    }

    pub fn mark_error<S: Into<String>>(&mut self, message: S) {
        self.status = ExternalModuleStatus::Error;
        self.error_message = Some(message.into());
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AbortPolicy {
    #[default]
    AbortRemaining,
    ContinueOnError,
}

impl FromStr for AbortPolicy {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "abort_remaining" => Ok(AbortPolicy::AbortRemaining),
            "continue_on_error" => Ok(AbortPolicy::ContinueOnError),
            other => Err(OrchestratorError::invalid_input(format!(
                "unknown abort policy: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChainStep {
    pub module_name: String,
    pub order: u32,
    #[serde(default)]
    pub parameters: serde_json::Value,
    #[serde(default)]
    pub inject_previous_results: bool,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chain {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub abort_policy: AbortPolicy,
    pub steps: Vec<ChainStep>,
}

impl Chain {
    /// 校验并按 order 排序步骤
    pub fn normalized(mut self) -> OrchestratorResult<Self> {
        if self.name.trim().is_empty() {
            return Err(OrchestratorError::invalid_input("chain name cannot be empty"));
        }
        if self.steps.is_empty() {
            return Err(OrchestratorError::invalid_input(format!(
                "chain '{}' must contain at least one step",
                self.name
            )));
        }
        self.steps.sort_by_key(|step| step.order);
        if let Some(pair) = self.steps.windows(2).find(|w| w[0].order == w[1].order) {
            return Err(OrchestratorError::invalid_input(format!(
                "chain '{}' has duplicate step order {}",
                self.name, pair[0].order
            )));
        }
        if let Some(step) = self.steps.iter().find(|s| s.module_name.trim().is_empty()) {
            return Err(OrchestratorError::invalid_input(format!(
                "chain '{}' step {} has no module",
                self.name, step.order
            )));
        }
        for step in &self.steps {
            if let Some(timeout) = step.timeout_seconds {
                ValidationUtils::validate_timeout_seconds(
                    timeout,
                    &format!("chain '{}' step {} timeout_seconds", self.name, step.order),
                )
                .map_err(|e| OrchestratorError::invalid_input(e.to_string()))?;
            }
        }
        Ok(self)
    }

    pub fn module_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.module_name.as_str()).collect()
    }
}

impl TryFrom<&ChainConfig> for Chain {
    type Error = OrchestratorError;

    fn try_from(config: &ChainConfig) -> Result<Self, Self::Error> {
        let steps = config
            .steps
            .iter()
            .enumerate()
            .map(|(index, step)| ChainStep {
                module_name: step.module_name.clone(),
                order: step.order.unwrap_or(index as u32 + 1),
                parameters: step.parameters.clone(),
                inject_previous_results: step.inject_previous_results,
                timeout_seconds: step.timeout_seconds,
            })
            .collect();

        Chain {
            name: config.name.clone(),
            description: config.description.clone(),
            abort_policy: config.abort_policy.parse()?,
            steps,
        }
        .normalized()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChainExecution {
    pub id: String,
    pub chain_name: String,
    pub file_hash: String,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl ChainExecution {
    pub fn new(chain_name: &str, file_hash: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            chain_name: chain_name.to_string(),
            file_hash: file_hash.to_string(),
            status: ExecutionStatus::Pending,
            started_at: Utc::now(),
            completed_at: None,
            error_message: None,
        }
    }

    pub fn update_status(&mut self, status: ExecutionStatus) {
        self.status = status;
        if status.is_terminal() && self.completed_at.is_none() {
            self.completed_at = Some(Utc::now());
        }
    }

    pub fn fail<S: Into<String>>(&mut self, message: S) {
        self.error_message = Some(message.into());
        self.update_status(ExecutionStatus::Failed);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModuleExecution {
    pub id: String,
    pub chain_execution_id: String,
    pub module_name: String,
    pub order: u32,
    pub status: ExecutionStatus,
    /// 本步骤派发的任务
    pub task_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub parameters: serde_json::Value,
    pub results: Option<serde_json::Value>,
    pub error_message: Option<String>,
}

impl ModuleExecution {
    pub fn new(
        chain_execution_id: &str,
        module_name: &str,
        order: u32,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            chain_execution_id: chain_execution_id.to_string(),
            module_name: module_name.to_string(),
            order,
            status: ExecutionStatus::Pending,
            task_id: None,
            started_at: Utc::now(),
            completed_at: None,
            parameters,
            results: None,
            error_message: None,
        }
    }

    pub fn mark_running(&mut self, task_id: &str) {
        self.task_id = Some(task_id.to_string());
        self.status = ExecutionStatus::Running;
        self.started_at = Utc::now();
    }

    pub fn complete(&mut self, results: serde_json::Value) {
        self.results = Some(results);
        self.status = ExecutionStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    pub fn fail<S: Into<String>>(&mut self, message: S) {
        self.error_message = Some(message.into());
        self.status = ExecutionStatus::Failed;
        self.completed_at = Some(Utc::now());
    }

    pub fn execution_duration_ms(&self) -> Option<i64> {
        self.completed_at
            .map(|completed| (completed - self.started_at).num_milliseconds())
    }
}
