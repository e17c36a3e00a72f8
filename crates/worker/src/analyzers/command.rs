use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use orchestrator_core::config::CommandModuleConfig;
use orchestrator_core::{OrchestratorError, OrchestratorResult};
use tokio::process::Command;
use tracing::{info, warn};

use crate::analyzer::{AnalysisContext, ModuleAnalyzer};

const PATH_PLACEHOLDER: &str = "{path}";
/// 任务参数以 JSON 形式经环境变量交给工具，不进入命令行
const PARAMETERS_ENV: &str = "ORCHESTRATOR_TASK_PARAMETERS";
const MAX_STDERR_CHARS: usize = 500;

/// 调用外部工具的分析模块，工具需要把 JSON 写到 stdout
pub struct CommandAnalyzer {
    config: CommandModuleConfig,
}

impl CommandAnalyzer {
    pub fn new(config: CommandModuleConfig) -> Self {
        Self { config }
    }

    /// 命令行只由配置决定
    fn build_args(&self, context: &AnalysisContext) -> Vec<String> {
        let path = context.artifact_path.to_string_lossy();
        self.config
            .args
            .iter()
            .map(|arg| arg.replace(PATH_PLACEHOLDER, &path))
            .collect()
    }
}

#[async_trait]
impl ModuleAnalyzer for CommandAnalyzer {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn version(&self) -> &str {
        &self.config.version
    }

    fn description(&self) -> &str {
        &self.config.description
    }

    fn supported_file_types(&self) -> Vec<String> {
        self.config.file_types.clone()
    }

    async fn analyze(&self, context: &AnalysisContext) -> OrchestratorResult<serde_json::Value> {
        let args = self.build_args(context);
        info!(
            module = %self.config.name,
            task_id = %context.task.task_id,
            "Running {} {:?}",
            self.config.command,
            args
        );

        let child = Command::new(&self.config.command)
            .args(&args)
            .env(PARAMETERS_ENV, context.task.parameters.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                OrchestratorError::execution_failure(format!(
                    "failed to start {}: {e}",
                    self.config.command
                ))
            })?;

        let timeout = Duration::from_secs(self.config.timeout_seconds);
        // 超时后 future 被丢弃，kill_on_drop 会结束子进程
        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                warn!(module = %self.config.name, "Tool exceeded {}s, killed", self.config.timeout_seconds);
                OrchestratorError::Timeout(format!(
                    "{} did not finish within {}s",
                    self.config.command, self.config.timeout_seconds
                ))
            })?
            .map_err(|e| {
                OrchestratorError::execution_failure(format!(
                    "failed to wait for {}: {e}",
                    self.config.command
                ))
            })?;

        if !output.status.success() {
            let stderr: String = String::from_utf8_lossy(&output.stderr)
                .trim()
                .chars()
                .take(MAX_STDERR_CHARS)
                .collect();
            return Err(OrchestratorError::execution_failure(format!(
                "{} exited with {:?}: {}",
                self.config.command,
                output.status.code(),
                stderr
            )));
        }

        serde_json::from_slice(&output.stdout).map_err(|e| {
            OrchestratorError::execution_failure(format!(
                "malformed output from {}: {e}",
                self.config.command
            ))
        })
    }
}
