use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, error, info, warn};

use orchestrator_core::config::RegistryConfig;
use orchestrator_core::{OrchestratorError, OrchestratorResult};
use orchestrator_domain::entities::{ExternalModule, Task};
use orchestrator_domain::ports::ExternalDispatcher;

/// 通过 HTTP 调用外部模块
///
/// 外部模块收到 `{task, files_url}` 后自行拉取归档，分析结果通过
/// `PUT /api/results/{module}/{file_hash}` 回写。
pub struct HttpExternalDispatcher {
    http_client: reqwest::Client,
    dispatch_timeout: Duration,
    healthcheck_timeout: Duration,
}

impl HttpExternalDispatcher {
    pub fn new(config: &RegistryConfig) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            dispatch_timeout: Duration::from_secs(config.dispatch_timeout_seconds),
            healthcheck_timeout: Duration::from_secs(config.healthcheck_timeout_seconds),
        }
    }
}

#[async_trait]
impl ExternalDispatcher for HttpExternalDispatcher {
    async fn dispatch(
        &self,
        module: &ExternalModule,
        task: &Task,
        files_url: &str,
    ) -> OrchestratorResult<()> {
        let url = format!("{}/analyze", module.base_url.trim_end_matches('/'));
        let payload = json!({
            "module_id": module.module_id,
            "task": task,
            "files_url": files_url,
        });

        match self
            .http_client
            .post(&url)
            .timeout(self.dispatch_timeout)
            .json(&payload)
            .send()
            .await
        {
            Ok(response) => {
                if response.status().is_success() {
                    info!(
                        module = %module.module_id,
                        task_id = %task.task_id,
                        "Dispatched task to external module"
                    );
                    Ok(())
                } else {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    error!(
                        "External module {} rejected task: HTTP {} - {}",
                        module.module_id, status, body
                    );
                    Err(OrchestratorError::execution_failure(format!(
                        "external module {} rejected task: HTTP {status}",
                        module.module_id
                    )))
                }
            }
            Err(e) => {
                error!(
                    "Failed to connect to external module {}: {}",
                    module.module_id, e
                );
                Err(OrchestratorError::infrastructure(format!(
                    "external module {} unreachable: {e}",
                    module.module_id
                )))
            }
        }
    }

    async fn check_health(&self, healthcheck_url: &str) -> OrchestratorResult<()> {
        match self
            .http_client
            .get(healthcheck_url)
            .timeout(self.healthcheck_timeout)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                debug!("Healthcheck passed: {}", healthcheck_url);
                Ok(())
            }
            Ok(response) => {
                let status = response.status();
                warn!("Healthcheck failed: {} returned HTTP {}", healthcheck_url, status);
                Err(OrchestratorError::execution_failure(format!(
                    "healthcheck returned HTTP {status}"
                )))
            }
            Err(e) => {
                warn!("Healthcheck unreachable: {}: {}", healthcheck_url, e);
                Err(OrchestratorError::infrastructure(format!(
                    "healthcheck unreachable: {e}"
                )))
            }
        }
    }
}
