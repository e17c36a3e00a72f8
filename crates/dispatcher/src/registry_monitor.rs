use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use orchestrator_core::config::RegistryConfig;
use orchestrator_domain::ports::ExternalDispatcher;

use crate::registry::ModuleRegistry;

/// 一次巡检的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub stale: Vec<String>,
    pub unhealthy: Vec<String>,
    pub removed: Vec<String>,
}

/// 外部模块巡检服务
///
/// 周期性地把心跳过期的模块标记为 inactive，探测健康检查地址，
/// 并清理长时间没有心跳的注册项。
pub struct RegistryMonitor {
    registry: Arc<ModuleRegistry>,
    external: Arc<dyn ExternalDispatcher>,
    config: RegistryConfig,
}

impl RegistryMonitor {
    pub fn new(
        registry: Arc<ModuleRegistry>,
        external: Arc<dyn ExternalDispatcher>,
        config: RegistryConfig,
    ) -> Self {
        Self {
            registry,
            external,
            config,
        }
    }

    pub async fn sweep_once(&self) -> SweepReport {
        let now = Utc::now();
        let mut report = SweepReport {
            stale: self.registry.mark_stale(now).await,
            ..SweepReport::default()
        };

        if self.config.healthcheck_enabled {
            for (module_id, url) in self.registry.healthcheck_targets(now).await {
                match self.external.check_health(&url).await {
                    Ok(()) => self.registry.clear_error(&module_id).await,
                    Err(e) => {
                        self.registry
                            .mark_error(&module_id, &format!("healthcheck failed: {e}"))
                            .await;
                        report.unhealthy.push(module_id);
                    }
                }
            }
        }

        report.removed = self
            .registry
            .remove_expired(self.config.cleanup_threshold_seconds as i64, now)
            .await;
        report
    }

    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            "Starting registry monitor (interval {}s, staleness window {}s)",
            self.config.sweep_interval_seconds, self.config.staleness_window_seconds
        );
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.sweep_interval_seconds));

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Registry monitor received shutdown signal");
                    break;
                }
                _ = interval.tick() => {
                    let report = self.sweep_once().await;
                    if report == SweepReport::default() {
                        debug!("Registry sweep found nothing to do");
                    } else {
                        if !report.stale.is_empty() {
                            warn!("External modules went stale: {:?}", report.stale);
                        }
                        if !report.unhealthy.is_empty() {
                            error!("External modules failed healthcheck: {:?}", report.unhealthy);
                        }
                        if !report.removed.is_empty() {
                            info!("Removed expired external modules: {:?}", report.removed);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use mockall::mock;
    use orchestrator_core::{OrchestratorError, OrchestratorResult};
    use orchestrator_domain::entities::{
        ExternalModule, ExternalModuleRegistration, ExternalModuleStatus, Task,
    };
    use serde_json::json;

    mock! {
        pub Remote {}

        #[async_trait]
        impl ExternalDispatcher for Remote {
            async fn dispatch(
                &self,
                module: &ExternalModule,
                task: &Task,
                files_url: &str,
            ) -> OrchestratorResult<()>;
            async fn check_health(&self, healthcheck_url: &str) -> OrchestratorResult<()>;
        }
    }

    fn config() -> RegistryConfig {
        RegistryConfig {
            staleness_window_seconds: 60,
            cleanup_threshold_seconds: 3600,
            sweep_interval_seconds: 1,
            ..RegistryConfig::default()
        }
    }

    async fn register(registry: &ModuleRegistry, id: &str, healthcheck: Option<&str>) {
        registry
            .register(ExternalModuleRegistration {
                module_id: Some(id.to_string()),
                base_url: format!("http://{id}:8000"),
                config: json!({}),
                healthcheck_url: healthcheck.map(str::to_string),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_sweep_marks_stale_and_unhealthy() {
        let registry = Arc::new(ModuleRegistry::new(&config()).unwrap());
        register(&registry, "stale", None).await;
        register(&registry, "sick", Some("http://sick:8000/health")).await;
        register(&registry, "well", Some("http://well:8000/health")).await;
        registry
            .set_last_heartbeat("stale", Utc::now() - ChronoDuration::seconds(120))
            .await;

        let mut remote = MockRemote::new();
        remote.expect_check_health().returning(|url| {
            if url.contains("sick") {
                Err(OrchestratorError::execution_failure("HTTP 503"))
            } else {
                Ok(())
            }
        });

        let monitor = RegistryMonitor::new(registry.clone(), Arc::new(remote), config());
        let report = monitor.sweep_once().await;

        assert_eq!(report.stale, vec!["stale".to_string()]);
        assert_eq!(report.unhealthy, vec!["sick".to_string()]);
        assert!(report.removed.is_empty());

        let sick = registry.get("sick").await.unwrap();
        assert_eq!(sick.status, ExternalModuleStatus::Error);
        assert!(sick.error_message.unwrap().contains("HTTP 503"));
        assert_eq!(
            registry.get("well").await.unwrap().status,
            ExternalModuleStatus::Active
        );
    }

    #[tokio::test]
    async fn test_sweep_removes_expired_modules() {
        let registry = Arc::new(ModuleRegistry::new(&config()).unwrap());
        register(&registry, "gone", None).await;
        registry
            .set_last_heartbeat("gone", Utc::now() - ChronoDuration::seconds(7200))
            .await;

        let monitor = RegistryMonitor::new(registry.clone(), Arc::new(MockRemote::new()), config());
        let report = monitor.sweep_once().await;
        assert_eq!(report.removed, vec!["gone".to_string()]);
        assert!(registry.get("gone").await.is_err());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let registry = Arc::new(ModuleRegistry::new(&config()).unwrap());
        let monitor = RegistryMonitor::new(registry, Arc::new(MockRemote::new()), config());
        let (tx, rx) = broadcast::channel(1);

        let handle = tokio::spawn(async move { monitor.run(rx).await });
        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
