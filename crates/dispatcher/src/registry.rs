use std::collections::HashMap;

use chrono::{DateTime, Utc};
use regex::Regex;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use orchestrator_core::config::RegistryConfig;
use orchestrator_domain::entities::{
    ExternalModule, ExternalModuleRegistration, ExternalModuleStatus, Module, ModuleKind,
};
use orchestrator_core::{OrchestratorError, OrchestratorResult};

const MODULE_ID_PATTERN: &str = r"^[A-Za-z0-9_-]{1,64}$";

/// 模块名解析后的派发目标
#[derive(Debug, Clone)]
pub enum ModuleRoute {
    Builtin(Module),
    External(ExternalModule),
}

/// 模块注册表
///
/// 内置模块与外部模块的唯一事实来源。外部模块的有效状态由心跳
/// 与过期窗口共同决定，任何派发前的状态检查都应通过这里完成。
pub struct ModuleRegistry {
    builtin: RwLock<HashMap<String, Module>>,
    external: RwLock<HashMap<String, ExternalModule>>,
    staleness_window_seconds: i64,
    id_pattern: Regex,
}

impl ModuleRegistry {
    pub fn new(config: &RegistryConfig) -> OrchestratorResult<Self> {
        let id_pattern = Regex::new(MODULE_ID_PATTERN)
            .map_err(|e| OrchestratorError::Internal(format!("invalid module id pattern: {e}")))?;
        Ok(Self {
            builtin: RwLock::new(HashMap::new()),
            external: RwLock::new(HashMap::new()),
            staleness_window_seconds: config.staleness_window_seconds as i64,
            id_pattern,
        })
    }

    pub fn staleness_window_seconds(&self) -> i64 {
        self.staleness_window_seconds
    }

    /// 登记本进程运行的内置模块
    pub async fn register_builtin(&self, module: Module) {
        debug!("Registering builtin module {}", module.name);
        self.builtin.write().await.insert(module.name.clone(), module);
    }

    /// 内置模块与外部模块的统一视图
    pub async fn modules(&self) -> Vec<Module> {
        let now = Utc::now();
        let mut modules: Vec<Module> = self.builtin.read().await.values().cloned().collect();
        modules.sort_by(|a, b| a.name.cmp(&b.name));

        let mut external: Vec<Module> = self
            .external
            .read()
            .await
            .values()
            .map(|entry| Module {
                name: entry.module_id.clone(),
                version: entry
                    .config
                    .get("version")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown")
                    .to_string(),
                description: format!(
                    "external module at {} ({})",
                    entry.base_url,
                    match entry.effective_status(self.staleness_window_seconds, now) {
                        ExternalModuleStatus::Active => "active",
                        ExternalModuleStatus::Inactive => "inactive",
                        ExternalModuleStatus::Error => "error",
                    }
                ),
                config: entry.config.clone(),
                kind: ModuleKind::External,
                file_types: Vec::new(),
            })
            .collect();
        external.sort_by(|a, b| a.name.cmp(&b.name));

        modules.extend(external);
        modules
    }

    /// 按名称查找派发目标，内置模块优先
    pub async fn route(&self, module_name: &str) -> Option<ModuleRoute> {
        if let Some(module) = self.builtin.read().await.get(module_name) {
            return Some(ModuleRoute::Builtin(module.clone()));
        }
        self.external
            .read()
            .await
            .get(module_name)
            .cloned()
            .map(ModuleRoute::External)
    }

    pub async fn register(
        &self,
        registration: ExternalModuleRegistration,
    ) -> OrchestratorResult<ExternalModule> {
        let module_id = match registration.module_id.as_deref() {
            Some(id) => {
                if !self.id_pattern.is_match(id) {
                    return Err(OrchestratorError::invalid_input(format!(
                        "module_id '{id}' must be 1-64 characters of [A-Za-z0-9_-]"
                    )));
                }
                id.to_string()
            }
            None => format!("ext-{}", Uuid::new_v4()),
        };

        let base_url = registration.base_url.trim();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(OrchestratorError::invalid_input(format!(
                "base_url '{base_url}' must start with http:// or https://"
            )));
        }
        if self.builtin.read().await.contains_key(&module_id) {
            return Err(OrchestratorError::invalid_input(format!(
                "module_id '{module_id}' collides with a builtin module"
            )));
        }

        let registration = ExternalModuleRegistration {
            base_url: base_url.trim_end_matches('/').to_string(),
            ..registration
        };
        let mut entry = ExternalModule::new(module_id.clone(), registration);

        let mut external = self.external.write().await;
        if let Some(existing) = external.get(&module_id) {
            entry.registered_at = existing.registered_at;
            info!("Re-registering external module {}", module_id);
        } else {
            info!(base_url = %entry.base_url, "Registered external module {}", module_id);
        }
        external.insert(module_id, entry.clone());
        Ok(entry)
    }

    /// 列出外部模块，返回的状态已按心跳窗口折算
    pub async fn list(&self, active_only: bool) -> Vec<ExternalModule> {
        let now = Utc::now();
        let mut entries: Vec<ExternalModule> = self
            .external
            .read()
            .await
            .values()
            .map(|entry| self.with_effective_status(entry, now))
            .filter(|entry| !active_only || entry.status == ExternalModuleStatus::Active)
            .collect();
        entries.sort_by(|a, b| a.registered_at.cmp(&b.registered_at));
        entries
    }

    pub async fn get(&self, module_id: &str) -> OrchestratorResult<ExternalModule> {
        self.external
            .read()
            .await
            .get(module_id)
            .map(|entry| self.with_effective_status(entry, Utc::now()))
            .ok_or_else(|| OrchestratorError::module_not_found(module_id))
    }

    pub async fn deregister(&self, module_id: &str) -> bool {
        let removed = self.external.write().await.remove(module_id).is_some();
        if removed {
            info!("Deregistered external module {}", module_id);
        }
        removed
    }

    pub async fn heartbeat(&self, module_id: &str) -> bool {
        match self.external.write().await.get_mut(module_id) {
            Some(entry) => {
                entry.record_heartbeat(Utc::now());
                debug!("Heartbeat from external module {}", module_id);
                true
            }
            None => false,
        }
    }

    pub async fn effective_status(&self, module_id: &str) -> Option<ExternalModuleStatus> {
        self.external
            .read()
            .await
            .get(module_id)
            .map(|entry| entry.effective_status(self.staleness_window_seconds, Utc::now()))
    }

    /// 确认外部模块可以接收文件，否则返回客户端可见的错误
    pub async fn ensure_deliverable(&self, module_id: &str) -> OrchestratorResult<ExternalModule> {
        let entry = self.get(module_id).await?;
        match entry.status {
            ExternalModuleStatus::Active => Ok(entry),
            ExternalModuleStatus::Inactive => Err(OrchestratorError::module_unavailable(
                module_id,
                format!(
                    "no heartbeat within {}s (last at {})",
                    self.staleness_window_seconds,
                    entry.last_heartbeat.to_rfc3339()
                ),
            )),
            ExternalModuleStatus::Error => Err(OrchestratorError::module_unavailable(
                module_id,
                entry
                    .error_message
                    .unwrap_or_else(|| "module is in error state".to_string()),
            )),
        }
    }

    pub async fn mark_error(&self, module_id: &str, message: &str) {
        if let Some(entry) = self.external.write().await.get_mut(module_id) {
            warn!("External module {} marked as error: {}", module_id, message);
            entry.mark_error(message);
        }
    }

    /// 健康检查恢复后清除错误状态，心跳过期的模块保持 inactive
    pub async fn clear_error(&self, module_id: &str) {
        let now = Utc::now();
        if let Some(entry) = self.external.write().await.get_mut(module_id) {
            if entry.status == ExternalModuleStatus::Error
                && !entry.is_heartbeat_expired(self.staleness_window_seconds, now)
            {
                info!("External module {} recovered", module_id);
                entry.status = ExternalModuleStatus::Active;
                entry.error_message = None;
            }
        }
    }

    /// 将心跳过期的 active 模块标记为 inactive，返回受影响的模块ID
    pub async fn mark_stale(&self, now: DateTime<Utc>) -> Vec<String> {
        let mut stale = Vec::new();
        for entry in self.external.write().await.values_mut() {
            if entry.status == ExternalModuleStatus::Active
                && entry.is_heartbeat_expired(self.staleness_window_seconds, now)
            {
                warn!(
                    "External module {} missed heartbeat (last: {})",
                    entry.module_id,
                    entry.last_heartbeat.format("%Y-%m-%d %H:%M:%S UTC")
                );
                entry.status = ExternalModuleStatus::Inactive;
                stale.push(entry.module_id.clone());
            }
        }
        stale
    }

    /// 删除心跳超过清理阈值的模块
    pub async fn remove_expired(&self, threshold_seconds: i64, now: DateTime<Utc>) -> Vec<String> {
        let mut external = self.external.write().await;
        let expired: Vec<String> = external
            .values()
            .filter(|entry| entry.is_heartbeat_expired(threshold_seconds, now))
            .map(|entry| entry.module_id.clone())
            .collect();
        for module_id in &expired {
            external.remove(module_id);
            info!("Removed expired external module {}", module_id);
        }
        expired
    }

    /// 需要健康检查的模块：配置了地址且心跳仍在窗口内
    pub async fn healthcheck_targets(&self, now: DateTime<Utc>) -> Vec<(String, String)> {
        self.external
            .read()
            .await
            .values()
            .filter(|entry| !entry.is_heartbeat_expired(self.staleness_window_seconds, now))
            .filter_map(|entry| {
                entry
                    .healthcheck_url
                    .as_ref()
                    .map(|url| (entry.module_id.clone(), url.clone()))
            })
            .collect()
    }

    fn with_effective_status(&self, entry: &ExternalModule, now: DateTime<Utc>) -> ExternalModule {
        let mut view = entry.clone();
        view.status = entry.effective_status(self.staleness_window_seconds, now);
        view
    }

    #[cfg(test)]
    pub(crate) async fn set_last_heartbeat(&self, module_id: &str, at: DateTime<Utc>) {
        if let Some(entry) = self.external.write().await.get_mut(module_id) {
            entry.last_heartbeat = at;
        }
    }
}
