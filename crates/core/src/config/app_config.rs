use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::validation::{ConfigValidator, ValidationUtils};
use super::{ConfigError, ConfigResult};

const DEFAULT_CONFIG_PATHS: [&str; 3] = [
    "config/orchestrator.toml",
    "orchestrator.toml",
    "/etc/orchestrator/config.toml",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub storage: StorageConfig,
    pub worker: WorkerConfig,
    pub chain_engine: ChainEngineConfig,
    pub registry: RegistryConfig,
    pub api: ApiConfig,
    pub observability: ObservabilityConfig,
}

/// 任务存储后端
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub redis_url: String,
    pub key_prefix: String,
    pub task_ttl_seconds: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: "orchestrator".to_string(),
            task_ttl_seconds: 86_400,
        }
    }
}

impl ConfigValidator for StoreConfig {
    fn validate(&self) -> ConfigResult<()> {
        ValidationUtils::validate_not_empty(&self.key_prefix, "store.key_prefix")?;
        ValidationUtils::validate_timeout_seconds(self.task_ttl_seconds, "store.task_ttl_seconds")?;
        if self.backend == StoreBackend::Redis {
            ValidationUtils::validate_url(&self.redis_url, "store.redis_url", &["redis", "rediss"])?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// 上传文件的存储根目录
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data/uploads"),
        }
    }
}

impl ConfigValidator for StorageConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.root.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "storage.root cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// 通过外部工具执行的分析模块（例如 semgrep）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandModuleConfig {
    pub name: String,
    #[serde(default = "default_module_version")]
    pub version: String,
    #[serde(default)]
    pub description: String,
    pub command: String,
    /// `{path}` is replaced with the artifact path
    #[serde(default)]
    pub args: Vec<String>,
    pub file_types: Vec<String>,
    #[serde(default = "default_command_timeout")]
    pub timeout_seconds: u64,
}

fn default_module_version() -> String {
    "1.0.0".to_string()
}

fn default_command_timeout() -> u64 {
    600
}

impl ConfigValidator for CommandModuleConfig {
    fn validate(&self) -> ConfigResult<()> {
        ValidationUtils::validate_not_empty(&self.name, "worker.command_modules.name")?;
        ValidationUtils::validate_not_empty(&self.command, "worker.command_modules.command")?;
        ValidationUtils::validate_timeout_seconds(
            self.timeout_seconds,
            "worker.command_modules.timeout_seconds",
        )?;
        if self.file_types.is_empty() {
            return Err(ConfigError::Validation(format!(
                "worker.command_modules[{}].file_types cannot be empty",
                self.name
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub enabled: bool,
    pub idle_interval_ms: u64,
    pub backoff_multiplier: u32,
    pub instances_per_module: usize,
    /// 需要运行的内置分析模块
    pub modules: Vec<String>,
    pub command_modules: Vec<CommandModuleConfig>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            idle_interval_ms: 1000,
            backoff_multiplier: 5,
            instances_per_module: 1,
            modules: vec![
                "permissions".to_string(),
                "secrets".to_string(),
                "native-libs".to_string(),
            ],
            command_modules: Vec::new(),
        }
    }
}

impl ConfigValidator for WorkerConfig {
    fn validate(&self) -> ConfigResult<()> {
        ValidationUtils::validate_interval_ms(self.idle_interval_ms, "worker.idle_interval_ms")?;
        ValidationUtils::validate_count(
            self.backoff_multiplier as usize,
            "worker.backoff_multiplier",
            100,
        )?;
        ValidationUtils::validate_count(
            self.instances_per_module,
            "worker.instances_per_module",
            64,
        )?;
        for module in &self.modules {
            ValidationUtils::validate_not_empty(module, "worker.modules")?;
        }
        for command_module in &self.command_modules {
            command_module.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChainStepConfig {
    pub module_name: String,
    #[serde(default)]
    pub order: Option<u32>,
    #[serde(default)]
    pub parameters: serde_json::Value,
    #[serde(default)]
    pub inject_previous_results: bool,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChainConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// "abort_remaining" or "continue_on_error"
    #[serde(default = "default_abort_policy")]
    pub abort_policy: String,
    pub steps: Vec<ChainStepConfig>,
}

fn default_abort_policy() -> String {
    "abort_remaining".to_string()
}

impl ConfigValidator for ChainConfig {
    fn validate(&self) -> ConfigResult<()> {
        ValidationUtils::validate_not_empty(&self.name, "chain_engine.chains.name")?;
        if self.steps.is_empty() {
            return Err(ConfigError::Validation(format!(
                "chain '{}' must contain at least one step",
                self.name
            )));
        }
        let valid_policies = ["abort_remaining", "continue_on_error"];
        if !valid_policies.contains(&self.abort_policy.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Invalid abort policy for chain '{}': {}. Valid options: {:?}",
                self.name, self.abort_policy, valid_policies
            )));
        }
        for step in &self.steps {
            ValidationUtils::validate_not_empty(&step.module_name, "chain_engine.chains.steps")?;
            if let Some(timeout) = step.timeout_seconds {
                ValidationUtils::validate_timeout_seconds(
                    timeout,
                    "chain_engine.chains.steps.timeout_seconds",
                )?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainEngineConfig {
    pub poll_interval_ms: u64,
    pub step_timeout_seconds: u64,
    pub chains: Vec<ChainConfig>,
}

impl Default for ChainEngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            step_timeout_seconds: 1800,
            chains: Vec::new(),
        }
    }
}

impl ConfigValidator for ChainEngineConfig {
    fn validate(&self) -> ConfigResult<()> {
        ValidationUtils::validate_interval_ms(self.poll_interval_ms, "chain_engine.poll_interval_ms")?;
        ValidationUtils::validate_timeout_seconds(
            self.step_timeout_seconds,
            "chain_engine.step_timeout_seconds",
        )?;
        for chain in &self.chains {
            chain.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// 心跳过期窗口（秒）
    pub staleness_window_seconds: u64,
    pub sweep_interval_seconds: u64,
    /// 离线模块清理阈值（秒）
    pub cleanup_threshold_seconds: u64,
    pub healthcheck_enabled: bool,
    pub healthcheck_timeout_seconds: u64,
    pub dispatch_timeout_seconds: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            staleness_window_seconds: 90,
            sweep_interval_seconds: 30,
            cleanup_threshold_seconds: 3600,
            healthcheck_enabled: true,
            healthcheck_timeout_seconds: 5,
            dispatch_timeout_seconds: 30,
        }
    }
}

impl ConfigValidator for RegistryConfig {
    fn validate(&self) -> ConfigResult<()> {
        ValidationUtils::validate_timeout_seconds(
            self.staleness_window_seconds,
            "registry.staleness_window_seconds",
        )?;
        ValidationUtils::validate_timeout_seconds(
            self.sweep_interval_seconds,
            "registry.sweep_interval_seconds",
        )?;
        ValidationUtils::validate_timeout_seconds(
            self.cleanup_threshold_seconds,
            "registry.cleanup_threshold_seconds",
        )?;
        ValidationUtils::validate_timeout_seconds(
            self.healthcheck_timeout_seconds,
            "registry.healthcheck_timeout_seconds",
        )?;
        ValidationUtils::validate_timeout_seconds(
            self.dispatch_timeout_seconds,
            "registry.dispatch_timeout_seconds",
        )?;
        if self.cleanup_threshold_seconds < self.staleness_window_seconds {
            return Err(ConfigError::Validation(
                "registry.cleanup_threshold_seconds must not be shorter than the staleness window"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub bind_address: String,
    /// 外部模块拉取文件时使用的对外地址
    pub public_url: String,
    pub cors_enabled: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "0.0.0.0:8080".to_string(),
            public_url: "http://127.0.0.1:8080".to_string(),
            cors_enabled: true,
        }
    }
}

impl ConfigValidator for ApiConfig {
    fn validate(&self) -> ConfigResult<()> {
        ValidationUtils::validate_bind_address(&self.bind_address, "api.bind_address")?;
        ValidationUtils::validate_url(&self.public_url, "api.public_url", &["http", "https"])?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    /// "pretty" or "json"
    pub log_format: String,
    pub metrics_enabled: bool,
    pub metrics_bind_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_bind_address: "0.0.0.0:9090".to_string(),
        }
    }
}

impl ConfigValidator for ObservabilityConfig {
    fn validate(&self) -> ConfigResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Invalid log level: {}. Valid options: {:?}",
                self.log_level, valid_levels
            )));
        }
        let valid_formats = ["pretty", "json"];
        if !valid_formats.contains(&self.log_format.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Invalid log format: {}. Valid options: {:?}",
                self.log_format, valid_formats
            )));
        }
        if self.metrics_enabled {
            ValidationUtils::validate_bind_address(
                &self.metrics_bind_address,
                "observability.metrics_bind_address",
            )?;
        }
        Ok(())
    }
}

impl AppConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let defaults =
            ConfigBuilder::try_from(&AppConfig::default()).context("构建默认配置失败")?;
        let mut builder = ConfigBuilder::builder().add_source(defaults);

        if let Some(path) = config_path {
            if !Path::new(path).exists() {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
            tracing::info!("加载配置文件: {}", path);
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        } else if let Some(path) = DEFAULT_CONFIG_PATHS
            .iter()
            .find(|path| Path::new(path).exists())
        {
            tracing::info!("使用默认配置文件: {}", path);
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        } else {
            tracing::warn!("未找到配置文件，使用内置默认配置");
        }

        builder = builder.add_source(
            Environment::with_prefix("ORCHESTRATOR")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }
}

impl ConfigValidator for AppConfig {
    fn validate(&self) -> ConfigResult<()> {
        self.store.validate()?;
        self.storage.validate()?;
        self.worker.validate()?;
        self.chain_engine.validate()?;
        self.registry.validate()?;
        self.api.validate()?;
        self.observability.validate()?;
        Ok(())
    }
}
