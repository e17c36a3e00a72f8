//! 配置管理
//!
//! 配置按以下顺序叠加，后者覆盖前者：
//!
//! - 内置默认值
//! - TOML 配置文件
//! - `ORCHESTRATOR_` 前缀的环境变量，层级之间使用 `__` 分隔，
//!   例如 `ORCHESTRATOR_API__BIND_ADDRESS=0.0.0.0:9000`

pub mod app_config;
pub mod validation;

use thiserror::Error;

pub use app_config::{
    ApiConfig, AppConfig, ChainConfig, ChainEngineConfig, ChainStepConfig, CommandModuleConfig,
    ObservabilityConfig, RegistryConfig, StorageConfig, StoreBackend, StoreConfig, WorkerConfig,
};
pub use validation::{ConfigValidator, ValidationUtils};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("File error: {0}")]
    File(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

impl From<ConfigError> for crate::errors::OrchestratorError {
    fn from(err: ConfigError) -> Self {
        crate::errors::OrchestratorError::Configuration(err.to_string())
    }
}
