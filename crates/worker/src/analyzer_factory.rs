use std::sync::Arc;

use orchestrator_core::config::WorkerConfig;
use orchestrator_core::{OrchestratorError, OrchestratorResult};
use tracing::info;

use crate::analyzer::ModuleAnalyzer;
use crate::analyzers::{CommandAnalyzer, NativeLibsAnalyzer, PermissionsAnalyzer, SecretsAnalyzer};

pub const BUILTIN_ANALYZERS: [&str; 3] = ["permissions", "secrets", "native-libs"];

/// 按配置创建分析模块
pub struct AnalyzerFactory;

impl AnalyzerFactory {
    pub fn create(name: &str) -> OrchestratorResult<Arc<dyn ModuleAnalyzer>> {
        match name {
            "permissions" => Ok(Arc::new(PermissionsAnalyzer::new()?)),
            "secrets" => Ok(Arc::new(SecretsAnalyzer::new()?)),
            "native-libs" => Ok(Arc::new(NativeLibsAnalyzer)),
            other => Err(OrchestratorError::Configuration(format!(
                "unknown built-in module '{other}', available: {}",
                BUILTIN_ANALYZERS.join(", ")
            ))),
        }
    }

    pub fn from_config(config: &WorkerConfig) -> OrchestratorResult<Vec<Arc<dyn ModuleAnalyzer>>> {
        let mut analyzers = Vec::new();
        for name in &config.modules {
            analyzers.push(Self::create(name)?);
        }
        for command_module in &config.command_modules {
            if analyzers.iter().any(|a| a.name() == command_module.name) {
                return Err(OrchestratorError::Configuration(format!(
                    "module '{}' is defined twice",
                    command_module.name
                )));
            }
            analyzers.push(Arc::new(CommandAnalyzer::new(command_module.clone())));
        }
        info!(
            "Configured analyzers: {:?}",
            analyzers.iter().map(|a| a.name().to_string()).collect::<Vec<_>>()
        );
        Ok(analyzers)
    }
}
