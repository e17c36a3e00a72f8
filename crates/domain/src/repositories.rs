//! 领域仓储抽象

use async_trait::async_trait;
use orchestrator_core::OrchestratorResult;

use crate::entities::{Chain, ChainExecution, ModuleExecution};

/// 链定义仓储
#[async_trait]
pub trait ChainRepository: Send + Sync {
    async fn save(&self, chain: &Chain) -> OrchestratorResult<Chain>;
    async fn find_by_name(&self, name: &str) -> OrchestratorResult<Option<Chain>>;
    async fn find_all(&self) -> OrchestratorResult<Vec<Chain>>;
}

/// 链执行记录仓储
#[async_trait]
pub trait ExecutionRepository: Send + Sync {
    async fn create(&self, execution: &ChainExecution) -> OrchestratorResult<ChainExecution>;
    async fn update(&self, execution: &ChainExecution) -> OrchestratorResult<ChainExecution>;
    async fn find_by_id(&self, id: &str) -> OrchestratorResult<Option<ChainExecution>>;
    async fn find_by_chain(&self, chain_name: &str) -> OrchestratorResult<Vec<ChainExecution>>;

    async fn create_module_execution(
        &self,
        module_execution: &ModuleExecution,
    ) -> OrchestratorResult<ModuleExecution>;
    async fn update_module_execution(
        &self,
        module_execution: &ModuleExecution,
    ) -> OrchestratorResult<ModuleExecution>;
    /// 按步骤顺序返回
    async fn find_module_executions(
        &self,
        chain_execution_id: &str,
    ) -> OrchestratorResult<Vec<ModuleExecution>>;
}
