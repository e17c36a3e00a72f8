use std::collections::HashMap;

use async_trait::async_trait;
use orchestrator_core::{OrchestratorError, OrchestratorResult};
use orchestrator_domain::entities::{Chain, ChainExecution, ModuleExecution};
use orchestrator_domain::repositories::{ChainRepository, ExecutionRepository};
use tokio::sync::RwLock;

/// 内存链定义仓储
#[derive(Default)]
pub struct InMemoryChainRepository {
    chains: RwLock<HashMap<String, Chain>>,
}

impl InMemoryChainRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChainRepository for InMemoryChainRepository {
    async fn save(&self, chain: &Chain) -> OrchestratorResult<Chain> {
        let chain = chain.clone().normalized()?;
        self.chains
            .write()
            .await
            .insert(chain.name.clone(), chain.clone());
        Ok(chain)
    }

    async fn find_by_name(&self, name: &str) -> OrchestratorResult<Option<Chain>> {
        Ok(self.chains.read().await.get(name).cloned())
    }

    async fn find_all(&self) -> OrchestratorResult<Vec<Chain>> {
        let mut chains: Vec<Chain> = self.chains.read().await.values().cloned().collect();
        chains.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(chains)
    }
}

/// 内存链执行记录仓储
#[derive(Default)]
pub struct InMemoryExecutionRepository {
    executions: RwLock<HashMap<String, ChainExecution>>,
    module_executions: RwLock<HashMap<String, Vec<ModuleExecution>>>,
}

impl InMemoryExecutionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExecutionRepository for InMemoryExecutionRepository {
    async fn create(&self, execution: &ChainExecution) -> OrchestratorResult<ChainExecution> {
        self.executions
            .write()
            .await
            .insert(execution.id.clone(), execution.clone());
        Ok(execution.clone())
    }

    async fn update(&self, execution: &ChainExecution) -> OrchestratorResult<ChainExecution> {
        let mut executions = self.executions.write().await;
        match executions.get_mut(&execution.id) {
            Some(existing) => {
                *existing = execution.clone();
                Ok(execution.clone())
            }
            None => Err(OrchestratorError::execution_not_found(&execution.id)),
        }
    }

    async fn find_by_id(&self, id: &str) -> OrchestratorResult<Option<ChainExecution>> {
        Ok(self.executions.read().await.get(id).cloned())
    }

    async fn find_by_chain(&self, chain_name: &str) -> OrchestratorResult<Vec<ChainExecution>> {
        let mut executions: Vec<ChainExecution> = self
            .executions
            .read()
            .await
            .values()
            .filter(|e| e.chain_name == chain_name)
            .cloned()
            .collect();
        executions.sort_by_key(|e| e.started_at);
        Ok(executions)
    }

    async fn create_module_execution(
        &self,
        module_execution: &ModuleExecution,
    ) -> OrchestratorResult<ModuleExecution> {
        let mut all = self.module_executions.write().await;
        let steps = all
            .entry(module_execution.chain_execution_id.clone())
            .or_default();
        if steps.iter().any(|s| s.order == module_execution.order) {
            return Err(OrchestratorError::invalid_input(format!(
                "step {} already recorded for execution {}",
                module_execution.order, module_execution.chain_execution_id
            )));
        }
        steps.push(module_execution.clone());
        steps.sort_by_key(|s| s.order);
        Ok(module_execution.clone())
    }

    async fn update_module_execution(
        &self,
        module_execution: &ModuleExecution,
    ) -> OrchestratorResult<ModuleExecution> {
        let mut all = self.module_executions.write().await;
        let existing = all
            .get_mut(&module_execution.chain_execution_id)
            .and_then(|steps| steps.iter_mut().find(|s| s.id == module_execution.id))
            .ok_or_else(|| OrchestratorError::execution_not_found(&module_execution.id))?;
        *existing = module_execution.clone();
        Ok(module_execution.clone())
    }

    async fn find_module_executions(
        &self,
        chain_execution_id: &str,
    ) -> OrchestratorResult<Vec<ModuleExecution>> {
        Ok(self
            .module_executions
            .read()
            .await
            .get(chain_execution_id)
            .cloned()
            .unwrap_or_default())
    }
}
