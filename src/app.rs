use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{error, info};

use orchestrator_api::{create_app, AppState};
use orchestrator_core::AppConfig;
use orchestrator_dispatcher::{
    ChainEngine, ChainEngineSettings, ExternalModuleBridge, HttpExternalDispatcher,
    ModuleDispatcher, ModuleRegistry, RegistryMonitor,
};
use orchestrator_domain::ports::{ExternalDispatcher, FileStorage, TaskStore};
use orchestrator_infrastructure::{
    InMemoryChainRepository, InMemoryExecutionRepository, LocalFileStorage, TaskStoreFactory,
};
use orchestrator_worker::{AnalyzerFactory, ModuleAnalyzer, WorkerPool};

/// 应用运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    /// 仅运行API服务器（含链引擎与外部模块巡检）
    Api,
    /// 仅运行分析模块工作实例
    Worker,
    /// 运行所有组件
    All,
}

impl std::str::FromStr for AppMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "api" => Ok(AppMode::Api),
            "worker" => Ok(AppMode::Worker),
            "all" => Ok(AppMode::All),
            other => Err(anyhow::anyhow!("不支持的运行模式: {other}")),
        }
    }
}

/// 进程内共享的组件
///
/// API进程和工作进程需要对同一组模块有一致的认识：
/// 内置模块在两边都从 `worker` 配置推导出来。
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn TaskStore>,
    pub file_storage: Arc<dyn FileStorage>,
    pub registry: Arc<ModuleRegistry>,
    pub external: Arc<dyn ExternalDispatcher>,
    pub dispatcher: Arc<ModuleDispatcher>,
    pub bridge: Arc<ExternalModuleBridge>,
    pub chain_engine: Arc<ChainEngine>,
    pub analyzers: Vec<Arc<dyn ModuleAnalyzer>>,
}

impl Services {
    pub async fn build(config: &AppConfig) -> Result<Self> {
        let store = TaskStoreFactory::create(&config.store)
            .await
            .context("创建任务存储失败")?;
        let file_storage: Arc<dyn FileStorage> =
            Arc::new(LocalFileStorage::new(config.storage.root.clone()));

        let analyzers = AnalyzerFactory::from_config(&config.worker).context("创建分析模块失败")?;
        let registry = Arc::new(ModuleRegistry::new(&config.registry)?);
        for analyzer in &analyzers {
            registry.register_builtin(analyzer.descriptor()).await;
        }

        let external: Arc<dyn ExternalDispatcher> =
            Arc::new(HttpExternalDispatcher::new(&config.registry));
        let dispatcher = Arc::new(ModuleDispatcher::new(
            store.clone(),
            registry.clone(),
            external.clone(),
            &config.api.public_url,
        ));
        let bridge = Arc::new(ExternalModuleBridge::new(
            registry.clone(),
            file_storage.clone(),
        ));

        let chain_engine = Arc::new(ChainEngine::new(
            dispatcher.clone(),
            store.clone(),
            file_storage.clone(),
            Arc::new(InMemoryChainRepository::new()),
            Arc::new(InMemoryExecutionRepository::new()),
            ChainEngineSettings::from(&config.chain_engine),
        ));
        let loaded = chain_engine
            .load_chains(&config.chain_engine.chains)
            .await
            .context("加载链定义失败")?;
        info!("Loaded {} chain definitions", loaded);

        Ok(Self {
            store,
            file_storage,
            registry,
            external,
            dispatcher,
            bridge,
            chain_engine,
            analyzers,
        })
    }

    pub fn app_state(&self) -> AppState {
        AppState {
            store: self.store.clone(),
            file_storage: self.file_storage.clone(),
            registry: self.registry.clone(),
            dispatcher: self.dispatcher.clone(),
            bridge: self.bridge.clone(),
            chain_engine: self.chain_engine.clone(),
        }
    }
}

/// 主应用程序
pub struct Application {
    config: AppConfig,
    mode: AppMode,
    services: Services,
}

impl Application {
    pub async fn new(config: AppConfig, mode: AppMode) -> Result<Self> {
        info!("初始化应用程序，模式: {:?}", mode);

        if matches!(mode, AppMode::Api) && !config.api.enabled {
            return Err(anyhow::anyhow!("API模式被禁用，请检查配置"));
        }
        if matches!(mode, AppMode::Worker) && !config.worker.enabled {
            return Err(anyhow::anyhow!("Worker模式被禁用，请检查配置"));
        }

        let services = Services::build(&config).await?;
        info!(
            "Task store backend: {}, storage root: {}",
            services.store.backend_name(),
            config.storage.root.display()
        );

        Ok(Self {
            config,
            mode,
            services,
        })
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// 运行直到收到关闭信号
    pub async fn run(&self, shutdown_tx: broadcast::Sender<()>) -> Result<()> {
        info!("启动应用程序，模式: {:?}", self.mode);

        let run_api = self.mode != AppMode::Worker && self.config.api.enabled;
        let run_worker = self.mode != AppMode::Api && self.config.worker.enabled;

        let mut handles = Vec::new();

        if run_api {
            let monitor = RegistryMonitor::new(
                self.services.registry.clone(),
                self.services.external.clone(),
                self.config.registry.clone(),
            );
            let shutdown_rx = shutdown_tx.subscribe();
            handles.push(tokio::spawn(async move { monitor.run(shutdown_rx).await }));
        }

        let pool = if run_worker {
            Some(self.start_workers(&shutdown_tx).await)
        } else {
            None
        };

        let api_result = if run_api {
            self.run_api(shutdown_tx.subscribe()).await
        } else {
            let mut shutdown_rx = shutdown_tx.subscribe();
            let _ = shutdown_rx.recv().await;
            Ok(())
        };
        if let Err(e) = &api_result {
            // API服务器失败时其余组件随之停止
            error!("API服务器异常退出: {e:#}");
            let _ = shutdown_tx.send(());
        }

        if let Some(pool) = pool {
            pool.join().await;
            info!("Worker服务已停止");
        }
        for handle in handles {
            if let Err(e) = handle.await {
                error!("后台任务异常退出: {}", e);
            }
        }

        info!("所有组件已停止");
        api_result
    }

    async fn start_workers(&self, shutdown_tx: &broadcast::Sender<()>) -> WorkerPool {
        let pool = WorkerPool::new(
            self.services.analyzers.clone(),
            self.services.store.clone(),
            self.services.file_storage.clone(),
            &self.config.worker,
        );
        info!(
            "启动 {} 个工作实例，覆盖 {} 个模块",
            pool.worker_count(),
            pool.descriptors().len()
        );
        pool.start(shutdown_tx).await;
        pool
    }

    async fn run_api(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let app = create_app(self.services.app_state(), &self.config.api);

        let listener = TcpListener::bind(&self.config.api.bind_address)
            .await
            .with_context(|| format!("绑定地址失败: {}", self.config.api.bind_address))?;

        info!("API服务器启动在 http://{}", self.config.api.bind_address);

        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("API服务器收到关闭信号");
            })
            .await
            .context("API服务器运行失败")?;

        info!("API服务器已停止");
        Ok(())
    }
}
