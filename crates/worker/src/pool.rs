use std::sync::Arc;

use orchestrator_core::config::WorkerConfig;
use orchestrator_domain::entities::Module;
use orchestrator_domain::ports::{FileStorage, TaskStore};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::analyzer::ModuleAnalyzer;
use crate::runtime::{ModuleWorker, WorkerSettings};

/// 为每个分析模块启动若干个工作实例
pub struct WorkerPool {
    workers: Vec<Arc<ModuleWorker>>,
    analyzers: Vec<Arc<dyn ModuleAnalyzer>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(
        analyzers: Vec<Arc<dyn ModuleAnalyzer>>,
        store: Arc<dyn TaskStore>,
        file_storage: Arc<dyn FileStorage>,
        config: &WorkerConfig,
    ) -> Self {
        let settings = WorkerSettings::new(config.idle_interval_ms, config.backoff_multiplier);
        let host = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "localhost".to_string());

        let workers = analyzers
            .iter()
            .flat_map(|analyzer| {
                (0..config.instances_per_module).map(|index| {
                    Arc::new(ModuleWorker::new(
                        format!("{}-{}-{}", host, analyzer.name(), index),
                        analyzer.clone(),
                        store.clone(),
                        file_storage.clone(),
                        settings.clone(),
                    ))
                })
            })
            .collect();

        Self {
            workers,
            analyzers,
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn descriptors(&self) -> Vec<Module> {
        self.analyzers.iter().map(|a| a.descriptor()).collect()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub async fn start(&self, shutdown_tx: &broadcast::Sender<()>) {
        let mut handles = self.handles.lock().await;
        for worker in &self.workers {
            let worker = worker.clone();
            let shutdown_rx = shutdown_tx.subscribe();
            handles.push(tokio::spawn(async move { worker.run(shutdown_rx).await }));
        }
        info!("Started {} module workers", self.workers.len());
    }

    /// 等待所有工作实例退出
    pub async fn join(&self) {
        let handles: Vec<_> = self.handles.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Module worker terminated abnormally: {}", e);
            }
        }
    }
}
