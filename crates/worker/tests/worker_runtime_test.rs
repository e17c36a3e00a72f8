use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use orchestrator_core::config::WorkerConfig;
use orchestrator_core::{OrchestratorError, OrchestratorResult};
use orchestrator_domain::entities::{ResultStatus, StoredFile, Task, TaskResult};
use orchestrator_domain::ports::{FileStorage, TaskStore};
use orchestrator_infrastructure::{InMemoryTaskStore, LocalFileStorage};
use orchestrator_worker::{
    AnalysisContext, ModuleAnalyzer, ModuleWorker, PollOutcome, WorkerPool, WorkerSettings,
};
use serde_json::json;
use tokio::sync::broadcast;

/// 回显文件哈希；file_hash 为 "explode" 时报错
struct EchoAnalyzer;

#[async_trait]
impl ModuleAnalyzer for EchoAnalyzer {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "test analyzer"
    }

    fn supported_file_types(&self) -> Vec<String> {
        vec!["apk".to_string()]
    }

    async fn analyze(&self, context: &AnalysisContext) -> OrchestratorResult<serde_json::Value> {
        if context.task.file_hash == "explode" {
            return Err(OrchestratorError::execution_failure("decoder crashed"));
        }
        Ok(json!({
            "file": context.task.file_hash,
            "path": context.artifact_path.to_string_lossy(),
        }))
    }
}

/// 前几次出队失败的存储
struct FlakyStore {
    inner: InMemoryTaskStore,
    failures_left: AtomicUsize,
}

#[async_trait]
impl TaskStore for FlakyStore {
    async fn create_task(&self, task: &Task) -> OrchestratorResult<String> {
        self.inner.create_task(task).await
    }
    async fn enqueue(&self, module_name: &str, task_id: &str) -> OrchestratorResult<()> {
        self.inner.enqueue(module_name, task_id).await
    }
    async fn dequeue(&self, module_name: &str) -> OrchestratorResult<Option<String>> {
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(OrchestratorError::infrastructure("connection reset"));
        }
        self.inner.dequeue(module_name).await
    }
    async fn get_task(&self, task_id: &str) -> OrchestratorResult<Option<Task>> {
        self.inner.get_task(task_id).await
    }
    async fn put_result(
        &self,
        module_name: &str,
        file_hash: &str,
        result: &TaskResult,
    ) -> OrchestratorResult<()> {
        self.inner.put_result(module_name, file_hash, result).await
    }
    async fn get_result(
        &self,
        module_name: &str,
        file_hash: &str,
    ) -> OrchestratorResult<Option<TaskResult>> {
        self.inner.get_result(module_name, file_hash).await
    }
    async fn queue_len(&self, module_name: &str) -> OrchestratorResult<usize> {
        self.inner.queue_len(module_name).await
    }
    fn backend_name(&self) -> &'static str {
        "flaky"
    }
}

fn file(hash: &str, file_type: &str) -> StoredFile {
    StoredFile {
        file_hash: hash.to_string(),
        folder_path: hash.to_string(),
        file_name: "app.apk".to_string(),
        file_type: file_type.to_string(),
    }
}

async fn submit(store: &dyn TaskStore, hash: &str, file_type: &str) -> String {
    let task = Task::new("echo", &file(hash, file_type), json!({}));
    let id = store.create_task(&task).await.unwrap();
    store.enqueue("echo", &id).await.unwrap();
    id
}

fn fast_settings() -> WorkerSettings {
    WorkerSettings::new(10, 5)
}

fn worker(store: Arc<dyn TaskStore>, storage: Arc<dyn FileStorage>) -> ModuleWorker {
    ModuleWorker::new(
        "test-worker".to_string(),
        Arc::new(EchoAnalyzer),
        store,
        storage,
        fast_settings(),
    )
}

#[tokio::test]
async fn test_success_result_is_published_with_task_id() {
    let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
    let storage: Arc<dyn FileStorage> = Arc::new(LocalFileStorage::new("/srv/uploads"));
    let worker = worker(store.clone(), storage);

    let task_id = submit(store.as_ref(), "deadbeef", "apk").await;
    let outcome = worker.process_next().await.unwrap();
    assert_eq!(outcome, PollOutcome::Processed(ResultStatus::Success));

    let result = store.get_result("echo", "deadbeef").await.unwrap().unwrap();
    assert_eq!(result.task_id.as_deref(), Some(task_id.as_str()));
    assert_eq!(result.results["path"], "/srv/uploads/deadbeef/app.apk");
    assert_eq!(worker.process_next().await.unwrap(), PollOutcome::Idle);
}

#[tokio::test]
async fn test_unsupported_file_type_publishes_error() {
    let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
    let storage: Arc<dyn FileStorage> = Arc::new(LocalFileStorage::new("/srv/uploads"));
    let worker = worker(store.clone(), storage);

    submit(store.as_ref(), "cafebabe", "ipa").await;
    let outcome = worker.process_next().await.unwrap();
    assert_eq!(outcome, PollOutcome::Processed(ResultStatus::Error));

    let result = store.get_result("echo", "cafebabe").await.unwrap().unwrap();
    assert!(result.error.unwrap().contains("does not support file type 'ipa'"));
}

#[tokio::test]
async fn test_analysis_error_does_not_stop_processing() {
    let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
    let storage: Arc<dyn FileStorage> = Arc::new(LocalFileStorage::new("/srv/uploads"));
    let worker = worker(store.clone(), storage);

    submit(store.as_ref(), "explode", "apk").await;
    submit(store.as_ref(), "deadbeef", "apk").await;

    assert_eq!(
        worker.process_next().await.unwrap(),
        PollOutcome::Processed(ResultStatus::Error)
    );
    assert_eq!(
        worker.process_next().await.unwrap(),
        PollOutcome::Processed(ResultStatus::Success)
    );

    let failed = store.get_result("echo", "explode").await.unwrap().unwrap();
    assert!(failed.error.unwrap().contains("decoder crashed"));
}

#[tokio::test]
async fn test_missing_task_is_skipped() {
    let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
    let storage: Arc<dyn FileStorage> = Arc::new(LocalFileStorage::new("/srv/uploads"));
    let worker = worker(store.clone(), storage);

    store.enqueue("echo", "evicted-task").await.unwrap();
    assert_eq!(worker.process_next().await.unwrap(), PollOutcome::Skipped);
    assert_eq!(worker.process_next().await.unwrap(), PollOutcome::Idle);
}

#[tokio::test]
async fn test_store_failures_back_off_and_recover() {
    let flaky = Arc::new(FlakyStore {
        inner: InMemoryTaskStore::new(),
        failures_left: AtomicUsize::new(2),
    });
    let store: Arc<dyn TaskStore> = flaky.clone();
    let storage: Arc<dyn FileStorage> = Arc::new(LocalFileStorage::new("/srv/uploads"));
    let worker = Arc::new(worker(store.clone(), storage));

    submit(store.as_ref(), "deadbeef", "apk").await;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = {
        let worker = worker.clone();
        tokio::spawn(async move { worker.run(shutdown_rx).await })
    };

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while store.get_result("echo", "deadbeef").await.unwrap().is_none() {
        assert!(tokio::time::Instant::now() < deadline, "worker never recovered");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(flaky.failures_left.load(Ordering::SeqCst), 0);

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("worker should stop on shutdown")
        .unwrap();
}

#[tokio::test]
async fn test_pool_eventually_consumes_every_enqueued_task() {
    let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
    let storage: Arc<dyn FileStorage> = Arc::new(LocalFileStorage::new("/srv/uploads"));
    let config = WorkerConfig {
        idle_interval_ms: 10,
        instances_per_module: 3,
        ..WorkerConfig::default()
    };
    let pool = WorkerPool::new(
        vec![Arc::new(EchoAnalyzer) as Arc<dyn ModuleAnalyzer>],
        store.clone(),
        storage,
        &config,
    );
    assert_eq!(pool.worker_count(), 3);
    assert_eq!(pool.descriptors()[0].name, "echo");

    let (shutdown_tx, _) = broadcast::channel(1);
    pool.start(&shutdown_tx).await;

    let hashes: Vec<String> = (0..25).map(|i| format!("file-{i}")).collect();
    for hash in &hashes {
        submit(store.as_ref(), hash, "apk").await;
    }

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    for hash in &hashes {
        while store.get_result("echo", hash).await.unwrap().is_none() {
            assert!(tokio::time::Instant::now() < deadline, "task {hash} never consumed");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
    assert_eq!(store.queue_len("echo").await.unwrap(), 0);

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(2), pool.join())
        .await
        .expect("pool should drain on shutdown");
}
