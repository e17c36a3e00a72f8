use anyhow::Result;
use orchestrator_core::config::{StoreBackend, StoreConfig};
use orchestrator_domain::entities::{StoredFile, Task, TaskResult};
use orchestrator_domain::ports::TaskStore;
use orchestrator_infrastructure::TaskStoreFactory;
use serde_json::json;
use testcontainers::runners::AsyncRunner;
use testcontainers::ImageExt;
use testcontainers_modules::redis::Redis;

fn apk_file() -> StoredFile {
    StoredFile {
        file_hash: "deadbeef".to_string(),
        folder_path: "deadbeef".to_string(),
        file_name: "app.apk".to_string(),
        file_type: "apk".to_string(),
    }
}

#[tokio::test]
#[ignore] // 需要 Docker
async fn test_redis_task_store_protocol() -> Result<()> {
    let container = Redis::default().with_tag("7-alpine").start().await?;
    let port = container.get_host_port_ipv4(6379).await?;

    let config = StoreConfig {
        backend: StoreBackend::Redis,
        redis_url: format!("redis://127.0.0.1:{port}"),
        key_prefix: "orchestrator-test".to_string(),
        task_ttl_seconds: 60,
    };
    let store = TaskStoreFactory::create(&config).await?;
    assert_eq!(store.backend_name(), "redis");

    // FIFO
    let mut ids = Vec::new();
    for _ in 0..3 {
        let task = Task::new("permissions", &apk_file(), json!({"depth": 1}));
        let id = store.create_task(&task).await?;
        store.enqueue("permissions", &id).await?;
        ids.push(id);
    }
    assert_eq!(store.queue_len("permissions").await?, 3);
    for expected in &ids {
        assert_eq!(store.dequeue("permissions").await?.as_ref(), Some(expected));
    }
    assert_eq!(store.dequeue("permissions").await?, None);

    let task = store.get_task(&ids[0]).await?.expect("task stored");
    assert_eq!(task.parameters, json!({"depth": 1}));
    assert!(store.get_task("missing").await?.is_none());

    // 结果覆盖写
    let first = TaskResult::success(Some(ids[0].clone()), json!({"dangerous": []}));
    let second = TaskResult::error(Some(ids[1].clone()), "manifest not found");
    store.put_result("permissions", "deadbeef", &first).await?;
    store.put_result("permissions", "deadbeef", &second).await?;
    let current = store.get_result("permissions", "deadbeef").await?;
    assert_eq!(current, Some(second));

    Ok(())
}
