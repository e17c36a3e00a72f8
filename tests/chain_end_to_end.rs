use std::time::Duration;

use orchestrator::{Services, ShutdownManager};
use orchestrator_core::config::{ChainConfig, ChainStepConfig, CommandModuleConfig};
use orchestrator_core::AppConfig;
use orchestrator_domain::entities::{ExecutionStatus, StoredFile};
use orchestrator_worker::WorkerPool;
use serde_json::json;
use tempfile::TempDir;

const MANIFEST: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<manifest xmlns:android="http://schemas.android.com/apk/res/android" package="com.example.app">
    <uses-permission android:name="android.permission.CAMERA" />
    <application android:label="Example" />
</manifest>
"#;

fn step(module_name: &str, order: u32) -> ChainStepConfig {
    ChainStepConfig {
        module_name: module_name.to_string(),
        order: Some(order),
        parameters: json!({}),
        inject_previous_results: false,
        timeout_seconds: None,
    }
}

fn config_for(root: &TempDir) -> AppConfig {
    let mut config = AppConfig::default();
    config.storage.root = root.path().to_path_buf();
    config.worker.idle_interval_ms = 10;
    config.worker.backoff_multiplier = 1;
    config.worker.modules = vec!["permissions".to_string()];
    config.worker.command_modules = vec![CommandModuleConfig {
        name: "semgrep".to_string(),
        version: "1.0.0".to_string(),
        description: "stub scanner".to_string(),
        command: "sh".to_string(),
        args: vec!["-c".to_string(), r#"echo '{"findings":[]}'"#.to_string()],
        file_types: vec!["apk".to_string()],
        timeout_seconds: 10,
    }];
    config.chain_engine.poll_interval_ms = 10;
    config.chain_engine.step_timeout_seconds = 10;
    config.chain_engine.chains = vec![ChainConfig {
        name: "apk-baseline".to_string(),
        description: "baseline".to_string(),
        abort_policy: "abort_remaining".to_string(),
        steps: vec![step("permissions", 1), step("semgrep", 2)],
    }];
    config
}

#[tokio::test]
async fn test_chain_runs_builtin_and_command_modules_in_order() {
    let root = TempDir::new().unwrap();
    let apk_dir = root.path().join("deadbeef").join("apk");
    std::fs::create_dir_all(&apk_dir).unwrap();
    std::fs::write(apk_dir.join("AndroidManifest.xml"), MANIFEST).unwrap();

    let config = config_for(&root);
    let services = Services::build(&config).await.unwrap();
    services
        .file_storage
        .register(StoredFile {
            file_hash: "deadbeef".to_string(),
            folder_path: "deadbeef/apk".to_string(),
            file_name: String::new(),
            file_type: "apk".to_string(),
        })
        .await
        .unwrap();

    let shutdown = ShutdownManager::new();
    let pool = WorkerPool::new(
        services.analyzers.clone(),
        services.store.clone(),
        services.file_storage.clone(),
        &config.worker,
    );
    pool.start(&shutdown.sender().await.unwrap()).await;

    let execution = tokio::time::timeout(
        Duration::from_secs(20),
        services.chain_engine.execute("apk-baseline", "deadbeef"),
    )
    .await
    .expect("chain did not finish")
    .unwrap();

    assert_eq!(execution.status, ExecutionStatus::Completed);

    let details = services.chain_engine.get_execution(&execution.id).await.unwrap();
    let modules: Vec<_> = details
        .module_executions
        .iter()
        .map(|m| (m.module_name.as_str(), m.status))
        .collect();
    assert_eq!(
        modules,
        vec![
            ("permissions", ExecutionStatus::Completed),
            ("semgrep", ExecutionStatus::Completed),
        ]
    );

    let permissions = details.module_executions[0].results.as_ref().unwrap();
    assert_eq!(permissions["dangerous"], json!(["android.permission.CAMERA"]));

    let semgrep = services
        .store
        .get_result("semgrep", "deadbeef")
        .await
        .unwrap()
        .unwrap();
    assert!(semgrep.is_success());
    assert_eq!(semgrep.results["findings"], json!([]));

    shutdown.shutdown().await;
    pool.join().await;
}

#[test]
fn test_sample_config_is_valid() {
    let config =
        AppConfig::from_toml(include_str!("../config/orchestrator.toml")).unwrap();

    assert_eq!(config.chain_engine.chains.len(), 1);
    assert_eq!(config.chain_engine.chains[0].name, "apk-baseline");
    assert_eq!(config.worker.command_modules[0].name, "semgrep");
}
