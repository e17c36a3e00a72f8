use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use flate2::read::GzDecoder;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use orchestrator_api::{create_app, AppState};
use orchestrator_core::config::{ApiConfig, RegistryConfig};
use orchestrator_core::OrchestratorResult;
use orchestrator_dispatcher::{
    ChainEngine, ChainEngineSettings, ExternalModuleBridge, ModuleDispatcher, ModuleRegistry,
};
use orchestrator_domain::entities::{ExternalModule, Module, Task};
use orchestrator_domain::ports::ExternalDispatcher;
use orchestrator_infrastructure::{
    InMemoryChainRepository, InMemoryExecutionRepository, InMemoryTaskStore, LocalFileStorage,
};

struct NoopRemote;

#[async_trait]
impl ExternalDispatcher for NoopRemote {
    async fn dispatch(&self, _: &ExternalModule, _: &Task, _: &str) -> OrchestratorResult<()> {
        Ok(())
    }

    async fn check_health(&self, _: &str) -> OrchestratorResult<()> {
        Ok(())
    }
}

struct TestApp {
    router: Router,
    registry: Arc<ModuleRegistry>,
    _dir: TempDir,
}

async fn test_app() -> TestApp {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("abc123/source_code/app");
    std::fs::create_dir_all(&source).unwrap();
    std::fs::write(source.join("MainActivity.java"), "class MainActivity {}").unwrap();

    let store = Arc::new(InMemoryTaskStore::new());
    let file_storage = Arc::new(LocalFileStorage::new(dir.path()));
    let registry = Arc::new(ModuleRegistry::new(&RegistryConfig::default()).unwrap());
    registry
        .register_builtin(Module::builtin(
            "permissions",
            "1.0.0",
            "Android permission extractor",
            &["apk"],
        ))
        .await;

    let dispatcher = Arc::new(ModuleDispatcher::new(
        store.clone(),
        registry.clone(),
        Arc::new(NoopRemote),
        "http://127.0.0.1:8080",
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
        ChainEngineSettings {
            poll_interval: Duration::from_millis(10),
            step_timeout: Duration::from_secs(1),
        },
    ));

    let state = AppState {
        store,
        file_storage,
        registry: registry.clone(),
        dispatcher,
        bridge,
        chain_engine,
    };

    TestApp {
        router: create_app(state, &ApiConfig::default()),
        registry,
        _dir: dir,
    }
}

async fn send(app: &TestApp, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    let response = app
        .router
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn register_apk(app: &TestApp) {
    let (status, _) = send(
        app,
        Method::POST,
        "/api/files",
        Some(json!({
            "file_hash": "deadbeef",
            "folder_path": "deadbeef",
            "file_name": "app.apk",
            "file_type": "apk"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_health_check() {
    let app = test_app().await;
    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["store_backend"], "memory");
}

#[tokio::test]
async fn test_list_modules() {
    let app = test_app().await;
    let (status, body) = send(&app, Method::GET, "/api/modules", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"][0]["name"], "permissions");
    assert_eq!(body["data"][0]["kind"], "builtin");
}

#[tokio::test]
async fn test_run_module_creates_retrievable_task() {
    let app = test_app().await;
    register_apk(&app).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/modules/permissions/run",
        Some(json!({"file_hash": "deadbeef"})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let task_id = body["data"]["task_id"].as_str().unwrap().to_string();

    let (status, body) = send(&app, Method::GET, &format!("/api/tasks/{task_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["module_name"], "permissions");
    assert_eq!(body["data"]["file_type"], "apk");
}

#[tokio::test]
async fn test_run_module_errors() {
    let app = test_app().await;
    register_apk(&app).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/modules/unknown/run",
        Some(json!({"file_hash": "deadbeef"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["type"], "MODULE_NOT_FOUND");
    assert_eq!(body["error"]["code"], 404);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/modules/permissions/run",
        Some(json!({"file_hash": "nope"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["type"], "FILE_NOT_FOUND");

    let (status, _) = send(&app, Method::GET, "/api/tasks/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_result_upsert_and_read() {
    let app = test_app().await;
    let uri = "/api/results/permissions/deadbeef";

    let (status, body) = send(&app, Method::GET, uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["type"], "RESULT_NOT_FOUND");

    for count in [1, 2] {
        let (status, _) = send(
            &app,
            Method::PUT,
            uri,
            Some(json!({"status": "success", "results": {"count": count}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = send(&app, Method::GET, uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "success");
    assert_eq!(body["data"]["results"]["count"], 2);

    let (status, _) = send(
        &app,
        Method::PUT,
        "/api/results/ghost/deadbeef",
        Some(json!({"status": "success", "results": {}})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, Method::PUT, uri, Some(json!({"status": "error"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_chain_definition_and_run() {
    let app = test_app().await;
    register_apk(&app).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/chains",
        Some(json!({
            "name": "apk-baseline",
            "steps": [
                {"module_name": "permissions", "order": 1},
                {"module_name": "semgrep", "order": 2, "inject_previous_results": true}
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["abort_policy"], "abort_remaining");

    let (status, body) = send(&app, Method::GET, "/api/chains", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/chains",
        Some(json!({"name": "empty", "steps": []})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, Method::GET, "/api/chains/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/chains/apk-baseline/run",
        Some(json!({"file_hash": "deadbeef"})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["data"]["status"], "pending");
    let execution_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/api/chain-executions/{execution_id}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["chain_name"], "apk-baseline");
    assert!(body["data"]["module_executions"].is_array());

    let (status, _) = send(&app, Method::GET, "/api/chain-executions/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_external_module_lifecycle() {
    let app = test_app().await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/external-modules/register",
        Some(json!({"module_id": "mobsf", "base_url": "http://mobsf:8000", "config": {}})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["module_id"], "mobsf");
    assert_eq!(body["data"]["status"], "active");

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/external-modules/register",
        Some(json!({"base_url": "http://anonymous:8000"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body["data"]["module_id"]
        .as_str()
        .unwrap()
        .starts_with("ext-"));

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/external-modules/register",
        Some(json!({"base_url": "mobsf:8000"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/external-modules/mobsf/heartbeat",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "ok");

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/external-modules/ghost/heartbeat",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(
        &app,
        Method::GET,
        "/api/external-modules?active_only=true",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let (status, body) = send(&app, Method::GET, "/api/external-modules/mobsf", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["base_url"], "http://mobsf:8000");

    let (status, _) = send(&app, Method::DELETE, "/api/external-modules/mobsf", None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, Method::DELETE, "/api/external-modules/mobsf", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_external_module_file_archive() {
    let app = test_app().await;
    send(
        &app,
        Method::POST,
        "/api/external-modules/register",
        Some(json!({"module_id": "mobsf", "base_url": "http://mobsf:8000"})),
    )
    .await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/external-modules/mobsf/files?file_ids=abc123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/x-tar"
    );
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    let mut archive = tar::Archive::new(GzDecoder::new(&bytes[..]));
    let mut names = Vec::new();
    for entry in archive.entries().unwrap() {
        let mut entry = entry.unwrap();
        if entry.header().entry_type().is_file() {
            let mut content = String::new();
            entry.read_to_string(&mut content).unwrap();
            names.push(entry.path().unwrap().to_string_lossy().to_string());
        }
    }
    assert_eq!(names, vec!["source_code/app/MainActivity.java".to_string()]);

    let (status, _) = send(&app, Method::GET, "/api/external-modules/mobsf/files", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        Method::GET,
        "/api/external-modules/mobsf/files?file_ids=unknown",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    app.registry.mark_error("mobsf", "healthcheck failed").await;
    let (status, body) = send(
        &app,
        Method::GET,
        "/api/external-modules/mobsf/files?file_ids=abc123",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["type"], "MODULE_UNAVAILABLE");
}
