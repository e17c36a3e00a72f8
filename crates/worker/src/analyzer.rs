use std::path::{Path, PathBuf};

use async_trait::async_trait;
use orchestrator_core::{OrchestratorError, OrchestratorResult};
use orchestrator_domain::entities::{Module, ModuleKind, Task};

/// 单个文件的最大扫描大小
pub const MAX_SCAN_FILE_BYTES: u64 = 4 * 1024 * 1024;

/// 一次分析的输入
#[derive(Debug, Clone)]
pub struct AnalysisContext {
    pub task: Task,
    /// 制品在本地的绝对路径，可能是文件也可能是目录
    pub artifact_path: PathBuf,
}

impl AnalysisContext {
    pub fn new(task: Task, artifact_path: PathBuf) -> Self {
        Self {
            task,
            artifact_path,
        }
    }

    pub fn parameter_str(&self, key: &str) -> Option<&str> {
        self.task.parameters.get(key).and_then(|v| v.as_str())
    }

    /// 相对于制品根目录的展示路径
    pub fn display_path(&self, path: &Path) -> String {
        path.strip_prefix(&self.artifact_path)
            .ok()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned()
    }
}

/// 分析模块
#[async_trait]
pub trait ModuleAnalyzer: Send + Sync {
    fn name(&self) -> &str;

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn description(&self) -> &str;

    fn supported_file_types(&self) -> Vec<String>;

    fn supports(&self, file_type: &str) -> bool {
        self.supported_file_types()
            .iter()
            .any(|t| t == "*" || t.eq_ignore_ascii_case(file_type))
    }

    fn descriptor(&self) -> Module {
        Module {
            name: self.name().to_string(),
            version: self.version().to_string(),
            description: self.description().to_string(),
            config: serde_json::Value::Null,
            kind: ModuleKind::Builtin,
            file_types: self.supported_file_types(),
        }
    }

    async fn analyze(&self, context: &AnalysisContext) -> OrchestratorResult<serde_json::Value>;
}

/// 收集制品下满足条件的文件，制品本身是文件时只检查它自己
pub fn collect_files<F>(root: &Path, filter: F) -> OrchestratorResult<Vec<PathBuf>>
where
    F: Fn(&Path) -> bool,
{
    let metadata = std::fs::metadata(root).map_err(|e| {
        OrchestratorError::execution_failure(format!(
            "artifact not readable: {}: {e}",
            root.display()
        ))
    })?;

    if metadata.is_file() {
        return Ok(if filter(root) {
            vec![root.to_path_buf()]
        } else {
            Vec::new()
        });
    }

    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = std::fs::read_dir(&dir).map_err(|e| {
            OrchestratorError::execution_failure(format!(
                "failed to read directory {}: {e}",
                dir.display()
            ))
        })?;
        for entry in entries.flatten() {
            let path = entry.path();
            match entry.file_type() {
                Ok(ft) if ft.is_dir() => pending.push(path),
                Ok(ft) if ft.is_file() && filter(&path) => files.push(path),
                _ => {}
            }
        }
    }
    files.sort();
    Ok(files)
}

/// 在阻塞线程池中执行文件扫描
pub async fn run_blocking<T, F>(f: F) -> OrchestratorResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> OrchestratorResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| OrchestratorError::Internal(format!("analysis task panicked: {e}")))?
}
