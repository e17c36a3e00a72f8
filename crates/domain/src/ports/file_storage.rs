use std::path::{Path, PathBuf};

use async_trait::async_trait;
use orchestrator_core::OrchestratorResult;

use crate::entities::StoredFile;

/// 文件存储协作方，负责上传文件的元数据与落盘位置
#[async_trait]
pub trait FileStorage: Send + Sync {
    async fn resolve(&self, file_id: &str) -> OrchestratorResult<Option<StoredFile>>;
    async fn register(&self, file: StoredFile) -> OrchestratorResult<StoredFile>;
    fn root(&self) -> &Path;

    fn absolute_path(&self, file: &StoredFile) -> PathBuf {
        self.root().join(file.relative_path())
    }
}
