use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use orchestrator_core::{OrchestratorError, OrchestratorResult};
use orchestrator_domain::entities::StoredFile;
use orchestrator_domain::ports::FileStorage;
use tokio::sync::RwLock;
use tracing::debug;

/// 本地目录上的文件存储
///
/// 元数据保存在内存索引中。未登记的文件ID如果在根目录下存在同名目录，
/// 按 `{root}/{file_id}` 解析。
pub struct LocalFileStorage {
    root: PathBuf,
    index: RwLock<HashMap<String, StoredFile>>,
}

impl LocalFileStorage {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into(),
            index: RwLock::new(HashMap::new()),
        }
    }

    pub async fn with_files<P: Into<PathBuf>>(root: P, files: Vec<StoredFile>) -> Self {
        let storage = Self::new(root);
        {
            let mut index = storage.index.write().await;
            for file in files {
                index.insert(file.file_hash.clone(), file);
            }
        }
        storage
    }
}

#[async_trait]
impl FileStorage for LocalFileStorage {
    async fn resolve(&self, file_id: &str) -> OrchestratorResult<Option<StoredFile>> {
        if let Some(file) = self.index.read().await.get(file_id) {
            return Ok(Some(file.clone()));
        }

        // 拒绝路径穿越
        if file_id.is_empty() || file_id.contains('/') || file_id.contains("..") {
            return Ok(None);
        }

        let folder = self.root.join(file_id);
        if tokio::fs::metadata(&folder)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            debug!(file_id, "Resolved unindexed file from storage directory");
            return Ok(Some(StoredFile {
                file_hash: file_id.to_string(),
                folder_path: file_id.to_string(),
                file_name: String::new(),
                file_type: String::new(),
            }));
        }

        Ok(None)
    }

    async fn register(&self, file: StoredFile) -> OrchestratorResult<StoredFile> {
        if file.file_hash.trim().is_empty() {
            return Err(OrchestratorError::invalid_input("file_hash is required"));
        }
        if file.folder_path.trim().is_empty() {
            return Err(OrchestratorError::invalid_input("folder_path is required"));
        }
        if Path::new(&file.folder_path)
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(OrchestratorError::invalid_input(
                "folder_path must stay inside the storage root",
            ));
        }

        self.index
            .write()
            .await
            .insert(file.file_hash.clone(), file.clone());
        Ok(file)
    }

    fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apk(hash: &str) -> StoredFile {
        StoredFile {
            file_hash: hash.to_string(),
            folder_path: hash.to_string(),
            file_name: "app.apk".to_string(),
            file_type: "apk".to_string(),
        }
    }

    #[tokio::test]
    async fn test_register_and_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalFileStorage::new(dir.path());
        storage.register(apk("deadbeef")).await.unwrap();

        let file = storage.resolve("deadbeef").await.unwrap().unwrap();
        assert_eq!(file.file_type, "apk");
        assert_eq!(
            storage.absolute_path(&file),
            dir.path().join("deadbeef").join("app.apk")
        );
    }

    #[tokio::test]
    async fn test_resolve_falls_back_to_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("abc123")).unwrap();
        let storage = LocalFileStorage::new(dir.path());

        let file = storage.resolve("abc123").await.unwrap().unwrap();
        assert_eq!(file.folder_path, "abc123");
        assert!(storage.resolve("missing").await.unwrap().is_none());
        assert!(storage.resolve("../etc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_register_rejects_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalFileStorage::new(dir.path());
        let mut file = apk("deadbeef");
        file.folder_path = "../outside".to_string();
        assert!(storage.register(file).await.is_err());
    }
}
