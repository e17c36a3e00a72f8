//! 外部模块文件桥
//!
//! 外部模块无法直接访问任务存储，只能通过 HTTP 拉取打包好的文件。
//! 单个文件时归档以该文件自身的子树为根（去掉首段哈希目录），
//! 多个文件时保留完整相对路径以避免重名。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::{info, warn};

use orchestrator_core::{OrchestratorError, OrchestratorResult};
use orchestrator_domain::entities::StoredFile;
use orchestrator_domain::ports::FileStorage;

use crate::registry::ModuleRegistry;

pub const ARCHIVE_CONTENT_TYPE: &str = "application/x-tar";

#[derive(Debug, Clone)]
pub struct FileArchive {
    /// gzip 压缩的 tar 数据
    pub bytes: Vec<u8>,
    pub file_ids: Vec<String>,
    pub skipped: Vec<String>,
}

impl FileArchive {
    pub fn file_name(&self, module_id: &str) -> String {
        format!("{module_id}-files.tar.gz")
    }
}

struct ArchiveEntry {
    source: PathBuf,
    name: PathBuf,
}

pub struct ExternalModuleBridge {
    registry: Arc<ModuleRegistry>,
    file_storage: Arc<dyn FileStorage>,
}

impl ExternalModuleBridge {
    pub fn new(registry: Arc<ModuleRegistry>, file_storage: Arc<dyn FileStorage>) -> Self {
        Self {
            registry,
            file_storage,
        }
    }

    pub async fn get_files_for_module(
        &self,
        module_id: &str,
        file_ids: &[String],
    ) -> OrchestratorResult<FileArchive> {
        self.registry.ensure_deliverable(module_id).await?;

        if file_ids.is_empty() {
            return Err(OrchestratorError::invalid_input("file_ids cannot be empty"));
        }

        let mut resolved: Vec<(String, StoredFile, PathBuf)> = Vec::new();
        let mut skipped = Vec::new();
        for file_id in file_ids {
            match self.file_storage.resolve(file_id).await? {
                Some(file) => {
                    let path = self.file_storage.absolute_path(&file);
                    if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                        resolved.push((file_id.clone(), file, path));
                    } else {
                        warn!(
                            module = %module_id,
                            file_hash = %file_id,
                            "File missing on disk, skipping: {}",
                            path.display()
                        );
                        skipped.push(file_id.clone());
                    }
                }
                None => {
                    warn!(module = %module_id, file_hash = %file_id, "Unknown file id, skipping");
                    skipped.push(file_id.clone());
                }
            }
        }

        if resolved.is_empty() {
            return Err(OrchestratorError::invalid_input(format!(
                "none of the requested files could be resolved: {}",
                file_ids.join(",")
            )));
        }

        let single = resolved.len() == 1;
        let mut delivered = Vec::with_capacity(resolved.len());
        let mut sources = Vec::with_capacity(resolved.len());
        for (id, file, path) in resolved {
            delivered.push(id);
            sources.push((file, path));
        }

        // 条目命名也要读文件元数据，和打包一起放到阻塞线程池
        let bytes = tokio::task::spawn_blocking(move || {
            let entries: Vec<ArchiveEntry> = sources
                .iter()
                .map(|(file, path)| ArchiveEntry {
                    source: path.clone(),
                    name: archive_name(file, path, single),
                })
                .collect();
            build_archive(&entries)
        })
        .await
        .map_err(|e| OrchestratorError::Internal(format!("archive task failed: {e}")))??;

        // 成功交付同时视为一次心跳
        self.registry.heartbeat(module_id).await;
        metrics::counter!("orchestrator_bridge_deliveries_total").increment(1);
        info!(
            module = %module_id,
            files = delivered.len(),
            skipped = skipped.len(),
            bytes = bytes.len(),
            "Delivered file archive"
        );

        Ok(FileArchive {
            bytes,
            file_ids: delivered,
            skipped,
        })
    }
}

/// 归档内的条目名，空路径表示以目录内容作为归档根
fn archive_name(file: &StoredFile, source: &Path, single: bool) -> PathBuf {
    let relative = file.relative_path();
    if !single {
        return relative;
    }
    let stripped: PathBuf = relative.components().skip(1).collect();
    if stripped.as_os_str().is_empty() && source.is_file() {
        return source
            .file_name()
            .map(PathBuf::from)
            .unwrap_or(relative);
    }
    stripped
}

fn build_archive(entries: &[ArchiveEntry]) -> OrchestratorResult<Vec<u8>> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for entry in entries {
        let result = if entry.source.is_dir() {
            builder.append_dir_all(&entry.name, &entry.source)
        } else {
            builder.append_path_with_name(&entry.source, &entry.name)
        };
        result.map_err(|e| {
            OrchestratorError::Internal(format!(
                "failed to add {} to archive: {e}",
                entry.source.display()
            ))
        })?;
    }

    let encoder = builder
        .into_inner()
        .map_err(|e| OrchestratorError::Internal(format!("failed to finish archive: {e}")))?;
    encoder
        .finish()
        .map_err(|e| OrchestratorError::Internal(format!("failed to compress archive: {e}")))
}
