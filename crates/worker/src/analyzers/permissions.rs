use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use orchestrator_core::{OrchestratorError, OrchestratorResult};
use regex::Regex;
use serde_json::json;
use tracing::debug;

use crate::analyzer::{collect_files, run_blocking, AnalysisContext, ModuleAnalyzer};

const MANIFEST_FILE: &str = "AndroidManifest.xml";

/// Android 运行时权限（protection level: dangerous）
const DANGEROUS_PERMISSIONS: &[&str] = &[
    "android.permission.READ_CALENDAR",
    "android.permission.WRITE_CALENDAR",
    "android.permission.CAMERA",
    "android.permission.READ_CONTACTS",
    "android.permission.WRITE_CONTACTS",
    "android.permission.GET_ACCOUNTS",
    "android.permission.ACCESS_FINE_LOCATION",
    "android.permission.ACCESS_COARSE_LOCATION",
    "android.permission.ACCESS_BACKGROUND_LOCATION",
    "android.permission.RECORD_AUDIO",
    "android.permission.READ_PHONE_STATE",
    "android.permission.READ_PHONE_NUMBERS",
    "android.permission.CALL_PHONE",
    "android.permission.ANSWER_PHONE_CALLS",
    "android.permission.READ_CALL_LOG",
    "android.permission.WRITE_CALL_LOG",
    "android.permission.ADD_VOICEMAIL",
    "android.permission.USE_SIP",
    "android.permission.PROCESS_OUTGOING_CALLS",
    "android.permission.BODY_SENSORS",
    "android.permission.ACTIVITY_RECOGNITION",
    "android.permission.SEND_SMS",
    "android.permission.RECEIVE_SMS",
    "android.permission.READ_SMS",
    "android.permission.RECEIVE_WAP_PUSH",
    "android.permission.RECEIVE_MMS",
    "android.permission.READ_EXTERNAL_STORAGE",
    "android.permission.WRITE_EXTERNAL_STORAGE",
    "android.permission.READ_MEDIA_IMAGES",
    "android.permission.READ_MEDIA_VIDEO",
    "android.permission.READ_MEDIA_AUDIO",
    "android.permission.POST_NOTIFICATIONS",
    "android.permission.NEARBY_WIFI_DEVICES",
    "android.permission.BLUETOOTH_SCAN",
    "android.permission.BLUETOOTH_CONNECT",
    "android.permission.BLUETOOTH_ADVERTISE",
    "android.permission.UWB_RANGING",
];

/// 从 AndroidManifest.xml 提取 uses-permission 并分类
pub struct PermissionsAnalyzer {
    pattern: Regex,
}

impl PermissionsAnalyzer {
    pub fn new() -> OrchestratorResult<Self> {
        let pattern = Regex::new(
            r#"<uses-permission(?:-sdk-23)?\b[^>]*?android:name\s*=\s*"([^"]+)""#,
        )
        .map_err(|e| OrchestratorError::Internal(format!("invalid permission pattern: {e}")))?;
        Ok(Self { pattern })
    }

    pub fn extract(&self, manifest: &str) -> (Vec<String>, Vec<String>) {
        let permissions: BTreeSet<String> = self
            .pattern
            .captures_iter(manifest)
            .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
            .collect();

        permissions
            .into_iter()
            .partition(|p| DANGEROUS_PERMISSIONS.contains(&p.as_str()))
    }

    fn find_manifest(artifact: &Path) -> OrchestratorResult<PathBuf> {
        let candidates = collect_files(artifact, |p| {
            p.file_name().and_then(|n| n.to_str()) == Some(MANIFEST_FILE)
        })?;
        // 选最浅的一份，反编译目录下可能有多份
        candidates
            .into_iter()
            .min_by_key(|p| p.components().count())
            .ok_or_else(|| {
                OrchestratorError::execution_failure(format!(
                    "{MANIFEST_FILE} not found under {}",
                    artifact.display()
                ))
            })
    }
}

#[async_trait]
impl ModuleAnalyzer for PermissionsAnalyzer {
    fn name(&self) -> &str {
        "permissions"
    }

    fn description(&self) -> &str {
        "Extracts and classifies Android manifest permissions"
    }

    fn supported_file_types(&self) -> Vec<String> {
        vec!["apk".to_string(), "aab".to_string(), "xml".to_string()]
    }

    async fn analyze(&self, context: &AnalysisContext) -> OrchestratorResult<serde_json::Value> {
        let artifact = context.artifact_path.clone();
        let manifest_path = run_blocking(move || Self::find_manifest(&artifact)).await?;
        debug!(manifest = %manifest_path.display(), "Parsing manifest");

        let content = tokio::fs::read(&manifest_path).await.map_err(|e| {
            OrchestratorError::execution_failure(format!(
                "failed to read {}: {e}",
                manifest_path.display()
            ))
        })?;
        let content = String::from_utf8(content).map_err(|_| {
            OrchestratorError::execution_failure(
                "manifest is binary XML; decode the package before running permissions",
            )
        })?;

        let (dangerous, normal) = self.extract(&content);
        Ok(json!({
            "manifest": context.display_path(&manifest_path),
            "dangerous": dangerous,
            "normal": normal,
            "total": dangerous.len() + normal.len(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator_domain::entities::{StoredFile, Task};

    const MANIFEST: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<manifest xmlns:android="http://schemas.android.com/apk/res/android" package="com.example">
    <uses-permission android:name="android.permission.CAMERA" />
    <uses-permission android:name="android.permission.INTERNET"/>
    <uses-permission
        android:name="android.permission.READ_SMS" />
    <uses-permission android:name="android.permission.CAMERA" />
    <uses-permission-sdk-23 android:name="android.permission.ACCESS_FINE_LOCATION" />
</manifest>"#;

    fn context(path: &Path) -> AnalysisContext {
        let file = StoredFile {
            file_hash: "deadbeef".to_string(),
            folder_path: "deadbeef".to_string(),
            file_name: String::new(),
            file_type: "apk".to_string(),
        };
        AnalysisContext::new(
            Task::new("permissions", &file, serde_json::json!({})),
            path.to_path_buf(),
        )
    }

    #[test]
    fn test_extract_classifies_and_dedups() {
        let analyzer = PermissionsAnalyzer::new().unwrap();
        let (dangerous, normal) = analyzer.extract(MANIFEST);
        assert_eq!(
            dangerous,
            vec![
                "android.permission.ACCESS_FINE_LOCATION",
                "android.permission.CAMERA",
                "android.permission.READ_SMS",
            ]
        );
        assert_eq!(normal, vec!["android.permission.INTERNET"]);
    }

    #[tokio::test]
    async fn test_analyze_decoded_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("decoded")).unwrap();
        std::fs::write(dir.path().join("decoded/AndroidManifest.xml"), MANIFEST).unwrap();

        let analyzer = PermissionsAnalyzer::new().unwrap();
        let result = analyzer.analyze(&context(dir.path())).await.unwrap();
        assert_eq!(result["manifest"], "decoded/AndroidManifest.xml");
        assert_eq!(result["total"], 4);
    }

    #[tokio::test]
    async fn test_missing_manifest_is_execution_failure() {
        let dir = tempfile::tempdir().unwrap();
        let analyzer = PermissionsAnalyzer::new().unwrap();
        let err = analyzer.analyze(&context(dir.path())).await.unwrap_err();
        assert!(err.to_string().contains("AndroidManifest.xml"));
    }

    #[test]
    fn test_supports_file_types() {
        let analyzer = PermissionsAnalyzer::new().unwrap();
        assert!(analyzer.supports("APK"));
        assert!(!analyzer.supports("ipa"));
    }
}
