use std::path::Path;

use async_trait::async_trait;
use orchestrator_core::{OrchestratorError, OrchestratorResult};
use regex::Regex;
use serde::Serialize;
use serde_json::json;

use crate::analyzer::{
    collect_files, run_blocking, AnalysisContext, ModuleAnalyzer, MAX_SCAN_FILE_BYTES,
};

const SKIPPED_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "webp", "so", "dex", "ttf", "otf", "mp3", "mp4", "ogg",
];

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SecretFinding {
    pub rule: String,
    pub file: String,
    pub line: usize,
    /// 脱敏后的匹配内容
    pub redacted: String,
}

struct SecretRule {
    name: &'static str,
    pattern: Regex,
    /// 需要脱敏的捕获组，0 表示整个匹配
    group: usize,
}

/// 扫描硬编码密钥
pub struct SecretsAnalyzer {
    rules: Vec<SecretRule>,
}

fn redact(secret: &str) -> String {
    let visible: String = secret.chars().take(4).collect();
    format!("{visible}****")
}

impl SecretsAnalyzer {
    pub fn new() -> OrchestratorResult<Self> {
        let definitions: [(&'static str, &str, usize); 4] = [
            ("aws_access_key", r"\b(?:AKIA|ASIA)[0-9A-Z]{16}\b", 0),
            ("google_api_key", r"\bAIza[0-9A-Za-z\-_]{35}\b", 0),
            (
                "private_key",
                r"-----BEGIN (?:RSA |EC |DSA |OPENSSH )?PRIVATE KEY-----",
                0,
            ),
            (
                "generic_secret",
                r#"(?i)\b(?:api[_-]?key|secret|token|password)\b\s*[:=]\s*["']([^"'\s]{8,})["']"#,
                1,
            ),
        ];

        let rules = definitions
            .into_iter()
            .map(|(name, pattern, group)| {
                Regex::new(pattern)
                    .map(|pattern| SecretRule {
                        name,
                        pattern,
                        group,
                    })
                    .map_err(|e| {
                        OrchestratorError::Internal(format!("invalid secret rule {name}: {e}"))
                    })
            })
            .collect::<OrchestratorResult<Vec<_>>>()?;

        Ok(Self { rules })
    }

    pub fn scan_text(&self, file: &str, text: &str) -> Vec<SecretFinding> {
        let mut findings = Vec::new();
        for (index, line) in text.lines().enumerate() {
            for rule in &self.rules {
                for caps in rule.pattern.captures_iter(line) {
                    if let Some(m) = caps.get(rule.group) {
                        findings.push(SecretFinding {
                            rule: rule.name.to_string(),
                            file: file.to_string(),
                            line: index + 1,
                            redacted: redact(m.as_str()),
                        });
                    }
                }
            }
        }
        findings
    }

    fn scannable(path: &Path) -> bool {
        let skipped = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| SKIPPED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        let small_enough = std::fs::metadata(path)
            .map(|m| m.len() <= MAX_SCAN_FILE_BYTES)
            .unwrap_or(false);
        !skipped && small_enough
    }
}

#[async_trait]
impl ModuleAnalyzer for SecretsAnalyzer {
    fn name(&self) -> &str {
        "secrets"
    }

    fn description(&self) -> &str {
        "Detects hard-coded credentials and keys"
    }

    fn supported_file_types(&self) -> Vec<String> {
        ["apk", "aab", "ipa", "zip", "jar", "source"]
            .iter()
            .map(|t| t.to_string())
            .collect()
    }

    async fn analyze(&self, context: &AnalysisContext) -> OrchestratorResult<serde_json::Value> {
        let artifact = context.artifact_path.clone();
        let files = run_blocking(move || collect_files(&artifact, Self::scannable)).await?;

        let mut findings = Vec::new();
        for path in &files {
            let bytes = match tokio::fs::read(path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::debug!(file = %path.display(), "Skipping unreadable file: {}", e);
                    continue;
                }
            };
            let text = String::from_utf8_lossy(&bytes);
            findings.extend(self.scan_text(&context.display_path(path), &text));
        }

        Ok(json!({
            "files_scanned": files.len(),
            "findings": findings,
        }))
    }
}
