use std::io::Read;
use std::path::Path;

use async_trait::async_trait;
use orchestrator_core::OrchestratorResult;
use serde::Serialize;
use serde_json::json;

use crate::analyzer::{collect_files, run_blocking, AnalysisContext, ModuleAnalyzer};

const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ElfInfo {
    pub class: &'static str,
    pub endianness: &'static str,
    pub architecture: String,
}

/// 解析 ELF 头部，非 ELF 文件返回 None
pub fn parse_elf_header(header: &[u8]) -> Option<ElfInfo> {
    if header.len() < 20 || header[..4] != ELF_MAGIC {
        return None;
    }

    let class = match header[4] {
        1 => "ELF32",
        2 => "ELF64",
        _ => return None,
    };
    let (endianness, machine) = match header[5] {
        1 => ("little", u16::from_le_bytes([header[18], header[19]])),
        2 => ("big", u16::from_be_bytes([header[18], header[19]])),
        _ => return None,
    };
    let architecture = match machine {
        0x03 => "x86".to_string(),
        0x08 => "mips".to_string(),
        0x28 => "arm".to_string(),
        0x3E => "x86_64".to_string(),
        0xB7 => "aarch64".to_string(),
        0xF3 => "riscv".to_string(),
        other => format!("unknown(0x{other:x})"),
    };

    Some(ElfInfo {
        class,
        endianness,
        architecture,
    })
}

fn read_header(path: &Path) -> std::io::Result<Vec<u8>> {
    let mut header = Vec::with_capacity(20);
    std::fs::File::open(path)?.take(20).read_to_end(&mut header)?;
    Ok(header)
}

/// 检查 .so 原生库的架构
pub struct NativeLibsAnalyzer;

impl NativeLibsAnalyzer {
    fn is_shared_object(path: &Path) -> bool {
        path.extension().and_then(|e| e.to_str()) == Some("so")
    }
}

#[async_trait]
impl ModuleAnalyzer for NativeLibsAnalyzer {
    fn name(&self) -> &str {
        "native-libs"
    }

    fn description(&self) -> &str {
        "Inspects bundled native libraries"
    }

    fn supported_file_types(&self) -> Vec<String> {
        ["apk", "aab", "ipa", "zip", "so"]
            .iter()
            .map(|t| t.to_string())
            .collect()
    }

    async fn analyze(&self, context: &AnalysisContext) -> OrchestratorResult<serde_json::Value> {
        let artifact = context.artifact_path.clone();
        let libraries =
            run_blocking(move || collect_files(&artifact, Self::is_shared_object)).await?;

        let mut valid = Vec::new();
        let mut invalid = Vec::new();
        for path in &libraries {
            let display = context.display_path(path);
            let header = {
                let path = path.clone();
                run_blocking(move || {
                    read_header(&path).map_err(|e| {
                        orchestrator_core::OrchestratorError::execution_failure(format!(
                            "failed to read {}: {e}",
                            path.display()
                        ))
                    })
                })
                .await?
            };
            match parse_elf_header(&header) {
                Some(info) => valid.push(json!({
                    "path": display,
                    "class": info.class,
                    "endianness": info.endianness,
                    "architecture": info.architecture,
                })),
                None => invalid.push(display),
            }
        }

        let mut architectures: Vec<String> = valid
            .iter()
            .filter_map(|lib| lib["architecture"].as_str().map(str::to_string))
            .collect();
        architectures.sort();
        architectures.dedup();

        Ok(json!({
            "libraries": valid,
            "invalid": invalid,
            "architectures": architectures,
        }))
    }
}
