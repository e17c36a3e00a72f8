use thiserror::Error;

/// 编排器错误类型定义
#[derive(Debug, Error, Clone, PartialEq)]
pub enum OrchestratorError {
    #[error("task not found: {id}")]
    TaskNotFound { id: String },

    #[error("module not found: {name}")]
    ModuleNotFound { name: String },

    #[error("chain not found: {name}")]
    ChainNotFound { name: String },

    #[error("chain execution not found: {id}")]
    ExecutionNotFound { id: String },

    #[error("no result for module '{module_name}' and file '{file_hash}'")]
    ResultNotFound {
        module_name: String,
        file_hash: String,
    },

    #[error("file not found: {file_id}")]
    FileNotFound { file_id: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("external module '{module_id}' is not eligible for delivery: {reason}")]
    ModuleUnavailable { module_id: String, reason: String },

    #[error("execution failed: {0}")]
    ExecutionFailure(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("infrastructure failure: {0}")]
    Infrastructure(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// 错误分类，对应分析流水线的传播策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidInput,
    ExecutionFailure,
    Timeout,
    InfrastructureFailure,
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

impl OrchestratorError {
    pub fn task_not_found<S: Into<String>>(id: S) -> Self {
        Self::TaskNotFound { id: id.into() }
    }
    pub fn module_not_found<S: Into<String>>(name: S) -> Self {
        Self::ModuleNotFound { name: name.into() }
    }
    pub fn chain_not_found<S: Into<String>>(name: S) -> Self {
        Self::ChainNotFound { name: name.into() }
    }
    pub fn execution_not_found<S: Into<String>>(id: S) -> Self {
        Self::ExecutionNotFound { id: id.into() }
    }
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }
    pub fn execution_failure<S: Into<String>>(msg: S) -> Self {
        Self::ExecutionFailure(msg.into())
    }
    pub fn infrastructure<S: Into<String>>(msg: S) -> Self {
        Self::Infrastructure(msg.into())
    }
    pub fn module_unavailable<S: Into<String>, R: Into<String>>(module_id: S, reason: R) -> Self {
        Self::ModuleUnavailable {
            module_id: module_id.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TaskNotFound { .. }
            | Self::ModuleNotFound { .. }
            | Self::ChainNotFound { .. }
            | Self::ExecutionNotFound { .. }
            | Self::ResultNotFound { .. }
            | Self::FileNotFound { .. } => ErrorKind::NotFound,
            Self::InvalidInput(_) | Self::ModuleUnavailable { .. } => ErrorKind::InvalidInput,
            Self::ExecutionFailure(_) => ErrorKind::ExecutionFailure,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Infrastructure(_)
            | Self::Serialization(_)
            | Self::Configuration(_)
            | Self::Internal(_) => ErrorKind::InfrastructureFailure,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Infrastructure(_) | Self::Timeout(_))
    }
}

impl From<serde_json::Error> for OrchestratorError {
    fn from(err: serde_json::Error) -> Self {
        OrchestratorError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for OrchestratorError {
    fn from(err: anyhow::Error) -> Self {
        OrchestratorError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds_follow_taxonomy() {
        assert_eq!(
            OrchestratorError::task_not_found("t-1").kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            OrchestratorError::invalid_input("unsupported file type").kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(
            OrchestratorError::execution_failure("exit code 2").kind(),
            ErrorKind::ExecutionFailure
        );
        assert_eq!(
            OrchestratorError::Timeout("step 1".to_string()).kind(),
            ErrorKind::Timeout
        );
        assert_eq!(
            OrchestratorError::infrastructure("connection refused").kind(),
            ErrorKind::InfrastructureFailure
        );
    }

    #[test]
    fn test_retryable_errors() {
        assert!(OrchestratorError::infrastructure("down").is_retryable());
        assert!(OrchestratorError::Timeout("slow".to_string()).is_retryable());
        assert!(!OrchestratorError::invalid_input("bad").is_retryable());
        assert!(!OrchestratorError::module_not_found("semgrep").is_retryable());
    }

    #[test]
    fn test_display_contains_identifiers() {
        let err = OrchestratorError::ResultNotFound {
            module_name: "permissions".to_string(),
            file_hash: "deadbeef".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("permissions"));
        assert!(text.contains("deadbeef"));
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: OrchestratorError = json_err.into();
        assert!(matches!(err, OrchestratorError::Serialization(_)));
    }
}
