//! 模块派发、链执行引擎、模块注册表与外部模块文件桥

pub mod bridge;
pub mod chain_engine;
pub mod external_client;
pub mod module_dispatcher;
pub mod registry;
pub mod registry_monitor;

pub use bridge::{ExternalModuleBridge, FileArchive, ARCHIVE_CONTENT_TYPE};
pub use chain_engine::{ChainEngine, ChainEngineSettings, ExecutionDetails};
pub use external_client::HttpExternalDispatcher;
pub use module_dispatcher::ModuleDispatcher;
pub use registry::{ModuleRegistry, ModuleRoute};
pub use registry_monitor::{RegistryMonitor, SweepReport};
