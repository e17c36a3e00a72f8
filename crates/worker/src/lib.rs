pub mod analyzer;
pub mod analyzer_factory;
pub mod analyzers;
pub mod pool;
pub mod runtime;

pub use analyzer::{AnalysisContext, ModuleAnalyzer};
pub use analyzer_factory::AnalyzerFactory;
pub use pool::WorkerPool;
pub use runtime::{ModuleWorker, PollOutcome, WorkerSettings};
