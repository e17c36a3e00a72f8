pub mod entities;
pub mod ports;
pub mod repositories;

pub use entities::*;
pub use orchestrator_core::{OrchestratorError, OrchestratorResult};
pub use ports::*;
pub use repositories::*;
