//! 移动应用安全分析模块编排系统的进程装配层。

pub mod app;
pub mod shutdown;

pub use app::{AppMode, Application, Services};
pub use shutdown::ShutdownManager;
