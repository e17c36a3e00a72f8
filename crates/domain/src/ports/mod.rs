pub mod external;
pub mod file_storage;
pub mod task_store;

pub use external::ExternalDispatcher;
pub use file_storage::FileStorage;
pub use task_store::TaskStore;
