pub mod file_storage;
pub mod in_memory_store;
pub mod redis_store;
pub mod repositories;
pub mod store_factory;

pub use file_storage::LocalFileStorage;
pub use in_memory_store::InMemoryTaskStore;
pub use redis_store::RedisTaskStore;
pub use repositories::{InMemoryChainRepository, InMemoryExecutionRepository};
pub use store_factory::TaskStoreFactory;
