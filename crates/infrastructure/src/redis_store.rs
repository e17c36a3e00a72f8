use async_trait::async_trait;
use orchestrator_core::config::StoreConfig;
use orchestrator_core::{OrchestratorError, OrchestratorResult};
use orchestrator_domain::entities::{module_queue_name, Task, TaskResult};
use orchestrator_domain::ports::TaskStore;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, info, instrument};

/// Redis 任务存储
///
/// 队列使用 list（RPUSH 入队，LPOP 出队），任务和结果以 JSON 字符串保存。
pub struct RedisTaskStore {
    connection: ConnectionManager,
    key_prefix: String,
    task_ttl_seconds: u64,
}

fn redis_error(err: redis::RedisError) -> OrchestratorError {
    OrchestratorError::infrastructure(format!("redis: {err}"))
}

impl RedisTaskStore {
    pub async fn new(config: &StoreConfig) -> OrchestratorResult<Self> {
        info!("Connecting Redis task store at {}", config.redis_url);

        let client = redis::Client::open(config.redis_url.as_str()).map_err(redis_error)?;
        let mut connection = client
            .get_connection_manager()
            .await
            .map_err(redis_error)?;

        let pong: String = redis::cmd("PING")
            .query_async(&mut connection)
            .await
            .map_err(redis_error)?;
        debug!("Redis PING response: {}", pong);

        Ok(Self {
            connection,
            key_prefix: config.key_prefix.clone(),
            task_ttl_seconds: config.task_ttl_seconds,
        })
    }

    fn task_key(&self, task_id: &str) -> String {
        format!("{}:task:{}", self.key_prefix, task_id)
    }

    fn queue_key(&self, module_name: &str) -> String {
        format!("{}:{}", self.key_prefix, module_queue_name(module_name))
    }

    fn result_key(&self, module_name: &str, file_hash: &str) -> String {
        format!("{}:result:{}:{}", self.key_prefix, module_name, file_hash)
    }
}

#[async_trait]
impl TaskStore for RedisTaskStore {
    #[instrument(skip(self, task), fields(task_id = %task.task_id))]
    async fn create_task(&self, task: &Task) -> OrchestratorResult<String> {
        let payload = serde_json::to_string(task)?;
        let mut conn = self.connection.clone();
        let _: () = conn
            .set_ex(self.task_key(&task.task_id), payload, self.task_ttl_seconds)
            .await
            .map_err(redis_error)?;
        Ok(task.task_id.clone())
    }

    async fn enqueue(&self, module_name: &str, task_id: &str) -> OrchestratorResult<()> {
        let mut conn = self.connection.clone();
        let _: i64 = conn
            .rpush(self.queue_key(module_name), task_id)
            .await
            .map_err(redis_error)?;
        Ok(())
    }

    async fn dequeue(&self, module_name: &str) -> OrchestratorResult<Option<String>> {
        let mut conn = self.connection.clone();
        conn.lpop(self.queue_key(module_name), None)
            .await
            .map_err(redis_error)
    }

    async fn get_task(&self, task_id: &str) -> OrchestratorResult<Option<Task>> {
        let mut conn = self.connection.clone();
        let payload: Option<String> = conn
            .get(self.task_key(task_id))
            .await
            .map_err(redis_error)?;
        payload
            .map(|json| serde_json::from_str(&json).map_err(OrchestratorError::from))
            .transpose()
    }

    async fn put_result(
        &self,
        module_name: &str,
        file_hash: &str,
        result: &TaskResult,
    ) -> OrchestratorResult<()> {
        let payload = serde_json::to_string(result)?;
        let mut conn = self.connection.clone();
        let _: () = conn
            .set(self.result_key(module_name, file_hash), payload)
            .await
            .map_err(redis_error)?;
        Ok(())
    }

    async fn get_result(
        &self,
        module_name: &str,
        file_hash: &str,
    ) -> OrchestratorResult<Option<TaskResult>> {
        let mut conn = self.connection.clone();
        let payload: Option<String> = conn
            .get(self.result_key(module_name, file_hash))
            .await
            .map_err(redis_error)?;
        payload
            .map(|json| serde_json::from_str(&json).map_err(OrchestratorError::from))
            .transpose()
    }

    async fn queue_len(&self, module_name: &str) -> OrchestratorResult<usize> {
        let mut conn = self.connection.clone();
        conn.llen(self.queue_key(module_name))
            .await
            .map_err(redis_error)
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
