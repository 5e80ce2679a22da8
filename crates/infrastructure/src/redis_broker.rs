//! 基于Redis的消息代理
//!
//! 键布局（均带 `key_prefix` 前缀）：
//!
//! - `queue:<name>`: 待处理任务ID列表，LPUSH入队，从右侧取出
//! - `job:<id>`: 任务记录（JSON），进入终态后设置过期时间
//! - `workers`: Worker节点 -> 最近心跳时间（毫秒时间戳）
//! - `worker:<id>:reserved` / `:scheduled` / `:active`: 各节点持有的任务ID
//!
//! 状态变化都通过Lua脚本完成：脚本先确认记录仍是读取时的内容，再在同一步里
//! 写入新记录并移动任务ID。记录和节点集合因此总是一致，同一个任务也只会被
//! 一个节点拿到。

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use jobrunner_config::BrokerConfig;
use jobrunner_core::{
    Broker, EnqueueOptions, Job, JobCompletion, JobRunnerError, JobRunnerResult, JobStatus,
};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisResult, Script};
use tracing::{debug, info, warn};

/// 状态转换后任务ID所在的节点集合
#[derive(Debug, Clone, Copy)]
enum Holding {
    Scheduled,
    Active,
    Released,
}

impl Holding {
    fn as_str(&self) -> &'static str {
        match self {
            Holding::Scheduled => "scheduled",
            Holding::Active => "active",
            Holding::Released => "none",
        }
    }
}

struct Scripts {
    reserve_peek: Script,
    reserve_claim: Script,
    transition: Script,
}

impl Scripts {
    fn load() -> Self {
        Self {
            reserve_peek: Script::new(include_str!("lua/reserve_peek.lua")),
            reserve_claim: Script::new(include_str!("lua/reserve_claim.lua")),
            transition: Script::new(include_str!("lua/transition.lua")),
        }
    }
}

pub struct RedisBroker {
    redis: ConnectionManager,
    scripts: Scripts,
    queue_name: String,
    key_prefix: String,
    operation_timeout: Duration,
    result_expires_seconds: u64,
    worker_ttl: Duration,
}

impl RedisBroker {
    /// 建立连接并确认服务端可用
    pub async fn connect(config: &BrokerConfig) -> JobRunnerResult<Self> {
        let url = config
            .broker_url()
            .map_err(|e| JobRunnerError::Configuration(e.to_string()))?;
        info!(
            "连接Redis消息代理: {} (tls={})",
            url.masked(),
            url.is_tls()
        );

        let client = redis::Client::open(url.connection_url()).map_err(|e| {
            JobRunnerError::broker_unavailable(format!("创建Redis客户端失败: {e}"))
        })?;

        let connect_timeout = Duration::from_secs(config.connect_timeout_seconds);
        let redis = tokio::time::timeout(connect_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| {
                JobRunnerError::broker_unavailable(format!(
                    "连接Redis超时: {}s",
                    config.connect_timeout_seconds
                ))
            })?
            .map_err(|e| JobRunnerError::broker_unavailable(format!("连接Redis失败: {e}")))?;

        let broker = Self {
            redis,
            scripts: Scripts::load(),
            queue_name: config.queue_name.clone(),
            key_prefix: config.key_prefix.clone(),
            operation_timeout: Duration::from_millis(config.operation_timeout_ms),
            result_expires_seconds: config.result_expires_seconds,
            worker_ttl: Duration::from_secs(config.worker_ttl_seconds),
        };
        broker.ping().await?;
        debug!("Redis消息代理连接成功: {}", url.masked());

        Ok(broker)
    }

    pub async fn ping(&self) -> JobRunnerResult<()> {
        let mut conn = self.redis.clone();
        let response: String = self
            .bounded("PING", async move { redis::cmd("PING").query_async(&mut conn).await })
            .await?;
        if response != "PONG" {
            return Err(JobRunnerError::broker_unavailable(format!(
                "Unexpected PING response: {response}"
            )));
        }
        Ok(())
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}:{}", self.key_prefix, suffix)
    }

    fn queue_key(&self) -> String {
        self.key(&format!("queue:{}", self.queue_name))
    }

    fn job_key(&self, job_id: &str) -> String {
        self.key(&format!("job:{job_id}"))
    }

    fn workers_key(&self) -> String {
        self.key("workers")
    }

    fn worker_key(&self, worker_id: &str, set: &str) -> String {
        self.key(&format!("worker:{worker_id}:{set}"))
    }

    /// 为单次操作加上超时，超时和连接错误都视为代理不可用
    async fn bounded<T, F>(&self, operation: &str, fut: F) -> JobRunnerResult<T>
    where
        F: Future<Output = RedisResult<T>>,
    {
        match tokio::time::timeout(self.operation_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(JobRunnerError::broker_unavailable(format!(
                "Redis {operation} 失败: {e}"
            ))),
            Err(_) => Err(JobRunnerError::broker_unavailable(format!(
                "Redis {operation} 超时: {}ms",
                self.operation_timeout.as_millis()
            ))),
        }
    }

    /// 读取任务记录，同时返回原始内容供状态转换时比对
    async fn load_record(&self, job_id: &str) -> JobRunnerResult<(Job, String)> {
        let mut conn = self.redis.clone();
        let key = self.job_key(job_id);
        let data: Option<String> = self
            .bounded("GET", async move { conn.get(&key).await })
            .await?;
        match data {
            Some(data) => Ok((serde_json::from_str(&data)?, data)),
            None => Err(JobRunnerError::JobNotFound {
                id: job_id.to_string(),
            }),
        }
    }

    /// 比对并写入任务记录，同时把任务ID移到 `holding` 对应的节点集合
    #[allow(clippy::too_many_arguments)]
    async fn apply_transition(
        &self,
        operation: &str,
        worker_id: &str,
        job_id: &str,
        expected: &str,
        replacement: &str,
        expire_seconds: u64,
        holding: Holding,
    ) -> JobRunnerResult<()> {
        let mut invocation = self.scripts.transition.prepare_invoke();
        invocation
            .key(self.job_key(job_id))
            .key(self.worker_key(worker_id, "reserved"))
            .key(self.worker_key(worker_id, "scheduled"))
            .key(self.worker_key(worker_id, "active"))
            .arg(expected)
            .arg(replacement)
            .arg(expire_seconds)
            .arg(job_id)
            .arg(holding.as_str());

        let mut conn = self.redis.clone();
        let applied: i64 = self
            .bounded(operation, async move { invocation.invoke_async(&mut conn).await })
            .await?;
        if applied == 1 {
            return Ok(());
        }

        warn!(job_id = %job_id, worker_id = worker_id, "任务记录在 {} 期间被并发修改", operation);
        Err(JobRunnerError::ReservationConflict {
            job_id: job_id.to_string(),
            worker_id: worker_id.to_string(),
        })
    }

    async fn touch(&self, worker_id: &str) -> JobRunnerResult<()> {
        let mut conn = self.redis.clone();
        let key = self.workers_key();
        let now = Utc::now().timestamp_millis();
        self.bounded("HSET", async move { conn.hset::<_, _, _, ()>(&key, worker_id, now).await })
            .await
    }

    /// 心跳仍在有效期内的Worker节点
    async fn live_workers(&self) -> JobRunnerResult<Vec<String>> {
        let mut conn = self.redis.clone();
        let key = self.workers_key();
        let workers: HashMap<String, i64> = self
            .bounded("HGETALL", async move { conn.hgetall(&key).await })
            .await?;

        let cutoff = Utc::now().timestamp_millis() - self.worker_ttl.as_millis() as i64;
        Ok(workers
            .into_iter()
            .filter(|(_, last_seen)| *last_seen >= cutoff)
            .map(|(worker_id, _)| worker_id)
            .collect())
    }

    async fn count_per_worker(&self, set: &str) -> JobRunnerResult<HashMap<String, usize>> {
        let workers = self.live_workers().await?;
        if workers.is_empty() {
            return Ok(HashMap::new());
        }

        let mut pipe = redis::pipe();
        for worker_id in &workers {
            let key = self.worker_key(worker_id, set);
            if set == "reserved" {
                pipe.llen(key);
            } else {
                pipe.scard(key);
            }
        }

        let mut conn = self.redis.clone();
        let counts: Vec<usize> = self
            .bounded("inspect", async move { pipe.query_async(&mut conn).await })
            .await?;

        Ok(workers.into_iter().zip(counts).collect())
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn enqueue(
        &self,
        name: &str,
        args: serde_json::Value,
        options: EnqueueOptions,
    ) -> JobRunnerResult<String> {
        let mut job = Job::new(name, args);
        if let Some(eta) = options.eta {
            job = job.with_eta(eta);
        }
        job.mark_queued()?;
        let payload = serde_json::to_string(&job)?;

        let mut pipe = redis::pipe();
        pipe.atomic()
            .set(self.job_key(&job.job_id), payload)
            .ignore()
            .lpush(self.queue_key(), &job.job_id)
            .ignore();

        let mut conn = self.redis.clone();
        self.bounded("enqueue", async move { pipe.query_async::<()>(&mut conn).await })
            .await?;

        debug!(job_id = %job.job_id, job_name = name, "任务已入队");
        Ok(job.job_id)
    }

    async fn reserve(&self, worker_id: &str) -> JobRunnerResult<Option<Job>> {
        self.touch(worker_id).await?;

        loop {
            let mut peek = self.scripts.reserve_peek.prepare_invoke();
            peek.key(self.queue_key()).arg(self.key("job:"));
            let mut conn = self.redis.clone();
            let head: Option<(String, String)> = self
                .bounded("reserve", async move { peek.invoke_async(&mut conn).await })
                .await?;

            let Some((job_id, current)) = head else {
                return Ok(None);
            };

            let mut job: Job = serde_json::from_str(&current)?;
            job.mark_reserved(worker_id)?;
            let replacement = serde_json::to_string(&job)?;

            let mut claim = self.scripts.reserve_claim.prepare_invoke();
            claim
                .key(self.queue_key())
                .key(self.worker_key(worker_id, "reserved"))
                .key(self.job_key(&job_id))
                .arg(&job_id)
                .arg(current)
                .arg(replacement);
            let mut conn = self.redis.clone();
            let claimed: i64 = self
                .bounded("reserve", async move { claim.invoke_async(&mut conn).await })
                .await?;

            if claimed == 1 {
                debug!(job_id = %job_id, worker_id = worker_id, "任务已预留");
                return Ok(Some(job));
            }
            debug!(job_id = %job_id, worker_id = worker_id, "任务已被其他节点预留，重新读取队列");
        }
    }

    async fn hold_scheduled(&self, worker_id: &str, job_id: &str) -> JobRunnerResult<()> {
        let (job, current) = self.load_record(job_id).await?;
        job.ensure_held_by(worker_id)?;
        if job.status != JobStatus::Reserved {
            return Err(JobRunnerError::InvalidTransition {
                job_id: job_id.to_string(),
                from: job.status,
                to: JobStatus::Reserved,
            });
        }

        self.apply_transition(
            "hold_scheduled",
            worker_id,
            job_id,
            &current,
            &current,
            0,
            Holding::Scheduled,
        )
        .await
    }

    async fn start(&self, worker_id: &str, job_id: &str) -> JobRunnerResult<Job> {
        let (mut job, current) = self.load_record(job_id).await?;
        job.ensure_held_by(worker_id)?;
        job.mark_active()?;
        let replacement = serde_json::to_string(&job)?;

        self.apply_transition(
            "start",
            worker_id,
            job_id,
            &current,
            &replacement,
            0,
            Holding::Active,
        )
        .await?;
        Ok(job)
    }

    async fn store_result(
        &self,
        worker_id: &str,
        job_id: &str,
        completion: JobCompletion,
    ) -> JobRunnerResult<Job> {
        let (mut job, current) = self.load_record(job_id).await?;
        job.ensure_held_by(worker_id)?;
        match completion {
            JobCompletion::Success(result) => job.mark_completed(result)?,
            JobCompletion::Failure(error) => job.mark_failed(error)?,
        }
        let replacement = serde_json::to_string(&job)?;

        self.apply_transition(
            "store_result",
            worker_id,
            job_id,
            &current,
            &replacement,
            self.result_expires_seconds,
            Holding::Released,
        )
        .await?;
        Ok(job)
    }

    async fn get_job(&self, job_id: &str) -> JobRunnerResult<Option<Job>> {
        match self.load_record(job_id).await {
            Ok((job, _)) => Ok(Some(job)),
            Err(JobRunnerError::JobNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn queue_length(&self) -> JobRunnerResult<u64> {
        let mut conn = self.redis.clone();
        let key = self.queue_key();
        self.bounded("LLEN", async move { conn.llen(&key).await })
            .await
    }

    fn queue_name(&self) -> &str {
        &self.queue_name
    }

    async fn heartbeat(&self, worker_id: &str) -> JobRunnerResult<()> {
        self.touch(worker_id).await
    }

    async fn unregister_worker(&self, worker_id: &str) -> JobRunnerResult<()> {
        // 预留列表和计划集合保留，可据此排查未执行的任务
        let mut pipe = redis::pipe();
        pipe.atomic()
            .hdel(self.workers_key(), worker_id)
            .ignore()
            .del(self.worker_key(worker_id, "active"))
            .ignore();

        let mut conn = self.redis.clone();
        self.bounded("unregister", async move {
            pipe.query_async::<()>(&mut conn).await
        })
        .await?;
        info!("Worker已注销: {}", worker_id);
        Ok(())
    }

    async fn inspect_active(&self) -> JobRunnerResult<HashMap<String, usize>> {
        self.count_per_worker("active").await
    }

    async fn inspect_scheduled(&self) -> JobRunnerResult<HashMap<String, usize>> {
        self.count_per_worker("scheduled").await
    }

    async fn inspect_reserved(&self) -> JobRunnerResult<HashMap<String, usize>> {
        self.count_per_worker("reserved").await
    }
}
