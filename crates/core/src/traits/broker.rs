use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::{models::Job, JobRunnerError, JobRunnerResult};

/// 入队选项
#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    /// 最早执行时间，为空表示立即执行
    pub eta: Option<DateTime<Utc>>,
}

impl EnqueueOptions {
    /// `seconds` 秒后执行，超出时间范围时返回 `InvalidArgument`
    pub fn with_countdown(seconds: u64) -> JobRunnerResult<Self> {
        let eta = i64::try_from(seconds)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .and_then(|delay| Utc::now().checked_add_signed(delay))
            .ok_or_else(|| {
                JobRunnerError::InvalidArgument(format!("countdown_seconds 超出范围: {seconds}"))
            })?;
        Ok(Self { eta: Some(eta) })
    }
}

/// 任务执行的最终结果
#[derive(Debug, Clone, PartialEq)]
pub enum JobCompletion {
    Success(serde_json::Value),
    Failure(String),
}

/// 单个Worker节点的检查结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerInspection {
    pub active: usize,
    pub scheduled: usize,
    pub reserved: usize,
}

/// 消息代理抽象接口
///
/// 生产者、Worker和指标采集器各自持有自己的客户端实例。预留操作由代理保证
/// 排他性：同一个任务在任意时刻最多被一个Worker持有。投递语义为至多一次，
/// Worker在预留后崩溃会导致该任务丢失。
///
/// 所有调用都必须有超时，超时按 `BrokerUnavailable` 处理而不是空结果。
#[async_trait]
pub trait Broker: Send + Sync {
    /// 将任务写入队列，返回代理生成的任务ID
    async fn enqueue(
        &self,
        name: &str,
        args: serde_json::Value,
        options: EnqueueOptions,
    ) -> JobRunnerResult<String>;

    /// 非阻塞地预留一个待处理任务，队列为空时返回 `None`
    async fn reserve(&self, worker_id: &str) -> JobRunnerResult<Option<Job>>;

    /// 将已预留但尚未到执行时间的任务登记为计划任务
    async fn hold_scheduled(&self, worker_id: &str, job_id: &str) -> JobRunnerResult<()>;

    /// 标记任务开始执行
    async fn start(&self, worker_id: &str, job_id: &str) -> JobRunnerResult<Job>;

    /// 写入终态结果，只能由持有该任务的Worker调用
    async fn store_result(
        &self,
        worker_id: &str,
        job_id: &str,
        completion: JobCompletion,
    ) -> JobRunnerResult<Job>;

    /// 查询任务记录，过期或不存在时返回 `None`
    async fn get_job(&self, job_id: &str) -> JobRunnerResult<Option<Job>>;

    /// 待处理队列长度
    async fn queue_length(&self) -> JobRunnerResult<u64>;

    /// 队列名称，用作指标标签
    fn queue_name(&self) -> &str;

    /// 登记Worker节点或刷新其心跳
    async fn heartbeat(&self, worker_id: &str) -> JobRunnerResult<()>;

    /// 注销Worker节点
    async fn unregister_worker(&self, worker_id: &str) -> JobRunnerResult<()>;

    /// 各存活Worker正在执行的任务数
    async fn inspect_active(&self) -> JobRunnerResult<HashMap<String, usize>>;

    /// 各存活Worker持有的计划任务数
    async fn inspect_scheduled(&self) -> JobRunnerResult<HashMap<String, usize>>;

    /// 各存活Worker已预留但未开始的任务数
    async fn inspect_reserved(&self) -> JobRunnerResult<HashMap<String, usize>>;

    /// 检查单个Worker节点
    async fn inspect(&self, worker_id: &str) -> JobRunnerResult<WorkerInspection> {
        let active = self.inspect_active().await?;
        let scheduled = self.inspect_scheduled().await?;
        let reserved = self.inspect_reserved().await?;

        Ok(WorkerInspection {
            active: active.get(worker_id).copied().unwrap_or(0),
            scheduled: scheduled.get(worker_id).copied().unwrap_or(0),
            reserved: reserved.get(worker_id).copied().unwrap_or(0),
        })
    }
}
