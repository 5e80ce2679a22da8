use std::sync::Arc;

use jobrunner_core::{Broker, EnqueueOptions, Job, JobRunnerError, ShutdownCoordinator};
use serde::Deserialize;
use tracing::info;

use crate::error::{ApiError, ApiResult};

const MAX_JOB_NAME_LEN: usize = 128;
const DEFAULT_MAX_COUNTDOWN_SECONDS: u64 = 86400;

/// 任务触发请求
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TriggerRequest {
    pub name: Option<String>,
    #[serde(default)]
    pub args: Option<serde_json::Value>,
    pub countdown_seconds: Option<u64>,
}

/// 任务生产者
///
/// 只负责把任务放入消息代理并立即返回任务ID，不等待执行结果。
/// 关闭协调器进入关闭状态后拒绝所有新的触发请求。
#[derive(Clone)]
pub struct JobProducer {
    broker: Arc<dyn Broker>,
    shutdown: ShutdownCoordinator,
    default_job_name: String,
    max_countdown_seconds: u64,
}

impl JobProducer {
    pub fn new(
        broker: Arc<dyn Broker>,
        shutdown: ShutdownCoordinator,
        default_job_name: impl Into<String>,
    ) -> Self {
        Self {
            broker,
            shutdown,
            default_job_name: default_job_name.into(),
            max_countdown_seconds: DEFAULT_MAX_COUNTDOWN_SECONDS,
        }
    }

    /// 设置允许的最大延迟秒数
    pub fn with_max_countdown(mut self, seconds: u64) -> Self {
        self.max_countdown_seconds = seconds;
        self
    }

    pub fn is_ready(&self) -> bool {
        self.shutdown.is_ready()
    }

    /// 校验请求并入队，返回任务ID
    pub async fn trigger(&self, request: TriggerRequest) -> ApiResult<String> {
        self.shutdown.ensure_ready()?;

        let name = request
            .name
            .unwrap_or_else(|| self.default_job_name.clone());
        validate_job_name(&name)?;

        let args = request.args.unwrap_or_else(|| serde_json::json!({}));
        let options = match request.countdown_seconds {
            Some(seconds) if seconds > self.max_countdown_seconds => {
                return Err(ApiError::BadRequest(format!(
                    "countdown_seconds 不能超过 {}",
                    self.max_countdown_seconds
                )));
            }
            Some(seconds) => EnqueueOptions::with_countdown(seconds)?,
            None => EnqueueOptions::default(),
        };

        let job_id = self.broker.enqueue(&name, args, options).await?;
        info!(job_id = %job_id, job_name = %name, "任务已提交");
        Ok(job_id)
    }

    /// 查询任务记录，未知或已过期的任务返回 `JobNotFound`
    pub async fn get_job(&self, job_id: &str) -> ApiResult<Job> {
        self.broker
            .get_job(job_id)
            .await?
            .ok_or_else(|| {
                JobRunnerError::JobNotFound {
                    id: job_id.to_string(),
                }
                .into()
            })
    }
}

fn validate_job_name(name: &str) -> ApiResult<()> {
    if name.trim().is_empty() {
        return Err(ApiError::BadRequest("任务名不能为空".to_string()));
    }
    if name.len() > MAX_JOB_NAME_LEN {
        return Err(ApiError::BadRequest(format!(
            "任务名长度不能超过 {MAX_JOB_NAME_LEN} 个字符"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'))
    {
        return Err(ApiError::BadRequest(format!("任务名包含非法字符: {name}")));
    }
    Ok(())
}
