use async_trait::async_trait;

use crate::models::Job;

/// 任务执行上下文
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: String,
    pub name: String,
    pub args: serde_json::Value,
    pub worker_id: String,
}

impl JobContext {
    pub fn from_job(job: &Job, worker_id: &str) -> Self {
        Self {
            job_id: job.job_id.clone(),
            name: job.name.clone(),
            args: job.args.clone(),
            worker_id: worker_id.to_string(),
        }
    }
}

/// 任务处理器接口
///
/// 任务体是一个黑盒的长耗时计算：没有中间进度上报，也没有取消钩子。
/// 返回 `Err` 或发生 panic 都视为执行异常。
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// 处理器名称，与任务名称一一对应
    fn name(&self) -> &str;

    async fn execute(&self, context: &JobContext) -> anyhow::Result<serde_json::Value>;
}
