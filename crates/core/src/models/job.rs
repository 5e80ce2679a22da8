use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{JobRunnerError, JobRunnerResult};

/// 任务生命周期状态
///
/// 状态只能沿 `submitted → queued → reserved → active → {completed | failed}`
/// 向前推进，终态一旦写入不可再修改。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Submitted,
    Queued,
    Reserved,
    Active,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Submitted => "submitted",
            JobStatus::Queued => "queued",
            JobStatus::Reserved => "reserved",
            JobStatus::Active => "active",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// 检查是否允许从当前状态转换到 `next`
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Submitted, JobStatus::Queued)
                | (JobStatus::Queued, JobStatus::Reserved)
                | (JobStatus::Reserved, JobStatus::Active)
                | (JobStatus::Active, JobStatus::Completed)
                | (JobStatus::Active, JobStatus::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 任务执行结果分类，用作指标标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobOutcome {
    Success,
    Failure,
}

impl JobOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            JobOutcome::Success => "success",
            JobOutcome::Failure => "failure",
        }
    }
}

/// 任务记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub job_id: String,
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Value,
    pub status: JobStatus,
    pub enqueued_at: DateTime<Utc>,
    /// 延迟执行时间，为空表示立即执行
    #[serde(default)]
    pub eta: Option<DateTime<Utc>>,
    /// 持有该任务的Worker节点
    #[serde(default)]
    pub worker_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl Job {
    pub fn new(name: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            job_id: Uuid::new_v4().simple().to_string(),
            name: name.into(),
            args,
            status: JobStatus::Submitted,
            enqueued_at: Utc::now(),
            eta: None,
            worker_id: None,
            started_at: None,
            finished_at: None,
            result: None,
            error: None,
        }
    }

    pub fn with_eta(mut self, eta: DateTime<Utc>) -> Self {
        self.eta = Some(eta);
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// 是否已到可执行时间
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.eta.map_or(true, |eta| eta <= now)
    }

    fn transition(&mut self, next: JobStatus) -> JobRunnerResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(JobRunnerError::InvalidTransition {
                job_id: self.job_id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// 消息代理确认持久化后调用
    pub fn mark_queued(&mut self) -> JobRunnerResult<()> {
        self.transition(JobStatus::Queued)
    }

    pub fn mark_reserved(&mut self, worker_id: &str) -> JobRunnerResult<()> {
        self.transition(JobStatus::Reserved)?;
        self.worker_id = Some(worker_id.to_string());
        Ok(())
    }

    pub fn mark_active(&mut self) -> JobRunnerResult<()> {
        self.transition(JobStatus::Active)?;
        // 时钟回拨时也要保证 started_at >= enqueued_at
        self.started_at = Some(Utc::now().max(self.enqueued_at));
        Ok(())
    }

    pub fn mark_completed(&mut self, result: serde_json::Value) -> JobRunnerResult<()> {
        self.transition(JobStatus::Completed)?;
        self.finished_at = Some(self.finish_time());
        self.result = Some(result);
        Ok(())
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) -> JobRunnerResult<()> {
        self.transition(JobStatus::Failed)?;
        self.finished_at = Some(self.finish_time());
        self.error = Some(error.into());
        Ok(())
    }

    fn finish_time(&self) -> DateTime<Utc> {
        let floor = self.started_at.unwrap_or(self.enqueued_at);
        Utc::now().max(floor)
    }

    /// 检查任务是否由指定Worker持有
    pub fn ensure_held_by(&self, worker_id: &str) -> JobRunnerResult<()> {
        match self.worker_id.as_deref() {
            Some(holder) if holder == worker_id => Ok(()),
            _ => Err(JobRunnerError::ReservationConflict {
                job_id: self.job_id.clone(),
                worker_id: worker_id.to_string(),
            }),
        }
    }

    pub fn execution_duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.finished_at) {
            (Some(started), Some(finished)) => Some((finished - started).num_milliseconds()),
            _ => None,
        }
    }
}
