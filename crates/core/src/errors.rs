use thiserror::Error;

use crate::models::JobStatus;

/// 任务分发系统错误类型定义
#[derive(Debug, Error)]
pub enum JobRunnerError {
    /// 消息代理无法访问（连接失败、认证失败或超时）
    #[error("消息代理不可用: {0}")]
    BrokerUnavailable(String),

    /// 同一个任务被两个Worker持有，正常情况下不应出现
    #[error("任务预留冲突: job_id={job_id}, worker_id={worker_id}")]
    ReservationConflict { job_id: String, worker_id: String },

    #[error("任务执行异常: job_id={job_id} - {message}")]
    ExecutionFault { job_id: String, message: String },

    /// 指标采集中某一个数据源失败
    #[error("指标数据源不可用: {source_name} - {message}")]
    MetricsSourceUnavailable {
        source_name: String,
        message: String,
    },

    #[error("非法的任务状态转换: job_id={job_id}, {from} -> {to}")]
    InvalidTransition {
        job_id: String,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("任务未找到: {id}")]
    JobNotFound { id: String },

    #[error("序列化错误: {0}")]
    Serialization(String),

    /// 调用方传入的参数超出允许范围
    #[error("参数无效: {0}")]
    InvalidArgument(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("服务正在关闭")]
    ShuttingDown,

    #[error("内部错误: {0}")]
    Internal(String),
}

impl JobRunnerError {
    pub fn broker_unavailable(message: impl Into<String>) -> Self {
        Self::BrokerUnavailable(message.into())
    }

    pub fn metrics_source(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MetricsSourceUnavailable {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// 是否为消息代理连接类错误
    pub fn is_broker_error(&self) -> bool {
        matches!(self, Self::BrokerUnavailable(_))
    }
}

impl From<serde_json::Error> for JobRunnerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// 统一的Result类型
pub type JobRunnerResult<T> = std::result::Result<T, JobRunnerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = JobRunnerError::broker_unavailable("connection refused");
        assert_eq!(err.to_string(), "消息代理不可用: connection refused");
        assert!(err.is_broker_error());

        let err = JobRunnerError::InvalidTransition {
            job_id: "abc".to_string(),
            from: JobStatus::Completed,
            to: JobStatus::Active,
        };
        assert!(err.to_string().contains("completed -> active"));
        assert!(!err.is_broker_error());
    }

    #[test]
    fn test_serde_error_conversion() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: JobRunnerError = parse_err.into();
        assert!(matches!(err, JobRunnerError::Serialization(_)));
    }
}
