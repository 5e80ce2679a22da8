use serde::{Deserialize, Serialize};

use crate::validation::{ConfigValidator, ValidationUtils};
use crate::{ConfigError, ConfigResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub enabled: bool,
    /// 未设置时为 `worker@<hostname>`
    pub node_name: Option<String>,
    /// 同一节点上并发执行的任务数
    pub concurrency: usize,
    pub poll_interval_ms: u64,
    pub heartbeat_interval_seconds: u64,
    /// 仅worker模式下单独暴露 `/metrics` 时设置
    pub metrics_bind_address: Option<String>,
    pub process_job_min_seconds: u64,
    pub process_job_max_seconds: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            node_name: None,
            concurrency: default_concurrency(),
            poll_interval_ms: 1000,
            heartbeat_interval_seconds: 10,
            metrics_bind_address: None,
            process_job_min_seconds: 300,
            process_job_max_seconds: 600,
        }
    }
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl WorkerConfig {
    pub fn node_name(&self) -> String {
        match &self.node_name {
            Some(name) if !name.trim().is_empty() => name.clone(),
            _ => {
                let host = hostname::get()
                    .ok()
                    .and_then(|h| h.into_string().ok())
                    .unwrap_or_else(|| "localhost".to_string());
                format!("worker@{host}")
            }
        }
    }
}

impl ConfigValidator for WorkerConfig {
    fn validate(&self) -> ConfigResult<()> {
        ValidationUtils::validate_count(self.concurrency, "worker.concurrency", 1024)?;
        ValidationUtils::validate_timeout(
            self.heartbeat_interval_seconds,
            "worker.heartbeat_interval_seconds",
        )?;
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "worker.poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        if let Some(address) = &self.metrics_bind_address {
            ValidationUtils::validate_bind_address(address, "worker.metrics_bind_address")?;
        }
        ValidationUtils::validate_range(
            self.process_job_min_seconds,
            self.process_job_max_seconds,
            "worker.process_job_seconds",
        )?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// 收到信号后继续以503应答的时间，留给负载均衡摘除实例
    pub drain_delay_seconds: u64,
    /// 优雅关闭的上限，超时后强制退出
    pub grace_period_seconds: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_delay_seconds: 5,
            grace_period_seconds: 30,
        }
    }
}

impl ConfigValidator for ShutdownConfig {
    fn validate(&self) -> ConfigResult<()> {
        ValidationUtils::validate_timeout(
            self.grace_period_seconds,
            "shutdown.grace_period_seconds",
        )?;
        if self.drain_delay_seconds > self.grace_period_seconds {
            return Err(ConfigError::Validation(
                "shutdown.drain_delay_seconds cannot exceed shutdown.grace_period_seconds"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_config_defaults() {
        let config = WorkerConfig::default();
        assert!(config.concurrency >= 1);
        assert!(config.validate().is_ok());
        assert!(config.node_name().starts_with("worker@"));
    }

    #[test]
    fn test_explicit_node_name() {
        let config = WorkerConfig {
            node_name: Some("worker@node-a".to_string()),
            ..WorkerConfig::default()
        };
        assert_eq!(config.node_name(), "worker@node-a");
    }

    #[test]
    fn test_worker_config_validation() {
        let config = WorkerConfig {
            concurrency: 0,
            ..WorkerConfig::default()
        };
        assert!(config.validate().is_err());

        let config = WorkerConfig {
            process_job_min_seconds: 10,
            process_job_max_seconds: 1,
            ..WorkerConfig::default()
        };
        assert!(config.validate().is_err());

        let config = WorkerConfig {
            metrics_bind_address: Some("bad".to_string()),
            ..WorkerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_shutdown_config_validation() {
        assert!(ShutdownConfig::default().validate().is_ok());

        let config = ShutdownConfig {
            drain_delay_seconds: 60,
            grace_period_seconds: 30,
        };
        assert!(config.validate().is_err());
    }
}
