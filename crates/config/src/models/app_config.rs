use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    api_observability::{ApiConfig, ObservabilityConfig},
    broker::BrokerConfig,
    worker::{ShutdownConfig, WorkerConfig},
};
use crate::validation::ConfigValidator;

const DEFAULT_CONFIG_PATHS: [&str; 2] = ["config/jobrunner.toml", "jobrunner.toml"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub broker: BrokerConfig,
    pub api: ApiConfig,
    pub worker: WorkerConfig,
    pub shutdown: ShutdownConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 加载顺序：默认值 → TOML文件 → `JOBRUNNER_` 环境变量 → 兼容变量
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else if let Some(path) = DEFAULT_CONFIG_PATHS
            .iter()
            .find(|path| Path::new(path).exists())
        {
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix("JOBRUNNER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        let server_port = match std::env::var("SERVER_PORT") {
            Ok(value) => Some(
                value
                    .trim()
                    .parse::<u16>()
                    .with_context(|| format!("SERVER_PORT不是有效端口: {value}"))?,
            ),
            Err(_) => None,
        };
        config.apply_overrides(std::env::var("REDIS_URL").ok(), server_port);

        config.validate()?;

        Ok(config)
    }

    /// `REDIS_URL` 与 `SERVER_PORT` 的兼容处理
    pub fn apply_overrides(&mut self, redis_url: Option<String>, server_port: Option<u16>) {
        if let Some(url) = redis_url.filter(|url| !url.trim().is_empty()) {
            self.broker.url = url;
        }
        if let Some(port) = server_port {
            self.api.set_port(port);
        }
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }
}

impl ConfigValidator for AppConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        self.broker.validate()?;
        self.api.validate()?;
        self.worker.validate()?;
        self.shutdown.validate()?;
        self.observability.validate()?;

        // 心跳间隔不小于存活期时，节点会在两次心跳之间从检查结果中消失
        if self.worker.enabled
            && self.worker.heartbeat_interval_seconds >= self.broker.worker_ttl_seconds
        {
            return Err(crate::ConfigError::Validation(format!(
                "worker.heartbeat_interval_seconds ({}) must be less than broker.worker_ttl_seconds ({})",
                self.worker.heartbeat_interval_seconds, self.broker.worker_ttl_seconds
            )));
        }
        Ok(())
    }
}
