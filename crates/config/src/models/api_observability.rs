use serde::{Deserialize, Serialize};

use crate::validation::{ConfigValidator, ValidationUtils};
use crate::{ConfigError, ConfigResult};

/// 延迟任务上限的配置上界（一年）
const MAX_COUNTDOWN_LIMIT_SECONDS: u64 = 365 * 86400;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub bind_address: String,
    /// 触发接口未指定任务名时使用
    pub default_job_name: String,
    /// 触发接口允许的最大延迟秒数
    pub max_countdown_seconds: u64,
    pub data_delay_min_ms: u64,
    pub data_delay_max_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "0.0.0.0:8000".to_string(),
            default_job_name: "process_job".to_string(),
            max_countdown_seconds: 86400,
            data_delay_min_ms: 1000,
            data_delay_max_ms: 3000,
        }
    }
}

impl ApiConfig {
    /// 替换监听地址中的端口
    pub fn set_port(&mut self, port: u16) {
        let host = match self.bind_address.rsplit_once(':') {
            Some((host, _)) => host.to_string(),
            None => self.bind_address.clone(),
        };
        self.bind_address = format!("{host}:{port}");
    }
}

impl ConfigValidator for ApiConfig {
    fn validate(&self) -> ConfigResult<()> {
        ValidationUtils::validate_bind_address(&self.bind_address, "api.bind_address")?;
        ValidationUtils::validate_not_empty(&self.default_job_name, "api.default_job_name")?;
        if self.max_countdown_seconds > MAX_COUNTDOWN_LIMIT_SECONDS {
            return Err(ConfigError::Validation(format!(
                "api.max_countdown_seconds must not exceed {MAX_COUNTDOWN_LIMIT_SECONDS}"
            )));
        }
        ValidationUtils::validate_range(
            self.data_delay_min_ms,
            self.data_delay_max_ms,
            "api.data_delay_ms",
        )?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    /// `pretty` 或 `json`
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

impl ConfigValidator for ObservabilityConfig {
    fn validate(&self) -> ConfigResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::Validation(format!(
                "observability.log_level must be one of: {}",
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["pretty", "json"];
        if !valid_formats.contains(&self.log_format.to_lowercase().as_str()) {
            return Err(ConfigError::Validation(format!(
                "observability.log_format must be one of: {}",
                valid_formats.join(", ")
            )));
        }

        Ok(())
    }
}
