use serde::{Deserialize, Serialize};

use crate::validation::{ConfigValidator, ValidationUtils};
use crate::{BrokerUrl, ConfigError, ConfigResult};

/// 消息代理后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerBackend {
    Redis,
    /// 进程内队列，仅适用于单进程部署和测试
    Memory,
}

/// TLS连接的证书校验要求
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertRequirement {
    None,
    Optional,
    Required,
}

impl CertRequirement {
    /// 解析URL参数中的取值，兼容 `CERT_REQUIRED` 这类写法
    pub fn parse(value: &str) -> ConfigResult<Self> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.trim_start_matches("cert_") {
            "none" => Ok(CertRequirement::None),
            "optional" => Ok(CertRequirement::Optional),
            "required" => Ok(CertRequirement::Required),
            _ => Err(ConfigError::Validation(format!(
                "unsupported ssl_cert_reqs value: {value}"
            ))),
        }
    }

    pub fn verifies_certificate(&self) -> bool {
        matches!(self, CertRequirement::Required)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub backend: BrokerBackend,
    pub url: String,
    pub queue_name: String,
    /// Redis键前缀
    pub key_prefix: String,
    /// 单次代理操作的超时时间（毫秒）
    pub operation_timeout_ms: u64,
    pub connect_timeout_seconds: u64,
    /// 终态任务记录的保留时间
    pub result_expires_seconds: u64,
    /// 超过该时间未心跳的Worker不再出现在检查结果中
    pub worker_ttl_seconds: u64,
    /// URL中未指定 `ssl_cert_reqs` 时使用的默认值
    pub default_cert_reqs: CertRequirement,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            backend: BrokerBackend::Redis,
            url: "redis://redis:6379/0".to_string(),
            queue_name: "jobs".to_string(),
            key_prefix: "jobrunner".to_string(),
            operation_timeout_ms: 5000,
            connect_timeout_seconds: 10,
            result_expires_seconds: 86400,
            worker_ttl_seconds: 30,
            default_cert_reqs: CertRequirement::None,
        }
    }
}

impl BrokerConfig {
    /// 规范化后的代理地址
    pub fn broker_url(&self) -> ConfigResult<BrokerUrl> {
        BrokerUrl::parse(&self.url, self.default_cert_reqs)
    }
}

impl ConfigValidator for BrokerConfig {
    fn validate(&self) -> ConfigResult<()> {
        ValidationUtils::validate_not_empty(&self.queue_name, "broker.queue_name")?;
        ValidationUtils::validate_not_empty(&self.key_prefix, "broker.key_prefix")?;
        ValidationUtils::validate_timeout(self.connect_timeout_seconds, "broker.connect_timeout_seconds")?;
        ValidationUtils::validate_timeout(self.worker_ttl_seconds, "broker.worker_ttl_seconds")?;

        if self.operation_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "broker.operation_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.result_expires_seconds == 0 {
            return Err(ConfigError::Validation(
                "broker.result_expires_seconds must be greater than 0".to_string(),
            ));
        }

        if self.backend == BrokerBackend::Redis {
            ValidationUtils::validate_not_empty(&self.url, "broker.url")?;
            self.broker_url()?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cert_requirement_parse() {
        assert_eq!(CertRequirement::parse("none").unwrap(), CertRequirement::None);
        assert_eq!(
            CertRequirement::parse("CERT_REQUIRED").unwrap(),
            CertRequirement::Required
        );
        assert_eq!(
            CertRequirement::parse("Optional").unwrap(),
            CertRequirement::Optional
        );
        assert!(CertRequirement::parse("sometimes").is_err());
    }

    #[test]
    fn test_broker_config_validation() {
        let config = BrokerConfig::default();
        assert!(config.validate().is_ok());

        let config = BrokerConfig {
            operation_timeout_ms: 0,
            ..BrokerConfig::default()
        };
        assert!(config.validate().is_err());

        let config = BrokerConfig {
            url: String::new(),
            ..BrokerConfig::default()
        };
        assert!(config.validate().is_err());

        // 内存后端不需要URL
        let config = BrokerConfig {
            backend: BrokerBackend::Memory,
            url: String::new(),
            ..BrokerConfig::default()
        };
        assert!(config.validate().is_ok());
    }
}
