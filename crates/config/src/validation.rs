use std::net::SocketAddr;

use crate::{ConfigError, ConfigResult};

/// 配置验证接口
pub trait ConfigValidator {
    fn validate(&self) -> ConfigResult<()>;
}

/// 验证工具函数
pub struct ValidationUtils;

impl ValidationUtils {
    /// 验证非空字符串
    pub fn validate_not_empty(value: &str, field_name: &str) -> ConfigResult<()> {
        if value.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "{field_name} cannot be empty"
            )));
        }
        Ok(())
    }

    /// 验证超时值
    pub fn validate_timeout(timeout_seconds: u64, field_name: &str) -> ConfigResult<()> {
        if timeout_seconds == 0 {
            return Err(ConfigError::Validation(format!(
                "{field_name} must be greater than 0"
            )));
        }
        if timeout_seconds > 3600 {
            return Err(ConfigError::Validation(format!(
                "{field_name} cannot exceed 3600 seconds"
            )));
        }
        Ok(())
    }

    /// 验证计数值
    pub fn validate_count(count: usize, field_name: &str, max_value: usize) -> ConfigResult<()> {
        if count == 0 {
            return Err(ConfigError::Validation(format!(
                "{field_name} must be greater than 0"
            )));
        }
        if count > max_value {
            return Err(ConfigError::Validation(format!(
                "{field_name} cannot exceed {max_value}"
            )));
        }
        Ok(())
    }

    /// 验证监听地址
    pub fn validate_bind_address(address: &str, field_name: &str) -> ConfigResult<()> {
        address.parse::<SocketAddr>().map_err(|e| {
            ConfigError::Validation(format!("{field_name} is not a valid socket address: {e}"))
        })?;
        Ok(())
    }

    /// 验证取值范围的上下界
    pub fn validate_range(min: u64, max: u64, field_name: &str) -> ConfigResult<()> {
        if min > max {
            return Err(ConfigError::Validation(format!(
                "{field_name}: min ({min}) must not exceed max ({max})"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_utils() {
        assert!(ValidationUtils::validate_not_empty("a", "f").is_ok());
        assert!(ValidationUtils::validate_not_empty("  ", "f").is_err());
        assert!(ValidationUtils::validate_timeout(0, "t").is_err());
        assert!(ValidationUtils::validate_timeout(3601, "t").is_err());
        assert!(ValidationUtils::validate_timeout(30, "t").is_ok());
        assert!(ValidationUtils::validate_count(0, "c", 10).is_err());
        assert!(ValidationUtils::validate_count(11, "c", 10).is_err());
        assert!(ValidationUtils::validate_bind_address("0.0.0.0:8000", "b").is_ok());
        assert!(ValidationUtils::validate_bind_address("localhost", "b").is_err());
        assert!(ValidationUtils::validate_range(3, 1, "r").is_err());
        assert!(ValidationUtils::validate_range(1, 1, "r").is_ok());
    }
}
