//! 消息代理连接地址
//!
//! 地址的scheme决定传输方式：`redis://` 为明文，`rediss://` 为TLS。TLS连接可以
//! 在查询参数中携带 `ssl_cert_reqs`，URL中已有的取值优先于配置的默认值。

use url::Url;

use crate::models::CertRequirement;
use crate::{ConfigError, ConfigResult};

const CERT_REQS_PARAM: &str = "ssl_cert_reqs";

#[derive(Debug, Clone, PartialEq)]
pub struct BrokerUrl {
    url: Url,
    cert_requirement: Option<CertRequirement>,
}

impl BrokerUrl {
    pub fn parse(raw: &str, default_cert_reqs: CertRequirement) -> ConfigResult<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ConfigError::Validation("broker url cannot be empty".to_string()));
        }

        let normalized = if raw.starts_with("redis://") || raw.starts_with("rediss://") {
            raw.to_string()
        } else {
            format!("redis://{raw}")
        };

        let mut url = Url::parse(&normalized)?;
        if url.host_str().map_or(true, str::is_empty) {
            return Err(ConfigError::Validation(format!(
                "broker url has no host: {}",
                mask_password(&url)
            )));
        }

        let mut explicit = None;
        let mut remaining = Vec::new();
        for (key, value) in url.query_pairs() {
            if key == CERT_REQS_PARAM {
                explicit = Some(CertRequirement::parse(&value)?);
            } else {
                remaining.push((key.into_owned(), value.into_owned()));
            }
        }

        // ssl_cert_reqs 由这里解释，不透传给客户端
        if remaining.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(remaining);
        }

        let cert_requirement = if url.scheme() == "rediss" {
            Some(explicit.unwrap_or(default_cert_reqs))
        } else {
            None
        };

        Ok(Self {
            url,
            cert_requirement,
        })
    }

    pub fn is_tls(&self) -> bool {
        self.cert_requirement.is_some()
    }

    /// 明文连接返回 `None`
    pub fn cert_requirement(&self) -> Option<CertRequirement> {
        self.cert_requirement
    }

    /// 交给Redis客户端的连接串
    pub fn connection_url(&self) -> String {
        let mut url = self.url.clone();
        if let Some(requirement) = self.cert_requirement {
            if !requirement.verifies_certificate() {
                url.set_fragment(Some("insecure"));
            }
        }
        url.to_string()
    }

    /// 用于日志输出，隐藏密码
    pub fn masked(&self) -> String {
        mask_password(&self.url)
    }
}

fn mask_password(url: &Url) -> String {
    let mut masked = url.clone();
    if masked.password().is_some() {
        let _ = masked.set_password(Some("***"));
    }
    masked.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_scheme_defaults_to_plaintext() {
        let url = BrokerUrl::parse("redis:6379/0", CertRequirement::None).unwrap();
        assert!(!url.is_tls());
        assert_eq!(url.connection_url(), "redis://redis:6379/0");
    }

    #[test]
    fn test_tls_uses_default_cert_requirement() {
        let url = BrokerUrl::parse("rediss://cache.example.com:6379/0", CertRequirement::None)
            .unwrap();
        assert!(url.is_tls());
        assert_eq!(url.cert_requirement(), Some(CertRequirement::None));
        assert_eq!(
            url.connection_url(),
            "rediss://cache.example.com:6379/0#insecure"
        );
    }

    #[test]
    fn test_explicit_cert_requirement_is_not_overridden() {
        let url = BrokerUrl::parse(
            "rediss://cache.example.com:6379/0?ssl_cert_reqs=CERT_REQUIRED",
            CertRequirement::None,
        )
        .unwrap();
        assert_eq!(url.cert_requirement(), Some(CertRequirement::Required));
        assert_eq!(url.connection_url(), "rediss://cache.example.com:6379/0");

        let url = BrokerUrl::parse(
            "rediss://cache.example.com/0?ssl_cert_reqs=none&protocol=resp3",
            CertRequirement::Required,
        )
        .unwrap();
        assert_eq!(url.cert_requirement(), Some(CertRequirement::None));
        assert_eq!(
            url.connection_url(),
            "rediss://cache.example.com/0?protocol=resp3#insecure"
        );
    }

    #[test]
    fn test_plaintext_ignores_cert_requirement() {
        let url = BrokerUrl::parse(
            "redis://localhost:6379/0?ssl_cert_reqs=required",
            CertRequirement::None,
        )
        .unwrap();
        assert!(!url.is_tls());
        assert_eq!(url.connection_url(), "redis://localhost:6379/0");
    }

    #[test]
    fn test_masked_hides_password() {
        let url = BrokerUrl::parse("redis://:secret@localhost:6379/0", CertRequirement::None)
            .unwrap();
        let masked = url.masked();
        assert!(!masked.contains("secret"));
        assert!(masked.contains("***"));
        assert!(url.connection_url().contains("secret"));
    }

    #[test]
    fn test_invalid_urls() {
        assert!(BrokerUrl::parse("", CertRequirement::None).is_err());
        assert!(BrokerUrl::parse(
            "rediss://host/0?ssl_cert_reqs=maybe",
            CertRequirement::None
        )
        .is_err());
    }
}
