use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use jobrunner_core::JobRunnerError;
use serde_json::json;
use tracing::{error, warn};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    JobRunner(#[from] JobRunnerError),

    #[error("请求参数错误: {0}")]
    BadRequest(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::JobRunner(err) => match err {
                JobRunnerError::ShuttingDown => {
                    (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_SHUTTING_DOWN")
                }
                JobRunnerError::BrokerUnavailable(_) => {
                    (StatusCode::BAD_GATEWAY, "BROKER_UNAVAILABLE")
                }
                JobRunnerError::JobNotFound { .. } => (StatusCode::NOT_FOUND, "JOB_NOT_FOUND"),
                JobRunnerError::Serialization(_) => (StatusCode::BAD_REQUEST, "SERIALIZATION_ERROR"),
                JobRunnerError::InvalidArgument(_) => (StatusCode::BAD_REQUEST, "INVALID_ARGUMENT"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            error!("请求处理失败: {}", self);
        } else {
            warn!("请求被拒绝: {}", self);
        }

        let body = Json(json!({
            "success": false,
            "error": {
                "code": code,
                "message": self.to_string(),
            },
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ApiError::from(JobRunnerError::ShuttingDown), StatusCode::SERVICE_UNAVAILABLE),
            (
                ApiError::from(JobRunnerError::broker_unavailable("connection refused")),
                StatusCode::BAD_GATEWAY,
            ),
            (
                ApiError::from(JobRunnerError::JobNotFound { id: "x".to_string() }),
                StatusCode::NOT_FOUND,
            ),
            (ApiError::BadRequest("name".to_string()), StatusCode::BAD_REQUEST),
            (
                ApiError::from(JobRunnerError::InvalidArgument("countdown".to_string())),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::from(JobRunnerError::Internal("boom".to_string())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }

    #[test]
    fn test_message_is_preserved() {
        let error = ApiError::from(JobRunnerError::ShuttingDown);
        assert_eq!(error.to_string(), "服务正在关闭");
    }
}
