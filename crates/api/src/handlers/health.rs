use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::routes::AppState;

/// 就绪时返回200，进入关闭流程后返回503，供负载均衡摘除流量
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    if state.shutdown.is_ready() {
        (StatusCode::OK, Json(json!({ "status": "healthy" })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "unhealthy",
                "reason": "service is shutting down",
            })),
        )
    }
}
