use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::{
    error::{ApiError, ApiResult},
    producer::TriggerRequest,
    response::success,
    routes::AppState,
};

/// GET方式触发时的查询参数
#[derive(Debug, Deserialize)]
pub struct TriggerQuery {
    pub name: Option<String>,
    pub countdown_seconds: Option<u64>,
}

pub async fn trigger_job_get(
    State(state): State<AppState>,
    Query(query): Query<TriggerQuery>,
) -> ApiResult<impl IntoResponse> {
    let request = TriggerRequest {
        name: query.name,
        args: None,
        countdown_seconds: query.countdown_seconds,
    };
    started(&state, request).await
}

/// 请求体可以为空，此时触发默认任务
pub async fn trigger_job_post(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        TriggerRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("请求体不是合法的JSON: {e}")))?
    };
    started(&state, request).await
}

async fn started(state: &AppState, request: TriggerRequest) -> ApiResult<Json<serde_json::Value>> {
    let job_id = state.producer.trigger(request).await?;
    Ok(Json(json!({
        "job_id": job_id,
        "status": "started",
    })))
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let job = state.producer.get_job(&job_id).await?;
    Ok(success(job))
}
