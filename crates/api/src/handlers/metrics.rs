use std::sync::Arc;

use axum::{extract::State, http::header, response::IntoResponse};
use jobrunner_infrastructure::MetricsCollector;

use crate::routes::AppState;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// 每次请求都重新采集，某个数据源失败时只降级该字段
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    render(&state.collector).await
}

pub async fn worker_metrics(State(collector): State<Arc<MetricsCollector>>) -> impl IntoResponse {
    render(&collector).await
}

async fn render(collector: &MetricsCollector) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
        collector.scrape().await,
    )
}
