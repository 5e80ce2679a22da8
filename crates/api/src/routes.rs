use axum::{routing::get, Router};
use std::sync::Arc;
use std::time::Duration;

use jobrunner_core::ShutdownCoordinator;
use jobrunner_infrastructure::MetricsCollector;

use crate::handlers::{
    data::get_random_data,
    health::health_check,
    jobs::{get_job, trigger_job_get, trigger_job_post},
    metrics::{metrics, worker_metrics},
};
use crate::producer::JobProducer;

/// 演示数据接口的随机延迟区间
#[derive(Debug, Clone, Copy)]
pub struct DataDelay {
    pub min: Duration,
    pub max: Duration,
}

impl Default for DataDelay {
    fn default() -> Self {
        Self {
            min: Duration::from_secs(1),
            max: Duration::from_secs(3),
        }
    }
}

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub producer: JobProducer,
    pub shutdown: ShutdownCoordinator,
    pub collector: Arc<MetricsCollector>,
    pub data_delay: DataDelay,
}

/// 创建API路由
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        // 健康检查
        .route("/healthz", get(health_check))
        .route("/health", get(health_check))
        // 任务触发与查询
        .route("/job", get(trigger_job_get).post(trigger_job_post))
        .route("/job/{job_id}", get(get_job))
        .route("/data", get(get_random_data))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// 只暴露指标的路由，供单独运行的Worker节点使用
pub fn metrics_routes(collector: Arc<MetricsCollector>) -> Router {
    Router::new()
        .route("/metrics", get(worker_metrics))
        .with_state(collector)
}

