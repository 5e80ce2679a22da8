//! # JobRunner API
//!
//! 任务分发系统的HTTP前端，基于Axum构建。前端只负责把任务放入消息代理并
//! 立即返回任务ID，任务由Worker池异步执行。
//!
//! ## API 端点
//!
//! - `GET|POST /job` - 触发任务，返回 `{"job_id", "status": "started"}`
//! - `GET /job/{job_id}` - 查询任务记录
//! - `GET /healthz` (`/health`) - 健康检查，关闭流程中返回503
//! - `GET /metrics` - Prometheus格式的队列、Worker和任务指标
//! - `GET /data` - 带随机延迟的演示数据接口
//!
//! ## 关闭行为
//!
//! 关闭协调器进入关闭状态后，触发接口和数据接口返回503，健康检查报告不健康；
//! 已经被Worker预留的任务不受影响，继续执行到终态。

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod producer;
pub mod response;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use jobrunner_config::ApiConfig;
use jobrunner_core::{Broker, ShutdownCoordinator};
use jobrunner_infrastructure::MetricsCollector;
use tower::ServiceBuilder;

use middleware::{request_logging, trace_layer};
pub use producer::{JobProducer, TriggerRequest};
pub use routes::{create_routes, metrics_routes, AppState, DataDelay};

/// 创建完整的API应用
///
/// `broker` 是生产者专用的客户端，采集器持有自己的客户端。
pub fn create_app(
    broker: Arc<dyn Broker>,
    shutdown: ShutdownCoordinator,
    collector: Arc<MetricsCollector>,
    api_config: &ApiConfig,
) -> Router {
    let state = AppState {
        producer: JobProducer::new(broker, shutdown.clone(), api_config.default_job_name.clone())
            .with_max_countdown(api_config.max_countdown_seconds),
        shutdown,
        collector,
        data_delay: DataDelay {
            min: Duration::from_millis(api_config.data_delay_min_ms),
            max: Duration::from_millis(api_config.data_delay_max_ms),
        },
    };

    with_layers(create_routes(state))
}

/// Worker节点单独暴露的指标服务
pub fn create_metrics_app(collector: Arc<MetricsCollector>) -> Router {
    with_layers(metrics_routes(collector))
}

fn with_layers(router: Router) -> Router {
    router.layer(
        ServiceBuilder::new()
            .layer(trace_layer())
            .layer(axum::middleware::from_fn(request_logging)),
    )
}
