use axum::{extract::Request, middleware::Next, response::Response};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

pub async fn request_logging(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = std::time::Instant::now();

    debug!("开始处理请求: {} {}", method, uri);

    let response = next.run(request).await;
    let duration = start.elapsed();

    // 抓取接口调用频繁，只在调试级别记录
    if uri.path() == "/metrics" {
        debug!("完成请求处理: {} {} - 状态: {} - 耗时: {:?}", method, uri, response.status(), duration);
    } else {
        info!(
            "完成请求处理: {} {} - 状态: {} - 耗时: {:?}",
            method,
            uri,
            response.status(),
            duration
        );
    }

    response
}

pub fn trace_layer(
) -> TraceLayer<tower_http::classify::SharedClassifier<tower_http::classify::ServerErrorsAsFailures>>
{
    TraceLayer::new_for_http()
}
