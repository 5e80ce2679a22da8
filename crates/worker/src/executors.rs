use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use jobrunner_core::{JobContext, TaskHandler};
use rand::Rng;
use serde_json::json;
use tracing::info;

/// 内置的 `process_job` 任务
///
/// 模拟一个长耗时计算：在给定区间内随机休眠，然后返回一个随机结果编号。
pub struct ProcessJobHandler {
    min_duration: Duration,
    max_duration: Duration,
}

impl ProcessJobHandler {
    pub const NAME: &'static str = "process_job";

    pub fn new(min_seconds: u64, max_seconds: u64) -> Self {
        Self::with_duration_range(
            Duration::from_secs(min_seconds),
            Duration::from_secs(max_seconds),
        )
    }

    pub fn with_duration_range(min_duration: Duration, max_duration: Duration) -> Self {
        Self {
            min_duration,
            max_duration: max_duration.max(min_duration),
        }
    }
}

impl Default for ProcessJobHandler {
    fn default() -> Self {
        Self::new(300, 600)
    }
}

#[async_trait]
impl TaskHandler for ProcessJobHandler {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn execute(&self, context: &JobContext) -> anyhow::Result<serde_json::Value> {
        let (duration, result_id) = {
            let mut rng = rand::rng();
            let millis = rng.random_range(
                self.min_duration.as_millis() as u64..=self.max_duration.as_millis() as u64,
            );
            (Duration::from_millis(millis), rng.random_range(1000..=9999u32))
        };

        info!(
            job_id = %context.job_id,
            worker_id = %context.worker_id,
            "开始处理任务，预计耗时 {:.1}s",
            duration.as_secs_f64()
        );
        tokio::time::sleep(duration).await;

        Ok(json!({
            "status": "completed",
            "duration": duration.as_secs_f64(),
            "result_id": result_id,
            "completion_time": Utc::now().to_rfc3339(),
        }))
    }
}

/// 任务名到处理器的映射
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册处理器，同名处理器会被替换
    pub fn register(&mut self, handler: Arc<dyn TaskHandler>) {
        let name = handler.name().to_string();
        info!("注册任务处理器: {}", name);
        self.handlers.insert(name, handler);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }
}
