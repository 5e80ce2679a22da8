use std::collections::HashMap;
use std::sync::Arc;

use jobrunner_core::{Broker, JobRunnerError, JobRunnerResult};
use metrics::gauge;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{debug, warn};

use crate::observability::JobMetrics;

/// 一次采集得到的队列与Worker状态
///
/// 采集失败的数据源在这里体现为0或空表，具体错误只写入日志。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    pub queue_name: String,
    pub queue_length: u64,
    pub active_by_worker: HashMap<String, usize>,
    pub scheduled_by_worker: HashMap<String, usize>,
    pub reserved_by_worker: HashMap<String, usize>,
}

/// 按需采集的指标收集器
///
/// 每次抓取都直接查询消息代理，不做缓存；Worker维度的指标每次重新生成，
/// 已失联的Worker不会残留在输出中。
pub struct MetricsCollector {
    broker: Arc<dyn Broker>,
    job_metrics: Arc<JobMetrics>,
}

impl MetricsCollector {
    pub fn new(broker: Arc<dyn Broker>, job_metrics: Arc<JobMetrics>) -> Self {
        Self {
            broker,
            job_metrics,
        }
    }

    pub async fn collect_snapshot(&self) -> MetricsSnapshot {
        let (queue_length, active, scheduled, reserved) = tokio::join!(
            self.broker.queue_length(),
            self.broker.inspect_active(),
            self.broker.inspect_scheduled(),
            self.broker.inspect_reserved(),
        );

        MetricsSnapshot {
            queue_name: self.broker.queue_name().to_string(),
            queue_length: degrade("queue_length", queue_length),
            active_by_worker: degrade("active", active),
            scheduled_by_worker: degrade("scheduled", scheduled),
            reserved_by_worker: degrade("reserved", reserved),
        }
    }

    /// 采集快照并与任务计数合并为Prometheus文本
    pub async fn scrape(&self) -> String {
        let snapshot = self.collect_snapshot().await;
        let mut output = render_snapshot(&snapshot);
        output.push_str(&self.job_metrics.render());
        output
    }
}

fn degrade<T: Default>(source_name: &str, result: JobRunnerResult<T>) -> T {
    result.unwrap_or_else(|e| {
        let error = JobRunnerError::metrics_source(source_name, e.to_string());
        warn!("{}", error);
        T::default()
    })
}

/// 使用一次性记录器渲染仪表盘指标，保证只包含本次采集到的Worker
fn render_snapshot(snapshot: &MetricsSnapshot) -> String {
    let recorder = PrometheusBuilder::new().build_recorder();

    metrics::with_local_recorder(&recorder, || {
        gauge!("queue_length", "queue_name" => snapshot.queue_name.clone())
            .set(snapshot.queue_length as f64);

        let per_worker = [
            ("active_tasks", &snapshot.active_by_worker),
            ("scheduled_tasks", &snapshot.scheduled_by_worker),
            ("reserved_tasks", &snapshot.reserved_by_worker),
        ];
        for (name, counts) in per_worker {
            for (worker_name, count) in counts {
                gauge!(name, "worker_name" => worker_name.clone()).set(*count as f64);
            }
        }
    });

    debug!(
        queue_length = snapshot.queue_length,
        workers = snapshot.active_by_worker.len(),
        "Metrics snapshot collected"
    );
    recorder.handle().render()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryBroker;
    use async_trait::async_trait;
    use jobrunner_core::{EnqueueOptions, Job, JobCompletion};
    use serde_json::json;

    /// 包装内存代理，按需让某个检查调用失败
    struct FlakyBroker {
        inner: InMemoryBroker,
        fail_scheduled: bool,
        fail_queue_length: bool,
    }

    #[async_trait]
    impl Broker for FlakyBroker {
        async fn enqueue(
            &self,
            name: &str,
            args: serde_json::Value,
            options: EnqueueOptions,
        ) -> JobRunnerResult<String> {
            self.inner.enqueue(name, args, options).await
        }
        async fn reserve(&self, worker_id: &str) -> JobRunnerResult<Option<Job>> {
            self.inner.reserve(worker_id).await
        }
        async fn hold_scheduled(&self, worker_id: &str, job_id: &str) -> JobRunnerResult<()> {
            self.inner.hold_scheduled(worker_id, job_id).await
        }
        async fn start(&self, worker_id: &str, job_id: &str) -> JobRunnerResult<Job> {
            self.inner.start(worker_id, job_id).await
        }
        async fn store_result(
            &self,
            worker_id: &str,
            job_id: &str,
            completion: JobCompletion,
        ) -> JobRunnerResult<Job> {
            self.inner.store_result(worker_id, job_id, completion).await
        }
        async fn get_job(&self, job_id: &str) -> JobRunnerResult<Option<Job>> {
            self.inner.get_job(job_id).await
        }
        async fn queue_length(&self) -> JobRunnerResult<u64> {
            if self.fail_queue_length {
                return Err(JobRunnerError::broker_unavailable("LLEN timed out"));
            }
            self.inner.queue_length().await
        }
        fn queue_name(&self) -> &str {
            self.inner.queue_name()
        }
        async fn heartbeat(&self, worker_id: &str) -> JobRunnerResult<()> {
            self.inner.heartbeat(worker_id).await
        }
        async fn unregister_worker(&self, worker_id: &str) -> JobRunnerResult<()> {
            self.inner.unregister_worker(worker_id).await
        }
        async fn inspect_active(&self) -> JobRunnerResult<HashMap<String, usize>> {
            self.inner.inspect_active().await
        }
        async fn inspect_scheduled(&self) -> JobRunnerResult<HashMap<String, usize>> {
            if self.fail_scheduled {
                return Err(JobRunnerError::broker_unavailable("inspect timed out"));
            }
            self.inner.inspect_scheduled().await
        }
        async fn inspect_reserved(&self) -> JobRunnerResult<HashMap<String, usize>> {
            self.inner.inspect_reserved().await
        }
    }

    fn sample(output: &str, series: &str) -> Option<f64> {
        output
            .lines()
            .find(|line| line.starts_with(series))
            .and_then(|line| line.rsplit(' ').next())
            .and_then(|value| value.parse().ok())
    }

    async fn seeded_broker(fail_scheduled: bool, fail_queue_length: bool) -> Arc<FlakyBroker> {
        let broker = Arc::new(FlakyBroker {
            inner: InMemoryBroker::new("jobs"),
            fail_scheduled,
            fail_queue_length,
        });
        for _ in 0..3 {
            broker
                .enqueue("process_job", json!({}), EnqueueOptions::default())
                .await
                .unwrap();
        }
        let job = broker.reserve("worker@a").await.unwrap().unwrap();
        broker.start("worker@a", &job.job_id).await.unwrap();
        broker.reserve("worker@a").await.unwrap().unwrap();
        broker
    }

    #[tokio::test]
    async fn test_collect_snapshot() {
        let broker = seeded_broker(false, false).await;
        let collector = MetricsCollector::new(broker, Arc::new(JobMetrics::new().unwrap()));

        let snapshot = collector.collect_snapshot().await;
        assert_eq!(snapshot.queue_name, "jobs");
        assert_eq!(snapshot.queue_length, 1);
        assert_eq!(snapshot.active_by_worker.get("worker@a"), Some(&1));
        assert_eq!(snapshot.reserved_by_worker.get("worker@a"), Some(&1));
        assert_eq!(snapshot.scheduled_by_worker.get("worker@a"), Some(&0));
    }

    #[tokio::test]
    async fn test_failing_inspection_is_isolated() {
        let broker = seeded_broker(true, false).await;
        let collector = MetricsCollector::new(broker, Arc::new(JobMetrics::new().unwrap()));

        let snapshot = collector.collect_snapshot().await;
        assert!(snapshot.scheduled_by_worker.is_empty());
        assert_eq!(snapshot.queue_length, 1);
        assert_eq!(snapshot.active_by_worker.get("worker@a"), Some(&1));

        let output = collector.scrape().await;
        assert_eq!(sample(&output, "active_tasks{worker_name=\"worker@a\"}"), Some(1.0));
        assert_eq!(sample(&output, "reserved_tasks{worker_name=\"worker@a\"}"), Some(1.0));
        assert!(!output.contains("scheduled_tasks"));
    }

    #[tokio::test]
    async fn test_failing_queue_length_defaults_to_zero() {
        let broker = seeded_broker(false, true).await;
        let collector = MetricsCollector::new(broker, Arc::new(JobMetrics::new().unwrap()));

        let output = collector.scrape().await;
        assert_eq!(sample(&output, "queue_length{queue_name=\"jobs\"}"), Some(0.0));
        assert_eq!(sample(&output, "active_tasks{worker_name=\"worker@a\"}"), Some(1.0));
    }

    #[tokio::test]
    async fn test_scrape_includes_job_counters() {
        let broker = seeded_broker(false, false).await;
        let job_metrics = Arc::new(JobMetrics::new().unwrap());
        job_metrics.record(
            "process_job",
            jobrunner_core::JobOutcome::Success,
            std::time::Duration::from_secs(3),
        );
        let collector = MetricsCollector::new(broker, job_metrics);

        let output = collector.scrape().await;
        assert_eq!(sample(&output, "queue_length{queue_name=\"jobs\"}"), Some(1.0));
        assert_eq!(sample(&output, "task_total{task_name=\"process_job\",status=\"success\"}"), Some(1.0));
    }

    #[tokio::test]
    async fn test_departed_worker_is_not_reported() {
        let broker = seeded_broker(false, false).await;
        let collector =
            MetricsCollector::new(broker.clone(), Arc::new(JobMetrics::new().unwrap()));
        assert!(collector.scrape().await.contains("worker@a"));

        broker.unregister_worker("worker@a").await.unwrap();
        assert!(!collector.scrape().await.contains("worker@a"));
    }
}
