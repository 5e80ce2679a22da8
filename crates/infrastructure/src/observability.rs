use std::time::Duration;

use jobrunner_core::{JobOutcome, JobRunnerError, JobRunnerResult};
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusRecorder};
use tracing::info;

/// 任务耗时直方图的分桶（秒），覆盖秒级到半小时的任务
const DURATION_BUCKETS: &[f64] = &[
    0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 900.0, 1800.0,
];

/// 任务执行指标
///
/// 持有独立的Prometheus记录器而不是安装全局记录器，由Worker进程创建并注入到
/// Worker和指标采集器中。计数在进程生命周期内单调递增，重启后归零。
pub struct JobMetrics {
    recorder: PrometheusRecorder,
}

impl JobMetrics {
    pub fn new() -> JobRunnerResult<Self> {
        let recorder = PrometheusBuilder::new()
            .set_buckets(DURATION_BUCKETS)
            .map_err(|e| JobRunnerError::Configuration(format!("创建指标记录器失败: {e}")))?
            .build_recorder();
        Ok(Self { recorder })
    }

    /// 记录一次任务结束
    pub fn record(&self, task_name: &str, outcome: JobOutcome, duration: Duration) {
        let task_name = task_name.to_string();
        metrics::with_local_recorder(&self.recorder, || {
            histogram!("task_duration_seconds", "task_name" => task_name.clone())
                .record(duration.as_secs_f64());
            counter!(
                "task_total",
                "task_name" => task_name.clone(),
                "status" => outcome.label()
            )
            .increment(1);
        });

        info!(
            task_name = %task_name,
            status = outcome.label(),
            duration_seconds = duration.as_secs_f64(),
            "Task execution recorded"
        );
    }

    /// 以Prometheus文本格式导出
    pub fn render(&self) -> String {
        self.recorder.handle().render()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_value(rendered: &str, prefix: &str) -> Option<f64> {
        rendered
            .lines()
            .find(|line| line.starts_with(prefix))
            .and_then(|line| line.rsplit(' ').next())
            .and_then(|value| value.parse().ok())
    }

    #[test]
    fn test_record_success_and_failure() {
        let metrics = JobMetrics::new().unwrap();
        metrics.record("process_job", JobOutcome::Success, Duration::from_secs(2));
        metrics.record("process_job", JobOutcome::Success, Duration::from_secs(4));
        metrics.record("process_job", JobOutcome::Failure, Duration::from_millis(100));

        let rendered = metrics.render();
        assert_eq!(
            sample_value(
                &rendered,
                "task_total{task_name=\"process_job\",status=\"success\"}"
            ),
            Some(2.0)
        );
        assert_eq!(
            sample_value(
                &rendered,
                "task_total{task_name=\"process_job\",status=\"failure\"}"
            ),
            Some(1.0)
        );
        assert_eq!(
            sample_value(&rendered, "task_duration_seconds_count{task_name=\"process_job\"}"),
            Some(3.0)
        );
        assert!(rendered.contains("task_duration_seconds_bucket"));
    }

    #[test]
    fn test_instances_are_isolated() {
        let first = JobMetrics::new().unwrap();
        let second = JobMetrics::new().unwrap();
        first.record("process_job", JobOutcome::Success, Duration::from_secs(1));

        assert!(first.render().contains("task_total"));
        assert!(!second.render().contains("task_total"));
    }
}
