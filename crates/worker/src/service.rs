use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use jobrunner_core::{
    Broker, Job, JobCompletion, JobContext, JobOutcome, JobRunnerError, JobRunnerResult,
    ShutdownCoordinator, TaskHandler,
};
use jobrunner_infrastructure::JobMetrics;
use tokio::sync::{broadcast, mpsc, Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::executors::HandlerRegistry;

/// Worker服务构建器
pub struct WorkerServiceBuilder {
    node_name: String,
    broker: Arc<dyn Broker>,
    job_metrics: Arc<JobMetrics>,
    handlers: HandlerRegistry,
    concurrency: usize,
    heartbeat_interval_seconds: u64,
    poll_interval_ms: u64,
}

impl WorkerServiceBuilder {
    pub fn new(node_name: String, broker: Arc<dyn Broker>, job_metrics: Arc<JobMetrics>) -> Self {
        Self {
            node_name,
            broker,
            job_metrics,
            handlers: HandlerRegistry::new(),
            concurrency: 1,
            heartbeat_interval_seconds: 10,
            poll_interval_ms: 1000,
        }
    }

    /// 设置并发执行单元数
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// 设置心跳间隔
    pub fn heartbeat_interval_seconds(mut self, heartbeat_interval_seconds: u64) -> Self {
        self.heartbeat_interval_seconds = heartbeat_interval_seconds;
        self
    }

    /// 设置队列为空时的轮询间隔
    pub fn poll_interval_ms(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    /// 注册任务处理器
    pub fn register_handler(mut self, handler: Arc<dyn TaskHandler>) -> Self {
        self.handlers.register(handler);
        self
    }

    pub fn build(self) -> WorkerService {
        let (due_tx, due_rx) = mpsc::unbounded_channel();
        WorkerService {
            node_name: Arc::from(self.node_name),
            broker: self.broker,
            job_metrics: self.job_metrics,
            handlers: Arc::new(self.handlers),
            concurrency: self.concurrency,
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_seconds),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            stop_signal: ShutdownCoordinator::new(),
            is_running: Arc::new(RwLock::new(false)),
            tasks: Arc::new(Mutex::new(Vec::new())),
            due_tx,
            due_rx: Arc::new(Mutex::new(due_rx)),
            due_notify: Arc::new(Notify::new()),
        }
    }
}

/// Worker池
///
/// 同一节点下的多个执行单元共享节点名，各自独立地循环执行
/// 预留 → 执行 → 记录。执行单元之间除消息代理外没有共享的可变状态。
///
/// 未到执行时间的任务交给独立的定时任务等待，不占用执行单元；到期后
/// 经由通道交回执行单元，执行单元优先处理到期任务。
#[derive(Clone)]
pub struct WorkerService {
    node_name: Arc<str>,
    broker: Arc<dyn Broker>,
    job_metrics: Arc<JobMetrics>,
    handlers: Arc<HandlerRegistry>,
    concurrency: usize,
    heartbeat_interval: Duration,
    poll_interval: Duration,
    stop_signal: ShutdownCoordinator,
    is_running: Arc<RwLock<bool>>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
    due_tx: mpsc::UnboundedSender<Job>,
    due_rx: Arc<Mutex<mpsc::UnboundedReceiver<Job>>>,
    due_notify: Arc<Notify>,
}

impl WorkerService {
    pub fn builder(
        node_name: String,
        broker: Arc<dyn Broker>,
        job_metrics: Arc<JobMetrics>,
    ) -> WorkerServiceBuilder {
        WorkerServiceBuilder::new(node_name, broker, job_metrics)
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    pub fn supported_jobs(&self) -> Vec<String> {
        self.handlers.names()
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    /// 启动心跳和全部执行单元
    pub async fn start(&self) -> JobRunnerResult<()> {
        let mut is_running = self.is_running.write().await;
        if *is_running {
            return Err(JobRunnerError::Internal("Worker服务已在运行".to_string()));
        }
        if !self.stop_signal.is_ready() {
            return Err(JobRunnerError::ShuttingDown);
        }

        info!(
            "启动Worker服务: {} (concurrency={}, jobs={:?})",
            self.node_name,
            self.concurrency,
            self.supported_jobs()
        );

        if let Err(e) = self.broker.heartbeat(&self.node_name).await {
            warn!("Worker注册失败，但继续启动服务: {}", e);
        }

        let mut tasks = self.tasks.lock().await;

        let heartbeat_service = self.clone();
        let heartbeat_rx = self.stop_signal.subscribe();
        tasks.push(tokio::spawn(async move {
            heartbeat_service.run_heartbeat(heartbeat_rx).await;
        }));

        for unit in 0..self.concurrency {
            let unit_service = self.clone();
            let stop_rx = self.stop_signal.subscribe();
            tasks.push(tokio::spawn(async move {
                unit_service.run_unit(unit, stop_rx).await;
            }));
        }

        *is_running = true;
        info!("Worker服务启动成功: {}", self.node_name);
        Ok(())
    }

    /// 温和停止：不再预留新任务，等待执行中和已到期的任务进入终态后注销节点
    ///
    /// 尚未到期的计划任务不再等待，留在节点的计划集合中。
    pub async fn stop(&self) -> JobRunnerResult<()> {
        let mut is_running = self.is_running.write().await;
        if !*is_running {
            return Ok(());
        }

        info!("停止Worker服务: {}", self.node_name);
        self.stop_signal.shutdown();

        let handles: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                error!("Worker执行单元异常退出: {}", e);
            }
        }

        // 执行单元退出前已经到期但未被取走的任务
        while let Some(job) = self.take_due().await {
            self.report(self.run_reserved(job).await.map(Some));
        }

        if let Err(e) = self.broker.unregister_worker(&self.node_name).await {
            warn!("Worker注销失败: {}", e);
        }

        *is_running = false;
        info!("Worker服务已停止: {}", self.node_name);
        Ok(())
    }

    /// 执行一个已到期的计划任务，没有则预留并执行新任务
    ///
    /// 队列为空时返回 `Ok(None)`。预留到未到期的任务时登记为计划任务并交给
    /// 定时任务等待，返回的记录仍处于预留状态。任务体失败时结果和指标已经
    /// 记录，随后以 `ExecutionFault` 返回给调用方。
    pub async fn process_one(&self) -> JobRunnerResult<Option<Job>> {
        if let Some(job) = self.take_due().await {
            return self.run_reserved(job).await.map(Some);
        }

        let Some(job) = self.broker.reserve(&self.node_name).await? else {
            return Ok(None);
        };
        debug!(job_id = %job.job_id, job_name = %job.name, worker_id = %self.node_name, "任务已预留");

        if let Some(eta) = job.eta.filter(|_| !job.is_due(Utc::now())) {
            self.broker.hold_scheduled(&self.node_name, &job.job_id).await?;
            self.schedule(job.clone(), eta);
            return Ok(Some(job));
        }

        self.run_reserved(job).await.map(Some)
    }

    async fn take_due(&self) -> Option<Job> {
        self.due_rx.lock().await.try_recv().ok()
    }

    /// 等到 `eta` 后把任务交回执行单元，节点停止时放弃等待
    fn schedule(&self, job: Job, eta: DateTime<Utc>) {
        let wait = (eta - Utc::now()).to_std().unwrap_or_default();
        info!(job_id = %job.job_id, "任务计划在 {} 执行，等待 {:?}", eta, wait);

        let mut stop_rx = self.stop_signal.subscribe();
        let due_tx = self.due_tx.clone();
        let due_notify = Arc::clone(&self.due_notify);
        let node_name = Arc::clone(&self.node_name);
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    if due_tx.send(job).is_ok() {
                        due_notify.notify_one();
                    }
                }
                _ = stop_rx.recv() => {
                    warn!(
                        job_id = %job.job_id,
                        worker_id = %node_name,
                        "节点停止时计划任务尚未到期，保留在计划集合中"
                    );
                }
            }
        });
    }

    /// 开始执行已预留的任务并写入结果
    async fn run_reserved(&self, job: Job) -> JobRunnerResult<Job> {
        let job_id = job.job_id.clone();
        let job = self.broker.start(&self.node_name, &job_id).await?;
        let started = Instant::now();
        let execution = self.execute(&job).await;
        let elapsed = started.elapsed();

        let (completion, outcome) = match &execution {
            Ok(value) => (JobCompletion::Success(value.clone()), JobOutcome::Success),
            Err(message) => (JobCompletion::Failure(message.clone()), JobOutcome::Failure),
        };
        let stored = self
            .broker
            .store_result(&self.node_name, &job_id, completion)
            .await;
        self.job_metrics.record(&job.name, outcome, elapsed);

        match execution {
            Ok(_) => {
                let finished = stored?;
                info!(
                    job_id = %job_id,
                    job_name = %job.name,
                    duration_ms = elapsed.as_millis() as u64,
                    "任务执行成功"
                );
                Ok(finished)
            }
            Err(message) => {
                if let Err(e) = stored {
                    error!(job_id = %job_id, "写入失败结果失败: {}", e);
                }
                Err(JobRunnerError::ExecutionFault { job_id, message })
            }
        }
    }

    /// 在独立任务中运行处理器，panic也转换为失败
    async fn execute(&self, job: &Job) -> Result<serde_json::Value, String> {
        let Some(handler) = self.handlers.get(&job.name) else {
            return Err(format!("未注册的任务: {}", job.name));
        };

        let context = JobContext::from_job(job, &self.node_name);
        match tokio::spawn(async move { handler.execute(&context).await }).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(format!("{e:#}")),
            Err(e) if e.is_panic() => Err("任务执行时发生panic".to_string()),
            Err(e) => Err(format!("任务执行被中断: {e}")),
        }
    }

    /// 记录一次处理的结果，返回是否应立即继续处理
    fn report(&self, result: JobRunnerResult<Option<Job>>) -> bool {
        match result {
            Ok(Some(_)) => true,
            Ok(None) => false,
            Err(JobRunnerError::ExecutionFault { job_id, message }) => {
                error!(job_id = %job_id, worker_id = %self.node_name, "任务执行失败: {}", message);
                true
            }
            Err(e) if e.is_broker_error() => {
                warn!("消息代理不可用，稍后重试: {}", e);
                false
            }
            Err(e) => {
                error!("任务处理异常: {}", e);
                false
            }
        }
    }

    async fn run_unit(&self, unit: usize, mut stop_rx: broadcast::Receiver<()>) {
        debug!("执行单元启动: {}#{}", self.node_name, unit);

        while self.stop_signal.is_ready() {
            if self.report(self.process_one().await) {
                continue;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = self.due_notify.notified() => {}
                _ = stop_rx.recv() => break,
            }
        }

        debug!("执行单元退出: {}#{}", self.node_name, unit);
    }

    async fn run_heartbeat(&self, mut stop_rx: broadcast::Receiver<()>) {
        let mut heartbeat_interval = interval(self.heartbeat_interval);

        loop {
            tokio::select! {
                _ = heartbeat_interval.tick() => {
                    if let Err(e) = self.broker.heartbeat(&self.node_name).await {
                        error!("发送心跳失败: {}", e);
                    }
                }
                _ = stop_rx.recv() => {
                    info!("心跳任务收到停止信号");
                    break;
                }
            }
        }
    }
}
