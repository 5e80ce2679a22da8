use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use jobrunner_api::{create_app, create_metrics_app};
use jobrunner_config::{AppConfig, BrokerBackend, BrokerConfig};
use jobrunner_core::{Broker, ShutdownCoordinator};
use jobrunner_infrastructure::{BrokerFactory, JobMetrics, MetricsCollector};
use jobrunner_worker::{ProcessJobHandler, WorkerService};
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::shutdown::{DrainController, DrainSettings, ServerHandle};

/// 应用运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    /// 仅运行API服务器
    Api,
    /// 仅运行Worker池
    Worker,
    /// 在同一进程中运行API和Worker池
    All,
}

impl AppMode {
    fn runs_api(&self, config: &AppConfig) -> bool {
        match self {
            AppMode::Api => true,
            AppMode::Worker => false,
            AppMode::All => config.api.enabled,
        }
    }

    fn runs_worker(&self, config: &AppConfig) -> bool {
        match self {
            AppMode::Api => false,
            AppMode::Worker => true,
            AppMode::All => config.worker.enabled,
        }
    }
}

/// 主应用程序
///
/// 同一进程内的API和Worker共享一个 `JobMetrics`，因此 `all` 模式下
/// `/metrics` 能看到本进程Worker记录的任务计数。
pub struct Application {
    config: AppConfig,
    mode: AppMode,
    coordinator: ShutdownCoordinator,
    job_metrics: Arc<JobMetrics>,
}

impl Application {
    pub fn new(config: AppConfig, mode: AppMode) -> Result<Self> {
        info!("初始化应用程序，模式: {:?}", mode);
        let job_metrics = Arc::new(JobMetrics::new().context("创建任务指标失败")?);

        Ok(Self {
            config,
            mode,
            coordinator: ShutdownCoordinator::new(),
            job_metrics,
        })
    }

    pub fn coordinator(&self) -> ShutdownCoordinator {
        self.coordinator.clone()
    }

    /// 建立连接并启动各组件
    pub async fn start(&self) -> Result<RunningApplication> {
        info!("启动应用程序，模式: {:?}", self.mode);

        let brokers = BrokerProvider::new(&self.config.broker).await?;
        let drain = DrainController::new(
            self.coordinator.clone(),
            DrainSettings::from(&self.config.shutdown),
        );
        let mut running = RunningApplication {
            drain,
            servers: Vec::new(),
            worker: None,
            api_addr: None,
            metrics_addr: None,
        };

        if self.mode.runs_worker(&self.config) {
            let worker = self.start_worker(brokers.client("worker").await?).await?;
            running.worker = Some(worker);
        }

        if self.mode.runs_api(&self.config) {
            let collector = Arc::new(MetricsCollector::new(
                brokers.client("metrics").await?,
                Arc::clone(&self.job_metrics),
            ));
            let app = create_app(
                brokers.client("producer").await?,
                self.coordinator.clone(),
                collector,
                &self.config.api,
            );
            let addr = running
                .serve("API服务器", &self.config.api.bind_address, app)
                .await?;
            running.api_addr = Some(addr);
        } else if let Some(bind_address) = &self.config.worker.metrics_bind_address {
            let collector = Arc::new(MetricsCollector::new(
                brokers.client("metrics").await?,
                Arc::clone(&self.job_metrics),
            ));
            let addr = running
                .serve("Worker指标服务", bind_address, create_metrics_app(collector))
                .await?;
            running.metrics_addr = Some(addr);
        }

        Ok(running)
    }

    async fn start_worker(&self, broker: Arc<dyn Broker>) -> Result<WorkerService> {
        let worker_config = &self.config.worker;
        let node_name = worker_config.node_name();
        info!("启动Worker服务: {}", node_name);

        let worker = WorkerService::builder(node_name, broker, Arc::clone(&self.job_metrics))
            .concurrency(worker_config.concurrency)
            .heartbeat_interval_seconds(worker_config.heartbeat_interval_seconds)
            .poll_interval_ms(worker_config.poll_interval_ms)
            .register_handler(Arc::new(ProcessJobHandler::new(
                worker_config.process_job_min_seconds,
                worker_config.process_job_max_seconds,
            )))
            .build();

        worker.start().await.context("启动Worker服务失败")?;
        Ok(worker)
    }
}

/// 已启动的应用
pub struct RunningApplication {
    drain: DrainController,
    servers: Vec<ServerHandle>,
    worker: Option<WorkerService>,
    api_addr: Option<SocketAddr>,
    metrics_addr: Option<SocketAddr>,
}

impl RunningApplication {
    pub fn api_addr(&self) -> Option<SocketAddr> {
        self.api_addr
    }

    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        self.metrics_addr
    }

    pub fn worker(&self) -> Option<&WorkerService> {
        self.worker.as_ref()
    }

    async fn serve(&mut self, name: &str, bind_address: &str, app: Router) -> Result<SocketAddr> {
        let listener = TcpListener::bind(bind_address)
            .await
            .with_context(|| format!("绑定地址失败: {bind_address}"))?;
        let addr = listener.local_addr().context("获取监听地址失败")?;
        info!("{} 启动在 http://{}", name, addr);

        let stop = self.drain.http_stop_signal();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(stop)
                .await
        });
        self.servers.push((name.to_string(), handle));
        Ok(addr)
    }

    /// 优雅关闭
    ///
    /// HTTP排空与Worker温和停止同时进行。排空受宽限期约束，Worker则会等待
    /// 已预留的任务进入终态。
    pub async fn shutdown(self) -> Result<()> {
        let RunningApplication {
            drain,
            servers,
            worker,
            ..
        } = self;

        let stop_worker = async {
            match &worker {
                Some(worker) => worker.stop().await,
                None => Ok(()),
            }
        };

        let (drained, worker_result) = tokio::join!(drain.drain(servers), stop_worker);
        if drained {
            info!("HTTP服务已完成排空");
        }
        if let Err(e) = &worker_result {
            error!("停止Worker服务失败: {}", e);
        }

        worker_result.context("停止Worker服务失败")
    }
}

/// 按组件分配消息代理客户端
///
/// Redis后端为每个组件建立独立连接；内存后端只能在进程内共享同一个实例。
struct BrokerProvider {
    config: BrokerConfig,
    shared: Option<Arc<dyn Broker>>,
}

impl BrokerProvider {
    async fn new(config: &BrokerConfig) -> Result<Self> {
        let shared = match config.backend {
            BrokerBackend::Memory => Some(
                BrokerFactory::create(config)
                    .await
                    .context("创建内存消息代理失败")?,
            ),
            BrokerBackend::Redis => None,
        };

        Ok(Self {
            config: config.clone(),
            shared,
        })
    }

    async fn client(&self, component: &str) -> Result<Arc<dyn Broker>> {
        if let Some(broker) = &self.shared {
            return Ok(Arc::clone(broker));
        }

        info!("为 {} 建立消息代理连接", component);
        BrokerFactory::create(&self.config)
            .await
            .with_context(|| format!("{component} 连接消息代理失败"))
    }
}
