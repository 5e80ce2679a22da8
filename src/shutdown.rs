use std::future::Future;
use std::time::Duration;

use jobrunner_config::ShutdownConfig;
use jobrunner_core::ShutdownCoordinator;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

/// HTTP服务任务，名称只用于日志
pub type ServerHandle = (String, JoinHandle<std::io::Result<()>>);

/// 排空时序
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainSettings {
    /// 进入未就绪状态后继续接收请求的时间，让负载均衡有机会摘除流量
    pub drain_delay: Duration,
    /// 停止接收连接后等待进行中请求完成的上限
    pub grace_period: Duration,
}

impl From<&ShutdownConfig> for DrainSettings {
    fn from(config: &ShutdownConfig) -> Self {
        Self {
            drain_delay: Duration::from_secs(config.drain_delay_seconds),
            grace_period: Duration::from_secs(config.grace_period_seconds),
        }
    }
}

/// HTTP前端的排空控制器
///
/// 关闭顺序：
/// 1. 关闭协调器切换为未就绪，健康检查和触发接口开始返回503
/// 2. 在 `drain_delay` 内继续服务请求
/// 3. 通知所有HTTP服务停止接收新连接
/// 4. 最多等待 `grace_period`，超时后强制终止服务任务
///
/// Worker中的任务不在这里等待。
pub struct DrainController {
    coordinator: ShutdownCoordinator,
    http_stop: watch::Sender<bool>,
    settings: DrainSettings,
}

impl DrainController {
    pub fn new(coordinator: ShutdownCoordinator, settings: DrainSettings) -> Self {
        let (http_stop, _) = watch::channel(false);
        Self {
            coordinator,
            http_stop,
            settings,
        }
    }

    pub fn coordinator(&self) -> &ShutdownCoordinator {
        &self.coordinator
    }

    /// 交给 `axum::serve(..).with_graceful_shutdown` 的停止信号
    pub fn http_stop_signal(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.http_stop.subscribe();
        async move {
            // 发送端被丢弃时同样视为停止
            let _ = rx.wait_for(|stopped| *stopped).await;
        }
    }

    /// 执行排空，返回服务是否都在宽限期内退出
    pub async fn drain(&self, servers: Vec<ServerHandle>) -> bool {
        if !self.coordinator.shutdown() {
            debug!("关闭协调器已处于关闭状态");
        }

        if !self.settings.drain_delay.is_zero() {
            info!(
                "进入排空窗口 {:?}，期间健康检查返回不健康",
                self.settings.drain_delay
            );
            sleep(self.settings.drain_delay).await;
        }

        info!("停止接收新的HTTP连接");
        self.http_stop.send_replace(true);

        let abort_handles: Vec<_> = servers
            .iter()
            .map(|(_, handle)| handle.abort_handle())
            .collect();

        let wait_all = async move {
            for (name, handle) in servers {
                match handle.await {
                    Ok(Ok(())) => info!("{} 已停止", name),
                    Ok(Err(e)) => error!("{} 运行失败: {}", name, e),
                    Err(e) => error!("{} 任务异常退出: {}", name, e),
                }
            }
        };

        match timeout(self.settings.grace_period, wait_all).await {
            Ok(()) => true,
            Err(_) => {
                warn!(
                    "HTTP服务未能在 {:?} 内完成排空，强制关闭",
                    self.settings.grace_period
                );
                for handle in abort_handles {
                    handle.abort();
                }
                false
            }
        }
    }
}

/// 等待关闭信号
pub async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("安装Ctrl+C信号处理器失败: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("安装SIGTERM信号处理器失败: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("收到Ctrl+C信号");
        },
        _ = terminate => {
            info!("收到SIGTERM信号");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    fn settings(drain_ms: u64, grace_ms: u64) -> DrainSettings {
        DrainSettings {
            drain_delay: Duration::from_millis(drain_ms),
            grace_period: Duration::from_millis(grace_ms),
        }
    }

    /// 模拟一个在停止信号后还需要一段时间才能退出的服务
    fn fake_server(controller: &DrainController, linger: Duration) -> ServerHandle {
        let stop = controller.http_stop_signal();
        let handle = tokio::spawn(async move {
            stop.await;
            sleep(linger).await;
            Ok(())
        });
        ("test-server".to_string(), handle)
    }

    #[test]
    fn test_settings_from_config() {
        let config = ShutdownConfig {
            drain_delay_seconds: 2,
            grace_period_seconds: 9,
        };
        assert_eq!(DrainSettings::from(&config), settings(2000, 9000));
    }

    #[tokio::test]
    async fn test_drain_marks_not_ready_before_stopping_servers() {
        let coordinator = ShutdownCoordinator::new();
        let controller = DrainController::new(coordinator.clone(), settings(100, 1000));

        let stopped = Arc::new(AtomicBool::new(false));
        let stop = controller.http_stop_signal();
        let flag = stopped.clone();
        let handle = tokio::spawn(async move {
            stop.await;
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });

        let drain = tokio::spawn(async move {
            controller.drain(vec![("api".to_string(), handle)]).await
        });

        // 排空窗口内：已未就绪，但服务仍在运行
        sleep(Duration::from_millis(30)).await;
        assert!(!coordinator.is_ready());
        assert!(!stopped.load(Ordering::SeqCst));

        assert!(drain.await.unwrap());
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_drain_within_grace_period() {
        let controller = DrainController::new(ShutdownCoordinator::new(), settings(0, 500));
        let server = fake_server(&controller, Duration::from_millis(20));

        assert!(controller.drain(vec![server]).await);
        assert!(!controller.coordinator().is_ready());
    }

    #[tokio::test]
    async fn test_grace_period_bounds_drain() {
        let controller = DrainController::new(ShutdownCoordinator::new(), settings(0, 50));
        let server = fake_server(&controller, Duration::from_secs(30));

        let started = Instant::now();
        assert!(!controller.drain(vec![server]).await);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_stop_signal_after_drain_resolves_immediately() {
        let controller = DrainController::new(ShutdownCoordinator::new(), settings(0, 100));
        assert!(controller.drain(Vec::new()).await);

        timeout(Duration::from_millis(100), controller.http_stop_signal())
            .await
            .unwrap();
    }
}
