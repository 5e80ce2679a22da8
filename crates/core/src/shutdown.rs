use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::{JobRunnerError, JobRunnerResult};

/// 关闭协调器
///
/// 持有进程级的 `ready` 标志（初始为 true）和一个关闭广播。`ready` 只会
/// 从 true 变为 false 一次，重复触发不会产生额外的副作用。协调器只负责前端
/// 的就绪状态，不等待Worker中正在执行的任务。
#[derive(Clone)]
pub struct ShutdownCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    ready: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);

        Self {
            inner: Arc::new(Inner {
                ready: AtomicBool::new(true),
                shutdown_tx,
            }),
        }
    }

    /// 服务是否仍在接受新请求
    pub fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::Acquire)
    }

    /// 未就绪时返回 `ShuttingDown`
    pub fn ensure_ready(&self) -> JobRunnerResult<()> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(JobRunnerError::ShuttingDown)
        }
    }

    /// 订阅关闭信号
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        let rx = self.inner.shutdown_tx.subscribe();
        if self.is_ready() {
            rx
        } else {
            // 已经关闭，返回一个立即触发的接收器
            let (tx, rx) = broadcast::channel(1);
            let _ = tx.send(());
            rx
        }
    }

    /// 触发关闭，返回本次调用是否真正完成了状态切换
    pub fn shutdown(&self) -> bool {
        if self
            .inner
            .ready
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("关闭协调器已经触发过关闭");
            return false;
        }

        let subscriber_count = self.inner.shutdown_tx.receiver_count();
        debug!("发送关闭信号给 {} 个订阅者", subscriber_count);
        // 没有接收者时发送会失败，忽略即可
        let _ = self.inner.shutdown_tx.send(());

        info!("服务进入关闭状态，停止接受新任务");
        true
    }

    /// 等待关闭信号
    pub async fn wait_for_shutdown(&self) {
        let mut rx = self.subscribe();
        if !self.is_ready() {
            return;
        }
        let _ = rx.recv().await;
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
