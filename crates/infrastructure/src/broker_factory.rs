use std::sync::Arc;
use std::time::Duration;

use jobrunner_config::{BrokerBackend, BrokerConfig};
use jobrunner_core::{Broker, JobRunnerResult};
use tracing::{debug, info};

use crate::{InMemoryBroker, RedisBroker};

pub struct BrokerFactory;

impl BrokerFactory {
    /// 按配置创建消息代理客户端
    ///
    /// Redis后端每次调用都会建立新的连接，生产者、Worker和采集器各持一份；
    /// 内存后端没有跨组件的共享能力，调用方需要自行共享返回的实例。
    pub async fn create(config: &BrokerConfig) -> JobRunnerResult<Arc<dyn Broker>> {
        debug!("Creating broker with backend: {:?}", config.backend);

        match config.backend {
            BrokerBackend::Redis => {
                info!("初始化Redis消息代理");
                let broker = RedisBroker::connect(config).await?;
                Ok(Arc::new(broker))
            }
            BrokerBackend::Memory => {
                info!("初始化内存消息代理");
                Ok(Arc::new(InMemoryBroker::with_ttl(
                    config.queue_name.clone(),
                    Duration::from_secs(config.worker_ttl_seconds),
                    Duration::from_secs(config.result_expires_seconds),
                )))
            }
        }
    }
}
