pub mod broker_factory;
pub mod in_memory_broker;
pub mod metrics_collector;
pub mod observability;
pub mod redis_broker;

pub use broker_factory::BrokerFactory;
pub use in_memory_broker::InMemoryBroker;
pub use metrics_collector::{MetricsCollector, MetricsSnapshot};
pub use observability::JobMetrics;
pub use redis_broker::RedisBroker;
