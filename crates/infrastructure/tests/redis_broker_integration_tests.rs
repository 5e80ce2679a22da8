use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use jobrunner_config::BrokerConfig;
use jobrunner_core::{Broker, EnqueueOptions, JobCompletion, JobRunnerError, JobStatus};
use jobrunner_infrastructure::RedisBroker;
use serde_json::json;
use testcontainers::ImageExt;
use testcontainers::{runners::AsyncRunner, ContainerAsync};
use testcontainers_modules::redis::Redis;

struct RedisTestSetup {
    #[allow(dead_code)]
    container: ContainerAsync<Redis>,
    config: BrokerConfig,
}

impl RedisTestSetup {
    async fn new(queue_name: &str) -> Result<Self> {
        let container = Redis::default().with_tag("7-alpine").start().await?;
        let port = container.get_host_port_ipv4(6379).await?;
        let config = BrokerConfig {
            url: format!("redis://localhost:{port}/0"),
            queue_name: queue_name.to_string(),
            ..BrokerConfig::default()
        };
        Ok(Self { container, config })
    }

    async fn broker(&self) -> Result<RedisBroker> {
        Ok(RedisBroker::connect(&self.config).await?)
    }
}

#[tokio::test]
#[ignore] // Ignore by default since it requires Docker
async fn test_redis_broker_lifecycle() -> Result<()> {
    let setup = RedisTestSetup::new("lifecycle").await?;
    let producer = setup.broker().await?;
    let worker = setup.broker().await?;

    let job_id = producer
        .enqueue("process_job", json!({"n": 1}), EnqueueOptions::default())
        .await?;
    assert_eq!(producer.queue_length().await?, 1);

    let job = worker.reserve("worker@a").await?.expect("job reserved");
    assert_eq!(job.job_id, job_id);
    assert_eq!(job.status, JobStatus::Reserved);
    assert_eq!(producer.queue_length().await?, 0);
    assert_eq!(producer.inspect("worker@a").await?.reserved, 1);

    worker.start("worker@a", &job_id).await?;
    assert_eq!(producer.inspect("worker@a").await?.active, 1);

    let job = worker
        .store_result("worker@a", &job_id, JobCompletion::Success(json!({"ok": true})))
        .await?;
    assert_eq!(job.status, JobStatus::Completed);

    let stored = producer.get_job(&job_id).await?.expect("job stored");
    assert_eq!(stored.status, JobStatus::Completed);
    assert_eq!(stored.result, Some(json!({"ok": true})));
    assert_eq!(producer.inspect("worker@a").await?.active, 0);

    Ok(())
}

#[tokio::test]
#[ignore]
async fn test_redis_broker_concurrent_enqueue_and_exclusive_reserve() -> Result<()> {
    let setup = RedisTestSetup::new("concurrent").await?;
    let producer = Arc::new(setup.broker().await?);

    let mut handles = Vec::new();
    for i in 0..25 {
        let producer = producer.clone();
        handles.push(tokio::spawn(async move {
            producer
                .enqueue("process_job", json!({"i": i}), EnqueueOptions::default())
                .await
        }));
    }
    for handle in handles {
        handle.await??;
    }
    assert_eq!(producer.queue_length().await?, 25);

    let mut handles = Vec::new();
    for w in 0..4 {
        let broker = Arc::new(setup.broker().await?);
        handles.push(tokio::spawn(async move {
            let worker_id = format!("worker@{w}");
            let mut ids = Vec::new();
            while let Some(job) = broker.reserve(&worker_id).await? {
                ids.push(job.job_id);
            }
            Ok::<_, JobRunnerError>(ids)
        }));
    }

    let mut seen = HashSet::new();
    let mut total = 0;
    for handle in handles {
        for id in handle.await?? {
            total += 1;
            seen.insert(id);
        }
    }
    assert_eq!(total, 25);
    assert_eq!(seen.len(), 25);

    Ok(())
}

#[tokio::test]
#[ignore]
async fn test_redis_broker_reservation_conflict() -> Result<()> {
    let setup = RedisTestSetup::new("conflict").await?;
    let broker = setup.broker().await?;

    let job_id = broker
        .enqueue("process_job", json!({}), EnqueueOptions::default())
        .await?;
    broker.reserve("worker@a").await?;

    let err = broker.start("worker@b", &job_id).await.unwrap_err();
    assert!(matches!(err, JobRunnerError::ReservationConflict { .. }));

    broker.unregister_worker("worker@a").await?;
    assert!(broker.inspect_reserved().await?.is_empty());

    Ok(())
}

#[tokio::test]
#[ignore]
async fn test_redis_broker_unreachable() {
    let config = BrokerConfig {
        url: "redis://127.0.0.1:1/0".to_string(),
        connect_timeout_seconds: 2,
        ..BrokerConfig::default()
    };
    let err = RedisBroker::connect(&config).await.err().expect("connect must fail");
    assert!(err.is_broker_error());
}

#[tokio::test]
#[ignore]
async fn test_redis_reserved_lists_match_job_records() -> Result<()> {
    let setup = RedisTestSetup::new("consistency").await?;
    let producer = setup.broker().await?;
    for i in 0..12 {
        producer
            .enqueue("process_job", json!({"i": i}), EnqueueOptions::default())
            .await?;
    }

    let mut handles = Vec::new();
    for w in 0..3 {
        let broker = setup.broker().await?;
        handles.push(tokio::spawn(async move {
            let worker_id = format!("worker@{w}");
            while broker.reserve(&worker_id).await?.is_some() {}
            Ok::<_, JobRunnerError>(())
        }));
    }
    for handle in handles {
        handle.await??;
    }

    let client = redis::Client::open(setup.config.url.as_str())?;
    let mut conn = client.get_multiplexed_async_connection().await?;
    let mut total = 0;
    for w in 0..3 {
        let worker_id = format!("worker@{w}");
        let key = format!("{}:worker:{worker_id}:reserved", setup.config.key_prefix);
        let ids: Vec<String> = redis::cmd("LRANGE")
            .arg(&key)
            .arg(0)
            .arg(-1)
            .query_async(&mut conn)
            .await?;
        for id in ids {
            let job = producer.get_job(&id).await?.expect("job stored");
            assert_eq!(job.status, JobStatus::Reserved);
            assert_eq!(job.worker_id.as_deref(), Some(worker_id.as_str()));
            total += 1;
        }
    }
    assert_eq!(total, 12);
    assert_eq!(producer.queue_length().await?, 0);

    Ok(())
}

#[tokio::test]
#[ignore]
async fn test_redis_concurrent_start_applies_once() -> Result<()> {
    let setup = RedisTestSetup::new("start-once").await?;
    let broker = Arc::new(setup.broker().await?);
    let job_id = broker
        .enqueue("process_job", json!({}), EnqueueOptions::default())
        .await?;
    broker.reserve("worker@a").await?.expect("job reserved");

    let mut handles = Vec::new();
    for _ in 0..8 {
        let broker = broker.clone();
        let job_id = job_id.clone();
        handles.push(tokio::spawn(async move {
            broker.start("worker@a", &job_id).await
        }));
    }

    let mut started = 0;
    for handle in handles {
        match handle.await? {
            Ok(_) => started += 1,
            Err(JobRunnerError::ReservationConflict { .. })
            | Err(JobRunnerError::InvalidTransition { .. }) => {}
            Err(e) => return Err(e.into()),
        }
    }
    assert_eq!(started, 1);

    let inspection = broker.inspect("worker@a").await?;
    assert_eq!(inspection.active, 1);
    assert_eq!(inspection.reserved, 0);
    let job = broker.get_job(&job_id).await?.expect("job stored");
    assert_eq!(job.status, JobStatus::Active);

    Ok(())
}
