use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jobrunner_core::{
    Broker, EnqueueOptions, Job, JobCompletion, JobRunnerError, JobRunnerResult, JobStatus,
};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// 内存消息代理
///
/// 所有组件必须共享同一个实例，适用于单进程部署（`all` 模式）和测试。
/// 过期的终态任务记录和心跳超时的Worker在入队、预留和检查时清理。
#[derive(Debug)]
pub struct InMemoryBroker {
    queue_name: String,
    worker_ttl: Duration,
    result_ttl: Duration,
    state: Mutex<BrokerState>,
}

#[derive(Debug, Default)]
struct BrokerState {
    pending: VecDeque<String>,
    jobs: HashMap<String, StoredJob>,
    /// 终态记录按写入顺序排列，结果保留时长固定，因此也是过期顺序
    expiries: VecDeque<(Instant, String)>,
    workers: HashMap<String, WorkerEntry>,
}

#[derive(Debug)]
struct StoredJob {
    job: Job,
    expires_at: Option<Instant>,
}

#[derive(Debug)]
struct WorkerEntry {
    last_seen: Instant,
    reserved: HashSet<String>,
    scheduled: HashSet<String>,
    active: HashSet<String>,
}

impl WorkerEntry {
    fn new() -> Self {
        Self {
            last_seen: Instant::now(),
            reserved: HashSet::new(),
            scheduled: HashSet::new(),
            active: HashSet::new(),
        }
    }
}

impl BrokerState {
    fn touch(&mut self, worker_id: &str) -> &mut WorkerEntry {
        let entry = self
            .workers
            .entry(worker_id.to_string())
            .or_insert_with(WorkerEntry::new);
        entry.last_seen = Instant::now();
        entry
    }

    fn job_mut(&mut self, job_id: &str) -> JobRunnerResult<&mut Job> {
        let now = Instant::now();
        let expired = matches!(
            self.jobs.get(job_id),
            Some(StoredJob { expires_at: Some(at), .. }) if *at <= now
        );
        if expired {
            self.jobs.remove(job_id);
        }
        self.jobs
            .get_mut(job_id)
            .map(|stored| &mut stored.job)
            .ok_or_else(|| JobRunnerError::JobNotFound {
                id: job_id.to_string(),
            })
    }

    /// 清理过期的终态记录和心跳超时的Worker
    fn purge(&mut self, worker_ttl: Duration) {
        let now = Instant::now();
        while let Some((expires_at, _)) = self.expiries.front() {
            if *expires_at > now {
                break;
            }
            if let Some((_, job_id)) = self.expiries.pop_front() {
                self.jobs.remove(&job_id);
            }
        }

        self.workers
            .retain(|_, entry| now.duration_since(entry.last_seen) <= worker_ttl);
    }

    fn count_live<F>(&self, ttl: Duration, count: F) -> HashMap<String, usize>
    where
        F: Fn(&WorkerEntry) -> usize,
    {
        let now = Instant::now();
        self.workers
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.last_seen) <= ttl)
            .map(|(worker_id, entry)| (worker_id.clone(), count(entry)))
            .collect()
    }
}

impl InMemoryBroker {
    pub fn new(queue_name: impl Into<String>) -> Self {
        Self::with_ttl(queue_name, Duration::from_secs(30), Duration::from_secs(86400))
    }

    pub fn with_ttl(queue_name: impl Into<String>, worker_ttl: Duration, result_ttl: Duration) -> Self {
        let queue_name = queue_name.into();
        info!("创建内存消息代理: queue={}", queue_name);
        Self {
            queue_name,
            worker_ttl,
            result_ttl,
            state: Mutex::new(BrokerState::default()),
        }
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn enqueue(
        &self,
        name: &str,
        args: serde_json::Value,
        options: EnqueueOptions,
    ) -> JobRunnerResult<String> {
        let mut job = Job::new(name, args);
        if let Some(eta) = options.eta {
            job = job.with_eta(eta);
        }
        job.mark_queued()?;

        let job_id = job.job_id.clone();
        let mut state = self.state.lock().await;
        state.purge(self.worker_ttl);
        state.jobs.insert(
            job_id.clone(),
            StoredJob {
                job,
                expires_at: None,
            },
        );
        state.pending.push_back(job_id.clone());
        debug!(job_id = %job_id, job_name = name, "任务已入队");
        Ok(job_id)
    }

    async fn reserve(&self, worker_id: &str) -> JobRunnerResult<Option<Job>> {
        let mut state = self.state.lock().await;
        state.purge(self.worker_ttl);
        state.touch(worker_id);

        while let Some(job_id) = state.pending.pop_front() {
            let job = match state.job_mut(&job_id) {
                Ok(job) => job,
                Err(_) => continue,
            };
            job.mark_reserved(worker_id)?;
            let reserved = job.clone();
            state.touch(worker_id).reserved.insert(job_id);
            return Ok(Some(reserved));
        }

        Ok(None)
    }

    async fn hold_scheduled(&self, worker_id: &str, job_id: &str) -> JobRunnerResult<()> {
        let mut state = self.state.lock().await;
        let job = state.job_mut(job_id)?;
        job.ensure_held_by(worker_id)?;
        if job.status != JobStatus::Reserved {
            return Err(JobRunnerError::InvalidTransition {
                job_id: job_id.to_string(),
                from: job.status,
                to: JobStatus::Reserved,
            });
        }

        let entry = state.touch(worker_id);
        entry.reserved.remove(job_id);
        entry.scheduled.insert(job_id.to_string());
        Ok(())
    }

    async fn start(&self, worker_id: &str, job_id: &str) -> JobRunnerResult<Job> {
        let mut state = self.state.lock().await;
        let job = state.job_mut(job_id)?;
        job.ensure_held_by(worker_id)?;
        job.mark_active()?;
        let started = job.clone();

        let entry = state.touch(worker_id);
        entry.reserved.remove(job_id);
        entry.scheduled.remove(job_id);
        entry.active.insert(job_id.to_string());
        Ok(started)
    }

    async fn store_result(
        &self,
        worker_id: &str,
        job_id: &str,
        completion: JobCompletion,
    ) -> JobRunnerResult<Job> {
        let mut state = self.state.lock().await;
        let job = state.job_mut(job_id)?;
        job.ensure_held_by(worker_id)?;
        match completion {
            JobCompletion::Success(result) => job.mark_completed(result)?,
            JobCompletion::Failure(error) => job.mark_failed(error)?,
        }
        let finished = job.clone();

        let expires_at = Instant::now() + self.result_ttl;
        if let Some(stored) = state.jobs.get_mut(job_id) {
            stored.expires_at = Some(expires_at);
        }
        state.expiries.push_back((expires_at, job_id.to_string()));
        state.touch(worker_id).active.remove(job_id);
        Ok(finished)
    }

    async fn get_job(&self, job_id: &str) -> JobRunnerResult<Option<Job>> {
        let mut state = self.state.lock().await;
        match state.job_mut(job_id) {
            Ok(job) => Ok(Some(job.clone())),
            Err(JobRunnerError::JobNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn queue_length(&self) -> JobRunnerResult<u64> {
        let state = self.state.lock().await;
        Ok(state.pending.len() as u64)
    }

    fn queue_name(&self) -> &str {
        &self.queue_name
    }

    async fn heartbeat(&self, worker_id: &str) -> JobRunnerResult<()> {
        self.state.lock().await.touch(worker_id);
        Ok(())
    }

    async fn unregister_worker(&self, worker_id: &str) -> JobRunnerResult<()> {
        self.state.lock().await.workers.remove(worker_id);
        info!("Worker已注销: {}", worker_id);
        Ok(())
    }

    async fn inspect_active(&self) -> JobRunnerResult<HashMap<String, usize>> {
        let mut state = self.state.lock().await;
        state.purge(self.worker_ttl);
        Ok(state.count_live(self.worker_ttl, |entry| entry.active.len()))
    }

    async fn inspect_scheduled(&self) -> JobRunnerResult<HashMap<String, usize>> {
        let mut state = self.state.lock().await;
        state.purge(self.worker_ttl);
        Ok(state.count_live(self.worker_ttl, |entry| entry.scheduled.len()))
    }

    async fn inspect_reserved(&self) -> JobRunnerResult<HashMap<String, usize>> {
        let mut state = self.state.lock().await;
        state.purge(self.worker_ttl);
        Ok(state.count_live(self.worker_ttl, |entry| entry.reserved.len()))
    }
}
