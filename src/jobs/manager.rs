//! Job manager: bounded queue, worker pool, polling surface.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::JobsConfig;
use crate::error::{Error, JobError};
use crate::jobs::job::{Job, JobStatus};
use crate::jobs::store::{JobHandle, JobStore};
use crate::workflow::{WorkflowExecutor, WorkflowPlan};

type SharedReceiver = Arc<Mutex<mpsc::Receiver<Uuid>>>;
type CancelMap = Arc<RwLock<HashMap<Uuid, watch::Sender<bool>>>>;

/// Accepts workflow plans and runs them on a bounded worker pool.
///
/// `submit` never blocks on execution: it validates, stores a queued job
/// record, and enqueues the id. Workers pick ids off the shared queue, so
/// at most `workers` jobs execute at once and everything else waits in
/// FIFO order.
pub struct JobManager {
    store: Arc<JobStore>,
    queue: mpsc::Sender<Uuid>,
    cancels: CancelMap,
    config: JobsConfig,
}

impl JobManager {
    /// Start the manager: spawns the worker pool and the expiry sweeper.
    pub fn start(store: Arc<JobStore>, executor: Arc<WorkflowExecutor>, config: JobsConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let rx: SharedReceiver = Arc::new(Mutex::new(rx));
        let cancels: CancelMap = Arc::new(RwLock::new(HashMap::new()));

        for worker_id in 0..config.workers {
            tokio::spawn(worker_loop(
                worker_id,
                Arc::clone(&rx),
                Arc::clone(&store),
                Arc::clone(&executor),
                Arc::clone(&cancels),
            ));
        }

        {
            let store = Arc::clone(&store);
            let ttl = config.ttl;
            let sweep_interval = config.sweep_interval;
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(sweep_interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    let removed = store.expire_finished(ttl).await;
                    if removed > 0 {
                        debug!(removed, "job expiry sweep");
                    }
                }
            });
        }

        Self {
            store,
            queue: tx,
            cancels,
            config,
        }
    }

    /// Submit a plan for background execution, returning the job id
    /// immediately.
    pub async fn submit(&self, plan: WorkflowPlan) -> Result<Uuid, Error> {
        plan.validate().map_err(Error::Plan)?;

        let job = Job::new(plan);
        let id = job.id;
        self.store.insert(job).await;

        let (cancel_tx, _) = watch::channel(false);
        self.cancels.write().await.insert(id, cancel_tx);

        if let Err(e) = self.queue.try_send(id) {
            self.store.remove(id).await;
            self.cancels.write().await.remove(&id);
            return Err(enqueue_error(e, self.config.queue_capacity).into());
        }

        info!(job_id = %id, "job submitted");
        Ok(id)
    }

    /// Current state of a job.
    pub async fn status(&self, id: Uuid) -> Result<Job, Error> {
        Ok(self.store.snapshot(id).await?)
    }

    /// Full job record once terminal; `JobError::NotReady` while the job is
    /// still queued or running.
    pub async fn result(&self, id: Uuid) -> Result<Job, Error> {
        let job = self.store.snapshot(id).await?;
        if !job.status.is_terminal() {
            return Err(JobError::NotReady {
                id,
                status: job.status.to_string(),
            }
            .into());
        }
        Ok(job)
    }

    /// Request cancellation.
    ///
    /// A queued job is cancelled on the spot. A running job gets its cancel
    /// flag flipped; the executor observes it between step dispatches, so
    /// in-flight steps finish first. Cancelling a terminal job fails with
    /// `JobError::InvalidTransition`.
    pub async fn cancel(&self, id: Uuid) -> Result<(), Error> {
        let handle = self
            .store
            .get(id)
            .await
            .ok_or(JobError::NotFound { id })?;

        let mut job = handle.write().await;
        match job.status {
            JobStatus::Queued => {
                job.transition(JobStatus::Cancelled)?;
                drop(job);
                self.cancels.write().await.remove(&id);
                info!(job_id = %id, "queued job cancelled");
                Ok(())
            }
            JobStatus::Running => {
                drop(job);
                if let Some(tx) = self.cancels.read().await.get(&id) {
                    let _ = tx.send(true);
                }
                info!(job_id = %id, "cancellation requested");
                Ok(())
            }
            status => Err(JobError::InvalidTransition {
                id,
                from: status.to_string(),
                to: JobStatus::Cancelled.to_string(),
            }
            .into()),
        }
    }
}

/// A full queue is backpressure; a closed one means the workers are gone.
fn enqueue_error(e: TrySendError<Uuid>, capacity: usize) -> JobError {
    match e {
        TrySendError::Full(_) => JobError::QueueFull { capacity },
        TrySendError::Closed(_) => JobError::QueueClosed,
    }
}

async fn worker_loop(
    worker_id: usize,
    rx: SharedReceiver,
    store: Arc<JobStore>,
    executor: Arc<WorkflowExecutor>,
    cancels: CancelMap,
) {
    loop {
        let id = { rx.lock().await.recv().await };
        let Some(id) = id else {
            debug!(worker_id, "job queue closed, worker exiting");
            break;
        };
        let Some(handle) = store.get(id).await else {
            continue;
        };

        let cancel_rx = {
            let cancels = cancels.read().await;
            match cancels.get(&id) {
                Some(tx) => tx.subscribe(),
                None => watch::channel(false).1,
            }
        };

        {
            let mut job = handle.write().await;
            if job.status == JobStatus::Cancelled {
                drop(job);
                cancels.write().await.remove(&id);
                continue;
            }
            if let Err(e) = job.transition(JobStatus::Running) {
                error!(worker_id, job_id = %id, error = %e, "unexpected job state");
                continue;
            }
        }
        info!(worker_id, job_id = %id, "job started");

        run_job(&handle, &executor, cancel_rx).await;
        cancels.write().await.remove(&id);
    }
}

async fn run_job(handle: &JobHandle, executor: &WorkflowExecutor, cancel: watch::Receiver<bool>) {
    let (id, plan) = {
        let job = handle.read().await;
        (job.id, job.plan.clone())
    };

    // Step results stream into the job record as they land, so polls see
    // progress while the job runs.
    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
    let progress_handle = Arc::clone(handle);
    let drain = tokio::spawn(async move {
        while let Some(step) = progress_rx.recv().await {
            progress_handle.write().await.record_step(step);
        }
    });

    let outcome = executor.execute(&plan, cancel, Some(progress_tx)).await;
    let _ = drain.await;

    let mut job = handle.write().await;
    match outcome {
        Ok(outcome) if outcome.cancelled => {
            if job.transition(JobStatus::Cancelled).is_ok() {
                info!(job_id = %id, "job cancelled");
            }
        }
        Ok(outcome) if outcome.succeeded() => {
            job.final_result = outcome.final_output;
            if job.transition(JobStatus::Completed).is_ok() {
                info!(job_id = %id, steps = job.step_results.len(), "job completed");
            }
        }
        Ok(outcome) => {
            job.error = outcome
                .results
                .iter()
                .find(|r| !r.success)
                .and_then(|r| r.error.clone());
            if job.transition(JobStatus::Failed).is_ok() {
                info!(job_id = %id, "job failed");
            }
        }
        Err(e) => {
            job.error = Some(e.to_string());
            if job.transition(JobStatus::Failed).is_ok() {
                error!(job_id = %id, error = %e, "job failed to execute");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::config::{ExecutorConfig, RemoteConfig};
    use crate::error::ToolError;
    use crate::orchestrator::Orchestrator;
    use crate::remote::ServerRegistry;
    use crate::tools::{Tool, ToolOutput, ToolRegistry};
    use crate::workflow::WorkflowStep;

    struct SleepTool {
        name: String,
        delay: Duration,
    }

    #[async_trait]
    impl Tool for SleepTool {
        fn name(&self) -> &str {
            &self.name
        }

        fn description(&self) -> &str {
            "sleeps then echoes"
        }

        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }

        async fn invoke(&self, params: serde_json::Value) -> Result<ToolOutput, ToolError> {
            tokio::time::sleep(self.delay).await;
            Ok(ToolOutput::success(params, self.delay))
        }
    }

    async fn manager_with(tools: Vec<SleepTool>, config: JobsConfig) -> JobManager {
        let registry = Arc::new(ToolRegistry::new());
        for tool in tools {
            registry.register(Arc::new(tool)).await.unwrap();
        }
        let servers = Arc::new(ServerRegistry::new(RemoteConfig::default()));
        let orchestrator = Arc::new(Orchestrator::new(registry, servers));
        let executor = Arc::new(WorkflowExecutor::new(orchestrator, ExecutorConfig::default()));
        JobManager::start(Arc::new(JobStore::new()), executor, config)
    }

    fn fast(name: &str) -> SleepTool {
        SleepTool {
            name: name.to_string(),
            delay: Duration::ZERO,
        }
    }

    fn slow(name: &str, ms: u64) -> SleepTool {
        SleepTool {
            name: name.to_string(),
            delay: Duration::from_millis(ms),
        }
    }

    async fn wait_terminal(manager: &JobManager, id: Uuid) -> Job {
        for _ in 0..200 {
            let job = manager.status(id).await.unwrap();
            if job.status.is_terminal() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job never reached a terminal state");
    }

    #[tokio::test]
    async fn test_submit_runs_to_completion() {
        let manager = manager_with(vec![fast("echo")], JobsConfig::default()).await;
        let plan = WorkflowPlan::new(vec![
            WorkflowStep::new(1, "echo", "out").with_param("message", serde_json::json!("hi")),
        ]);

        let id = manager.submit(plan).await.unwrap();
        let job = wait_terminal(&manager, id).await;

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert_eq!(job.step_results.len(), 1);
        assert_eq!(
            job.final_result.as_ref().unwrap()["message"],
            serde_json::json!("hi")
        );
    }

    #[tokio::test]
    async fn test_result_not_ready_while_running() {
        let manager = manager_with(vec![slow("slow", 200)], JobsConfig::default()).await;
        let plan = WorkflowPlan::new(vec![WorkflowStep::new(1, "slow", "out")]);

        let id = manager.submit(plan).await.unwrap();
        let err = manager.result(id).await.unwrap_err();
        assert!(matches!(err, Error::Job(JobError::NotReady { .. })));

        wait_terminal(&manager, id).await;
        assert!(manager.result(id).await.is_ok());
    }

    #[tokio::test]
    async fn test_submit_invalid_plan_rejected_before_queueing() {
        let manager = manager_with(vec![fast("echo")], JobsConfig::default()).await;
        let err = manager.submit(WorkflowPlan::default()).await.unwrap_err();
        assert!(matches!(err, Error::Plan(_)));
    }

    #[tokio::test]
    async fn test_status_unknown_job() {
        let manager = manager_with(vec![fast("echo")], JobsConfig::default()).await;
        let err = manager.status(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, Error::Job(JobError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_cancel_running_job_skips_remaining_steps() {
        let manager = manager_with(vec![slow("slow", 150), fast("after")], JobsConfig::default()).await;
        let plan = WorkflowPlan::new(vec![
            WorkflowStep::new(1, "slow", "a"),
            WorkflowStep::new(2, "after", "b").depends_on_step(1),
        ]);

        let id = manager.submit(plan).await.unwrap();
        // Let the first step start, then cancel while it sleeps.
        tokio::time::sleep(Duration::from_millis(50)).await;
        manager.cancel(id).await.unwrap();

        let job = wait_terminal(&manager, id).await;
        assert_eq!(job.status, JobStatus::Cancelled);
        // The in-flight step finished; the dependent step never dispatched.
        assert!(job.step_results.len() <= 1);
    }

    #[tokio::test]
    async fn test_cancel_terminal_job_rejected() {
        let manager = manager_with(vec![fast("echo")], JobsConfig::default()).await;
        let plan = WorkflowPlan::new(vec![WorkflowStep::new(1, "echo", "out")]);

        let id = manager.submit(plan).await.unwrap();
        wait_terminal(&manager, id).await;

        let err = manager.cancel(id).await.unwrap_err();
        assert!(matches!(err, Error::Job(JobError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_queue_full_rejects_submit() {
        let config = JobsConfig {
            workers: 1,
            queue_capacity: 1,
            ..JobsConfig::default()
        };
        let manager = manager_with(vec![slow("slow", 500)], config).await;
        let plan = || WorkflowPlan::new(vec![WorkflowStep::new(1, "slow", "out")]);

        // First job occupies the single worker, second fills the queue.
        let first = manager.submit(plan()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        manager.submit(plan()).await.unwrap();

        let err = manager.submit(plan()).await.unwrap_err();
        assert!(matches!(err, Error::Job(JobError::QueueFull { capacity: 1 })));

        // The rejected job left no record behind.
        manager.cancel(first).await.unwrap();
    }

    #[test]
    fn test_enqueue_error_distinguishes_full_from_closed() {
        let id = Uuid::new_v4();
        assert!(matches!(
            enqueue_error(TrySendError::Full(id), 4),
            JobError::QueueFull { capacity: 4 }
        ));
        assert!(matches!(
            enqueue_error(TrySendError::Closed(id), 4),
            JobError::QueueClosed
        ));
    }

    #[tokio::test]
    async fn test_failed_step_fails_job_with_error() {
        let manager = manager_with(vec![fast("echo")], JobsConfig::default()).await;
        // "missing" is not registered anywhere.
        let plan = WorkflowPlan::new(vec![WorkflowStep::new(1, "missing", "out")]);

        let id = manager.submit(plan).await.unwrap();
        let job = wait_terminal(&manager, id).await;

        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.as_deref().unwrap_or("").contains("not found"));
    }
}
