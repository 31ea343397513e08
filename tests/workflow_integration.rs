//! End-to-end scenarios: plan execution through the job layer.
//!
//! Uses stub tools with artificial delays so ordering, fan-in and
//! cancellation windows are observable from the outside.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use conductor::config::{ExecutorConfig, JobsConfig, RemoteConfig};
use conductor::error::ToolError;
use conductor::jobs::{Job, JobManager, JobStatus, JobStore};
use conductor::orchestrator::{HealthStatus, Orchestrator};
use conductor::remote::{ServerRegistration, ServerRegistry};
use conductor::tools::{Tool, ToolOutput, ToolRegistry};
use conductor::workflow::{WorkflowExecutor, WorkflowPlan, WorkflowStep};

/// Stub tool: sleeps, appends its name to a shared trace, echoes params.
struct TraceTool {
    name: String,
    delay: Duration,
    trace: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Tool for TraceTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "test stub"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object"})
    }

    async fn invoke(&self, params: serde_json::Value) -> Result<ToolOutput, ToolError> {
        tokio::time::sleep(self.delay).await;
        self.trace.lock().await.push(self.name.clone());
        Ok(ToolOutput::success(
            serde_json::json!({"tool": self.name, "params": params}),
            self.delay,
        ))
    }
}

struct Harness {
    orchestrator: Arc<Orchestrator>,
    manager: JobManager,
    trace: Arc<Mutex<Vec<String>>>,
}

impl Harness {
    async fn with_tools(tools: &[(&str, u64)]) -> Self {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let registry = Arc::new(ToolRegistry::new());
        for (name, delay_ms) in tools {
            registry
                .register(Arc::new(TraceTool {
                    name: name.to_string(),
                    delay: Duration::from_millis(*delay_ms),
                    trace: Arc::clone(&trace),
                }))
                .await
                .unwrap();
        }

        let servers = Arc::new(ServerRegistry::new(RemoteConfig {
            connect_timeout: Duration::from_millis(200),
            call_timeout: Duration::from_millis(200),
            max_retries: 0,
            ..RemoteConfig::default()
        }));
        let orchestrator = Arc::new(Orchestrator::new(registry, servers));
        let executor = Arc::new(WorkflowExecutor::new(
            Arc::clone(&orchestrator),
            ExecutorConfig::default(),
        ));
        let manager = JobManager::start(
            Arc::new(JobStore::new()),
            executor,
            JobsConfig::default(),
        );

        Self {
            orchestrator,
            manager,
            trace,
        }
    }

    async fn wait_terminal(&self, id: uuid::Uuid) -> Job {
        for _ in 0..300 {
            let job = self.manager.status(id).await.unwrap();
            if job.status.is_terminal() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job never reached a terminal state");
    }
}

/// Diamond: fetch feeds two parallel analyses which feed one merge step.
/// The merge must observe both branch outputs, and the branches must both
/// run after the root.
#[tokio::test]
async fn diamond_dependencies_merge_both_branches() {
    let harness = Harness::with_tools(&[
        ("fetch", 20),
        ("analyze_a", 60),
        ("analyze_b", 10),
        ("merge", 0),
    ])
    .await;

    let plan = WorkflowPlan::new(vec![
        WorkflowStep::new(1, "fetch", "raw").with_param("source", serde_json::json!("feed")),
        WorkflowStep::new(2, "analyze_a", "left")
            .with_ref_param("input", "raw")
            .depends_on_step(1),
        WorkflowStep::new(3, "analyze_b", "right")
            .with_ref_param("input", "raw")
            .depends_on_step(1),
        WorkflowStep::new(4, "merge", "merged")
            .with_ref_param("left", "left")
            .with_ref_param("right", "right")
            .depends_on_step(2)
            .depends_on_step(3),
    ]);

    let id = harness.manager.submit(plan).await.unwrap();
    let job = harness.wait_terminal(id).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress, 100);
    assert_eq!(job.step_results.len(), 4);
    assert!(job.step_results.iter().all(|r| r.success));

    // Root first, merge last; branch order is timing-dependent.
    let trace = harness.trace.lock().await.clone();
    assert_eq!(trace.first().map(String::as_str), Some("fetch"));
    assert_eq!(trace.last().map(String::as_str), Some("merge"));

    // The merge step received both branch outputs.
    let merged = job.final_result.unwrap();
    assert_eq!(merged["params"]["left"]["tool"], "analyze_a");
    assert_eq!(merged["params"]["right"]["tool"], "analyze_b");
}

/// A failing branch fails its dependents without stopping the other branch,
/// and the job as a whole fails.
#[tokio::test]
async fn failure_skips_transitive_dependents_only() {
    let harness = Harness::with_tools(&[("ok_branch", 10), ("consumer", 0)]).await;

    let plan = WorkflowPlan::new(vec![
        // "missing" is in no catalog, so step 1 fails at dispatch.
        WorkflowStep::new(1, "missing", "bad"),
        WorkflowStep::new(2, "consumer", "downstream").depends_on_step(1),
        WorkflowStep::new(3, "ok_branch", "good"),
    ]);

    let id = harness.manager.submit(plan).await.unwrap();
    let job = harness.wait_terminal(id).await;

    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.is_some());

    let by_index = |i: usize| job.step_results.iter().find(|r| r.step_index == i).unwrap();
    assert!(!by_index(1).success);
    assert_eq!(
        by_index(2).error.as_deref(),
        Some("upstream dependency failed")
    );
    assert!(by_index(3).success);

    // The skipped step's tool never ran.
    let trace = harness.trace.lock().await.clone();
    assert_eq!(trace, vec!["ok_branch"]);
}

/// Submission returns immediately; polling right away sees a live
/// (queued or running) job, and the result endpoint refuses until terminal.
#[tokio::test]
async fn submit_returns_before_completion() {
    let harness = Harness::with_tools(&[("slow", 300)]).await;
    let plan = WorkflowPlan::new(vec![WorkflowStep::new(1, "slow", "out")]);

    let started = std::time::Instant::now();
    let id = harness.manager.submit(plan).await.unwrap();
    assert!(started.elapsed() < Duration::from_millis(100));

    let job = harness.manager.status(id).await.unwrap();
    assert!(matches!(job.status, JobStatus::Queued | JobStatus::Running));

    assert!(harness.manager.result(id).await.is_err());

    let job = harness.wait_terminal(id).await;
    assert_eq!(job.status, JobStatus::Completed);
    let result = harness.manager.result(id).await.unwrap();
    assert_eq!(result.final_result.unwrap()["tool"], "slow");
}

/// Cancellation mid-run: the in-flight step finishes, later steps never
/// dispatch, and the job lands in Cancelled.
#[tokio::test]
async fn cancel_between_steps() {
    let harness = Harness::with_tools(&[("first", 150), ("second", 0)]).await;
    let plan = WorkflowPlan::new(vec![
        WorkflowStep::new(1, "first", "a"),
        WorkflowStep::new(2, "second", "b").depends_on_step(1),
    ]);

    let id = harness.manager.submit(plan).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    harness.manager.cancel(id).await.unwrap();

    let job = harness.wait_terminal(id).await;
    assert_eq!(job.status, JobStatus::Cancelled);

    let trace = harness.trace.lock().await.clone();
    assert!(!trace.contains(&"second".to_string()));
}

/// Losing every external server degrades health but leaves internal tools
/// fully usable.
#[tokio::test]
async fn external_loss_degrades_but_internal_tools_still_work() {
    let harness = Harness::with_tools(&[("echoish", 0)]).await;

    // Baseline poll, then register a server that cannot be reached and
    // fake a regression by pretending one used to be reachable.
    let report = harness.orchestrator.get_health().await;
    assert_eq!(report.status, HealthStatus::Healthy);

    harness
        .orchestrator
        .external()
        .add_server(ServerRegistration::new("dead", "http://127.0.0.1:1"))
        .await
        .unwrap();

    let report = harness.orchestrator.get_health().await;
    // Never-reachable servers are not a regression, and never Unhealthy.
    assert_ne!(report.status, HealthStatus::Unhealthy);
    assert_eq!(report.external_servers, 1);
    assert_eq!(report.reachable_servers, 0);

    // Internal invocation is unaffected by the dead server.
    let plan = WorkflowPlan::new(vec![WorkflowStep::new(1, "echoish", "out")]);
    let id = harness.manager.submit(plan).await.unwrap();
    let job = harness.wait_terminal(id).await;
    assert_eq!(job.status, JobStatus::Completed);
}
