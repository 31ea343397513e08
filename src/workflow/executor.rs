//! Workflow execution against the orchestrator.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::config::ExecutorConfig;
use crate::error::{Error, ToolError};
use crate::jobs::StepResult;
use crate::orchestrator::Orchestrator;
use crate::tools::ToolOutput;
use crate::workflow::plan::{ParamValue, WorkflowPlan, WorkflowStep};

/// Result of running one plan to the end (or to cancellation).
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    /// Step results in step-index order. Under cancellation, steps never
    /// dispatched have no entry.
    pub results: Vec<StepResult>,
    /// Output of the final step, present only when every step succeeded.
    pub final_output: Option<serde_json::Value>,
    /// Whether execution stopped early on a cancellation signal.
    pub cancelled: bool,
}

impl ExecutionOutcome {
    /// All steps ran and succeeded.
    pub fn succeeded(&self) -> bool {
        !self.cancelled && !self.results.is_empty() && self.results.iter().all(|r| r.success)
    }
}

/// Runs workflow plans step by step against the orchestrator.
///
/// Eligibility is dependency-ordered: a step dispatches once every step it
/// depends on (explicitly, or implicitly through an output reference) has
/// finished successfully. Independent eligible steps run concurrently up to
/// the configured fan-out.
pub struct WorkflowExecutor {
    orchestrator: Arc<Orchestrator>,
    config: ExecutorConfig,
}

impl WorkflowExecutor {
    pub fn new(orchestrator: Arc<Orchestrator>, config: ExecutorConfig) -> Self {
        Self {
            orchestrator,
            config,
        }
    }

    /// Execute a plan.
    ///
    /// Each step result is pushed on `progress` as it becomes terminal, so
    /// a caller can keep a job record current while execution continues.
    /// The cancel flag is checked between dispatches; steps already running
    /// complete, pending steps are never dispatched.
    ///
    /// A failed step never aborts the run: its transitive dependents get
    /// synthetic failed results and every independent branch still runs.
    pub async fn execute(
        &self,
        plan: &WorkflowPlan,
        cancel: watch::Receiver<bool>,
        progress: Option<mpsc::UnboundedSender<StepResult>>,
    ) -> Result<ExecutionOutcome, Error> {
        plan.validate().map_err(Error::Plan)?;

        let steps: HashMap<usize, &WorkflowStep> =
            plan.steps.iter().map(|s| (s.index, s)).collect();
        let deps = effective_dependencies(plan);

        let mut pending: Vec<usize> = plan.steps.iter().map(|s| s.index).collect();
        let mut results: BTreeMap<usize, StepResult> = BTreeMap::new();
        let mut failed: HashSet<usize> = HashSet::new();
        let mut outputs: HashMap<String, serde_json::Value> = HashMap::new();

        let semaphore = Arc::new(Semaphore::new(self.config.step_fanout));
        let mut running: JoinSet<(usize, Result<ToolOutput, Error>)> = JoinSet::new();
        let mut cancelled = false;

        loop {
            if !cancelled && *cancel.borrow() {
                debug!("cancellation observed, draining in-flight steps");
                cancelled = true;
            }

            if !cancelled {
                // Steps downstream of a failure become terminal without
                // dispatch; repeat until no more propagate.
                loop {
                    let skipped: Vec<usize> = pending
                        .iter()
                        .copied()
                        .filter(|idx| deps[idx].iter().any(|d| failed.contains(d)))
                        .collect();
                    if skipped.is_empty() {
                        break;
                    }
                    for idx in skipped {
                        pending.retain(|&p| p != idx);
                        failed.insert(idx);
                        let result = StepResult::failure(
                            idx,
                            &steps[&idx].tool,
                            "upstream dependency failed",
                        );
                        record(&mut results, &progress, result);
                    }
                }

                let eligible: Vec<usize> = pending
                    .iter()
                    .copied()
                    .filter(|idx| deps[idx].iter().all(|d| results.contains_key(d)))
                    .collect();

                for idx in eligible {
                    let step = steps[&idx];
                    let permit =
                        Arc::clone(&semaphore)
                            .acquire_owned()
                            .await
                            .map_err(|_| ToolError::ExecutionFailed {
                                name: step.tool.clone(),
                                reason: "executor semaphore closed".to_string(),
                            })?;

                    // The permit wait can span a cancellation; re-check
                    // before committing the dispatch. Undispatched steps
                    // stay pending.
                    if *cancel.borrow() {
                        debug!("cancellation observed, draining in-flight steps");
                        cancelled = true;
                        break;
                    }

                    pending.retain(|&p| p != idx);
                    let params = self.resolve_parameters(step, &outputs);
                    let tool = step.tool.clone();
                    let orchestrator = Arc::clone(&self.orchestrator);

                    running.spawn(async move {
                        let _permit = permit;
                        (idx, orchestrator.invoke(&tool, params).await)
                    });
                }
            }

            if running.is_empty() {
                if cancelled || pending.is_empty() {
                    break;
                }
                // A validated plan always has an eligible step while any
                // remain, so this is unreachable; fail closed if not.
                warn!(remaining = pending.len(), "no step eligible or running");
                for idx in std::mem::take(&mut pending) {
                    failed.insert(idx);
                    let result =
                        StepResult::failure(idx, &steps[&idx].tool, "unresolvable dependency");
                    record(&mut results, &progress, result);
                }
                break;
            }

            match running.join_next().await {
                Some(Ok((idx, invoke_result))) => {
                    let step = steps[&idx];
                    let result = match invoke_result {
                        Ok(output) => {
                            outputs.insert(step.output_key.clone(), output.result.clone());
                            StepResult::success(idx, &step.tool, output.result)
                        }
                        Err(e) => {
                            failed.insert(idx);
                            StepResult::failure(idx, &step.tool, e.to_string())
                        }
                    };
                    record(&mut results, &progress, result);
                }
                Some(Err(e)) => {
                    // A panicking tool task cannot be attributed to a step,
                    // so the whole run fails.
                    return Err(ToolError::ExecutionFailed {
                        name: "workflow".to_string(),
                        reason: format!("step task failed: {e}"),
                    }
                    .into());
                }
                None => {}
            }
        }

        let final_output = if failed.is_empty() && !cancelled && results.len() == plan.len() {
            plan.steps
                .iter()
                .map(|s| s.index)
                .max()
                .and_then(|last| results.get(&last))
                .and_then(|r| r.output.clone())
        } else {
            None
        };

        Ok(ExecutionOutcome {
            results: results.into_values().collect(),
            final_output,
            cancelled,
        })
    }

    /// Materialize a step's parameters, substituting referenced outputs.
    ///
    /// Substituted values larger than the configured byte budget are
    /// replaced with a truncated string projection so one oversized output
    /// cannot balloon every downstream request.
    fn resolve_parameters(
        &self,
        step: &WorkflowStep,
        outputs: &HashMap<String, serde_json::Value>,
    ) -> serde_json::Value {
        let mut map = serde_json::Map::with_capacity(step.parameters.len());
        for (name, value) in &step.parameters {
            let resolved = match value {
                ParamValue::Literal(v) => v.clone(),
                ParamValue::OutputRef(key) => outputs
                    .get(key)
                    .map(|v| project(v, self.config.max_substitution_bytes))
                    .unwrap_or(serde_json::Value::Null),
            };
            map.insert(name.clone(), resolved);
        }
        serde_json::Value::Object(map)
    }
}

fn record(
    results: &mut BTreeMap<usize, StepResult>,
    progress: &Option<mpsc::UnboundedSender<StepResult>>,
    result: StepResult,
) {
    if let Some(tx) = progress {
        // Receiver gone means nobody is tracking progress anymore.
        let _ = tx.send(result.clone());
    }
    results.insert(result.step_index, result);
}

/// Explicit dependencies plus the producers of every referenced output key.
fn effective_dependencies(plan: &WorkflowPlan) -> HashMap<usize, HashSet<usize>> {
    let producers: HashMap<&str, usize> = plan
        .steps
        .iter()
        .map(|s| (s.output_key.as_str(), s.index))
        .collect();

    plan.steps
        .iter()
        .map(|step| {
            let mut deps: HashSet<usize> = step.depends_on.iter().copied().collect();
            for value in step.parameters.values() {
                if let Some(key) = value.output_ref() {
                    if let Some(&producer) = producers.get(key) {
                        deps.insert(producer);
                    }
                }
            }
            (step.index, deps)
        })
        .collect()
}

/// Bound a value substituted into a parameter to `budget` serialized bytes.
fn project(value: &serde_json::Value, budget: usize) -> serde_json::Value {
    let serialized = match serde_json::to_string(value) {
        Ok(s) => s,
        Err(_) => return value.clone(),
    };
    if serialized.len() <= budget {
        return value.clone();
    }
    let mut end = budget.min(serialized.len());
    while end > 0 && !serialized.is_char_boundary(end) {
        end -= 1;
    }
    serde_json::Value::String(serialized[..end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::config::RemoteConfig;
    use crate::remote::ServerRegistry;
    use crate::tools::{Tool, ToolRegistry};

    /// Echoes its parameters back as the output, tracking concurrency.
    struct StubTool {
        name: String,
        delay: Duration,
        fail: bool,
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    impl StubTool {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                delay: Duration::ZERO,
                fail: false,
                active: Arc::new(AtomicUsize::new(0)),
                peak: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn delayed(
            name: &str,
            delay: Duration,
            active: Arc<AtomicUsize>,
            peak: Arc<AtomicUsize>,
        ) -> Self {
            Self {
                delay,
                active,
                peak,
                ..Self::new(name)
            }
        }

        fn failing(name: &str) -> Self {
            Self {
                fail: true,
                ..Self::new(name)
            }
        }
    }

    #[async_trait]
    impl Tool for StubTool {
        fn name(&self) -> &str {
            &self.name
        }

        fn description(&self) -> &str {
            "stub"
        }

        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }

        async fn invoke(&self, params: serde_json::Value) -> Result<ToolOutput, ToolError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.active.fetch_sub(1, Ordering::SeqCst);

            if self.fail {
                return Err(ToolError::ExecutionFailed {
                    name: self.name.clone(),
                    reason: "stub failure".to_string(),
                });
            }
            Ok(ToolOutput::success(params, Duration::ZERO))
        }
    }

    async fn executor_with(tools: Vec<StubTool>, config: ExecutorConfig) -> WorkflowExecutor {
        let registry = Arc::new(ToolRegistry::new());
        for tool in tools {
            registry.register(Arc::new(tool)).await.unwrap();
        }
        let servers = Arc::new(ServerRegistry::new(RemoteConfig::default()));
        WorkflowExecutor::new(Arc::new(Orchestrator::new(registry, servers)), config)
    }

    fn no_cancel() -> watch::Receiver<bool> {
        watch::channel(false).1
    }

    #[tokio::test]
    async fn test_linear_chain_substitutes_outputs() {
        let executor =
            executor_with(vec![StubTool::new("first"), StubTool::new("second")], ExecutorConfig::default())
                .await;

        let plan = WorkflowPlan::new(vec![
            WorkflowStep::new(1, "first", "a").with_param("seed", serde_json::json!(7)),
            WorkflowStep::new(2, "second", "b")
                .with_ref_param("context", "a")
                .depends_on_step(1),
        ]);

        let outcome = executor.execute(&plan, no_cancel(), None).await.unwrap();
        assert!(outcome.succeeded());
        assert_eq!(outcome.results.len(), 2);

        // The stub echoes its params, so step 2's output carries step 1's
        // full output under "context".
        let step2 = &outcome.results[1];
        assert_eq!(
            step2.output.as_ref().unwrap()["context"]["seed"],
            serde_json::json!(7)
        );
        assert_eq!(outcome.final_output, step2.output);
    }

    #[tokio::test]
    async fn test_failed_dependency_skips_dependents_but_not_siblings() {
        let executor = executor_with(
            vec![
                StubTool::failing("broken"),
                StubTool::new("dependent"),
                StubTool::new("independent"),
            ],
            ExecutorConfig::default(),
        )
        .await;

        let plan = WorkflowPlan::new(vec![
            WorkflowStep::new(1, "broken", "a"),
            WorkflowStep::new(2, "dependent", "b").depends_on_step(1),
            WorkflowStep::new(3, "independent", "c"),
        ]);

        let outcome = executor.execute(&plan, no_cancel(), None).await.unwrap();
        assert!(!outcome.succeeded());
        assert_eq!(outcome.results.len(), 3);
        assert!(!outcome.results[0].success);
        assert!(!outcome.results[1].success);
        assert_eq!(
            outcome.results[1].error.as_deref(),
            Some("upstream dependency failed")
        );
        assert!(outcome.results[2].success);
        assert!(outcome.final_output.is_none());
    }

    #[tokio::test]
    async fn test_fanout_limits_concurrency() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let slow = |name: &str| {
            StubTool::delayed(
                name,
                Duration::from_millis(30),
                Arc::clone(&active),
                Arc::clone(&peak),
            )
        };
        let executor = executor_with(
            vec![slow("slow_a"), slow("slow_b"), slow("slow_c")],
            ExecutorConfig {
                step_fanout: 1,
                ..ExecutorConfig::default()
            },
        )
        .await;

        let plan = WorkflowPlan::new(vec![
            WorkflowStep::new(1, "slow_a", "a"),
            WorkflowStep::new(2, "slow_b", "b"),
            WorkflowStep::new(3, "slow_c", "c"),
        ]);

        let outcome = executor.execute(&plan, no_cancel(), None).await.unwrap();
        assert!(outcome.succeeded());
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_dispatches_nothing() {
        let executor =
            executor_with(vec![StubTool::new("only")], ExecutorConfig::default()).await;
        let plan = WorkflowPlan::new(vec![WorkflowStep::new(1, "only", "a")]);

        let (tx, rx) = watch::channel(true);
        let outcome = executor.execute(&plan, rx, None).await.unwrap();
        drop(tx);

        assert!(outcome.cancelled);
        assert!(outcome.results.is_empty());
    }

    /// With fan-out 1 a batch of independent steps queues on the permit;
    /// a cancel signalled while the first step runs must stop the rest of
    /// the batch from dispatching.
    #[tokio::test]
    async fn test_cancel_mid_batch_stops_queued_dispatches() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let slow = |name: &str| {
            StubTool::delayed(
                name,
                Duration::from_millis(100),
                Arc::clone(&active),
                Arc::clone(&peak),
            )
        };
        let executor = executor_with(
            vec![slow("slow_a"), slow("slow_b"), slow("slow_c")],
            ExecutorConfig {
                step_fanout: 1,
                ..ExecutorConfig::default()
            },
        )
        .await;

        let plan = WorkflowPlan::new(vec![
            WorkflowStep::new(1, "slow_a", "a"),
            WorkflowStep::new(2, "slow_b", "b"),
            WorkflowStep::new(3, "slow_c", "c"),
        ]);

        let (tx, rx) = watch::channel(false);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = tx.send(true);
        });

        let outcome = executor.execute(&plan, rx, None).await.unwrap();
        assert!(outcome.cancelled);
        // Only the step in flight at cancel time ran to completion.
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_oversized_output_truncated_on_substitution() {
        let executor = executor_with(
            vec![StubTool::new("big"), StubTool::new("consumer")],
            ExecutorConfig {
                max_substitution_bytes: 32,
                ..ExecutorConfig::default()
            },
        )
        .await;

        let plan = WorkflowPlan::new(vec![
            WorkflowStep::new(1, "big", "a").with_param("payload", serde_json::json!("x".repeat(200))),
            WorkflowStep::new(2, "consumer", "b").with_ref_param("context", "a"),
        ]);

        let outcome = executor.execute(&plan, no_cancel(), None).await.unwrap();
        assert!(outcome.succeeded());

        let context = &outcome.results[1].output.as_ref().unwrap()["context"];
        let projected = context.as_str().unwrap();
        assert!(projected.len() <= 32);
    }

    #[tokio::test]
    async fn test_progress_reports_every_terminal_step() {
        let executor = executor_with(
            vec![StubTool::new("first"), StubTool::new("second")],
            ExecutorConfig::default(),
        )
        .await;

        let plan = WorkflowPlan::new(vec![
            WorkflowStep::new(1, "first", "a"),
            WorkflowStep::new(2, "second", "b").depends_on_step(1),
        ]);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let outcome = executor.execute(&plan, no_cancel(), Some(tx)).await.unwrap();
        assert!(outcome.succeeded());

        let mut reported = Vec::new();
        while let Ok(result) = rx.try_recv() {
            reported.push(result.step_index);
        }
        assert_eq!(reported, vec![1, 2]);
    }

    #[test]
    fn test_project_truncates_at_char_boundary() {
        let value = serde_json::json!("é".repeat(100));
        let projected = project(&value, 11);
        let s = projected.as_str().unwrap();
        assert!(s.len() <= 11);
        assert!(s.starts_with('"'));
    }
}
