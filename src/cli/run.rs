//! The `run` command: plan a request and execute it as a job.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::cli::build_orchestrator;
use crate::config::Config;
use crate::jobs::{JobManager, JobStatus, JobStore};
use crate::workflow::{WorkflowExecutor, WorkflowPlan, WorkflowPlanner};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

pub async fn run_workflow_command(
    request: Option<String>,
    plan_path: Option<PathBuf>,
    dry_run: bool,
) -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let orchestrator = build_orchestrator(&config).await?;

    let planner = WorkflowPlanner::new();
    let catalog = orchestrator.list_all_tools().await.tools;

    let plan = match (plan_path, request) {
        (Some(path), _) => {
            let content = tokio::fs::read_to_string(&path).await?;
            let plan: WorkflowPlan = serde_json::from_str(&content)?;
            planner.validate(&plan, &catalog)?;
            plan
        }
        (None, Some(request)) => planner.plan_from_request(&request, &catalog)?,
        (None, None) => anyhow::bail!("provide a request or --plan <file>"),
    };

    println!("plan ({} steps):", plan.len());
    for step in &plan.steps {
        if step.depends_on.is_empty() {
            println!("  {}. {} -> {}", step.index, step.tool, step.output_key);
        } else {
            println!(
                "  {}. {} -> {} (after {:?})",
                step.index, step.tool, step.output_key, step.depends_on
            );
        }
    }
    if dry_run {
        return Ok(());
    }

    let executor = Arc::new(WorkflowExecutor::new(
        Arc::clone(&orchestrator),
        config.executor.clone(),
    ));
    let manager = JobManager::start(Arc::new(JobStore::new()), executor, config.jobs.clone());

    let id = manager.submit(plan).await?;
    println!("job {id} submitted");

    let mut reported = 0;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                eprintln!("cancelling (in-flight steps finish first)...");
                // Terminal by now is fine; the poll below reports it.
                let _ = manager.cancel(id).await;
            }
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
        }

        let job = manager.status(id).await?;
        for step in &job.step_results[reported..] {
            if step.success {
                println!("  step {} ({}) ok", step.step_index, step.tool);
            } else {
                println!(
                    "  step {} ({}) failed: {}",
                    step.step_index,
                    step.tool,
                    step.error.as_deref().unwrap_or("unknown error")
                );
            }
        }
        reported = job.step_results.len();

        if job.status.is_terminal() {
            match job.status {
                JobStatus::Completed => {
                    println!("job completed ({}%)", job.progress);
                    if let Some(result) = &job.final_result {
                        println!("{}", serde_json::to_string_pretty(result)?);
                    }
                }
                JobStatus::Cancelled => println!("job cancelled"),
                _ => anyhow::bail!(
                    "job failed: {}",
                    job.error.as_deref().unwrap_or("unknown error")
                ),
            }
            return Ok(());
        }
    }
}
