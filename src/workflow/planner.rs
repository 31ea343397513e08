//! Deterministic request-to-plan construction.
//!
//! Planning here is mechanical: catalog descriptors are scored against
//! request terms and the best matches are chained into a plan. The scoring
//! backend is deliberately simple and replaceable; the invariants the
//! planner guarantees (resolvable tools, backward-only dependencies) are
//! what the rest of the system relies on.

use std::collections::HashSet;

use tracing::debug;

use crate::catalog::ToolDescriptor;
use crate::error::PlanError;
use crate::workflow::plan::{WorkflowPlan, WorkflowStep};

/// Upper bound on steps a generated plan may contain.
const MAX_PLAN_STEPS: usize = 5;

/// Name-token matches count more than description matches.
const NAME_WEIGHT: usize = 3;
const DESCRIPTION_WEIGHT: usize = 1;

/// Words too common to carry signal when matching a request to tools.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "for", "from", "in", "into", "it", "me", "my", "of", "on", "or", "please",
    "that", "the", "then", "this", "to", "using", "with",
];

/// Builds validated workflow plans against a catalog snapshot.
#[derive(Debug, Default)]
pub struct WorkflowPlanner;

impl WorkflowPlanner {
    pub fn new() -> Self {
        Self
    }

    /// Build a plan for a free-form request from the given catalog.
    ///
    /// Descriptors are scored by overlap between request tokens and their
    /// name and description; matching tools are chained in score order,
    /// each step depending on the previous and receiving its output under
    /// the `context` parameter. A single match degenerates to a one-step
    /// plan. Fails with `PlanError::Empty` when nothing matches.
    pub fn plan_from_request(
        &self,
        request: &str,
        catalog: &[ToolDescriptor],
    ) -> Result<WorkflowPlan, PlanError> {
        let terms: HashSet<String> = tokenize(request).collect();

        let mut scored: Vec<(usize, &ToolDescriptor)> = catalog
            .iter()
            .map(|desc| (score(desc, &terms), desc))
            .filter(|(score, _)| *score > 0)
            .collect();

        // Score descending, name ascending as tiebreak so planning is
        // stable across catalog orderings.
        scored.sort_by(|(sa, da), (sb, db)| sb.cmp(sa).then_with(|| da.name.cmp(&db.name)));
        scored.truncate(MAX_PLAN_STEPS);

        if scored.is_empty() {
            return Err(PlanError::Empty);
        }

        debug!(
            request,
            tools = ?scored.iter().map(|(s, d)| (d.name.as_str(), *s)).collect::<Vec<_>>(),
            "planned workflow"
        );

        let mut steps = Vec::with_capacity(scored.len());
        for (position, (_, desc)) in scored.iter().enumerate() {
            let index = position + 1;
            let output_key = format!("step{index}_{}", desc.name);
            let mut step = WorkflowStep::new(index, desc.name.clone(), output_key)
                .with_param("request", serde_json::json!(request));
            if let Some(previous) = steps.last() {
                let previous: &WorkflowStep = previous;
                step = step
                    .depends_on_step(previous.index)
                    .with_ref_param("context", previous.output_key.clone());
            }
            steps.push(step);
        }

        let plan = WorkflowPlan::new(steps);
        self.validate(&plan, catalog)?;
        Ok(plan)
    }

    /// Check a plan's structural invariants and that every referenced tool
    /// resolves against the catalog.
    pub fn validate(
        &self,
        plan: &WorkflowPlan,
        catalog: &[ToolDescriptor],
    ) -> Result<(), PlanError> {
        plan.validate()?;

        let known: HashSet<&str> = catalog.iter().map(|d| d.name.as_str()).collect();
        for step in &plan.steps {
            if !known.contains(step.tool.as_str()) {
                return Err(PlanError::UnknownTool {
                    step: step.index,
                    tool: step.tool.clone(),
                });
            }
        }
        Ok(())
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 1)
        .map(|t| t.to_lowercase())
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
}

fn score(desc: &ToolDescriptor, terms: &HashSet<String>) -> usize {
    let name_hits = tokenize(&desc.name).filter(|t| terms.contains(t)).count();
    let desc_hits = tokenize(&desc.description)
        .filter(|t| terms.contains(t))
        .count();
    name_hits * NAME_WEIGHT + desc_hits * DESCRIPTION_WEIGHT
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::plan::ParamValue;
    use pretty_assertions::assert_eq;

    fn catalog() -> Vec<ToolDescriptor> {
        vec![
            ToolDescriptor::internal(
                "search",
                "Search indexed documents for matching passages",
                serde_json::json!({"type": "object"}),
            ),
            ToolDescriptor::internal(
                "summarize",
                "Summarize a set of documents into a short brief",
                serde_json::json!({"type": "object"}),
            ),
            ToolDescriptor::internal(
                "translate",
                "Translate text between languages",
                serde_json::json!({"type": "object"}),
            ),
        ]
    }

    #[test]
    fn test_plan_chains_matching_tools() {
        let planner = WorkflowPlanner::new();
        let plan = planner
            .plan_from_request("search the documents and summarize them", &catalog())
            .unwrap();

        assert_eq!(plan.len(), 2);
        let names: Vec<&str> = plan.steps.iter().map(|s| s.tool.as_str()).collect();
        assert!(names.contains(&"search"));
        assert!(names.contains(&"summarize"));

        // Second step consumes the first step's output.
        assert_eq!(plan.steps[1].depends_on, vec![1]);
        assert!(matches!(
            plan.steps[1].parameters.get("context"),
            Some(ParamValue::OutputRef(_))
        ));
    }

    #[test]
    fn test_single_match_is_one_step_plan() {
        let planner = WorkflowPlanner::new();
        let plan = planner
            .plan_from_request("translate this text", &catalog())
            .unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.steps[0].tool, "translate");
        assert!(plan.steps[0].depends_on.is_empty());
    }

    #[test]
    fn test_no_match_is_empty_plan_error() {
        let planner = WorkflowPlanner::new();
        let err = planner
            .plan_from_request("launch the rocket", &catalog())
            .unwrap_err();
        assert!(matches!(err, PlanError::Empty));
    }

    #[test]
    fn test_planning_is_deterministic() {
        let planner = WorkflowPlanner::new();
        let request = "search and summarize documents";
        let first = planner.plan_from_request(request, &catalog()).unwrap();
        let mut reversed = catalog();
        reversed.reverse();
        let second = planner.plan_from_request(request, &reversed).unwrap();

        let tools = |p: &WorkflowPlan| p.steps.iter().map(|s| s.tool.clone()).collect::<Vec<_>>();
        assert_eq!(tools(&first), tools(&second));
    }

    #[test]
    fn test_validate_rejects_unknown_tool() {
        let planner = WorkflowPlanner::new();
        let plan = WorkflowPlan::new(vec![WorkflowStep::new(1, "ghost", "out")]);
        assert!(matches!(
            planner.validate(&plan, &catalog()),
            Err(PlanError::UnknownTool { step: 1, .. })
        ));
    }
}
