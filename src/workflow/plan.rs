//! Workflow plan data model and structural validation.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::PlanError;

/// Prefix marking a parameter string as a reference to an earlier step's
/// output key.
const OUTPUT_REF_PREFIX: &str = "$ref:";

/// A parameter value: a literal, or a reference to an earlier step's
/// output. References serialize as strings of the form `"$ref:key"` so
/// plans stay plain JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Literal(serde_json::Value),
    OutputRef(String),
}

impl ParamValue {
    /// The referenced output key, if this is a reference.
    pub fn output_ref(&self) -> Option<&str> {
        match self {
            Self::OutputRef(key) => Some(key),
            Self::Literal(_) => None,
        }
    }
}

impl Serialize for ParamValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Literal(value) => value.serialize(serializer),
            Self::OutputRef(key) => format!("{OUTPUT_REF_PREFIX}{key}").serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for ParamValue {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        if let Some(s) = value.as_str() {
            if let Some(key) = s.strip_prefix(OUTPUT_REF_PREFIX) {
                return Ok(Self::OutputRef(key.to_string()));
            }
        }
        Ok(Self::Literal(value))
    }
}

/// One step of a workflow plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// 1-based, unique within the plan.
    pub index: usize,

    /// Tool name; resolved against the catalog at execution time.
    pub tool: String,

    /// Parameter name to value (literal or output reference).
    #[serde(default)]
    pub parameters: BTreeMap<String, ParamValue>,

    /// Indices of steps this one depends on; all must be strictly earlier.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<usize>,

    /// Name under which this step's output becomes available.
    pub output_key: String,
}

impl WorkflowStep {
    /// Create a step with no parameters or dependencies.
    pub fn new(index: usize, tool: impl Into<String>, output_key: impl Into<String>) -> Self {
        Self {
            index,
            tool: tool.into(),
            parameters: BTreeMap::new(),
            depends_on: Vec::new(),
            output_key: output_key.into(),
        }
    }

    /// Add a literal parameter.
    pub fn with_param(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.parameters
            .insert(name.into(), ParamValue::Literal(value));
        self
    }

    /// Add a parameter referencing an earlier step's output key.
    pub fn with_ref_param(mut self, name: impl Into<String>, key: impl Into<String>) -> Self {
        self.parameters
            .insert(name.into(), ParamValue::OutputRef(key.into()));
        self
    }

    /// Add a dependency on an earlier step index.
    pub fn depends_on_step(mut self, index: usize) -> Self {
        self.depends_on.push(index);
        self
    }
}

/// An ordered, dependency-constrained sequence of steps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowPlan {
    pub steps: Vec<WorkflowStep>,
}

impl WorkflowPlan {
    /// Create a plan from steps.
    pub fn new(steps: Vec<WorkflowStep>) -> Self {
        Self { steps }
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the plan has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Validate structural invariants:
    /// step indices unique, dependencies strictly backward, output keys
    /// unique, and every output reference resolvable by an earlier step.
    pub fn validate(&self) -> Result<(), PlanError> {
        if self.steps.is_empty() {
            return Err(PlanError::Empty);
        }

        let mut seen_indices = HashSet::new();
        let mut seen_keys = HashSet::new();

        for step in &self.steps {
            if !seen_indices.insert(step.index) {
                return Err(PlanError::DuplicateStepIndex { index: step.index });
            }
            if !seen_keys.insert(step.output_key.clone()) {
                return Err(PlanError::DuplicateOutputKey {
                    key: step.output_key.clone(),
                });
            }
        }

        // Keys produced strictly before each step, walking in plan order.
        let mut earlier_keys: HashSet<&str> = HashSet::new();
        let mut earlier_indices: HashSet<usize> = HashSet::new();

        for step in &self.steps {
            for &dep in &step.depends_on {
                if dep >= step.index || !earlier_indices.contains(&dep) {
                    return Err(PlanError::ForwardDependency {
                        step: step.index,
                        dependency: dep,
                    });
                }
            }

            for value in step.parameters.values() {
                if let Some(key) = value.output_ref() {
                    if !earlier_keys.contains(key) {
                        return Err(PlanError::UnknownOutputKey {
                            step: step.index,
                            key: key.to_string(),
                        });
                    }
                }
            }

            earlier_keys.insert(&step.output_key);
            earlier_indices.insert(step.index);
        }

        Ok(())
    }

    /// Steps that transitively depend on the given step index.
    pub fn transitive_dependents(&self, index: usize) -> HashSet<usize> {
        let mut affected = HashSet::new();
        affected.insert(index);

        // Plan order guarantees dependencies precede dependents, so one
        // forward pass closes the set.
        for step in &self.steps {
            if step.depends_on.iter().any(|d| affected.contains(d)) {
                affected.insert(step.index);
            }
        }

        affected.remove(&index);
        affected
    }
}
