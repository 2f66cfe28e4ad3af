//! # Workflow Templates
//!
//! A template is the ordered task graph for one service/obligation type.
//! The upstream product encoded dependencies as ad-hoc lists of string
//! keys re-resolved on every execution; here the graph is built and
//! validated exactly once at registration. Cycles, dangling references,
//! duplicate keys, and empty templates are rejected before any run exists.

use std::collections::{HashMap, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};

use vigil_core::TemplateId;

use crate::error::WorkflowError;

// ---------------------------------------------------------------------------
// StepKey, StepType, Priority
// ---------------------------------------------------------------------------

/// A step's key, unique within its template.
///
/// # Validation
///
/// Non-empty after trimming. Keys are caller-chosen mnemonic strings
/// ("collect_documents", "qa_review").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct StepKey(String);

impl StepKey {
    /// Create a step key, validating non-emptiness.
    pub fn new(value: impl Into<String>) -> Result<Self, WorkflowError> {
        let trimmed = value.into().trim().to_string();
        if trimmed.is_empty() {
            return Err(WorkflowError::InvalidStepKey);
        }
        Ok(Self(trimmed))
    }

    /// Access the key string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for StepKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::new(raw).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for StepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What kind of work a step represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    /// Internal ops-team task.
    OpsTask,
    /// Task the client must perform (e.g. upload a document).
    ClientTask,
    /// Quality review gate before the obligation can close.
    QaReview,
    /// Automated step; may be skipped when its precondition is false.
    Automated,
}

/// Step priority, used as the primary queue ordering key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
    Critical,
}

impl Priority {
    /// Numeric rank: critical=5 … low=1.
    pub fn rank(self) -> u8 {
        match self {
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
            Self::Urgent => 4,
            Self::Critical => 5,
        }
    }
}

// ---------------------------------------------------------------------------
// StepDefinition & WorkflowTemplate
// ---------------------------------------------------------------------------

/// One step in a workflow template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDefinition {
    pub key: StepKey,
    pub name: String,
    pub step_type: StepType,
    /// Keys of steps that must be done before this one becomes ready.
    pub depends_on: Vec<StepKey>,
    /// Days allotted once the step becomes ready.
    pub sla_days: u32,
    pub priority: Priority,
    /// Documents that must be attached before completion.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_documents: Vec<String>,
}

/// A validated workflow template: explicit nodes plus upstream/downstream
/// edge maps, built once at registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowTemplate {
    pub id: TemplateId,
    /// Service / obligation type this template fulfils.
    pub service: String,
    pub version: u32,
    steps: Vec<StepDefinition>,
    /// Deterministic topological order (Kahn with insertion-order
    /// tie-breaking).
    topo_order: Vec<StepKey>,
    downstream: HashMap<StepKey, Vec<StepKey>>,
}

impl WorkflowTemplate {
    /// Build and validate a template.
    ///
    /// Validation order: empty template, duplicate keys, self/dangling
    /// dependencies, then cycle detection via Kahn's algorithm with
    /// insertion-order tie-breaking for a reproducible topo order.
    ///
    /// # Errors
    ///
    /// Any [`WorkflowError`] validation variant; a failed template is
    /// never registered, so no run can be created from it.
    pub fn build(
        service: impl Into<String>,
        version: u32,
        steps: Vec<StepDefinition>,
    ) -> Result<Self, WorkflowError> {
        if steps.is_empty() {
            return Err(WorkflowError::EmptyTemplate);
        }

        let mut seen: HashMap<&StepKey, usize> = HashMap::with_capacity(steps.len());
        for step in &steps {
            if seen.insert(&step.key, 0).is_some() {
                return Err(WorkflowError::DuplicateStepKey(step.key.clone()));
            }
        }

        let mut in_degree: HashMap<StepKey, usize> = HashMap::with_capacity(steps.len());
        let mut downstream: HashMap<StepKey, Vec<StepKey>> = HashMap::with_capacity(steps.len());
        for step in &steps {
            in_degree.entry(step.key.clone()).or_insert(0);
            downstream.entry(step.key.clone()).or_default();
        }
        for step in &steps {
            for dep in &step.depends_on {
                if dep == &step.key {
                    return Err(WorkflowError::SelfDependency(step.key.clone()));
                }
                if !downstream.contains_key(dep) {
                    return Err(WorkflowError::UnknownDependency {
                        step: step.key.clone(),
                        dependency: dep.clone(),
                    });
                }
                if let Some(dependents) = downstream.get_mut(dep) {
                    dependents.push(step.key.clone());
                }
                *in_degree.entry(step.key.clone()).or_insert(0) += 1;
            }
        }

        // Kahn's algorithm; seed queue in declaration order so the topo
        // order is reproducible across runs.
        let mut queue: VecDeque<StepKey> = steps
            .iter()
            .filter(|s| in_degree[&s.key] == 0)
            .map(|s| s.key.clone())
            .collect();
        let mut topo_order = Vec::with_capacity(steps.len());
        while let Some(key) = queue.pop_front() {
            topo_order.push(key.clone());
            for next in &downstream[&key] {
                let deg = in_degree
                    .get_mut(next)
                    .ok_or_else(|| WorkflowError::UnknownStep(next.clone()))?;
                *deg -= 1;
                if *deg == 0 {
                    queue.push_back(next.clone());
                }
            }
        }
        if topo_order.len() != steps.len() {
            let mut remaining: Vec<StepKey> = in_degree
                .into_iter()
                .filter(|(_, deg)| *deg > 0)
                .map(|(key, _)| key)
                .collect();
            remaining.sort();
            return Err(WorkflowError::CycleDetected(remaining));
        }

        Ok(Self {
            id: TemplateId::new(),
            service: service.into(),
            version,
            steps,
            topo_order,
            downstream,
        })
    }

    /// All steps, in declaration order.
    pub fn steps(&self) -> &[StepDefinition] {
        &self.steps
    }

    /// Look up a step definition by key.
    pub fn step(&self, key: &StepKey) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| &s.key == key)
    }

    /// Deterministic topological order.
    pub fn topo_order(&self) -> &[StepKey] {
        &self.topo_order
    }

    /// Steps that depend on `key`.
    pub fn dependents(&self, key: &StepKey) -> &[StepKey] {
        self.downstream.get(key).map(Vec::as_slice).unwrap_or(&[])
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> StepKey {
        StepKey::new(s).unwrap()
    }

    fn step(k: &str, deps: &[&str]) -> StepDefinition {
        StepDefinition {
            key: key(k),
            name: k.to_string(),
            step_type: StepType::OpsTask,
            depends_on: deps.iter().map(|d| key(d)).collect(),
            sla_days: 2,
            priority: Priority::Medium,
            required_documents: vec![],
        }
    }

    #[test]
    fn linear_chain_builds_in_order() {
        let t = WorkflowTemplate::build(
            "gst_filing",
            1,
            vec![step("collect", &[]), step("prepare", &["collect"]), step("file", &["prepare"])],
        )
        .unwrap();
        assert_eq!(
            t.topo_order(),
            &[key("collect"), key("prepare"), key("file")]
        );
        assert_eq!(t.dependents(&key("collect")), &[key("prepare")]);
    }

    #[test]
    fn diamond_builds_deterministically() {
        let t = WorkflowTemplate::build(
            "svc",
            1,
            vec![
                step("a", &[]),
                step("b", &["a"]),
                step("c", &["a"]),
                step("d", &["b", "c"]),
            ],
        )
        .unwrap();
        // b before c because of declaration order, never the reverse.
        assert_eq!(t.topo_order(), &[key("a"), key("b"), key("c"), key("d")]);
    }

    #[test]
    fn two_step_cycle_rejected() {
        let err = WorkflowTemplate::build(
            "svc",
            1,
            vec![step("a", &["b"]), step("b", &["a"])],
        )
        .unwrap_err();
        assert_eq!(
            err,
            WorkflowError::CycleDetected(vec![key("a"), key("b")])
        );
    }

    #[test]
    fn self_dependency_rejected() {
        let err = WorkflowTemplate::build("svc", 1, vec![step("a", &["a"])]).unwrap_err();
        assert_eq!(err, WorkflowError::SelfDependency(key("a")));
    }

    #[test]
    fn dangling_dependency_rejected() {
        let err =
            WorkflowTemplate::build("svc", 1, vec![step("a", &[]), step("b", &["ghost"])])
                .unwrap_err();
        assert_eq!(
            err,
            WorkflowError::UnknownDependency {
                step: key("b"),
                dependency: key("ghost"),
            }
        );
    }

    #[test]
    fn duplicate_key_rejected() {
        let err =
            WorkflowTemplate::build("svc", 1, vec![step("a", &[]), step("a", &[])]).unwrap_err();
        assert_eq!(err, WorkflowError::DuplicateStepKey(key("a")));
    }

    #[test]
    fn empty_template_rejected() {
        assert_eq!(
            WorkflowTemplate::build("svc", 1, vec![]).unwrap_err(),
            WorkflowError::EmptyTemplate
        );
    }

    #[test]
    fn priority_ranks() {
        assert_eq!(Priority::Critical.rank(), 5);
        assert_eq!(Priority::Low.rank(), 1);
        assert!(Priority::Critical.rank() > Priority::High.rank());
    }

    #[test]
    fn step_key_rejects_empty() {
        assert!(StepKey::new("  ").is_err());
    }

    proptest::proptest! {
        /// Any graph whose steps only depend on earlier declarations is
        /// acyclic by construction and must always validate, with every
        /// step appearing after all of its dependencies in the topo order.
        #[test]
        fn forward_only_dependency_graphs_always_validate(
            edges in proptest::collection::vec(
                proptest::collection::vec(proptest::bool::ANY, 8),
                1..8,
            ),
        ) {
            let steps: Vec<StepDefinition> = edges
                .iter()
                .enumerate()
                .map(|(i, row)| StepDefinition {
                    key: StepKey::new(format!("s{i}")).unwrap(),
                    name: format!("s{i}"),
                    step_type: StepType::OpsTask,
                    depends_on: row
                        .iter()
                        .enumerate()
                        .filter(|(j, &on)| *j < i && on)
                        .map(|(j, _)| StepKey::new(format!("s{j}")).unwrap())
                        .collect(),
                    sla_days: 1,
                    priority: Priority::Low,
                    required_documents: vec![],
                })
                .collect();
            let template = WorkflowTemplate::build("svc", 1, steps).unwrap();
            let order = template.topo_order();
            proptest::prop_assert_eq!(order.len(), edges.len());
            for s in template.steps() {
                let pos = order.iter().position(|k| k == &s.key).unwrap();
                for dep in &s.depends_on {
                    let dep_pos = order.iter().position(|k| k == dep).unwrap();
                    proptest::prop_assert!(dep_pos < pos);
                }
            }
        }
    }

    #[test]
    fn template_serde_roundtrip_preserves_graph() {
        let t = WorkflowTemplate::build(
            "svc",
            1,
            vec![step("a", &[]), step("b", &["a"])],
        )
        .unwrap();
        let json = serde_json::to_string(&t).unwrap();
        let back: WorkflowTemplate = serde_json::from_str(&json).unwrap();
        assert_eq!(back.topo_order(), t.topo_order());
        assert_eq!(back.dependents(&key("a")), t.dependents(&key("a")));
    }
}
