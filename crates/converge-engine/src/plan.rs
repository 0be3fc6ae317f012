//! Turns change sets into an ordered list of mutation steps.

use std::num::NonZeroUsize;

use converge_config::BatchSettings;
use converge_core::{BatchPlan, ChangeSet, DesiredState};
use converge_remote::Member;
use serde_json::Value;

/// Concern name for member removals.
pub const DISASSOCIATE_CONCERN: &str = "members:disassociate";
/// Concern name for member additions and replacements.
pub const ASSOCIATE_CONCERN: &str = "members:associate";

/// Per-call item limits for batch member calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    pub associate: NonZeroUsize,
    pub disassociate: NonZeroUsize,
}

impl Default for BatchLimits {
    fn default() -> Self {
        BatchLimits::from(&BatchSettings::default())
    }
}

impl From<&BatchSettings> for BatchLimits {
    fn from(settings: &BatchSettings) -> Self {
        Self {
            associate: settings.associate_limit(),
            disassociate: settings.disassociate_limit(),
        }
    }
}

/// One mutating step against a single resource.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationStep {
    /// Set (or with `Value::Null`, clear) one attribute concern.
    Update { concern: String, value: Value },
    /// Add or replace members, chunked.
    Associate(BatchPlan<Member>),
    /// Remove members by key, chunked.
    Disassociate(BatchPlan<String>),
}

impl MutationStep {
    pub fn concern(&self) -> &str {
        match self {
            Self::Update { concern, .. } => concern,
            Self::Associate(_) => ASSOCIATE_CONCERN,
            Self::Disassociate(_) => DISASSOCIATE_CONCERN,
        }
    }

    /// Number of remote calls this step issues when nothing fails.
    pub fn call_count(&self) -> usize {
        match self {
            Self::Update { .. } => 1,
            Self::Associate(plan) => plan.len(),
            Self::Disassociate(plan) => plan.len(),
        }
    }
}

/// Ordered steps for one pass: attribute concerns in desired order, then
/// member removals, then member additions and replacements.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutationPlan {
    steps: Vec<MutationStep>,
}

impl MutationPlan {
    /// Builds the plan.
    ///
    /// Attribute keys in `attributes.to_remove` are ignored: attributes present
    /// remotely but not declared locally are left alone.
    pub fn build(
        attributes: &ChangeSet<String>,
        desired_attributes: &DesiredState<String, Value>,
        members: &ChangeSet<String>,
        desired_members: &DesiredState<String, Value>,
        limits: BatchLimits,
    ) -> Self {
        let mut steps = Vec::new();

        for (concern, value) in desired_attributes.iter() {
            if attributes.to_add.contains(concern) || attributes.to_modify.contains(concern) {
                steps.push(MutationStep::Update {
                    concern: concern.clone(),
                    value: value.clone(),
                });
            }
        }

        if !members.to_remove.is_empty() {
            steps.push(MutationStep::Disassociate(BatchPlan::chunk(
                members.to_remove.iter().cloned(),
                limits.disassociate,
            )));
        }

        let upserts: Vec<Member> = desired_members
            .iter()
            .filter(|(key, _)| members.to_add.contains(key) || members.to_modify.contains(key))
            .map(|(key, value)| Member::new(key.clone(), value.clone()))
            .collect();
        if !upserts.is_empty() {
            steps.push(MutationStep::Associate(BatchPlan::chunk(upserts, limits.associate)));
        }

        Self { steps }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn steps(&self) -> &[MutationStep] {
        &self.steps
    }

    pub fn into_steps(self) -> Vec<MutationStep> {
        self.steps
    }

    /// Total remote calls the plan issues when nothing fails.
    pub fn call_count(&self) -> usize {
        self.steps.iter().map(MutationStep::call_count).sum()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::diff::diff;
    use converge_core::ObservedState;

    fn limits(n: usize) -> BatchLimits {
        let n = NonZeroUsize::new(n).unwrap();
        BatchLimits {
            associate: n,
            disassociate: n,
        }
    }

    fn state(pairs: &[(&str, Value)]) -> DesiredState<String, Value> {
        DesiredState::try_from_pairs(pairs.iter().map(|(k, v)| (k.to_string(), v.clone()))).unwrap()
    }

    #[test]
    fn test_plan_order_and_chunking() {
        let desired_attrs = state(&[
            ("description", json!("edge")),
            ("routing", json!({"mode": "weighted"})),
            ("logging", json!(true)),
        ]);
        let observed_attrs = ObservedState::from_pairs([
            ("description".to_string(), json!("old")),
            ("logging".to_string(), json!(true)),
            ("arn".to_string(), json!("computed")),
        ]);
        let desired_members = state(&[
            ("a", json!(1)),
            ("b", json!(2)),
            ("c", json!(3)),
        ]);
        let observed_members = ObservedState::from_pairs([
            ("b".to_string(), json!(20)),
            ("x".to_string(), json!(0)),
            ("y".to_string(), json!(0)),
            ("z".to_string(), json!(0)),
        ]);

        let plan = MutationPlan::build(
            &diff(&desired_attrs, &observed_attrs),
            &desired_attrs,
            &diff(&desired_members, &observed_members),
            &desired_members,
            limits(2),
        );

        let concerns: Vec<&str> = plan.steps().iter().map(MutationStep::concern).collect();
        assert_eq!(
            concerns,
            vec!["description", "routing", DISASSOCIATE_CONCERN, ASSOCIATE_CONCERN]
        );

        match &plan.steps()[2] {
            MutationStep::Disassociate(batch) => {
                assert_eq!(batch.len(), 2);
                assert_eq!(batch.clone().concat(), vec!["x", "y", "z"]);
            }
            other => panic!("unexpected step {other:?}"),
        }
        match &plan.steps()[3] {
            MutationStep::Associate(batch) => {
                let keys: Vec<String> = batch.clone().concat().into_iter().map(|m| m.key).collect();
                assert_eq!(keys, vec!["a", "b", "c"]);
            }
            other => panic!("unexpected step {other:?}"),
        }
        // two updates, two disassociate chunks, two associate chunks
        assert_eq!(plan.call_count(), 6);
    }

    #[test]
    fn test_noop_plan_is_empty() {
        let attrs = state(&[("description", json!("edge"))]);
        let observed = ObservedState::from_pairs([("description".to_string(), json!("edge"))]);
        let plan = MutationPlan::build(
            &diff(&attrs, &observed),
            &attrs,
            &ChangeSet::new(),
            &DesiredState::new(),
            BatchLimits::default(),
        );
        assert!(plan.is_empty());
        assert_eq!(plan.call_count(), 0);
    }
}
