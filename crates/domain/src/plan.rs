//! Mutation plans: the normalized, merge-checked form of one or more patches.

use serde::Serialize;
use serde_json::Value;

use crate::document;
use crate::error::PatchError;
use crate::ids::StepId;
use crate::merge::{MergeOptions, Merger};
use crate::operation::Operation;
use crate::patch::Patch;
use crate::path::{FieldPath, ItemKey};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedSet {
    pub path: FieldPath,
    pub value: Value,
    pub source: StepId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedAdd {
    pub path: FieldPath,
    /// A single item, or an array for a batch add.
    pub item: Value,
    pub source: StepId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedRemoval {
    pub path: FieldPath,
    pub key: ItemKey,
    pub source: StepId,
}

/// Operations grouped by effect kind.
///
/// Plans are only built by the merge engine, so every plan has already been
/// normalized: applying it (sets, then deletes, then adds) gives the same
/// result as applying its source patches one operation at a time.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MutationPlan {
    set: Vec<PlannedSet>,
    delete: Vec<PlannedRemoval>,
    add: Vec<PlannedAdd>,
    sources: Vec<StepId>,
}

impl MutationPlan {
    pub(crate) fn from_parts(
        set: Vec<PlannedSet>,
        delete: Vec<PlannedRemoval>,
        add: Vec<PlannedAdd>,
        sources: Vec<StepId>,
    ) -> Self {
        Self {
            set,
            delete,
            add,
            sources,
        }
    }

    /// Normalize a single patch. Operations of one patch never conflict.
    pub fn from_patch(patch: &Patch) -> Self {
        let mut merger = Merger::new(MergeOptions::lenient());
        merger.record(0, patch);
        merger.finish()
    }

    pub fn sets(&self) -> &[PlannedSet] {
        &self.set
    }

    pub fn adds(&self) -> &[PlannedAdd] {
        &self.add
    }

    pub fn deletes(&self) -> &[PlannedRemoval] {
        &self.delete
    }

    /// Steps that contributed to this plan, in batch order.
    pub fn sources(&self) -> &[StepId] {
        &self.sources
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.add.is_empty() && self.delete.is_empty()
    }

    pub fn len(&self) -> usize {
        self.set.len() + self.add.len() + self.delete.len()
    }

    /// Final value planned for `path`, if the plan sets it directly.
    pub fn value_at(&self, path: &FieldPath) -> Option<&Value> {
        self.set
            .iter()
            .rev()
            .find(|s| &s.path == path)
            .map(|s| &s.value)
    }

    /// The plan as primitive operations in application order.
    pub fn to_operations(&self) -> Vec<Operation> {
        let sets = self
            .set
            .iter()
            .map(|s| Operation::set(s.path.clone(), s.value.clone()));
        let deletes = self
            .delete
            .iter()
            .map(|d| Operation::remove(d.path.clone(), d.key.clone()));
        let adds = self
            .add
            .iter()
            .map(|a| Operation::add(a.path.clone(), a.item.clone()));
        sets.chain(deletes).chain(adds).collect()
    }

    /// Apply the plan to a copy of `doc`. `doc` itself is left untouched.
    pub fn apply_to(&self, doc: &Value) -> Result<Value, PatchError> {
        let mut next = doc.clone();
        for op in self.to_operations() {
            document::apply_operation(&mut next, &op)?;
        }
        Ok(next)
    }
}
