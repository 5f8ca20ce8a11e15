//! Patches: ordered operations from one step.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::StepId;
use crate::operation::Operation;
use crate::path::{FieldPath, ItemKey};

/// An ordered list of operations produced by one step.
///
/// Later operations on the same field win when applied. A patch is consumed
/// once by the apply engine; it never mutates anything by itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    pub source: StepId,
    pub created_at: DateTime<Utc>,
    pub ops: Vec<Operation>,
}

impl Patch {
    pub fn new(source: impl Into<StepId>, created_at: DateTime<Utc>) -> Self {
        Self {
            source: source.into(),
            created_at,
            ops: Vec::new(),
        }
    }

    pub fn with_ops(
        source: impl Into<StepId>,
        created_at: DateTime<Utc>,
        ops: impl IntoIterator<Item = Operation>,
    ) -> Self {
        Self {
            source: source.into(),
            created_at,
            ops: ops.into_iter().collect(),
        }
    }

    pub fn set(mut self, path: FieldPath, value: impl Into<Value>) -> Self {
        self.ops.push(Operation::set(path, value));
        self
    }

    pub fn add(mut self, path: FieldPath, item: impl Into<Value>) -> Self {
        self.ops.push(Operation::add(path, item));
        self
    }

    pub fn remove(mut self, path: FieldPath, key: impl Into<ItemKey>) -> Self {
        self.ops.push(Operation::remove(path, key));
        self
    }

    pub fn push(&mut self, op: Operation) {
        self.ops.push(op);
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Distinct paths touched by this patch, in first-touch order.
    pub fn touched(&self) -> Vec<&FieldPath> {
        let mut seen: Vec<&FieldPath> = Vec::new();
        for op in &self.ops {
            if !seen.contains(&op.path()) {
                seen.push(op.path());
            }
        }
        seen
    }

    /// Equal source and operations, ignoring when the patch was created.
    pub fn is_structurally_equal(&self, other: &Patch) -> bool {
        self.source == other.source && self.ops == other.ops
    }
}
