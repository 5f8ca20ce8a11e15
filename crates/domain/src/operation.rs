//! Primitive operations a patch is made of.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::path::{FieldPath, ItemKey};

/// A single primitive change to the character tree.
///
/// Operations are plain data: comparable, serializable and replayable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// Replace the value at `path`, creating intermediate objects as needed.
    SetField { path: FieldPath, value: Value },

    /// Append `item` to the collection at `path`.
    ///
    /// An array item is a batch: each element is appended in order.
    AddToCollection { path: FieldPath, item: Value },

    /// Remove every item whose logical key equals `key`.
    RemoveFromCollection { path: FieldPath, key: ItemKey },
}

/// Effect group of an operation inside a mutation plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Set,
    Add,
    Delete,
}

impl Operation {
    pub fn set(path: FieldPath, value: impl Into<Value>) -> Self {
        Self::SetField {
            path,
            value: value.into(),
        }
    }

    pub fn add(path: FieldPath, item: impl Into<Value>) -> Self {
        Self::AddToCollection {
            path,
            item: item.into(),
        }
    }

    pub fn remove(path: FieldPath, key: impl Into<ItemKey>) -> Self {
        Self::RemoveFromCollection {
            path,
            key: key.into(),
        }
    }

    pub fn path(&self) -> &FieldPath {
        match self {
            Self::SetField { path, .. }
            | Self::AddToCollection { path, .. }
            | Self::RemoveFromCollection { path, .. } => path,
        }
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Self::SetField { .. } => OperationKind::Set,
            Self::AddToCollection { .. } => OperationKind::Add,
            Self::RemoveFromCollection { .. } => OperationKind::Delete,
        }
    }

    /// Logical keys of the collection items this operation touches.
    ///
    /// Empty for `SetField` and for unkeyed items.
    pub fn item_keys(&self) -> Vec<ItemKey> {
        match self {
            Self::SetField { .. } => Vec::new(),
            Self::AddToCollection { item, .. } => match item {
                Value::Array(items) => items.iter().filter_map(ItemKey::of).collect(),
                other => ItemKey::of(other).into_iter().collect(),
            },
            Self::RemoveFromCollection { key, .. } => vec![key.clone()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;
    use serde_json::json;

    #[test]
    fn operations_serialize_with_op_tag() {
        let op = Operation::set(path!("hp", "max"), 12);
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json, json!({"op": "set_field", "path": "hp.max", "value": 12}));

        let remove = Operation::remove(path!("feats"), "Dodge");
        let json = serde_json::to_value(&remove).unwrap();
        assert_eq!(
            json,
            json!({"op": "remove_from_collection", "path": "feats", "key": "dodge"})
        );

        let back: Operation = serde_json::from_value(json).unwrap();
        assert_eq!(back, remove);
    }

    #[test]
    fn batch_add_exposes_every_key() {
        let op = Operation::add(path!("languages"), json!(["Basic", "Shyriiwook"]));
        assert_eq!(op.kind(), OperationKind::Add);
        assert_eq!(
            op.item_keys(),
            vec![ItemKey::new("basic"), ItemKey::new("shyriiwook")]
        );

        let empty = Operation::add(path!("languages"), json!([]));
        assert!(empty.item_keys().is_empty());
    }
}
