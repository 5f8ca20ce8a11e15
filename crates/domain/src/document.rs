//! Applying operations to a JSON tree.
//!
//! These functions mutate the value they are given; callers that need
//! immutability (snapshots, plans) clone first.

use serde_json::{Map, Value};

use crate::error::PatchError;
use crate::operation::Operation;
use crate::path::{FieldPath, ItemKey};

/// Name of a JSON value's type, for error messages.
pub fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Read the value at `path`.
pub fn get_at<'a>(doc: &'a Value, path: &FieldPath) -> Option<&'a Value> {
    path.segments()
        .iter()
        .try_fold(doc, |current, seg| current.get(seg.as_str()))
}

fn get_at_mut<'a>(doc: &'a mut Value, path: &FieldPath) -> Option<&'a mut Value> {
    path.segments()
        .iter()
        .try_fold(doc, |current, seg| current.get_mut(seg.as_str()))
}

/// Treat `current` as an object, turning null into an empty object.
fn object_at<'a>(
    current: &'a mut Value,
    path: &FieldPath,
) -> Result<&'a mut Map<String, Value>, PatchError> {
    if current.is_null() {
        *current = Value::Object(Map::new());
    }
    let found = value_type_name(current);
    current
        .as_object_mut()
        .ok_or_else(|| PatchError::type_mismatch(path.clone(), "object", found))
}

/// Walk to the parent object of the last segment, creating objects on the way.
fn parent_object<'a>(
    doc: &'a mut Value,
    path: &'a FieldPath,
) -> Result<(&'a mut Map<String, Value>, &'a str), PatchError> {
    let (last, parents) = path.segments().split_last().ok_or(PatchError::EmptyPath)?;
    let mut current = doc;
    for seg in parents {
        let obj = object_at(current, path)?;
        current = obj.entry(seg.clone()).or_insert(Value::Null);
    }
    Ok((object_at(current, path)?, last.as_str()))
}

/// Set the value at `path`.
pub fn set_at(doc: &mut Value, path: &FieldPath, value: Value) -> Result<(), PatchError> {
    let (parent, last) = parent_object(doc, path)?;
    parent.insert(last.to_string(), value);
    Ok(())
}

/// Append an item (or each element of an array item) to the collection at `path`.
pub fn add_to(doc: &mut Value, path: &FieldPath, item: Value) -> Result<(), PatchError> {
    let items = match item {
        Value::Array(items) => items,
        single => vec![single],
    };
    if items.iter().any(|i| ItemKey::of(i).is_none()) {
        return Err(PatchError::UnkeyedItem { path: path.clone() });
    }

    let (parent, last) = parent_object(doc, path)?;
    let slot = parent
        .entry(last.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    if slot.is_null() {
        *slot = Value::Array(Vec::new());
    }
    let found = value_type_name(slot);
    let collection = slot.as_array_mut().ok_or_else(|| PatchError::NotACollection {
        path: path.clone(),
        found,
    })?;
    collection.extend(items);
    Ok(())
}

/// Remove every item keyed `key` from the collection at `path`.
///
/// Returns the number of removed items. A missing collection is a no-op.
pub fn remove_from(doc: &mut Value, path: &FieldPath, key: &ItemKey) -> Result<usize, PatchError> {
    let Some(slot) = get_at_mut(doc, path) else {
        return Ok(0);
    };
    if slot.is_null() {
        return Ok(0);
    }
    let found = value_type_name(slot);
    let collection = slot.as_array_mut().ok_or_else(|| PatchError::NotACollection {
        path: path.clone(),
        found,
    })?;
    let before = collection.len();
    collection.retain(|item| ItemKey::of(item).as_ref() != Some(key));
    Ok(before - collection.len())
}

/// Apply one operation in place.
pub fn apply_operation(doc: &mut Value, op: &Operation) -> Result<(), PatchError> {
    match op {
        Operation::SetField { path, value } => set_at(doc, path, value.clone()),
        Operation::AddToCollection { path, item } => add_to(doc, path, item.clone()),
        Operation::RemoveFromCollection { path, key } => remove_from(doc, path, key).map(|_| ()),
    }
}
