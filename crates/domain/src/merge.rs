//! Merge engine: combine patches from several steps into one mutation plan.
//!
//! Merging is purely structural. It never consults rules; it only decides
//! whether two patches contradict each other and how their operations
//! collapse into a [`MutationPlan`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ConflictError, ConflictTarget};
use crate::ids::StepId;
use crate::operation::Operation;
use crate::patch::Patch;
use crate::path::{FieldPath, ItemKey};
use crate::plan::{MutationPlan, PlannedAdd, PlannedRemoval, PlannedSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOptions {
    /// When false, the last writer wins silently.
    pub detect_conflicts: bool,
}

impl MergeOptions {
    pub fn strict() -> Self {
        Self {
            detect_conflicts: true,
        }
    }

    pub fn lenient() -> Self {
        Self {
            detect_conflicts: false,
        }
    }
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self::strict()
    }
}

/// Merge `patches` in input order.
///
/// With conflict detection on, the first contradiction found is returned:
/// two patches setting overlapping fields to different values, one patch
/// adding an item another removes, or one patch replacing a collection
/// another edits item by item. Operations from the same patch never
/// conflict with each other.
pub fn merge(patches: &[Patch], options: MergeOptions) -> Result<MutationPlan, ConflictError> {
    let mut merger = Merger::new(options);
    for (index, patch) in patches.iter().enumerate() {
        merger.push(index, patch)?;
    }
    Ok(merger.finish())
}

/// An entry tagged with the index of the patch it came from.
///
/// The index, not the step id, identifies the source: two patches from the
/// same step submitted in one batch are still different sources.
#[derive(Debug, Clone)]
struct Sourced<T> {
    patch: usize,
    entry: T,
}

pub(crate) struct Merger {
    options: MergeOptions,
    set: Vec<Sourced<PlannedSet>>,
    delete: Vec<Sourced<PlannedRemoval>>,
    add: Vec<Sourced<PlannedAdd>>,
    sources: Vec<StepId>,
}

impl Merger {
    pub(crate) fn new(options: MergeOptions) -> Self {
        Self {
            options,
            set: Vec::new(),
            delete: Vec::new(),
            add: Vec::new(),
            sources: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, index: usize, patch: &Patch) -> Result<(), ConflictError> {
        if self.options.detect_conflicts {
            // Check each op against what earlier patches recorded, then
            // record the whole patch. Ops of this patch never see each other.
            for op in &patch.ops {
                self.check(index, &patch.source, op)?;
            }
        }
        self.record(index, patch);
        Ok(())
    }

    /// Fold a patch into the plan without conflict checks.
    pub(crate) fn record(&mut self, index: usize, patch: &Patch) {
        if !self.sources.contains(&patch.source) {
            self.sources.push(patch.source.clone());
        }
        for op in &patch.ops {
            match op {
                Operation::SetField { path, value } => {
                    self.record_set(index, &patch.source, path, value)
                }
                Operation::AddToCollection { path, item } => {
                    self.add.push(Sourced {
                        patch: index,
                        entry: PlannedAdd {
                            path: path.clone(),
                            item: item.clone(),
                            source: patch.source.clone(),
                        },
                    });
                }
                Operation::RemoveFromCollection { path, key } => {
                    self.record_delete(index, &patch.source, path, key)
                }
            }
        }
    }

    pub(crate) fn finish(self) -> MutationPlan {
        MutationPlan::from_parts(
            self.set.into_iter().map(|s| s.entry).collect(),
            self.delete.into_iter().map(|d| d.entry).collect(),
            self.add.into_iter().map(|a| a.entry).collect(),
            self.sources,
        )
    }

    fn record_set(&mut self, index: usize, source: &StepId, path: &FieldPath, value: &Value) {
        // Last writer wins: a re-set moves to the end so it is applied after
        // any nested sets recorded in between.
        self.set.retain(|s| &s.entry.path != path);
        // A set replaces whatever collection edits happened at or below it.
        self.add.retain(|a| !covers(path, &a.entry.path));
        self.delete.retain(|d| !covers(path, &d.entry.path));
        self.set.push(Sourced {
            patch: index,
            entry: PlannedSet {
                path: path.clone(),
                value: value.clone(),
                source: source.clone(),
            },
        });
    }

    fn record_delete(&mut self, index: usize, source: &StepId, path: &FieldPath, key: &ItemKey) {
        // Deletes run before adds, so drop earlier adds of the same item.
        self.add.retain_mut(|a| {
            if &a.entry.path != path {
                return true;
            }
            match &mut a.entry.item {
                Value::Array(items) => {
                    let before = items.len();
                    items.retain(|item| ItemKey::of(item).as_ref() != Some(key));
                    before == 0 || !items.is_empty()
                }
                single => ItemKey::of(single).as_ref() != Some(key),
            }
        });
        self.delete.push(Sourced {
            patch: index,
            entry: PlannedRemoval {
                path: path.clone(),
                key: key.clone(),
                source: source.clone(),
            },
        });
    }

    fn check(&self, index: usize, source: &StepId, op: &Operation) -> Result<(), ConflictError> {
        let conflict = |target: ConflictTarget, first: &StepId| ConflictError {
            target,
            first_step: first.clone(),
            second_step: source.clone(),
        };

        match op {
            Operation::SetField { path, value } => {
                for earlier in self.set.iter().filter(|s| s.patch != index) {
                    let other = &earlier.entry;
                    if let Some(at) = contradicting_sets(&other.path, &other.value, path, value) {
                        return Err(conflict(ConflictTarget::Path(at), &other.source));
                    }
                }
                for earlier in self.add.iter().filter(|a| a.patch != index) {
                    let other = &earlier.entry;
                    if other.path.overlaps(path) && !is_empty_batch(&other.item) {
                        return Err(conflict(
                            ConflictTarget::Collection(other.path.clone()),
                            &other.source,
                        ));
                    }
                }
                for earlier in self.delete.iter().filter(|d| d.patch != index) {
                    let other = &earlier.entry;
                    if other.path.overlaps(path) {
                        return Err(conflict(
                            ConflictTarget::Collection(other.path.clone()),
                            &other.source,
                        ));
                    }
                }
            }
            Operation::AddToCollection { path, item } => {
                if is_empty_batch(item) {
                    return Ok(());
                }
                if let Some(other) = self.overlapping_set(index, path) {
                    return Err(conflict(ConflictTarget::Collection(path.clone()), other));
                }
                let keys = op.item_keys();
                let removed = self.delete.iter().find(|d| {
                    d.patch != index && &d.entry.path == path && keys.contains(&d.entry.key)
                });
                if let Some(earlier) = removed {
                    return Err(conflict(
                        ConflictTarget::Collection(path.clone()),
                        &earlier.entry.source,
                    ));
                }
            }
            Operation::RemoveFromCollection { path, key } => {
                if let Some(other) = self.overlapping_set(index, path) {
                    return Err(conflict(ConflictTarget::Collection(path.clone()), other));
                }
                let added = self.add.iter().find(|a| {
                    a.patch != index
                        && &a.entry.path == path
                        && Operation::add(path.clone(), a.entry.item.clone())
                            .item_keys()
                            .contains(key)
                });
                if let Some(earlier) = added {
                    return Err(conflict(
                        ConflictTarget::Collection(path.clone()),
                        &earlier.entry.source,
                    ));
                }
            }
        }
        Ok(())
    }

    fn overlapping_set(&self, index: usize, path: &FieldPath) -> Option<&StepId> {
        self.set
            .iter()
            .find(|s| s.patch != index && s.entry.path.overlaps(path))
            .map(|s| &s.entry.source)
    }
}

/// True when a set at `set_path` replaces the collection at `collection`.
fn covers(set_path: &FieldPath, collection: &FieldPath) -> bool {
    set_path == collection || set_path.is_prefix_of(collection)
}

fn is_empty_batch(item: &Value) -> bool {
    matches!(item, Value::Array(items) if items.is_empty())
}

/// Path at which two sets disagree, if they overlap and disagree.
fn contradicting_sets(
    a_path: &FieldPath,
    a_value: &Value,
    b_path: &FieldPath,
    b_value: &Value,
) -> Option<FieldPath> {
    if a_path == b_path {
        return (a_value != b_value).then(|| b_path.clone());
    }
    if let Some(suffix) = a_path.suffix_of(b_path) {
        return (nested(a_value, suffix) != Some(b_value)).then(|| b_path.clone());
    }
    if let Some(suffix) = b_path.suffix_of(a_path) {
        return (nested(b_value, suffix) != Some(a_value)).then(|| a_path.clone());
    }
    None
}

fn nested<'a>(value: &'a Value, suffix: &[String]) -> Option<&'a Value> {
    suffix
        .iter()
        .try_fold(value, |current, seg| current.get(seg.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;
    use chrono::Utc;
    use serde_json::json;

    fn patch(step: &str) -> Patch {
        Patch::new(step, Utc::now())
    }

    #[test]
    fn differing_sets_conflict_only_when_detecting() {
        let p1 = patch("species").set(path!("hp", "max"), 10);
        let p2 = patch("class").set(path!("hp", "max"), 12);

        let err = merge(&[p1.clone(), p2.clone()], MergeOptions::strict()).unwrap_err();
        assert_eq!(err.path(), Some(&path!("hp", "max")));
        assert_eq!(err.first_step, StepId::from("species"));
        assert_eq!(err.second_step, StepId::from("class"));

        let plan = merge(&[p1, p2], MergeOptions::lenient()).unwrap();
        assert_eq!(plan.value_at(&path!("hp", "max")), Some(&json!(12)));
        assert_eq!(plan.sets().len(), 1);
    }

    #[test]
    fn equal_sets_from_different_steps_do_not_conflict() {
        let p1 = patch("species").set(path!("size"), "medium");
        let p2 = patch("template").set(path!("size"), "medium");
        let plan = merge(&[p1, p2], MergeOptions::strict()).unwrap();
        assert_eq!(plan.sets().len(), 1);
        assert_eq!(plan.sets()[0].source, StepId::from("template"));
    }

    #[test]
    fn add_and_remove_of_same_item_is_a_collection_conflict() {
        let p1 = patch("feats").add(path!("feats"), json!({"name": "Dodge"}));
        let p2 = patch("class").remove(path!("feats"), "Dodge");

        let err = merge(&[p1.clone(), p2.clone()], MergeOptions::strict()).unwrap_err();
        assert_eq!(err.collection(), Some(&path!("feats")));

        let reversed = merge(&[p2, p1], MergeOptions::strict()).unwrap_err();
        assert_eq!(reversed.collection(), Some(&path!("feats")));
    }

    #[test]
    fn same_patch_never_conflicts_with_itself() {
        let p = patch("feats")
            .set(path!("hp", "max"), 10)
            .set(path!("hp", "max"), 12)
            .add(path!("feats"), "Dodge")
            .remove(path!("feats"), "Dodge");

        let plan = merge(&[p], MergeOptions::strict()).unwrap();
        assert_eq!(plan.value_at(&path!("hp", "max")), Some(&json!(12)));
        assert!(plan.adds().is_empty());
        assert_eq!(plan.deletes().len(), 1);
    }

    #[test]
    fn two_patches_from_the_same_step_are_still_distinct_sources() {
        let p1 = patch("class").set(path!("talentsRequired"), 1);
        let p2 = patch("class").set(path!("talentsRequired"), 2);
        assert!(merge(&[p1, p2], MergeOptions::strict()).is_err());
    }

    #[test]
    fn overlapping_paths_conflict_when_nested_values_differ() {
        let p1 = patch("species").set(path!("hp"), json!({"max": 10, "value": 10}));
        let agrees = patch("class").set(path!("hp", "max"), 10);
        let disagrees = patch("class").set(path!("hp", "max"), 12);

        assert!(merge(&[p1.clone(), agrees], MergeOptions::strict()).is_ok());
        let err = merge(&[p1, disagrees], MergeOptions::strict()).unwrap_err();
        assert_eq!(err.path(), Some(&path!("hp", "max")));
    }

    #[test]
    fn replacing_a_collection_another_step_edits_conflicts() {
        let p1 = patch("species").add(path!("languages"), "Shyriiwook");
        let p2 = patch("background").set(path!("languages"), json!(["Basic"]));
        let err = merge(&[p1.clone(), p2.clone()], MergeOptions::strict()).unwrap_err();
        assert_eq!(err.collection(), Some(&path!("languages")));

        // Leniently the later set wins and the earlier add is superseded.
        let plan = merge(&[p1, p2], MergeOptions::lenient()).unwrap();
        assert!(plan.adds().is_empty());
    }

    #[test]
    fn empty_batch_add_touches_nothing() {
        let a = patch("background")
            .set(path!("background"), "soldier")
            .add(path!("languages"), json!([]));
        let b = patch("class").set(path!("languages"), json!(["Basic"]));
        assert!(merge(&[a, b], MergeOptions::strict()).is_ok());
    }

    #[test]
    fn disjoint_patches_merge_in_order() {
        let a = patch("background")
            .set(path!("background"), "soldier")
            .add(path!("languages"), json!([]));
        let b = patch("class")
            .set(path!("classes"), json!([{"name": "Soldier", "level": 1}]))
            .set(path!("talentsRequired"), 1);

        let plan = merge(&[a, b], MergeOptions::default()).unwrap();
        let paths: Vec<String> = plan.sets().iter().map(|s| s.path.to_string()).collect();
        assert_eq!(paths, vec!["background", "classes", "talentsRequired"]);
        assert_eq!(
            plan.sources(),
            &[StepId::from("background"), StepId::from("class")]
        );
    }

    #[test]
    fn merge_is_deterministic() {
        let batch = vec![
            patch("species").set(path!("species"), "wookiee"),
            patch("feats").add(path!("feats"), json!(["Dodge", "Toughness"])),
            patch("languages").remove(path!("languages"), "Huttese"),
        ];
        let first = merge(&batch, MergeOptions::strict()).unwrap();
        let second = merge(&batch, MergeOptions::strict()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }
}
