//! The in-progress character value.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::document;
use crate::error::PatchError;
use crate::ids::StepId;
use crate::patch::Patch;
use crate::path::{FieldPath, ItemKey};
use crate::plan::MutationPlan;

/// The six ability keys, in sheet order.
pub const ABILITIES: [&str; 6] = ["str", "dex", "con", "int", "wis", "cha"];

/// Immutable character-in-progress.
///
/// Every change goes through [`Snapshot::apply`] or [`Snapshot::apply_plan`],
/// which return a new snapshot and leave `self` untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(Value);

impl Snapshot {
    /// The default tree a builder starts from.
    pub fn empty() -> Self {
        let ability = json!({"base": 10, "racial": 0, "temp": 0, "total": 10, "mod": 0});
        let abilities: serde_json::Map<String, Value> = ABILITIES
            .iter()
            .map(|a| ((*a).to_string(), ability.clone()))
            .collect();

        Self(json!({
            "name": "",
            "species": null,
            "template": null,
            "size": "medium",
            "classes": [],
            "abilities": abilities,
            "skills": {"trained": []},
            "defenses": {"reflex": 10, "fortitude": 10, "will": 10},
            "hp": {"value": 0, "max": 0},
            "forcePoints": {"value": 0, "max": 0},
            "feats": [],
            "talents": [],
            "powers": [],
            "languages": [],
            "equipment": [],
            "background": null,
            "freebuild": false,
            "currentStep": null,
            "talentsRequired": 0,
            "featsRequired": 0,
        }))
    }

    /// Wrap an existing tree. The root must be an object.
    pub fn from_value(value: Value) -> Result<Self, PatchError> {
        if !value.is_object() {
            return Err(PatchError::InvalidSnapshot(format!(
                "root must be an object, found {}",
                document::value_type_name(&value)
            )));
        }
        Ok(Self(value))
    }

    pub fn with_freebuild(&self, freebuild: bool) -> Self {
        let mut next = self.0.clone();
        if let Some(root) = next.as_object_mut() {
            root.insert("freebuild".into(), Value::Bool(freebuild));
        }
        Self(next)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    pub fn get(&self, path: &FieldPath) -> Option<&Value> {
        document::get_at(&self.0, path)
    }

    /// String at `path`, treating blank strings as absent.
    pub fn get_str(&self, path: &FieldPath) -> Option<&str> {
        self.get(path)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn is_freebuild(&self) -> bool {
        self.0
            .get("freebuild")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn current_step(&self) -> Option<StepId> {
        self.0
            .get("currentStep")
            .and_then(Value::as_str)
            .map(StepId::from)
    }

    /// Logical keys of the items in the collection at `path`.
    pub fn collection_keys(&self, path: &FieldPath) -> BTreeSet<ItemKey> {
        self.get(path)
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(ItemKey::of).collect())
            .unwrap_or_default()
    }

    pub fn has_item(&self, path: &FieldPath, key: &ItemKey) -> bool {
        self.collection_keys(path).contains(key)
    }

    /// Apply a patch's operations in order, returning the new snapshot.
    pub fn apply(&self, patch: &Patch) -> Result<Snapshot, PatchError> {
        let mut next = self.0.clone();
        for op in &patch.ops {
            document::apply_operation(&mut next, op)?;
        }
        Ok(Self(next))
    }

    pub fn apply_plan(&self, plan: &MutationPlan) -> Result<Snapshot, PatchError> {
        plan.apply_to(&self.0).map(Self)
    }

    /// Typed view of the tree.
    pub fn draft(&self) -> Result<CharacterDraft, PatchError> {
        serde_json::from_value(self.0.clone())
            .map_err(|e| PatchError::InvalidSnapshot(e.to_string()))
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassLevel {
    pub name: String,
    #[serde(default = "first_level")]
    pub level: u32,
}

fn first_level() -> u32 {
    1
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AbilityScore {
    pub base: i32,
    pub racial: i32,
    pub temp: i32,
    pub total: i32,
    #[serde(rename = "mod")]
    pub modifier: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Skills {
    pub trained: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pool {
    pub value: i32,
    pub max: i32,
}

/// Typed, read-only view of a snapshot.
///
/// Selections stay as JSON because they may be bare names or catalog objects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CharacterDraft {
    pub name: String,
    pub species: Option<String>,
    pub template: Option<String>,
    pub size: Option<String>,
    pub classes: Vec<ClassLevel>,
    pub abilities: BTreeMap<String, AbilityScore>,
    pub skills: Skills,
    pub defenses: BTreeMap<String, i32>,
    pub hp: Pool,
    pub force_points: Pool,
    pub feats: Vec<Value>,
    pub talents: Vec<Value>,
    pub powers: Vec<Value>,
    pub languages: Vec<Value>,
    pub equipment: Vec<Value>,
    pub background: Option<String>,
    pub freebuild: bool,
    pub current_step: Option<StepId>,
    pub talents_required: u32,
    pub feats_required: u32,
}

impl CharacterDraft {
    /// Total character level across classes.
    pub fn level(&self) -> u32 {
        self.classes.iter().map(|c| c.level).sum()
    }
}
