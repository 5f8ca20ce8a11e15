//! Built-in builder steps.

mod abilities;
mod background;
mod class;
mod equipment;
mod name;
mod selection;
mod skills;
mod species;

pub use abilities::AbilitiesStep;
pub use background::BackgroundStep;
pub use class::ClassStep;
pub use equipment::EquipmentStep;
pub use name::NameStep;
pub use selection::SelectionStep;
pub use skills::SkillsStep;
pub use species::SpeciesStep;

use serde_json::Value;

use charforge_domain::{FieldPath, ItemKey, Snapshot};

/// Names from a list that the snapshot's collection does not hold yet.
fn missing_from(snapshot: &Snapshot, collection: &FieldPath, names: Vec<String>) -> Vec<Value> {
    let present = snapshot.collection_keys(collection);
    let mut seen = Vec::new();
    names
        .into_iter()
        .filter(|name| {
            let key = ItemKey::new(name);
            if present.contains(&key) || seen.contains(&key) {
                return false;
            }
            seen.push(key);
            true
        })
        .map(Value::String)
        .collect()
}
