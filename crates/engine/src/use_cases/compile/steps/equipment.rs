use async_trait::async_trait;
use serde_json::{json, Value};

use charforge_domain::{
    path, CatalogKind, ItemKey, Operation, ProgressionError, ProgressionResult, Snapshot, StepId,
};

use crate::use_cases::compile::{
    ListChanges, Selection, StepCompiler, StepContext, StepDescription, StepOutput,
};

/// Starting gear. Items are `{name, id, quantity}`.
pub struct EquipmentStep;

impl EquipmentStep {
    fn quantity(raw: &Value) -> ProgressionResult<i64> {
        match raw.get("quantity") {
            None => Ok(1),
            Some(q) => q.as_i64().filter(|q| *q >= 1).ok_or_else(|| {
                ProgressionError::validation("equipment", "quantity must be a whole number of at least 1")
            }),
        }
    }
}

#[async_trait]
impl StepCompiler for EquipmentStep {
    fn id(&self) -> StepId {
        StepId::from("equipment")
    }

    fn field(&self) -> &'static str {
        "equipment"
    }

    fn describe(&self, snapshot: &Snapshot) -> StepDescription {
        let count = snapshot.collection_keys(&path!("equipment")).len();
        StepDescription {
            id: self.id(),
            title: "Equipment".into(),
            summary: format!("{count} items"),
            complete: count > 0,
        }
    }

    async fn compile(
        &self,
        ctx: &StepContext<'_>,
        selection: &Selection,
    ) -> ProgressionResult<StepOutput> {
        let changes: ListChanges = selection.parse(self.field())?;
        if changes.is_empty() {
            return Err(ProgressionError::validation(self.field(), "nothing selected"));
        }

        let collection = path!("equipment");
        let present = ctx.snapshot.collection_keys(&collection);

        let mut ops = Vec::new();
        for key in &changes.remove {
            if !present.contains(key) {
                return Err(ProgressionError::validation(
                    self.field(),
                    format!("'{key}' is not carried"),
                ));
            }
            ops.push(Operation::remove(collection.clone(), key.clone()));
        }

        let mut added = Vec::new();
        let mut keys: Vec<ItemKey> = Vec::new();
        for raw in &changes.add {
            let wanted = ItemKey::of(raw)
                .ok_or_else(|| ProgressionError::validation(self.field(), "item has no name"))?;
            let entry = ctx
                .require(CatalogKind::Equipment, wanted.as_str(), self.field())
                .await?;
            let quantity = Self::quantity(raw)?;
            let key = entry.key();
            if (present.contains(&key) && !changes.remove.contains(&key)) || keys.contains(&key) {
                return Err(ProgressionError::validation(
                    self.field(),
                    format!("'{}' is already carried", entry.name),
                ));
            }
            added.push(json!({"name": entry.name, "id": entry.id, "quantity": quantity}));
            keys.push(key);
        }
        if !added.is_empty() {
            ops.push(Operation::add(collection, Value::Array(added)));
        }

        Ok(StepOutput::new(ops).choosing_all(keys))
    }
}
