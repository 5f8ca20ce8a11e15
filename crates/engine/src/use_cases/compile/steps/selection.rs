//! Generic add/remove step over one catalog kind (feats, talents, powers, languages).

use async_trait::async_trait;
use serde_json::{json, Value};

use charforge_domain::{
    CatalogKind, FieldPath, ItemKey, Operation, ProgressionError, ProgressionResult, Snapshot,
    StepId,
};

use crate::use_cases::compile::{
    ListChanges, Selection, StepCompiler, StepContext, StepDescription, StepOutput,
};

pub struct SelectionStep {
    id: &'static str,
    kind: CatalogKind,
    title: &'static str,
}

impl SelectionStep {
    /// `id` doubles as the snapshot collection name.
    pub fn new(id: &'static str, kind: CatalogKind, title: &'static str) -> Self {
        Self { id, kind, title }
    }

    fn collection(&self) -> FieldPath {
        FieldPath::new(self.id)
    }

    /// Languages are stored as bare names; everything else as `{name, id}`.
    fn item_for(&self, name: &str, id: &str) -> Value {
        match self.kind {
            CatalogKind::Language => Value::String(name.to_string()),
            _ => json!({"name": name, "id": id}),
        }
    }
}

#[async_trait]
impl StepCompiler for SelectionStep {
    fn id(&self) -> StepId {
        StepId::from(self.id)
    }

    fn field(&self) -> &'static str {
        self.id
    }

    fn describe(&self, snapshot: &Snapshot) -> StepDescription {
        let count = snapshot.collection_keys(&self.collection()).len();
        StepDescription {
            id: self.id(),
            title: self.title.into(),
            summary: format!("{count} selected"),
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
            return Err(ProgressionError::validation(
                self.field(),
                "nothing selected",
            ));
        }

        let collection = self.collection();
        let present = ctx.snapshot.collection_keys(&collection);

        let mut ops = Vec::new();
        for key in &changes.remove {
            if !present.contains(key) {
                return Err(ProgressionError::validation(
                    self.field(),
                    format!("'{key}' is not selected"),
                ));
            }
            ops.push(Operation::remove(collection.clone(), key.clone()));
        }

        let mut added = Vec::new();
        let mut keys: Vec<ItemKey> = Vec::new();
        for raw in &changes.add {
            let wanted = ItemKey::of(raw).ok_or_else(|| {
                ProgressionError::validation(self.field(), "selection has no name")
            })?;
            let entry = ctx.require(self.kind, wanted.as_str(), self.field()).await?;
            let key = entry.key();
            let re_adding = changes.remove.contains(&key);
            if (present.contains(&key) && !re_adding) || keys.contains(&key) {
                return Err(ProgressionError::validation(
                    self.field(),
                    format!("'{}' is already selected", entry.name),
                ));
            }
            added.push(self.item_for(&entry.name, &entry.id));
            keys.push(key);
        }
        if !added.is_empty() {
            ops.push(Operation::add(collection, Value::Array(added)));
        }

        Ok(StepOutput::new(ops).choosing_all(keys))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::use_cases::compile::steps::test_support::compile;
    use charforge_domain::{path, Patch};
    use chrono::Utc;

    fn feats() -> SelectionStep {
        SelectionStep::new("feats", CatalogKind::Feat, "Feats")
    }

    fn with_dodge() -> Snapshot {
        Snapshot::empty()
            .apply(
                &Patch::new("feats", Utc::now())
                    .add(path!("feats"), json!({"name": "Dodge", "id": "dodge"})),
            )
            .unwrap()
    }

    #[tokio::test]
    async fn adds_catalog_items_as_one_batch() {
        let out = compile(&feats(), &Snapshot::empty(), Selection::new(json!(["dodge", "Toughness"])))
            .await
            .unwrap();
        assert_eq!(
            out.ops,
            vec![Operation::add(
                path!("feats"),
                json!([{"name": "Dodge", "id": "dodge"}, {"name": "Toughness", "id": "toughness"}])
            )]
        );
        assert_eq!(out.chosen, vec![ItemKey::new("dodge"), ItemKey::new("toughness")]);
    }

    #[tokio::test]
    async fn removes_selected_items() {
        let out = compile(&feats(), &with_dodge(), Selection::new(json!({"remove": ["Dodge"]})))
            .await
            .unwrap();
        assert_eq!(out.ops, vec![Operation::remove(path!("feats"), "dodge")]);
        assert!(out.chosen.is_empty());
    }

    #[tokio::test]
    async fn duplicate_and_missing_items_are_rejected() {
        let dup = compile(&feats(), &with_dodge(), Selection::new(json!(["Dodge"])))
            .await
            .unwrap_err();
        assert!(dup.as_validation().unwrap().reason.contains("already selected"));

        let missing = compile(&feats(), &Snapshot::empty(), Selection::new(json!({"remove": ["Dodge"]})))
            .await
            .unwrap_err();
        assert!(missing.as_validation().unwrap().reason.contains("not selected"));

        let unknown = compile(&feats(), &Snapshot::empty(), Selection::new(json!(["Force Lightning"])))
            .await
            .unwrap_err();
        assert!(unknown.as_validation().unwrap().reason.contains("unknown feat"));
    }

    #[tokio::test]
    async fn languages_are_stored_by_name() {
        let step = SelectionStep::new("languages", CatalogKind::Language, "Languages");
        let out = compile(&step, &Snapshot::empty(), Selection::new(json!(["binary"])))
            .await
            .unwrap();
        assert_eq!(out.ops, vec![Operation::add(path!("languages"), json!(["Binary"]))]);
    }
}
