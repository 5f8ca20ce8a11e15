//! Finalization: the one place a snapshot becomes a persisted character.
//!
//! Nothing else creates sub-records or lets catalog effect data reach the
//! store. Writes are covered by a compensation stack; a record that was
//! written but then fails validation is kept for an operator to inspect.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use charforge_domain::{
    ApplicationError, CharacterDraft, CorrelationId, EffectSanitizer, ItemKey, PersistedRecord,
    ProgressionError, ProgressionResult, RecordId, Snapshot, SubRecord, SubRecordDraft,
    SubRecordId, SubRecordKind, ValidationError,
};

use super::rollback::{Compensation, Compensations};
use crate::infrastructure::ports::{
    CatalogPort, CharacterStore, ClockPort, CompletionNotifier, FinalizationCompleted,
    RuleEvaluator, RuleVerdict, StoreError,
};
use crate::infrastructure::record_locks::RecordLocks;

/// Snapshot fields that only exist while building.
const BUILDER_FIELDS: [&str; 2] = ["currentStep", "freebuild"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finalized {
    pub record: PersistedRecord,
    pub sub_records: Vec<SubRecord>,
    /// Effects dropped by the sanitizer across all sub-records.
    pub stripped_effects: usize,
}

/// Cause attached when a written record fails the terminal check. The record
/// stays in the store; finalizing again against `record_id` replaces it.
#[derive(Debug, thiserror::Error)]
#[error("record {record_id} kept for review: {reason}")]
pub struct RecordKept {
    pub record_id: RecordId,
    pub reason: String,
}

/// Id of the record a failed finalization left behind, if any.
pub fn kept_record(err: &ProgressionError) -> Option<RecordId> {
    err.as_application()?
        .cause
        .as_ref()?
        .downcast_ref::<RecordKept>()
        .map(|kept| kept.record_id)
}

/// Finalize use case.
pub struct FinalizeCharacter {
    store: Arc<dyn CharacterStore>,
    catalog: Arc<dyn CatalogPort>,
    rules: Arc<dyn RuleEvaluator>,
    notifier: Arc<dyn CompletionNotifier>,
    clock: Arc<dyn ClockPort>,
    sanitizer: EffectSanitizer,
    locks: RecordLocks,
}

impl FinalizeCharacter {
    pub fn new(
        store: Arc<dyn CharacterStore>,
        catalog: Arc<dyn CatalogPort>,
        rules: Arc<dyn RuleEvaluator>,
        notifier: Arc<dyn CompletionNotifier>,
        clock: Arc<dyn ClockPort>,
        sanitizer: EffectSanitizer,
        locks: RecordLocks,
    ) -> Self {
        Self {
            store,
            catalog,
            rules,
            notifier,
            clock,
            sanitizer,
            locks,
        }
    }

    /// Persist `snapshot` as a new record, or over `existing`.
    pub async fn execute(
        &self,
        snapshot: &Snapshot,
        existing: Option<RecordId>,
    ) -> ProgressionResult<Finalized> {
        let draft = snapshot
            .draft()
            .map_err(|e| ProgressionError::validation("snapshot", e.to_string()))?;
        check_required(&draft)?;
        let data = record_data(snapshot, &draft);

        let _guard = match existing {
            Some(id) => Some(self.locks.try_acquire(id).ok_or_else(|| {
                ApplicationError::new(format!("Character {id} is already being updated; try again"))
            })?),
            None => None,
        };

        let mut compensations = Compensations::new();
        let (record, sub_records, stripped_effects) = match self
            .write(snapshot, data, existing, &mut compensations)
            .await
        {
            Ok(written) => written,
            Err(err) => {
                let correlation_id = match &err {
                    ProgressionError::Application(app) => app.correlation_id,
                    _ => CorrelationId::new(),
                };
                tracing::warn!(
                    correlation_id = %correlation_id.short(),
                    writes = compensations.len(),
                    error = %err,
                    "Finalization failed, removing partial writes"
                );
                compensations.unwind(self.store.as_ref(), correlation_id).await;
                return Err(err);
            }
        };

        self.validate_result(&record).await?;

        let event = FinalizationCompleted {
            record: record.clone(),
            snapshot: snapshot.clone(),
            sub_records: sub_records.clone(),
            finalized_at: self.clock.now(),
        };
        let listeners = self.notifier.notify(event);

        tracing::info!(
            record_id = %record.id,
            sub_records = sub_records.len(),
            stripped_effects,
            listeners,
            "Character finalized"
        );
        Ok(Finalized {
            record,
            sub_records,
            stripped_effects,
        })
    }

    async fn write(
        &self,
        snapshot: &Snapshot,
        data: Value,
        existing: Option<RecordId>,
        compensations: &mut Compensations,
    ) -> ProgressionResult<(PersistedRecord, Vec<SubRecord>, usize)> {
        let (record, previous) = match existing {
            None => {
                let record = self.store.create_record(data).await?;
                compensations.push(Compensation::DeleteRecord(record.id));
                (record, Vec::new())
            }
            Some(id) => {
                let before = self
                    .store
                    .get_record(id)
                    .await?
                    .ok_or_else(|| StoreError::not_found("record", id))?;
                let previous: Vec<SubRecordId> = self
                    .store
                    .list_sub_records(id)
                    .await?
                    .into_iter()
                    .map(|s| s.id)
                    .collect();
                compensations.push(Compensation::RestoreRecord {
                    id,
                    data: before.data,
                });
                (self.store.update_record(id, data).await?, previous)
            }
        };

        let mut created = Vec::new();
        let mut stripped = 0;
        for kind in SubRecordKind::ALL {
            let (drafts, dropped) = self.drafts_for(kind, snapshot, record.id).await?;
            stripped += dropped;
            if drafts.is_empty() {
                continue;
            }
            let subs = self
                .store
                .create_sub_records(record.id, kind, drafts)
                .await?;
            compensations.push(Compensation::DeleteSubRecords {
                owner: record.id,
                ids: subs.iter().map(|s| s.id).collect(),
            });
            created.extend(subs);
        }

        if !previous.is_empty() {
            if let Err(err) = self
                .store
                .delete_sub_records(record.id, previous.clone())
                .await
            {
                let remaining = match self.store.list_sub_records(record.id).await {
                    Ok(current) => still_present(&previous, &current),
                    Err(_) => previous,
                };
                tracing::error!(
                    record_id = %record.id,
                    orphaned = ?remaining,
                    error = %err,
                    "Could not remove replaced sub-records"
                );
                return Err(err.into());
            }
        }

        Ok((record, created, stripped))
    }

    /// Sub-record drafts for one collection, with catalog effects sanitized.
    async fn drafts_for(
        &self,
        kind: SubRecordKind,
        snapshot: &Snapshot,
        owner: RecordId,
    ) -> ProgressionResult<(Vec<SubRecordDraft>, usize)> {
        let items = snapshot
            .get(&kind.collection())
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut drafts = Vec::with_capacity(items.len());
        let mut stripped = 0;
        for item in items {
            let Some(key) = ItemKey::of(&item) else {
                tracing::warn!(owner = %owner, kind = ?kind, "Skipping unnamed selection");
                continue;
            };
            let lookup = item
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or(key.as_str())
                .to_string();

            let (name, data, raw_effects) =
                match self.catalog.lookup(kind.catalog_kind(), &lookup).await? {
                    Some(entry) => (entry.name, enrich(entry.data, &item), entry.effects),
                    None => (
                        item_name(&item).unwrap_or_else(|| key.to_string()),
                        item.clone(),
                        item.get("effects")
                            .and_then(Value::as_array)
                            .cloned()
                            .unwrap_or_default(),
                    ),
                };

            let sanitized = self.sanitizer.sanitize_raw(raw_effects.iter());
            if sanitized.has_stripped() {
                tracing::warn!(
                    owner = %owner,
                    kind = ?kind,
                    item = %name,
                    stripped = sanitized.stripped.len(),
                    "Stripped unrecognized effects"
                );
                stripped += sanitized.stripped.len();
            }

            drafts.push(SubRecordDraft {
                name,
                data,
                effects: sanitized.kept,
            });
        }
        Ok((drafts, stripped))
    }

    /// Terminal check. Failures keep the written records.
    async fn validate_result(&self, record: &PersistedRecord) -> ProgressionResult<()> {
        let (message, reason) = match self.rules.validate_record(&record.data).await {
            Ok(RuleVerdict::Ok) => return Ok(()),
            Ok(RuleVerdict::Errors(errors)) => {
                let detail = errors
                    .into_iter()
                    .next()
                    .unwrap_or_else(|| ValidationError::new("record", "rejected by the rules"));
                (
                    format!("Finalized character failed validation ({detail})"),
                    detail.to_string(),
                )
            }
            Err(e) => ("Finalized character could not be checked".to_string(), e.to_string()),
        };
        let error = ApplicationError::with_cause(
            message,
            RecordKept {
                record_id: record.id,
                reason,
            },
        );
        tracing::error!(
            record_id = %record.id,
            correlation_id = %error.correlation_id.short(),
            error = %error,
            "Finalized record did not validate; kept for review"
        );
        Err(error.into())
    }
}

fn check_required(draft: &CharacterDraft) -> ProgressionResult<()> {
    if draft.name.trim().is_empty() {
        return Err(ProgressionError::validation("name", "a character needs a name"));
    }
    let present = |field: &Option<String>| field.as_deref().is_some_and(|s| !s.trim().is_empty());
    if !present(&draft.species) && !present(&draft.template) {
        return Err(ProgressionError::validation(
            "species",
            "choose a species or a construct template",
        ));
    }
    if draft.classes.is_empty() {
        return Err(ProgressionError::validation(
            "classes",
            "choose at least one class",
        ));
    }
    Ok(())
}

/// Primitive record fields. Owned selections become sub-records instead.
fn record_data(snapshot: &Snapshot, draft: &CharacterDraft) -> Value {
    let mut data = snapshot.as_value().clone();
    if let Some(root) = data.as_object_mut() {
        for field in BUILDER_FIELDS {
            root.remove(field);
        }
        for kind in SubRecordKind::ALL {
            root.remove(kind.collection().first());
        }
        root.insert("level".into(), Value::from(draft.level()));
    }
    data
}

/// Ids from `previous` that `current` still holds.
fn still_present(previous: &[SubRecordId], current: &[SubRecord]) -> Vec<SubRecordId> {
    previous
        .iter()
        .filter(|id| current.iter().any(|s| s.id == **id))
        .copied()
        .collect()
}

fn item_name(item: &Value) -> Option<String> {
    match item {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map.get("name").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

/// Catalog data overlaid with the snapshot item's own fields (e.g. quantity).
fn enrich(catalog: Value, item: &Value) -> Value {
    match (catalog, item) {
        (Value::Object(mut base), Value::Object(own)) => {
            for (k, v) in own {
                if k != "effects" {
                    base.insert(k.clone(), v.clone());
                }
            }
            Value::Object(base)
        }
        (Value::Null, _) => item.clone(),
        (catalog, _) => catalog,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::catalog::InMemoryCatalog;
    use crate::infrastructure::clock::FixedClock;
    use crate::infrastructure::memory_store::InMemoryCharacterStore;
    use crate::infrastructure::notifier::BroadcastNotifier;
    use crate::infrastructure::ports::{
        MockCharacterStore, MockCompletionNotifier, MockRuleEvaluator,
    };
    use crate::infrastructure::rules::BasicRules;
    use charforge_domain::{path, CatalogEntry, CatalogKind, Patch};
    use chrono::Utc;
    use serde_json::json;

    fn catalog() -> Arc<InMemoryCatalog> {
        Arc::new(InMemoryCatalog::new(vec![
            CatalogEntry::new("dodge", CatalogKind::Feat, "Dodge")
                .with_data(json!({"prerequisites": ["dex 13"]}))
                .with_effects(vec![
                    json!({"kind": "defense", "key": "reflex", "value": 1}),
                    json!({"kind": "teleport", "value": 9000}),
                    json!("not an effect"),
                ]),
            CatalogEntry::new("medpac", CatalogKind::Equipment, "Medpac")
                .with_data(json!({"weight": 1})),
        ]))
    }

    fn complete_snapshot() -> Snapshot {
        Snapshot::empty()
            .apply(
                &Patch::new("test", Utc::now())
                    .set(path!("name"), "Kel Dorran")
                    .set(path!("species"), "Human")
                    .set(path!("classes"), json!([{"name": "Soldier", "level": 1}]))
                    .set(path!("currentStep"), "equipment")
                    .add(path!("feats"), json!({"name": "Dodge", "id": "dodge"}))
                    .add(
                        path!("equipment"),
                        json!({"name": "Medpac", "id": "medpac", "quantity": 2}),
                    )
                    .add(path!("talents"), json!({"name": "Homebrew Grit"})),
            )
            .unwrap()
    }

    struct Harness {
        store: Arc<dyn CharacterStore>,
        rules: Arc<dyn RuleEvaluator>,
        notifier: Arc<dyn CompletionNotifier>,
    }

    impl Harness {
        fn in_memory(store: Arc<InMemoryCharacterStore>) -> Self {
            Self {
                store,
                rules: Arc::new(BasicRules::new()),
                notifier: Arc::new(BroadcastNotifier::new()),
            }
        }

        async fn build(self) -> FinalizeCharacter {
            let catalog = catalog();
            catalog.open().await.unwrap();
            FinalizeCharacter::new(
                self.store,
                catalog,
                self.rules,
                self.notifier,
                Arc::new(FixedClock(Utc::now())),
                EffectSanitizer::default(),
                RecordLocks::new(),
            )
        }
    }

    #[tokio::test]
    async fn creates_record_and_sanitized_sub_records() {
        let store = Arc::new(InMemoryCharacterStore::new());
        let finalize = Harness::in_memory(store.clone()).build().await;

        let done = finalize.execute(&complete_snapshot(), None).await.unwrap();

        assert_eq!(done.record.data["name"], "Kel Dorran");
        assert_eq!(done.record.data["level"], 1);
        assert!(done.record.data.get("currentStep").is_none());
        assert!(done.record.data.get("feats").is_none());
        assert_eq!(done.sub_records.len(), 3);
        assert_eq!(done.stripped_effects, 2);

        let dodge = done.sub_records.iter().find(|s| s.name == "Dodge").unwrap();
        assert_eq!(dodge.kind, SubRecordKind::Feat);
        assert_eq!(dodge.effects.len(), 1);
        assert_eq!(dodge.effects[0].kind, "defense");

        let medpac = done.sub_records.iter().find(|s| s.name == "Medpac").unwrap();
        assert_eq!(medpac.data["quantity"], 2);
        assert_eq!(medpac.data["weight"], 1);

        let custom = done
            .sub_records
            .iter()
            .find(|s| s.kind == SubRecordKind::Talent)
            .unwrap();
        assert_eq!(custom.name, "Homebrew Grit");

        assert_eq!(store.list_sub_records(done.record.id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn classless_snapshot_never_reaches_the_store() {
        let mut store = MockCharacterStore::new();
        store.expect_create_record().never();
        store.expect_create_sub_records().never();
        let finalize = Harness {
            store: Arc::new(store),
            rules: Arc::new(BasicRules::new()),
            notifier: Arc::new(BroadcastNotifier::new()),
        }
        .build()
        .await;

        let snapshot = complete_snapshot()
            .apply(&Patch::new("class", Utc::now()).set(path!("classes"), json!([])))
            .unwrap();
        let err = finalize.execute(&snapshot, None).await.unwrap_err();
        assert_eq!(err.as_validation().unwrap().field, "classes");
    }

    #[tokio::test]
    async fn template_stands_in_for_species() {
        let store = Arc::new(InMemoryCharacterStore::new());
        let finalize = Harness::in_memory(store).build().await;
        let snapshot = complete_snapshot()
            .apply(
                &Patch::new("species", Utc::now())
                    .set(path!("species"), Value::Null)
                    .set(path!("template"), "Droid"),
            )
            .unwrap();
        assert!(finalize.execute(&snapshot, None).await.is_ok());

        let nameless = snapshot
            .apply(&Patch::new("name", Utc::now()).set(path!("name"), "  "))
            .unwrap();
        let err = finalize.execute(&nameless, None).await.unwrap_err();
        assert_eq!(err.as_validation().unwrap().field, "name");
    }

    #[tokio::test]
    async fn sub_record_failure_deletes_the_new_record() {
        let mut store = MockCharacterStore::new();
        let id = RecordId::new();
        store
            .expect_create_record()
            .times(1)
            .returning(move |data| Ok(PersistedRecord::new(id, data)));
        store
            .expect_create_sub_records()
            .returning(|_, _, _| Err(StoreError::storage("create_sub_records", "write timeout")));
        store
            .expect_delete_record()
            .withf(move |deleted| *deleted == id)
            .times(1)
            .returning(|_| Ok(()));

        let mut notifier = MockCompletionNotifier::new();
        notifier.expect_notify().never();

        let finalize = Harness {
            store: Arc::new(store),
            rules: Arc::new(BasicRules::new()),
            notifier: Arc::new(notifier),
        }
        .build()
        .await;

        let err = finalize.execute(&complete_snapshot(), None).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn failed_result_validation_keeps_records() {
        let mut store = MockCharacterStore::new();
        store
            .expect_create_record()
            .returning(|data| Ok(PersistedRecord::new(RecordId::new(), data)));
        store.expect_create_sub_records().returning(|owner, kind, drafts| {
            Ok(drafts
                .into_iter()
                .map(|d| SubRecord::from_draft(owner, kind, d))
                .collect())
        });
        store.expect_delete_record().never();
        store.expect_delete_sub_records().never();

        let mut rules = MockRuleEvaluator::new();
        rules.expect_validate_record().returning(|_| {
            Ok(RuleVerdict::Errors(vec![ValidationError::new(
                "abilities.str.base",
                "must be between 3 and 20, got 2",
            )]))
        });

        let finalize = Harness {
            store: Arc::new(store),
            rules: Arc::new(rules),
            notifier: Arc::new(BroadcastNotifier::new()),
        }
        .build()
        .await;

        let err = finalize.execute(&complete_snapshot(), None).await.unwrap_err();
        let app = err.as_application().unwrap();
        assert!(app.message.contains("abilities.str.base"));
        assert!(kept_record(&err).is_some());
    }

    #[tokio::test]
    async fn malformed_snapshot_is_a_validation_error() {
        let mut store = MockCharacterStore::new();
        store.expect_create_record().never();
        let finalize = Harness {
            store: Arc::new(store),
            rules: Arc::new(BasicRules::new()),
            notifier: Arc::new(BroadcastNotifier::new()),
        }
        .build()
        .await;

        let mut data = complete_snapshot().into_value();
        data["classes"] = json!("Soldier");
        let snapshot = Snapshot::from_value(data).unwrap();

        let err = finalize.execute(&snapshot, None).await.unwrap_err();
        assert_eq!(err.as_validation().unwrap().field, "snapshot");
        assert_eq!(kept_record(&err), None);
    }

    #[tokio::test]
    async fn failed_cleanup_of_replaced_sub_records_restores_the_record() {
        let id = RecordId::new();
        let stale = SubRecord::from_draft(
            id,
            SubRecordKind::Feat,
            SubRecordDraft {
                name: "Power Attack".into(),
                data: json!({}),
                effects: vec![],
            },
        );
        let stale_id = stale.id;

        let mut store = MockCharacterStore::new();
        store
            .expect_get_record()
            .returning(|id| Ok(Some(PersistedRecord::new(id, json!({"name": "Before"})))));
        store
            .expect_list_sub_records()
            .returning(move |_| Ok(vec![stale.clone()]));
        store
            .expect_update_record()
            .times(2)
            .returning(|id, data| Ok(PersistedRecord::new(id, data)));
        store.expect_create_sub_records().returning(|owner, kind, drafts| {
            Ok(drafts
                .into_iter()
                .map(|d| SubRecord::from_draft(owner, kind, d))
                .collect())
        });
        store.expect_delete_sub_records().returning(move |_, ids| {
            if ids.contains(&stale_id) {
                Err(StoreError::storage("delete_sub_records", "lock timeout"))
            } else {
                Ok(())
            }
        });
        store.expect_delete_record().never();

        let mut notifier = MockCompletionNotifier::new();
        notifier.expect_notify().never();

        let finalize = Harness {
            store: Arc::new(store),
            rules: Arc::new(BasicRules::new()),
            notifier: Arc::new(notifier),
        }
        .build()
        .await;

        let err = finalize
            .execute(&complete_snapshot(), Some(id))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(kept_record(&err), None);
    }

    #[test]
    fn still_present_keeps_only_undeleted_ids() {
        let owner = RecordId::new();
        let draft = |name: &str| SubRecordDraft {
            name: name.into(),
            data: json!({}),
            effects: vec![],
        };
        let kept = SubRecord::from_draft(owner, SubRecordKind::Feat, draft("Dodge"));
        let gone = SubRecordId::new();

        assert_eq!(still_present(&[kept.id, gone], &[kept.clone()]), vec![kept.id]);
        assert!(still_present(&[gone], &[kept]).is_empty());
    }

    #[tokio::test]
    async fn refinalizing_replaces_sub_records() {
        let store = Arc::new(InMemoryCharacterStore::new());
        let finalize = Harness::in_memory(store.clone()).build().await;
        let first = finalize.execute(&complete_snapshot(), None).await.unwrap();

        let leaner = complete_snapshot()
            .apply(&Patch::new("equipment", Utc::now()).remove(path!("equipment"), "medpac"))
            .unwrap();
        let second = finalize
            .execute(&leaner, Some(first.record.id))
            .await
            .unwrap();

        assert_eq!(second.record.id, first.record.id);
        assert_eq!(store.record_count(), 1);
        let owned = store.list_sub_records(first.record.id).await.unwrap();
        assert_eq!(owned.len(), 2);
        assert!(owned.iter().all(|s| s.kind != SubRecordKind::Equipment));
    }

    #[tokio::test]
    async fn completion_is_notified_once() {
        let store = Arc::new(InMemoryCharacterStore::new());
        let notifier = Arc::new(BroadcastNotifier::new());
        let mut rx = notifier.subscribe();
        let finalize = Harness {
            store,
            rules: Arc::new(BasicRules::new()),
            notifier: notifier.clone(),
        }
        .build()
        .await;

        let done = finalize.execute(&complete_snapshot(), None).await.unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event.record.id, done.record.id);
        assert_eq!(event.snapshot, complete_snapshot());
        assert!(rx.try_recv().is_err());
    }
}
