//! Shared fixtures for engine integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use charforge_domain::{
    CatalogEntry, CatalogKind, Operation, Patch, PersistedRecord, RecordId, Snapshot, StepId,
    SubRecord, SubRecordDraft, SubRecordId, SubRecordKind,
};
use charforge_engine::infrastructure::catalog::InMemoryCatalog;
use charforge_engine::infrastructure::clock::SystemClock;
use charforge_engine::infrastructure::config::EngineConfig;
use charforge_engine::infrastructure::memory_store::InMemoryCharacterStore;
use charforge_engine::infrastructure::notifier::BroadcastNotifier;
use charforge_engine::infrastructure::ports::{
    CharacterStore, Eligibility, RuleError, RuleEvaluator, RuleVerdict, StoreError,
};
use charforge_engine::infrastructure::rules::BasicRules;
use charforge_engine::infrastructure::telemetry::init_tracing;
use charforge_engine::{App, Ports};

pub fn catalog_entries() -> Vec<CatalogEntry> {
    vec![
        CatalogEntry::new("human", CatalogKind::Species, "Human")
            .with_data(json!({"languages": ["Basic"]})),
        CatalogEntry::new("wookiee", CatalogKind::Species, "Wookiee").with_data(json!({
            "abilities": {"str": 4, "dex": -2, "wis": -2, "cha": -2},
            "languages": ["Shyriiwook"]
        })),
        CatalogEntry::new("soldier", CatalogKind::Class, "Soldier")
            .with_data(json!({"talents": 1})),
        CatalogEntry::new("soldier", CatalogKind::Background, "Soldier")
            .with_data(json!({"languages": []})),
        CatalogEntry::new("dodge", CatalogKind::Feat, "Dodge").with_effects(vec![
            json!({"kind": "defense", "key": "reflex", "value": 1}),
            json!({"kind": "mind_control", "value": 99}),
        ]),
        CatalogEntry::new("toughness", CatalogKind::Feat, "Toughness")
            .with_effects(vec![json!({"kind": "hit_points", "value": 3})]),
        CatalogEntry::new("perception", CatalogKind::Skill, "Perception"),
        CatalogEntry::new("medpac", CatalogKind::Equipment, "Medpac"),
    ]
}

/// Store wrapper that counts calls to the write primitives.
#[derive(Default)]
pub struct CountingStore {
    inner: InMemoryCharacterStore,
    pub create_record_calls: AtomicUsize,
    pub create_sub_records_calls: AtomicUsize,
}

impl CountingStore {
    pub fn creates(&self) -> usize {
        self.create_record_calls.load(Ordering::SeqCst)
    }

    pub fn sub_record_creates(&self) -> usize {
        self.create_sub_records_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CharacterStore for CountingStore {
    async fn create_record(&self, data: Value) -> Result<PersistedRecord, StoreError> {
        self.create_record_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.create_record(data).await
    }

    async fn get_record(&self, id: RecordId) -> Result<Option<PersistedRecord>, StoreError> {
        self.inner.get_record(id).await
    }

    async fn update_record(
        &self,
        id: RecordId,
        data: Value,
    ) -> Result<PersistedRecord, StoreError> {
        self.inner.update_record(id, data).await
    }

    async fn delete_record(&self, id: RecordId) -> Result<(), StoreError> {
        self.inner.delete_record(id).await
    }

    async fn create_sub_records(
        &self,
        owner: RecordId,
        kind: SubRecordKind,
        drafts: Vec<SubRecordDraft>,
    ) -> Result<Vec<SubRecord>, StoreError> {
        self.create_sub_records_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.create_sub_records(owner, kind, drafts).await
    }

    async fn delete_sub_records(
        &self,
        owner: RecordId,
        ids: Vec<SubRecordId>,
    ) -> Result<(), StoreError> {
        self.inner.delete_sub_records(owner, ids).await
    }

    async fn list_sub_records(&self, owner: RecordId) -> Result<Vec<SubRecord>, StoreError> {
        self.inner.list_sub_records(owner).await
    }
}

/// Baseline rules whose rederive phase can be made to fail.
#[derive(Default)]
pub struct FlakyRules {
    inner: BasicRules,
    pub fail_rederive: AtomicBool,
}

#[async_trait]
impl RuleEvaluator for FlakyRules {
    async fn compute_eligibility(
        &self,
        snapshot: &Snapshot,
        step: &StepId,
    ) -> Result<Eligibility, RuleError> {
        self.inner.compute_eligibility(snapshot, step).await
    }

    async fn validate(
        &self,
        snapshot: &Snapshot,
        proposed: &Patch,
    ) -> Result<RuleVerdict, RuleError> {
        self.inner.validate(snapshot, proposed).await
    }

    async fn rederive(&self, data: &Value) -> Result<Vec<Operation>, RuleError> {
        if self.fail_rederive.load(Ordering::SeqCst) {
            return Err(RuleError::Evaluation("derived field table unavailable".into()));
        }
        self.inner.rederive(data).await
    }

    async fn validate_record(&self, data: &Value) -> Result<RuleVerdict, RuleError> {
        self.inner.validate_record(data).await
    }
}

pub struct TestEngine {
    pub app: App,
    pub store: Arc<CountingStore>,
    pub rules: Arc<FlakyRules>,
}

pub async fn engine() -> TestEngine {
    init_tracing("charforge_engine=debug");
    let store = Arc::new(CountingStore::default());
    let rules = Arc::new(FlakyRules::default());
    let ports = Ports {
        store: store.clone(),
        catalog: Arc::new(InMemoryCatalog::new(catalog_entries())),
        rules: rules.clone(),
        notifier: Arc::new(BroadcastNotifier::new()),
        clock: Arc::new(SystemClock::new()),
    };
    let app = App::new(EngineConfig::default(), ports);
    app.open().await.expect("catalog opens");
    TestEngine { app, store, rules }
}

/// A named starting record, as a host would persist before applying plans.
pub async fn seeded_record(store: &CountingStore) -> PersistedRecord {
    let mut data = Snapshot::empty().into_value();
    data["name"] = json!("Kel Dorran");
    store.create_record(data).await.expect("record created")
}
