//! In-memory character store.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use charforge_domain::{
    PersistedRecord, RecordId, SubRecord, SubRecordDraft, SubRecordId, SubRecordKind,
};

use crate::infrastructure::ports::{CharacterStore, StoreError};

/// Character store backed by concurrent maps.
///
/// Suitable for tests and for hosts that persist snapshots elsewhere.
#[derive(Default)]
pub struct InMemoryCharacterStore {
    records: DashMap<RecordId, PersistedRecord>,
    sub_records: DashMap<RecordId, Vec<SubRecord>>,
}

impl InMemoryCharacterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    fn ensure_record(&self, id: RecordId) -> Result<(), StoreError> {
        if self.records.contains_key(&id) {
            Ok(())
        } else {
            Err(StoreError::not_found("record", id))
        }
    }
}

#[async_trait]
impl CharacterStore for InMemoryCharacterStore {
    async fn create_record(&self, data: Value) -> Result<PersistedRecord, StoreError> {
        let record = PersistedRecord::new(RecordId::new(), data);
        self.records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_record(&self, id: RecordId) -> Result<Option<PersistedRecord>, StoreError> {
        Ok(self.records.get(&id).map(|r| r.value().clone()))
    }

    async fn update_record(
        &self,
        id: RecordId,
        data: Value,
    ) -> Result<PersistedRecord, StoreError> {
        let mut entry = self
            .records
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("record", id))?;
        entry.data = data;
        Ok(entry.value().clone())
    }

    async fn delete_record(&self, id: RecordId) -> Result<(), StoreError> {
        self.records.remove(&id);
        self.sub_records.remove(&id);
        Ok(())
    }

    async fn create_sub_records(
        &self,
        owner: RecordId,
        kind: SubRecordKind,
        drafts: Vec<SubRecordDraft>,
    ) -> Result<Vec<SubRecord>, StoreError> {
        self.ensure_record(owner)?;
        let created: Vec<SubRecord> = drafts
            .into_iter()
            .map(|draft| SubRecord::from_draft(owner, kind, draft))
            .collect();
        self.sub_records
            .entry(owner)
            .or_default()
            .extend(created.iter().cloned());
        Ok(created)
    }

    async fn delete_sub_records(
        &self,
        owner: RecordId,
        ids: Vec<SubRecordId>,
    ) -> Result<(), StoreError> {
        if let Some(mut owned) = self.sub_records.get_mut(&owner) {
            owned.retain(|s| !ids.contains(&s.id));
        }
        Ok(())
    }

    async fn list_sub_records(&self, owner: RecordId) -> Result<Vec<SubRecord>, StoreError> {
        Ok(self
            .sub_records
            .get(&owner)
            .map(|r| r.value().clone())
            .unwrap_or_default())
    }
}
