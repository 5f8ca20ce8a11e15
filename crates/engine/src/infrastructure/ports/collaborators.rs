//! Collaborator port traits.
//!
//! The engine calls out only through these. They are also the only
//! suspension points in the engine: everything between two port calls is
//! synchronous computation over values.

use async_trait::async_trait;
use serde_json::Value;

use charforge_domain::{
    CatalogEntry, CatalogKind, Operation, Patch, PersistedRecord, RecordId, Snapshot, StepId,
    SubRecord, SubRecordDraft, SubRecordId, SubRecordKind,
};

use super::error::{CatalogError, RuleError, StoreError};
use super::types::{Eligibility, FinalizationCompleted, RuleVerdict};

// =============================================================================
// Rule Evaluation
// =============================================================================

/// Decides domain legality. Rule arithmetic lives behind this trait.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RuleEvaluator: Send + Sync {
    async fn compute_eligibility(
        &self,
        snapshot: &Snapshot,
        step: &StepId,
    ) -> Result<Eligibility, RuleError>;

    async fn validate(&self, snapshot: &Snapshot, proposed: &Patch)
        -> Result<RuleVerdict, RuleError>;

    /// Operations that recompute derived fields from primitive ones.
    async fn rederive(&self, data: &Value) -> Result<Vec<Operation>, RuleError>;

    /// Check a complete record against schema and rule constraints.
    async fn validate_record(&self, data: &Value) -> Result<RuleVerdict, RuleError>;
}

// =============================================================================
// Catalog
// =============================================================================

/// Read-only reference definitions, with an explicit lifecycle.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogPort: Send + Sync {
    async fn open(&self) -> Result<(), CatalogError>;
    async fn close(&self);

    /// Look up by id or name. `Ok(None)` means "not found".
    async fn lookup(
        &self,
        kind: CatalogKind,
        id_or_name: &str,
    ) -> Result<Option<CatalogEntry>, CatalogError>;

    async fn list(&self, kind: CatalogKind) -> Result<Vec<CatalogEntry>, CatalogError>;
}

// =============================================================================
// Persistence
// =============================================================================

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CharacterStore: Send + Sync {
    async fn create_record(&self, data: Value) -> Result<PersistedRecord, StoreError>;
    async fn get_record(&self, id: RecordId) -> Result<Option<PersistedRecord>, StoreError>;
    async fn update_record(&self, id: RecordId, data: Value)
        -> Result<PersistedRecord, StoreError>;
    async fn delete_record(&self, id: RecordId) -> Result<(), StoreError>;

    /// Sub-record creation primitive. Only finalization may call this.
    async fn create_sub_records(
        &self,
        owner: RecordId,
        kind: SubRecordKind,
        drafts: Vec<SubRecordDraft>,
    ) -> Result<Vec<SubRecord>, StoreError>;

    async fn delete_sub_records(
        &self,
        owner: RecordId,
        ids: Vec<SubRecordId>,
    ) -> Result<(), StoreError>;

    async fn list_sub_records(&self, owner: RecordId) -> Result<Vec<SubRecord>, StoreError>;
}

// =============================================================================
// Notification
// =============================================================================

/// Fire-and-forget completion events.
#[cfg_attr(test, mockall::automock)]
pub trait CompletionNotifier: Send + Sync {
    /// Returns how many listeners received the event.
    fn notify(&self, event: FinalizationCompleted) -> usize;
}
