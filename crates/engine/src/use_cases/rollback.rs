//! Compensating actions for multi-write calls.
//!
//! The store offers no multi-record transaction, so every write that may need
//! undoing pushes its inverse here first. On failure the stack runs in
//! reverse; on success it is simply dropped.

use serde_json::Value;

use charforge_domain::{CorrelationId, RecordId, SubRecordId};

use crate::infrastructure::ports::{CharacterStore, StoreError};

#[derive(Debug, Clone, PartialEq)]
pub enum Compensation {
    /// Undo a `create_record`.
    DeleteRecord(RecordId),
    /// Undo an `update_record` by writing the pre-image back.
    RestoreRecord { id: RecordId, data: Value },
    /// Undo a `create_sub_records`.
    DeleteSubRecords {
        owner: RecordId,
        ids: Vec<SubRecordId>,
    },
}

impl Compensation {
    fn label(&self) -> &'static str {
        match self {
            Self::DeleteRecord(_) => "delete_record",
            Self::RestoreRecord { .. } => "restore_record",
            Self::DeleteSubRecords { .. } => "delete_sub_records",
        }
    }

    async fn run(&self, store: &dyn CharacterStore) -> Result<(), StoreError> {
        match self {
            Self::DeleteRecord(id) => store.delete_record(*id).await,
            Self::RestoreRecord { id, data } => {
                store.update_record(*id, data.clone()).await.map(|_| ())
            }
            Self::DeleteSubRecords { owner, ids } => {
                store.delete_sub_records(*owner, ids.clone()).await
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct Compensations {
    stack: Vec<Compensation>,
}

impl Compensations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, action: Compensation) {
        self.stack.push(action);
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Run every action, newest first. A failing action is logged and the
    /// rest still run. Returns how many actions failed.
    pub async fn unwind(self, store: &dyn CharacterStore, correlation_id: CorrelationId) -> usize {
        let mut failed = 0;
        for action in self.stack.iter().rev() {
            if let Err(e) = action.run(store).await {
                failed += 1;
                tracing::error!(
                    correlation_id = %correlation_id.short(),
                    action = action.label(),
                    error = %e,
                    "Compensating action failed"
                );
            }
        }
        if failed == 0 && !self.stack.is_empty() {
            tracing::info!(
                correlation_id = %correlation_id.short(),
                actions = self.stack.len(),
                "Rolled back partial writes"
            );
        }
        failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ports::MockCharacterStore;
    use mockall::Sequence;
    use serde_json::json;

    #[tokio::test]
    async fn unwinds_newest_first() {
        let record = RecordId::new();
        let sub = SubRecordId::new();
        let mut store = MockCharacterStore::new();
        let mut seq = Sequence::new();
        store
            .expect_delete_sub_records()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        store
            .expect_delete_record()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let mut compensations = Compensations::new();
        compensations.push(Compensation::DeleteRecord(record));
        compensations.push(Compensation::DeleteSubRecords {
            owner: record,
            ids: vec![sub],
        });

        assert_eq!(compensations.unwind(&store, CorrelationId::new()).await, 0);
    }

    #[tokio::test]
    async fn failing_action_does_not_stop_the_rest() {
        let record = RecordId::new();
        let mut store = MockCharacterStore::new();
        store
            .expect_update_record()
            .times(1)
            .returning(|_, _| Err(StoreError::storage("update_record", "connection reset")));
        store.expect_delete_record().times(1).returning(|_| Ok(()));

        let mut compensations = Compensations::new();
        compensations.push(Compensation::DeleteRecord(record));
        compensations.push(Compensation::RestoreRecord {
            id: record,
            data: json!({"name": "Kel"}),
        });

        assert_eq!(compensations.unwind(&store, CorrelationId::new()).await, 1);
    }
}
