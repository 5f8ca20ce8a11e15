//! Per-record exclusivity for apply and finalize.

use std::sync::Arc;

use dashmap::DashSet;

use charforge_domain::RecordId;

/// Tracks records with an apply or finalize call in flight.
///
/// Acquisition never waits: callers that find a record busy fail fast and
/// report a retryable error.
#[derive(Clone, Default)]
pub struct RecordLocks {
    in_flight: Arc<DashSet<RecordId>>,
}

impl RecordLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self, id: RecordId) -> Option<RecordGuard> {
        if self.in_flight.insert(id) {
            Some(RecordGuard {
                in_flight: Arc::clone(&self.in_flight),
                id,
            })
        } else {
            None
        }
    }

    pub fn is_locked(&self, id: RecordId) -> bool {
        self.in_flight.contains(&id)
    }
}

/// Releases the record when dropped.
pub struct RecordGuard {
    in_flight: Arc<DashSet<RecordId>>,
    id: RecordId,
}

impl RecordGuard {
    pub fn record_id(&self) -> RecordId {
        self.id
    }
}

impl Drop for RecordGuard {
    fn drop(&mut self) {
        self.in_flight.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_until_guard_drops() {
        let locks = RecordLocks::new();
        let id = RecordId::new();

        let guard = locks.try_acquire(id).expect("first acquire");
        assert!(locks.is_locked(id));
        assert!(locks.try_acquire(id).is_none());

        drop(guard);
        assert!(!locks.is_locked(id));
        assert!(locks.try_acquire(id).is_some());
    }

    #[test]
    fn different_records_are_independent() {
        let locks = RecordLocks::new();
        let _a = locks.try_acquire(RecordId::new()).expect("a");
        assert!(locks.try_acquire(RecordId::new()).is_some());
    }
}
