//! Mutation application: land a merged plan on a persisted record as one unit.

use std::sync::Arc;

use serde::Serialize;

use charforge_domain::{
    document, ApplicationError, CorrelationId, MutationPlan, PersistedRecord, ProgressionError,
    ProgressionResult, RecordId, StepId,
};

use super::rollback::{Compensation, Compensations};
use crate::infrastructure::config::EngineConfig;
use crate::infrastructure::ports::{CharacterStore, RuleEvaluator, RuleVerdict, StoreError};
use crate::infrastructure::record_locks::RecordLocks;

/// Per-call apply settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Who asked for the change; carried into logs.
    pub source: StepId,
    pub validate: bool,
    pub rederive: bool,
}

impl ApplyOptions {
    pub fn new(source: impl Into<StepId>) -> Self {
        Self {
            source: source.into(),
            validate: true,
            rederive: true,
        }
    }

    /// Options with the configured validate/rederive defaults.
    pub fn from_config(config: &EngineConfig, source: impl Into<StepId>) -> Self {
        Self {
            source: source.into(),
            validate: config.validate_on_apply,
            rederive: config.rederive_on_apply,
        }
    }

    pub fn without_validation(mut self) -> Self {
        self.validate = false;
        self
    }

    pub fn without_rederive(mut self) -> Self {
        self.rederive = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplyOutcome {
    pub record: PersistedRecord,
    /// Primitive operations from the plan.
    pub ops_applied: usize,
    /// Derived-field operations produced by the rules.
    pub rederived: usize,
}

/// Apply use case.
///
/// Phases: primitive writes, rederive, validate. Any failure after the first
/// write restores the pre-image, so readers see either the whole plan or
/// nothing.
pub struct ApplyMutation {
    store: Arc<dyn CharacterStore>,
    rules: Arc<dyn RuleEvaluator>,
    locks: RecordLocks,
}

impl ApplyMutation {
    pub fn new(
        store: Arc<dyn CharacterStore>,
        rules: Arc<dyn RuleEvaluator>,
        locks: RecordLocks,
    ) -> Self {
        Self {
            store,
            rules,
            locks,
        }
    }

    pub async fn execute(
        &self,
        record_id: RecordId,
        plan: &MutationPlan,
        options: ApplyOptions,
    ) -> ProgressionResult<ApplyOutcome> {
        let _guard = self.locks.try_acquire(record_id).ok_or_else(|| {
            ApplicationError::new(format!(
                "Character {record_id} is already being updated; try again"
            ))
        })?;

        let current = self
            .store
            .get_record(record_id)
            .await?
            .ok_or_else(|| StoreError::not_found("record", record_id))?;

        let mut compensations = Compensations::new();
        match self
            .write_phases(&current, plan, &options, &mut compensations)
            .await
        {
            Ok(outcome) => {
                tracing::info!(
                    record_id = %record_id,
                    source = %options.source,
                    ops = outcome.ops_applied,
                    rederived = outcome.rederived,
                    "Mutation plan applied"
                );
                Ok(outcome)
            }
            Err(err) => {
                let correlation_id = match &err {
                    ProgressionError::Application(app) => app.correlation_id,
                    _ => CorrelationId::new(),
                };
                tracing::warn!(
                    record_id = %record_id,
                    source = %options.source,
                    correlation_id = %correlation_id.short(),
                    error = %err,
                    "Apply failed, restoring record"
                );
                compensations.unwind(self.store.as_ref(), correlation_id).await;
                Err(err)
            }
        }
    }

    async fn write_phases(
        &self,
        current: &PersistedRecord,
        plan: &MutationPlan,
        options: &ApplyOptions,
        compensations: &mut Compensations,
    ) -> ProgressionResult<ApplyOutcome> {
        let id = current.id;
        let primitive = plan.apply_to(&current.data)?;

        // Pushed before the write: a failed update may still have landed.
        compensations.push(Compensation::RestoreRecord {
            id,
            data: current.data.clone(),
        });
        let mut record = self.store.update_record(id, primitive).await?;

        let mut rederived = 0;
        if options.rederive {
            let derived_ops = self.rules.rederive(&record.data).await?;
            if !derived_ops.is_empty() {
                let mut derived = record.data.clone();
                for op in &derived_ops {
                    document::apply_operation(&mut derived, op)?;
                }
                record = self.store.update_record(id, derived).await?;
                rederived = derived_ops.len();
            }
        }

        if options.validate {
            if let RuleVerdict::Errors(errors) = self.rules.validate_record(&record.data).await? {
                let error = errors.into_iter().next().map_or_else(
                    || ProgressionError::validation("record", "rejected by the rules"),
                    ProgressionError::Validation,
                );
                return Err(error);
            }
        }

        Ok(ApplyOutcome {
            record,
            ops_applied: plan.len(),
            rederived,
        })
    }
}
