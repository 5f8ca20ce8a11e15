//! Builder session: one character in progress, driven step by step.
//!
//! State machine:
//! `Collecting(step) -> Collecting(next) -> ... -> Finalizing -> Finalized | Failed`.
//! `Failed` may go back to `Collecting`; `Finalized` is terminal. A record
//! kept by a failed finalization is reused when finalizing again.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use charforge_domain::{
    merge, path, ApplicationError, MergeOptions, Patch, ProgressionError, ProgressionResult,
    RecordId, Snapshot, StepId,
};

use super::compile::{CompileOptions, CompileStep, Selection};
use super::finalize::{kept_record, FinalizeCharacter, Finalized};
use super::merge::MergePatches;
use crate::infrastructure::ports::ClockPort;

/// Source id for the session's own bookkeeping patches.
pub const BUILDER_SOURCE: &str = "builder";

#[derive(Debug, Clone)]
pub enum BuilderState {
    Collecting(StepId),
    Finalizing,
    Finalized(RecordId),
    Failed {
        error: ApplicationError,
        /// Record written before the terminal check rejected it.
        kept: Option<RecordId>,
    },
}

impl BuilderState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finalized(_))
    }
}

/// Patches committed together in one `commit` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommittedBatch {
    pub patches: Vec<Patch>,
    pub committed_at: DateTime<Utc>,
}

pub struct BuilderSession {
    compile: Arc<CompileStep>,
    merge: Arc<MergePatches>,
    finalize: Arc<FinalizeCharacter>,
    clock: Arc<dyn ClockPort>,
    origin: Snapshot,
    snapshot: Snapshot,
    state: BuilderState,
    history: Vec<CommittedBatch>,
    /// Survives `advance` so a corrected retry updates the same record.
    kept: Option<RecordId>,
}

impl BuilderSession {
    /// Start a session on `snapshot`, resuming at its saved step if it has one.
    pub fn new(
        compile: Arc<CompileStep>,
        merge: Arc<MergePatches>,
        finalize: Arc<FinalizeCharacter>,
        clock: Arc<dyn ClockPort>,
        snapshot: Snapshot,
    ) -> Self {
        let step = snapshot
            .current_step()
            .filter(|s| compile.registry().get(s).is_some())
            .or_else(|| compile.registry().ids().into_iter().next())
            .unwrap_or_else(|| StepId::from("name"));
        Self {
            compile,
            merge,
            finalize,
            clock,
            origin: snapshot.clone(),
            snapshot,
            state: BuilderState::Collecting(step),
            history: Vec::new(),
            kept: None,
        }
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn state(&self) -> &BuilderState {
        &self.state
    }

    pub fn history(&self) -> &[CommittedBatch] {
        &self.history
    }

    pub fn current_step(&self) -> Option<&StepId> {
        match &self.state {
            BuilderState::Collecting(step) => Some(step),
            _ => None,
        }
    }

    /// Compile a selection against the current snapshot. Nothing is committed.
    pub async fn compile(&self, step: &StepId, selection: &Selection) -> ProgressionResult<Patch> {
        self.ensure_collecting()?;
        let options = CompileOptions {
            freebuild: self.snapshot.is_freebuild(),
        };
        self.compile
            .execute(&self.snapshot, step, selection, options)
            .await
    }

    /// Merge `patches` with the configured conflict default and apply the
    /// result to the snapshot.
    pub fn commit(&mut self, patches: Vec<Patch>) -> ProgressionResult<&Snapshot> {
        self.ensure_collecting()?;
        let plan = self.merge.execute(&patches, None)?;
        self.snapshot = self.snapshot.apply_plan(&plan)?;
        tracing::debug!(
            patches = patches.len(),
            sources = ?plan.sources(),
            "Patches committed to snapshot"
        );
        self.history.push(CommittedBatch {
            patches,
            committed_at: self.clock.now(),
        });
        Ok(&self.snapshot)
    }

    /// Move to `step`. Allowed while collecting, and from `Failed` for corrections.
    pub fn advance(&mut self, step: StepId) -> ProgressionResult<()> {
        self.ensure_open()?;
        if matches!(self.state, BuilderState::Finalizing) {
            return Err(ApplicationError::new("finalization is in progress").into());
        }
        if self.compile.registry().get(&step).is_none() {
            return Err(ApplicationError::new(format!("No step named '{step}' is registered")).into());
        }

        let bookkeeping = Patch::new(BUILDER_SOURCE, self.clock.now())
            .set(path!("currentStep"), step.as_str());
        self.snapshot = self.snapshot.apply(&bookkeeping)?;
        self.history.push(CommittedBatch {
            patches: vec![bookkeeping],
            committed_at: self.clock.now(),
        });
        self.state = BuilderState::Collecting(step);
        Ok(())
    }

    /// Advance to the step after the current one. Returns `None` at the last step.
    pub fn advance_to_next(&mut self) -> ProgressionResult<Option<StepId>> {
        let current = self.current_step().cloned().ok_or_else(|| {
            ProgressionError::application("no step is being collected")
        })?;
        match self.compile.registry().next_after(&current) {
            Some(next) => {
                self.advance(next.clone())?;
                Ok(Some(next))
            }
            None => Ok(None),
        }
    }

    /// Hand the snapshot to the finalization boundary.
    ///
    /// Without `existing`, a record kept by an earlier failed attempt is
    /// updated instead of creating a second one.
    pub async fn finalize(&mut self, existing: Option<RecordId>) -> ProgressionResult<Finalized> {
        self.ensure_open()?;
        if matches!(self.state, BuilderState::Finalizing) {
            return Err(ApplicationError::new("finalization is already in progress").into());
        }

        let target = existing.or(self.kept);
        self.state = BuilderState::Finalizing;
        let result = self.finalize.execute(&self.snapshot, target).await;

        match &result {
            Ok(done) => {
                self.state = BuilderState::Finalized(done.record.id);
            }
            Err(err) => {
                let failure = match err {
                    ProgressionError::Application(app) => app.clone(),
                    other => ApplicationError::with_cause("finalization failed", other.clone()),
                };
                if let Some(id) = kept_record(err) {
                    self.kept = Some(id);
                }
                tracing::info!(
                    correlation_id = %failure.correlation_id.short(),
                    kept_record = ?self.kept,
                    error = %err,
                    "Finalization failed, session can be corrected"
                );
                self.state = BuilderState::Failed {
                    error: failure,
                    kept: self.kept,
                };
            }
        }
        result
    }

    /// Rebuild the snapshot from the session's starting point and its history.
    ///
    /// Batches already passed conflict detection, so they are re-merged
    /// without it.
    pub fn replay(&self) -> ProgressionResult<Snapshot> {
        let mut snapshot = self.origin.clone();
        for batch in &self.history {
            let plan = merge(&batch.patches, MergeOptions::lenient())?;
            snapshot = snapshot.apply_plan(&plan)?;
        }
        Ok(snapshot)
    }

    fn ensure_open(&self) -> ProgressionResult<()> {
        if self.state.is_terminal() {
            return Err(ApplicationError::new("session finalized").into());
        }
        Ok(())
    }

    fn ensure_collecting(&self) -> ProgressionResult<()> {
        self.ensure_open()?;
        match self.state {
            BuilderState::Collecting(_) => Ok(()),
            BuilderState::Finalizing => {
                Err(ApplicationError::new("finalization is in progress").into())
            }
            _ => Err(ApplicationError::new(
                "finalization failed; advance to a step to make corrections",
            )
            .into()),
        }
    }
}
