//! Step compilation: turn one raw selection into a validated patch.
//!
//! Each builder step is an independent [`StepCompiler`] registered in a
//! [`StepRegistry`] under its step id. Compilation never writes anything;
//! it reads the snapshot, the catalog and the rules and returns a patch.

mod registry;
mod selection;
pub mod steps;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use charforge_domain::{
    ApplicationError, CatalogEntry, CatalogKind, ItemKey, Operation, Patch, ProgressionError,
    ProgressionResult, Snapshot, StepId,
};

use crate::infrastructure::ports::{CatalogPort, ClockPort, RuleEvaluator, RuleVerdict};

pub use registry::StepRegistry;
pub use selection::{ListChanges, Selection};

/// Caller-controlled compile behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileOptions {
    /// Skip eligibility and rule validation. Referential checks still run.
    pub freebuild: bool,
}

impl CompileOptions {
    pub fn freebuild() -> Self {
        Self { freebuild: true }
    }
}

/// What a step produced, before it becomes a patch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepOutput {
    pub ops: Vec<Operation>,
    /// Options the user picked, checked against eligibility.
    pub chosen: Vec<ItemKey>,
}

impl StepOutput {
    pub fn new(ops: Vec<Operation>) -> Self {
        Self {
            ops,
            chosen: Vec::new(),
        }
    }

    pub fn choosing(mut self, key: ItemKey) -> Self {
        self.chosen.push(key);
        self
    }

    pub fn choosing_all(mut self, keys: impl IntoIterator<Item = ItemKey>) -> Self {
        self.chosen.extend(keys);
        self
    }
}

/// Summary a UI shows for a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepDescription {
    pub id: StepId,
    pub title: String,
    pub summary: String,
    pub complete: bool,
}

/// Read-only inputs available while compiling one step.
pub struct StepContext<'a> {
    pub step: &'a StepId,
    pub snapshot: &'a Snapshot,
    pub catalog: &'a dyn CatalogPort,
    pub rules: &'a dyn RuleEvaluator,
}

impl StepContext<'_> {
    /// Catalog lookup where "not found" is the user's mistake.
    pub async fn require(
        &self,
        kind: CatalogKind,
        id_or_name: &str,
        field: &str,
    ) -> ProgressionResult<CatalogEntry> {
        let wanted = id_or_name.trim();
        if wanted.is_empty() {
            return Err(ProgressionError::validation(
                field,
                format!("no {kind} selected"),
            ));
        }
        self.catalog
            .lookup(kind, wanted)
            .await?
            .ok_or_else(|| ProgressionError::validation(field, format!("unknown {kind} '{wanted}'")))
    }
}

/// One builder step.
#[async_trait]
pub trait StepCompiler: Send + Sync {
    fn id(&self) -> StepId;

    /// Snapshot field validation errors are reported against.
    fn field(&self) -> &'static str;

    fn describe(&self, snapshot: &Snapshot) -> StepDescription;

    /// Build the step's operations. Runs referential checks only.
    async fn compile(
        &self,
        ctx: &StepContext<'_>,
        selection: &Selection,
    ) -> ProgressionResult<StepOutput>;

    /// Eligibility and rule validation for a compiled patch.
    async fn validate(
        &self,
        ctx: &StepContext<'_>,
        output: &StepOutput,
        proposed: &Patch,
    ) -> ProgressionResult<()> {
        let eligibility = ctx.rules.compute_eligibility(ctx.snapshot, ctx.step).await?;
        if let Some(key) = output.chosen.iter().find(|k| !eligibility.allows(k)) {
            return Err(ProgressionError::validation(
                self.field(),
                format!("'{key}' is not an eligible choice"),
            ));
        }

        match ctx.rules.validate(ctx.snapshot, proposed).await? {
            RuleVerdict::Ok => Ok(()),
            RuleVerdict::Errors(errors) => Err(errors
                .into_iter()
                .next()
                .map(ProgressionError::Validation)
                .unwrap_or_else(|| {
                    ProgressionError::validation(self.field(), "rejected by the rules")
                })),
        }
    }
}

/// Compile use case.
///
/// Orchestrates: step lookup, referential checks, eligibility, rule validation.
pub struct CompileStep {
    registry: Arc<StepRegistry>,
    catalog: Arc<dyn CatalogPort>,
    rules: Arc<dyn RuleEvaluator>,
    clock: Arc<dyn ClockPort>,
}

impl CompileStep {
    pub fn new(
        registry: Arc<StepRegistry>,
        catalog: Arc<dyn CatalogPort>,
        rules: Arc<dyn RuleEvaluator>,
        clock: Arc<dyn ClockPort>,
    ) -> Self {
        Self {
            registry,
            catalog,
            rules,
            clock,
        }
    }

    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    /// Compile `selection` for `step` against `snapshot`.
    ///
    /// Freebuild applies when either the options or the snapshot ask for it.
    pub async fn execute(
        &self,
        snapshot: &Snapshot,
        step: &StepId,
        selection: &Selection,
        options: CompileOptions,
    ) -> ProgressionResult<Patch> {
        let compiler = self.registry.get(step).ok_or_else(|| {
            ApplicationError::new(format!("No step named '{step}' is registered"))
        })?;

        let ctx = StepContext {
            step,
            snapshot,
            catalog: self.catalog.as_ref(),
            rules: self.rules.as_ref(),
        };

        let output = compiler.compile(&ctx, selection).await?;
        let patch = Patch::with_ops(step.clone(), self.clock.now(), output.ops.clone());

        let freebuild = options.freebuild || snapshot.is_freebuild();
        if freebuild {
            tracing::debug!(step = %step, "Freebuild: skipping eligibility and rule validation");
        } else {
            compiler.validate(&ctx, &output, &patch).await?;
        }

        tracing::debug!(step = %step, ops = patch.len(), "Step compiled");
        Ok(patch)
    }
}
