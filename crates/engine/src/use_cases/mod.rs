//! Use cases - the engine's exposed surface.
//!
//! `compile`, `merge`, `apply` and `finalize` each return a value or a
//! [`ProgressionError`](charforge_domain::ProgressionError). The builder
//! session strings them together for one character.

pub mod apply;
pub mod builder;
pub mod compile;
pub mod finalize;
pub mod merge;
pub mod rollback;

pub use apply::{ApplyMutation, ApplyOptions, ApplyOutcome};
pub use builder::{BuilderSession, BuilderState, CommittedBatch, BUILDER_SOURCE};
pub use compile::{
    CompileOptions, CompileStep, ListChanges, Selection, StepCompiler, StepContext,
    StepDescription, StepOutput, StepRegistry,
};
pub use finalize::{kept_record, FinalizeCharacter, Finalized, RecordKept};
pub use merge::MergePatches;
pub use rollback::{Compensation, Compensations};
