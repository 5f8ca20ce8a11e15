//! Pure value types for the character progression engine.
//!
//! Nothing in this crate performs I/O. Snapshots, patches and plans are
//! plain data; the merge engine is a pure function over them.

pub mod catalog;
pub mod document;
pub mod effect;
pub mod error;
pub mod ids;
pub mod merge;
pub mod operation;
pub mod patch;
pub mod path;
pub mod plan;
pub mod record;
pub mod snapshot;

pub use catalog::{CatalogEntry, CatalogKind};
pub use effect::{Effect, EffectKind, EffectSanitizer, SanitizedEffects, StrippedEffect};
pub use error::{
    ApplicationError, ConflictError, ConflictTarget, ErrorCause, PatchError, ProgressionError,
    ProgressionResult, ValidationError,
};
pub use ids::{CorrelationId, RecordId, StepId, SubRecordId};
pub use merge::{merge, MergeOptions};
pub use operation::{Operation, OperationKind};
pub use patch::Patch;
pub use path::{FieldPath, ItemKey};
pub use plan::{MutationPlan, PlannedAdd, PlannedRemoval, PlannedSet};
pub use record::{PersistedRecord, SubRecord, SubRecordDraft, SubRecordKind};
pub use snapshot::{
    AbilityScore, CharacterDraft, ClassLevel, Pool, Skills, Snapshot, ABILITIES,
};
