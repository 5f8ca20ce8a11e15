//! Port traits for infrastructure boundaries.
//!
//! These are the only abstractions in the engine. Ports exist for:
//! - Rule evaluation (eligibility, validation, derived fields)
//! - Catalog lookups (species, classes, feats, ...)
//! - Character persistence (records and sub-records)
//! - Completion notification
//! - Clock (for testing)

mod collaborators;
mod error;
mod testing;
mod types;

pub use collaborators::{CatalogPort, CharacterStore, CompletionNotifier, RuleEvaluator};
pub use error::{CatalogError, RuleError, StoreError};
pub use testing::ClockPort;
pub use types::{Eligibility, FinalizationCompleted, RuleVerdict};

#[cfg(test)]
pub use collaborators::{
    MockCatalogPort, MockCharacterStore, MockCompletionNotifier, MockRuleEvaluator,
};
#[cfg(test)]
pub use testing::MockClockPort;
