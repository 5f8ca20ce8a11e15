//! Values exchanged with collaborators.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use charforge_domain::{ItemKey, PersistedRecord, Snapshot, SubRecord, ValidationError};

/// What a step may choose from, according to the rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    /// The rules do not restrict this step.
    Unrestricted,
    /// Only these options are legal right now.
    Options(BTreeSet<ItemKey>),
}

impl Eligibility {
    pub fn options<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<ItemKey>,
    {
        Self::Options(keys.into_iter().map(Into::into).collect())
    }

    pub fn allows(&self, key: &ItemKey) -> bool {
        match self {
            Self::Unrestricted => true,
            Self::Options(valid) => valid.contains(key),
        }
    }
}

/// Outcome of a rule validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleVerdict {
    Ok,
    Errors(Vec<ValidationError>),
}

impl RuleVerdict {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// First reported error, if any.
    pub fn first_error(self) -> Option<ValidationError> {
        match self {
            Self::Ok => None,
            Self::Errors(errors) => errors.into_iter().next(),
        }
    }
}

/// Emitted once after a successful finalization.
#[derive(Debug, Clone, Serialize)]
pub struct FinalizationCompleted {
    pub record: PersistedRecord,
    pub snapshot: Snapshot,
    pub sub_records: Vec<SubRecord>,
    pub finalized_at: DateTime<Utc>,
}
