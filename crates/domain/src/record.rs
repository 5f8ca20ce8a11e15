//! Persisted character records and the sub-records they own.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::CatalogKind;
use crate::effect::Effect;
use crate::ids::{RecordId, SubRecordId};
use crate::path::FieldPath;

/// The durable character entity.
///
/// Records carry no revision counter, so a restored pre-image is equal to
/// the record as it was before the failed call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedRecord {
    pub id: RecordId,
    pub data: Value,
}

impl PersistedRecord {
    pub fn new(id: RecordId, data: Value) -> Self {
        Self { id, data }
    }
}

/// Kinds of sub-record a character owns. Only finalization creates them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubRecordKind {
    Feat,
    Talent,
    Power,
    Equipment,
}

impl SubRecordKind {
    pub const ALL: [SubRecordKind; 4] = [Self::Feat, Self::Talent, Self::Power, Self::Equipment];

    /// Snapshot collection the selections of this kind live in.
    pub fn collection(&self) -> FieldPath {
        FieldPath::new(match self {
            Self::Feat => "feats",
            Self::Talent => "talents",
            Self::Power => "powers",
            Self::Equipment => "equipment",
        })
    }

    pub fn catalog_kind(&self) -> CatalogKind {
        match self {
            Self::Feat => CatalogKind::Feat,
            Self::Talent => CatalogKind::Talent,
            Self::Power => CatalogKind::Power,
            Self::Equipment => CatalogKind::Equipment,
        }
    }
}

/// A sub-record before it is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubRecordDraft {
    pub name: String,
    pub data: Value,
    pub effects: Vec<Effect>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubRecord {
    pub id: SubRecordId,
    pub owner: RecordId,
    pub kind: SubRecordKind,
    pub name: String,
    pub data: Value,
    pub effects: Vec<Effect>,
}

impl SubRecord {
    pub fn from_draft(owner: RecordId, kind: SubRecordKind, draft: SubRecordDraft) -> Self {
        Self {
            id: SubRecordId::new(),
            owner,
            kind,
            name: draft.name,
            data: draft.data,
            effects: draft.effects,
        }
    }
}
