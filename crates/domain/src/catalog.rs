//! Reference definitions served by the catalog.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::path::ItemKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogKind {
    Species,
    Template,
    Class,
    Feat,
    Talent,
    Power,
    Skill,
    Background,
    Language,
    Equipment,
}

impl CatalogKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Species => "species",
            Self::Template => "template",
            Self::Class => "class",
            Self::Feat => "feat",
            Self::Talent => "talent",
            Self::Power => "power",
            Self::Skill => "skill",
            Self::Background => "background",
            Self::Language => "language",
            Self::Equipment => "equipment",
        }
    }
}

impl fmt::Display for CatalogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized catalog record.
///
/// `data` holds kind-specific fields (a species' ability adjustments, a
/// class' talent count). `effects` is raw and untrusted until sanitized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    pub kind: CatalogKind,
    pub name: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub effects: Vec<Value>,
}

impl CatalogEntry {
    pub fn new(id: impl Into<String>, kind: CatalogKind, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            name: name.into(),
            data: Value::Object(Default::default()),
            effects: Vec::new(),
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn with_effects(mut self, effects: Vec<Value>) -> Self {
        self.effects = effects;
        self
    }

    pub fn key(&self) -> ItemKey {
        ItemKey::new(&self.name)
    }

    /// True when `raw` names this entry by id or by name.
    pub fn matches(&self, raw: &str) -> bool {
        let wanted = ItemKey::new(raw);
        wanted == ItemKey::new(&self.id) || wanted == self.key()
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }

    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(Value::as_str)
    }

    pub fn field_i64(&self, name: &str) -> Option<i64> {
        self.field(name).and_then(Value::as_i64)
    }

    /// String list field, e.g. granted languages. Missing means empty.
    pub fn field_strings(&self, name: &str) -> Vec<String> {
        self.field(name)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn matches_by_id_or_name_case_insensitively() {
        let entry = CatalogEntry::new("bg-soldier", CatalogKind::Background, "Soldier");
        assert!(entry.matches("soldier"));
        assert!(entry.matches("BG-Soldier"));
        assert!(!entry.matches("scout"));
    }

    #[test]
    fn field_strings_defaults_to_empty() {
        let entry = CatalogEntry::new("wookiee", CatalogKind::Species, "Wookiee")
            .with_data(json!({"languages": ["Shyriiwook"], "size": "medium"}));
        assert_eq!(entry.field_strings("languages"), vec!["Shyriiwook"]);
        assert!(entry.field_strings("skills").is_empty());
        assert_eq!(entry.field_str("size"), Some("medium"));
    }
}
