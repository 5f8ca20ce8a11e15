//! Rule effects attached to sub-records, and the sanitizer that guards them.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A mechanical effect a feat, talent, power or item grants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Effect {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default)]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Effect {
    pub fn new(kind: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            kind: kind.into(),
            key: None,
            value: value.into(),
            label: None,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Effect kinds the engine recognizes out of the box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    Ability,
    Skill,
    Defense,
    HitPoints,
    ForcePoints,
    Speed,
    DamageReduction,
    Condition,
    Language,
    Proficiency,
}

impl EffectKind {
    pub const ALL: [EffectKind; 10] = [
        Self::Ability,
        Self::Skill,
        Self::Defense,
        Self::HitPoints,
        Self::ForcePoints,
        Self::Speed,
        Self::DamageReduction,
        Self::Condition,
        Self::Language,
        Self::Proficiency,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ability => "ability",
            Self::Skill => "skill",
            Self::Defense => "defense",
            Self::HitPoints => "hit_points",
            Self::ForcePoints => "force_points",
            Self::Speed => "speed",
            Self::DamageReduction => "damage_reduction",
            Self::Condition => "condition",
            Self::Language => "language",
            Self::Proficiency => "proficiency",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = normalize_kind(raw);
        Self::ALL.into_iter().find(|k| k.as_str() == normalized)
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn normalize_kind(raw: &str) -> String {
    raw.trim().to_lowercase().replace(['-', ' '], "_")
}

/// Why an effect was stripped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum StrippedEffect {
    /// Well-formed, but of a kind nobody recognizes.
    UnknownKind(Effect),
    /// Not an effect object at all.
    Malformed(Value),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SanitizedEffects {
    pub kept: Vec<Effect>,
    pub stripped: Vec<StrippedEffect>,
}

impl SanitizedEffects {
    pub fn has_stripped(&self) -> bool {
        !self.stripped.is_empty()
    }
}

/// Strips effects whose kind is not in the recognized set.
///
/// Catalog data is untrusted: every effect headed for a sub-record passes
/// through here first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectSanitizer {
    recognized: BTreeSet<String>,
}

impl Default for EffectSanitizer {
    fn default() -> Self {
        Self {
            recognized: EffectKind::ALL
                .iter()
                .map(|k| k.as_str().to_string())
                .collect(),
        }
    }
}

impl EffectSanitizer {
    pub fn with_extra_kinds<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.recognized.extend(
            kinds
                .into_iter()
                .map(|k| normalize_kind(k.as_ref()))
                .filter(|k| !k.is_empty()),
        );
        self
    }

    pub fn recognizes(&self, kind: &str) -> bool {
        self.recognized.contains(&normalize_kind(kind))
    }

    pub fn sanitize(&self, effects: impl IntoIterator<Item = Effect>) -> SanitizedEffects {
        let mut out = SanitizedEffects::default();
        for effect in effects {
            if self.recognizes(&effect.kind) {
                out.kept.push(effect);
            } else {
                out.stripped.push(StrippedEffect::UnknownKind(effect));
            }
        }
        out
    }

    /// Sanitize raw JSON effects, stripping anything that does not parse.
    pub fn sanitize_raw<'a>(&self, raw: impl IntoIterator<Item = &'a Value>) -> SanitizedEffects {
        let mut malformed = Vec::new();
        let parsed: Vec<Effect> = raw
            .into_iter()
            .filter_map(|v| match serde_json::from_value::<Effect>(v.clone()) {
                Ok(effect) => Some(effect),
                Err(_) => {
                    malformed.push(StrippedEffect::Malformed(v.clone()));
                    None
                }
            })
            .collect();

        let mut out = self.sanitize(parsed);
        out.stripped.extend(malformed);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keeps_recognized_and_strips_unknown_kinds() {
        let sanitizer = EffectSanitizer::default();
        let out = sanitizer.sanitize(vec![
            Effect::new("defense", 1).with_key("reflex"),
            Effect::new("Hit-Points", 5),
            Effect::new("arbitrary_script", "rm -rf"),
        ]);

        assert_eq!(out.kept.len(), 2);
        assert_eq!(out.stripped.len(), 1);
        assert!(matches!(
            &out.stripped[0],
            StrippedEffect::UnknownKind(e) if e.kind == "arbitrary_script"
        ));
    }

    #[test]
    fn extra_kinds_extend_the_recognized_set() {
        let sanitizer = EffectSanitizer::default().with_extra_kinds(["Initiative", " "]);
        assert!(sanitizer.recognizes("initiative"));
        assert!(!sanitizer.recognizes(""));
    }

    #[test]
    fn malformed_raw_effects_are_stripped() {
        let raw = vec![
            json!({"kind": "skill", "key": "perception", "value": 2}),
            json!("not an effect"),
            json!({"value": 3}),
        ];
        let out = EffectSanitizer::default().sanitize_raw(&raw);
        assert_eq!(out.kept, vec![Effect::new("skill", 2).with_key("perception")]);
        assert_eq!(out.stripped.len(), 2);
        assert!(out.has_stripped());
    }

    #[test]
    fn effect_kind_parse_normalizes() {
        assert_eq!(EffectKind::parse("Damage Reduction"), Some(EffectKind::DamageReduction));
        assert_eq!(EffectKind::parse("teleport"), None);
    }
}
