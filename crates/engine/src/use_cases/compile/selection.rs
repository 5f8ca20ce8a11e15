//! Raw user selections.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use charforge_domain::{ItemKey, ProgressionError, ProgressionResult};

/// The raw value a UI step submits, e.g. `"soldier"` or `{"add": ["Dodge"]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Selection(Value);

impl Selection {
    pub fn new(value: impl Into<Value>) -> Self {
        Self(value.into())
    }

    pub fn value(&self) -> &Value {
        &self.0
    }

    /// Deserialize into a typed selection; shape errors are validation errors on `field`.
    pub fn parse<T: DeserializeOwned>(&self, field: &str) -> ProgressionResult<T> {
        serde_json::from_value(self.0.clone()).map_err(|e| {
            ProgressionError::validation(field, format!("unrecognized selection: {e}"))
        })
    }

    /// A bare string, or the string under `key` in an object.
    pub fn text(&self, key: &str) -> Option<&str> {
        match &self.0 {
            Value::String(s) => Some(s.as_str()),
            Value::Object(map) => map.get(key).and_then(Value::as_str),
            _ => None,
        }
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.0.get(key).is_some()
    }
}

/// Add/remove selection for collection steps.
///
/// Accepts either a bare list (everything is added) or
/// `{"add": [...], "remove": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "ListSelectionRepr")]
pub struct ListChanges {
    pub add: Vec<Value>,
    pub remove: Vec<ItemKey>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ListSelectionRepr {
    Items(Vec<Value>),
    Changes {
        #[serde(default)]
        add: Vec<Value>,
        #[serde(default)]
        remove: Vec<ItemKey>,
    },
}

impl From<ListSelectionRepr> for ListChanges {
    fn from(repr: ListSelectionRepr) -> Self {
        match repr {
            ListSelectionRepr::Items(add) => Self {
                add,
                remove: Vec::new(),
            },
            ListSelectionRepr::Changes { add, remove } => Self { add, remove },
        }
    }
}

impl ListChanges {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_reads_bare_string_or_keyed_field() {
        assert_eq!(Selection::new("wookiee").text("species"), Some("wookiee"));
        assert_eq!(
            Selection::new(json!({"template": "droid"})).text("template"),
            Some("droid")
        );
        assert_eq!(Selection::new(json!(3)).text("species"), None);
    }

    #[test]
    fn list_changes_accept_both_shapes() {
        let bare: ListChanges = Selection::new(json!(["Dodge"])).parse("feats").unwrap();
        assert_eq!(bare.add, vec![json!("Dodge")]);
        assert!(bare.remove.is_empty());

        let full: ListChanges = Selection::new(json!({"remove": ["Toughness"]}))
            .parse("feats")
            .unwrap();
        assert!(full.add.is_empty());
        assert_eq!(full.remove, vec![ItemKey::new("toughness")]);
    }

    #[test]
    fn shape_errors_are_validation_errors() {
        let err = Selection::new(json!(42))
            .parse::<ListChanges>("feats")
            .unwrap_err();
        assert_eq!(err.as_validation().map(|v| v.field.as_str()), Some("feats"));
    }
}
