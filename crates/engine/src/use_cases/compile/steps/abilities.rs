use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

use charforge_domain::{
    path, Operation, ProgressionError, ProgressionResult, Snapshot, StepId, ABILITIES,
};

use crate::use_cases::compile::{Selection, StepCompiler, StepContext, StepDescription, StepOutput};

/// Base ability scores. Whether the array is legal is the rules' call.
pub struct AbilitiesStep;

#[async_trait]
impl StepCompiler for AbilitiesStep {
    fn id(&self) -> StepId {
        StepId::from("abilities")
    }

    fn field(&self) -> &'static str {
        "abilities"
    }

    fn describe(&self, snapshot: &Snapshot) -> StepDescription {
        let summary = ABILITIES
            .iter()
            .map(|a| {
                let total = snapshot
                    .get(&path!("abilities", *a, "total"))
                    .and_then(Value::as_i64)
                    .unwrap_or(10);
                format!("{} {total}", a.to_uppercase())
            })
            .collect::<Vec<_>>()
            .join(", ");
        let complete = ABILITIES.iter().any(|a| {
            snapshot
                .get(&path!("abilities", *a, "base"))
                .and_then(Value::as_i64)
                .is_some_and(|base| base != 10)
        });
        StepDescription {
            id: self.id(),
            title: "Abilities".into(),
            summary,
            complete,
        }
    }

    async fn compile(
        &self,
        _ctx: &StepContext<'_>,
        selection: &Selection,
    ) -> ProgressionResult<StepOutput> {
        let scores: BTreeMap<String, Value> = selection.parse("abilities")?;
        if scores.is_empty() {
            return Err(ProgressionError::validation(
                "abilities",
                "no ability scores given",
            ));
        }
        if let Some(unknown) = scores.keys().find(|k| !ABILITIES.contains(&k.as_str())) {
            return Err(ProgressionError::validation(
                "abilities",
                format!("unknown ability '{unknown}'"),
            ));
        }

        let mut ops = Vec::new();
        for ability in ABILITIES {
            let Some(raw) = scores.get(ability) else {
                continue;
            };
            let base = raw.as_i64().ok_or_else(|| {
                ProgressionError::validation(
                    format!("abilities.{ability}"),
                    "score must be a whole number",
                )
            })?;
            ops.push(Operation::set(path!("abilities", ability, "base"), base));
        }
        Ok(StepOutput::new(ops))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::use_cases::compile::steps::test_support::compile;
    use serde_json::json;

    #[tokio::test]
    async fn sets_base_scores_in_sheet_order() {
        let out = compile(
            &AbilitiesStep,
            &Snapshot::empty(),
            Selection::new(json!({"wis": 12, "str": 15})),
        )
        .await
        .unwrap();
        assert_eq!(
            out.ops,
            vec![
                Operation::set(path!("abilities", "str", "base"), 15),
                Operation::set(path!("abilities", "wis", "base"), 12),
            ]
        );
    }

    #[tokio::test]
    async fn non_integer_score_names_the_ability() {
        let err = compile(
            &AbilitiesStep,
            &Snapshot::empty(),
            Selection::new(json!({"dex": "high"})),
        )
        .await
        .unwrap_err();
        assert_eq!(err.as_validation().unwrap().field, "abilities.dex");
    }

    #[tokio::test]
    async fn unknown_ability_is_rejected() {
        let err = compile(
            &AbilitiesStep,
            &Snapshot::empty(),
            Selection::new(json!({"luck": 18})),
        )
        .await
        .unwrap_err();
        assert!(err.as_validation().unwrap().reason.contains("luck"));
    }
}
