//! Baseline rule evaluator.
//!
//! Hosts with a full ruleset plug in their own [`RuleEvaluator`]. This one
//! covers the structural checks every ruleset shares and keeps ability
//! totals and modifiers derived from their parts.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use charforge_domain::{
    path, ItemKey, Operation, Patch, Snapshot, StepId, ValidationError, ABILITIES,
};

use crate::infrastructure::ports::{Eligibility, RuleError, RuleEvaluator, RuleVerdict};

const MIN_ABILITY: i64 = 3;
const MAX_ABILITY: i64 = 20;

#[derive(Default)]
pub struct BasicRules {
    restrictions: HashMap<StepId, Vec<ItemKey>>,
}

impl BasicRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit a step to a fixed option list.
    pub fn with_options<I, K>(mut self, step: impl Into<StepId>, options: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<ItemKey>,
    {
        self.restrictions
            .insert(step.into(), options.into_iter().map(Into::into).collect());
        self
    }
}

fn int_at(data: &Value, ability: &str, part: &str) -> i64 {
    data.get("abilities")
        .and_then(|a| a.get(ability))
        .and_then(|a| a.get(part))
        .and_then(Value::as_i64)
        .unwrap_or(0)
}

fn ability_errors(data: &Value) -> Vec<ValidationError> {
    ABILITIES
        .iter()
        .filter_map(|ability| {
            let base = int_at(data, ability, "base");
            (!(MIN_ABILITY..=MAX_ABILITY).contains(&base)).then(|| {
                ValidationError::new(
                    format!("abilities.{ability}.base"),
                    format!("must be between {MIN_ABILITY} and {MAX_ABILITY}, got {base}"),
                )
            })
        })
        .collect()
}

fn verdict(errors: Vec<ValidationError>) -> RuleVerdict {
    if errors.is_empty() {
        RuleVerdict::Ok
    } else {
        RuleVerdict::Errors(errors)
    }
}

#[async_trait]
impl RuleEvaluator for BasicRules {
    async fn compute_eligibility(
        &self,
        _snapshot: &Snapshot,
        step: &StepId,
    ) -> Result<Eligibility, RuleError> {
        Ok(match self.restrictions.get(step) {
            Some(options) => Eligibility::Options(options.iter().cloned().collect()),
            None => Eligibility::Unrestricted,
        })
    }

    async fn validate(
        &self,
        snapshot: &Snapshot,
        proposed: &Patch,
    ) -> Result<RuleVerdict, RuleError> {
        let next = snapshot
            .apply(proposed)
            .map_err(|e| RuleError::Evaluation(e.to_string()))?;

        let mut errors = Vec::new();
        let touches = |root: &str| proposed.ops.iter().any(|op| op.path().first() == root);

        if touches("abilities") {
            errors.extend(ability_errors(next.as_value()));
        }
        if touches("classes") {
            let zero_level = next
                .draft()
                .map_err(|e| RuleError::Evaluation(e.to_string()))?
                .classes
                .into_iter()
                .any(|c| c.level == 0);
            if zero_level {
                errors.push(ValidationError::new("classes", "class level must be at least 1"));
            }
        }
        Ok(verdict(errors))
    }

    async fn rederive(&self, data: &Value) -> Result<Vec<Operation>, RuleError> {
        let mut ops = Vec::new();
        for ability in ABILITIES {
            let total = int_at(data, ability, "base")
                + int_at(data, ability, "racial")
                + int_at(data, ability, "temp");
            let modifier = (total - 10).div_euclid(2);

            if int_at(data, ability, "total") != total {
                ops.push(Operation::set(path!("abilities", ability, "total"), total));
            }
            if int_at(data, ability, "mod") != modifier {
                ops.push(Operation::set(path!("abilities", ability, "mod"), modifier));
            }
        }
        Ok(ops)
    }

    async fn validate_record(&self, data: &Value) -> Result<RuleVerdict, RuleError> {
        let mut errors = Vec::new();

        let has_name = data
            .get("name")
            .and_then(Value::as_str)
            .is_some_and(|n| !n.trim().is_empty());
        if !has_name {
            errors.push(ValidationError::new("name", "a character needs a name"));
        }

        let has_class = data
            .get("classes")
            .and_then(Value::as_array)
            .is_some_and(|c| !c.is_empty());
        if !has_class {
            errors.push(ValidationError::new("classes", "at least one class is required"));
        }

        errors.extend(ability_errors(data));
        Ok(verdict(errors))
    }
}
