use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use charforge_domain::{
    path, CatalogKind, ItemKey, Operation, ProgressionError, ProgressionResult, Snapshot, StepId,
};

use crate::use_cases::compile::{Selection, StepCompiler, StepContext, StepDescription, StepOutput};

/// Trained skills. The selection replaces the whole trained set.
pub struct SkillsStep;

#[derive(Deserialize)]
#[serde(untagged)]
enum SkillSelection {
    List(Vec<String>),
    Trained { trained: Vec<String> },
}

#[async_trait]
impl StepCompiler for SkillsStep {
    fn id(&self) -> StepId {
        StepId::from("skills")
    }

    fn field(&self) -> &'static str {
        "skills.trained"
    }

    fn describe(&self, snapshot: &Snapshot) -> StepDescription {
        let trained: Vec<String> = snapshot
            .get(&path!("skills", "trained"))
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        StepDescription {
            id: self.id(),
            title: "Skills".into(),
            summary: if trained.is_empty() {
                "No trained skills".into()
            } else {
                trained.join(", ")
            },
            complete: !trained.is_empty(),
        }
    }

    async fn compile(
        &self,
        ctx: &StepContext<'_>,
        selection: &Selection,
    ) -> ProgressionResult<StepOutput> {
        let names = match selection.parse::<SkillSelection>(self.field())? {
            SkillSelection::List(names) | SkillSelection::Trained { trained: names } => names,
        };

        let mut trained = Vec::new();
        let mut keys: Vec<ItemKey> = Vec::new();
        for name in names {
            let entry = ctx.require(CatalogKind::Skill, &name, self.field()).await?;
            if keys.contains(&entry.key()) {
                return Err(ProgressionError::validation(
                    self.field(),
                    format!("'{}' is listed twice", entry.name),
                ));
            }
            keys.push(entry.key());
            trained.push(Value::String(entry.name));
        }

        Ok(StepOutput::new(vec![Operation::set(
            path!("skills", "trained"),
            Value::Array(trained),
        )])
        .choosing_all(keys))
    }
}
