use async_trait::async_trait;
use serde_json::Value;

use charforge_domain::{path, CatalogKind, Operation, ProgressionResult, Snapshot, StepId};

use super::missing_from;
use crate::use_cases::compile::{Selection, StepCompiler, StepContext, StepDescription, StepOutput};

/// Background: records the catalog id and grants its languages and skills.
pub struct BackgroundStep;

#[async_trait]
impl StepCompiler for BackgroundStep {
    fn id(&self) -> StepId {
        StepId::from("background")
    }

    fn field(&self) -> &'static str {
        "background"
    }

    fn describe(&self, snapshot: &Snapshot) -> StepDescription {
        let background = snapshot.get_str(&path!("background"));
        StepDescription {
            id: self.id(),
            title: "Background".into(),
            summary: background.unwrap_or("No background").to_string(),
            complete: background.is_some(),
        }
    }

    async fn compile(
        &self,
        ctx: &StepContext<'_>,
        selection: &Selection,
    ) -> ProgressionResult<StepOutput> {
        let wanted = selection.text("background").unwrap_or_default();
        let entry = ctx
            .require(CatalogKind::Background, wanted, self.field())
            .await?;

        // Emitted even when empty.
        let languages = missing_from(
            ctx.snapshot,
            &path!("languages"),
            entry.field_strings("languages"),
        );
        let mut ops = vec![
            Operation::set(path!("background"), entry.id.as_str()),
            Operation::add(path!("languages"), Value::Array(languages)),
        ];

        let skills = missing_from(
            ctx.snapshot,
            &path!("skills", "trained"),
            entry.field_strings("skills"),
        );
        if !skills.is_empty() {
            ops.push(Operation::add(path!("skills", "trained"), Value::Array(skills)));
        }

        Ok(StepOutput::new(ops).choosing(entry.key()))
    }
}
