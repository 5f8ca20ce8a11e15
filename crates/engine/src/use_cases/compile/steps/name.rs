use async_trait::async_trait;

use charforge_domain::{path, Operation, ProgressionError, ProgressionResult, Snapshot, StepId};

use crate::use_cases::compile::{Selection, StepCompiler, StepContext, StepDescription, StepOutput};

const MAX_NAME_LEN: usize = 80;

/// Character name.
pub struct NameStep;

#[async_trait]
impl StepCompiler for NameStep {
    fn id(&self) -> StepId {
        StepId::from("name")
    }

    fn field(&self) -> &'static str {
        "name"
    }

    fn describe(&self, snapshot: &Snapshot) -> StepDescription {
        let name = snapshot.get_str(&path!("name"));
        StepDescription {
            id: self.id(),
            title: "Name".into(),
            summary: name.unwrap_or("Unnamed").to_string(),
            complete: name.is_some(),
        }
    }

    async fn compile(
        &self,
        _ctx: &StepContext<'_>,
        selection: &Selection,
    ) -> ProgressionResult<StepOutput> {
        let name = selection.text("name").map(str::trim).unwrap_or_default();
        if name.is_empty() {
            return Err(ProgressionError::validation("name", "name cannot be blank"));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(ProgressionError::validation(
                "name",
                format!("name cannot exceed {MAX_NAME_LEN} characters"),
            ));
        }
        Ok(StepOutput::new(vec![Operation::set(path!("name"), name)]))
    }
}
