//! Species, or a construct template for characters without one.

use async_trait::async_trait;
use serde_json::Value;

use charforge_domain::{
    path, CatalogEntry, CatalogKind, Operation, ProgressionResult, Snapshot, StepId, ABILITIES,
};

use super::missing_from;
use crate::use_cases::compile::{Selection, StepCompiler, StepContext, StepDescription, StepOutput};

pub struct SpeciesStep;

impl SpeciesStep {
    /// Size and racial ability adjustments shared by species and templates.
    fn physical_ops(entry: &CatalogEntry) -> Vec<Operation> {
        let mut ops = vec![Operation::set(
            path!("size"),
            entry.field_str("size").unwrap_or("medium"),
        )];
        let adjustments = entry.field("abilities");
        for ability in ABILITIES {
            let racial = adjustments
                .and_then(|a| a.get(ability))
                .and_then(Value::as_i64)
                .unwrap_or(0);
            ops.push(Operation::set(path!("abilities", ability, "racial"), racial));
        }
        ops
    }
}

#[async_trait]
impl StepCompiler for SpeciesStep {
    fn id(&self) -> StepId {
        StepId::from("species")
    }

    fn field(&self) -> &'static str {
        "species"
    }

    fn describe(&self, snapshot: &Snapshot) -> StepDescription {
        let species = snapshot.get_str(&path!("species"));
        let template = snapshot.get_str(&path!("template"));
        let summary = match (species, template) {
            (Some(s), _) => s.to_string(),
            (None, Some(t)) => format!("{t} (template)"),
            (None, None) => "No species chosen".to_string(),
        };
        StepDescription {
            id: self.id(),
            title: "Species".into(),
            summary,
            complete: species.is_some() || template.is_some(),
        }
    }

    async fn compile(
        &self,
        ctx: &StepContext<'_>,
        selection: &Selection,
    ) -> ProgressionResult<StepOutput> {
        if selection.has_key("template") {
            let wanted = selection.text("template").unwrap_or_default();
            let entry = ctx.require(CatalogKind::Template, wanted, "template").await?;

            let mut ops = vec![
                Operation::set(path!("template"), entry.name.as_str()),
                Operation::set(path!("species"), Value::Null),
            ];
            ops.extend(Self::physical_ops(&entry));
            return Ok(StepOutput::new(ops).choosing(entry.key()));
        }

        let wanted = selection.text("species").unwrap_or_default();
        let entry = ctx.require(CatalogKind::Species, wanted, "species").await?;

        let mut ops = vec![
            Operation::set(path!("species"), entry.name.as_str()),
            Operation::set(path!("template"), Value::Null),
        ];
        ops.extend(Self::physical_ops(&entry));

        let languages = missing_from(
            ctx.snapshot,
            &path!("languages"),
            entry.field_strings("languages"),
        );
        if !languages.is_empty() {
            ops.push(Operation::add(path!("languages"), Value::Array(languages)));
        }

        Ok(StepOutput::new(ops).choosing(entry.key()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::use_cases::compile::steps::test_support::compile;
    use charforge_domain::{ItemKey, Patch};
    use chrono::Utc;
    use serde_json::json;

    #[tokio::test]
    async fn species_sets_identity_racials_and_languages() {
        let out = compile(&SpeciesStep, &Snapshot::empty(), Selection::new("Wookiee"))
            .await
            .unwrap();

        assert!(out.ops.contains(&Operation::set(path!("species"), "Wookiee")));
        assert!(out.ops.contains(&Operation::set(path!("abilities", "str", "racial"), 4)));
        assert!(out.ops.contains(&Operation::set(path!("abilities", "con", "racial"), 0)));
        assert!(out
            .ops
            .contains(&Operation::add(path!("languages"), json!(["Shyriiwook"]))));
        assert_eq!(out.chosen, vec![ItemKey::new("wookiee")]);
    }

    #[tokio::test]
    async fn known_languages_are_not_added_twice() {
        let snapshot = Snapshot::empty()
            .apply(&Patch::new("languages", Utc::now()).add(path!("languages"), "Basic"))
            .unwrap();
        let out = compile(&SpeciesStep, &snapshot, Selection::new("human"))
            .await
            .unwrap();
        assert!(out.ops.iter().all(|op| op.path() != &path!("languages")));
    }

    #[tokio::test]
    async fn template_replaces_species() {
        let out = compile(
            &SpeciesStep,
            &Snapshot::empty(),
            Selection::new(json!({"template": "droid"})),
        )
        .await
        .unwrap();

        assert_eq!(out.ops[0], Operation::set(path!("template"), "Droid"));
        assert_eq!(out.ops[1], Operation::set(path!("species"), Value::Null));
        assert!(out.ops.contains(&Operation::set(path!("size"), "small")));
    }

    #[tokio::test]
    async fn unknown_species_is_a_validation_error() {
        let err = compile(&SpeciesStep, &Snapshot::empty(), Selection::new("gungan"))
            .await
            .unwrap_err();
        assert_eq!(err.as_validation().unwrap().field, "species");
    }
}
