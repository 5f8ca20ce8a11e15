//! Class selection: first class, level-up, or multiclass.

use async_trait::async_trait;
use serde_json::{json, Value};

use charforge_domain::{
    path, CatalogKind, ClassLevel, ItemKey, Operation, ProgressionError, ProgressionResult,
    Snapshot, StepId,
};

use super::missing_from;
use crate::use_cases::compile::{Selection, StepCompiler, StepContext, StepDescription, StepOutput};

const DEFAULT_TALENTS: i64 = 1;

pub struct ClassStep;

fn classes_of(snapshot: &Snapshot) -> ProgressionResult<Vec<ClassLevel>> {
    snapshot
        .draft()
        .map(|d| d.classes)
        .map_err(|e| ProgressionError::validation("classes", e.to_string()))
}

fn count_at(snapshot: &Snapshot, field: &str) -> i64 {
    snapshot
        .as_value()
        .get(field)
        .and_then(Value::as_i64)
        .unwrap_or(0)
}

#[async_trait]
impl StepCompiler for ClassStep {
    fn id(&self) -> StepId {
        StepId::from("class")
    }

    fn field(&self) -> &'static str {
        "classes"
    }

    fn describe(&self, snapshot: &Snapshot) -> StepDescription {
        let classes = classes_of(snapshot).unwrap_or_default();
        let summary = if classes.is_empty() {
            "No class chosen".to_string()
        } else {
            classes
                .iter()
                .map(|c| format!("{} {}", c.name, c.level))
                .collect::<Vec<_>>()
                .join(" / ")
        };
        StepDescription {
            id: self.id(),
            title: "Class".into(),
            summary,
            complete: !classes.is_empty(),
        }
    }

    async fn compile(
        &self,
        ctx: &StepContext<'_>,
        selection: &Selection,
    ) -> ProgressionResult<StepOutput> {
        let wanted = selection.text("class").unwrap_or_default();
        let entry = ctx.require(CatalogKind::Class, wanted, "classes").await?;
        let classes = classes_of(ctx.snapshot)?;
        let talents = entry.field_i64("talents").unwrap_or(DEFAULT_TALENTS);

        let mut ops = Vec::new();
        if classes.is_empty() {
            ops.push(Operation::set(
                path!("classes"),
                json!([{"name": entry.name, "level": 1}]),
            ));
            ops.push(Operation::set(path!("talentsRequired"), talents));
            if let Some(feats) = entry.field_i64("feats") {
                ops.push(Operation::set(path!("featsRequired"), feats));
            }

            let starting = missing_from(
                ctx.snapshot,
                &path!("feats"),
                entry.field_strings("startingFeats"),
            );
            if !starting.is_empty() {
                ops.push(Operation::add(path!("feats"), Value::Array(starting)));
            }
        } else {
            let key = entry.key();
            let levelled: Vec<ClassLevel> = if classes.iter().any(|c| ItemKey::new(&c.name) == key) {
                classes
                    .into_iter()
                    .map(|mut c| {
                        if ItemKey::new(&c.name) == key {
                            c.level += 1;
                        }
                        c
                    })
                    .collect()
            } else {
                let mut next = classes;
                next.push(ClassLevel {
                    name: entry.name.clone(),
                    level: 1,
                });
                next
            };
            ops.push(Operation::set(path!("classes"), json!(levelled)));
            ops.push(Operation::set(
                path!("talentsRequired"),
                count_at(ctx.snapshot, "talentsRequired") + talents,
            ));
            if let Some(feats) = entry.field_i64("feats") {
                ops.push(Operation::set(
                    path!("featsRequired"),
                    count_at(ctx.snapshot, "featsRequired") + feats,
                ));
            }
        }

        Ok(StepOutput::new(ops).choosing(entry.key()))
    }
}
