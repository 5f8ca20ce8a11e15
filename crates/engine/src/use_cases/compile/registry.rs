//! Step registry.

use std::sync::Arc;

use charforge_domain::{CatalogKind, Snapshot, StepId};

use super::steps::{
    AbilitiesStep, BackgroundStep, ClassStep, EquipmentStep, NameStep, SelectionStep, SkillsStep,
    SpeciesStep,
};
use super::{StepCompiler, StepDescription};

/// Step compilers indexed by step id, in builder order.
#[derive(Default, Clone)]
pub struct StepRegistry {
    steps: Vec<Arc<dyn StepCompiler>>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in character builder steps.
    pub fn with_builtin_steps() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(NameStep));
        registry.register(Arc::new(SpeciesStep));
        registry.register(Arc::new(ClassStep));
        registry.register(Arc::new(AbilitiesStep));
        registry.register(Arc::new(SkillsStep));
        registry.register(Arc::new(SelectionStep::new(
            "feats",
            CatalogKind::Feat,
            "Feats",
        )));
        registry.register(Arc::new(SelectionStep::new(
            "talents",
            CatalogKind::Talent,
            "Talents",
        )));
        registry.register(Arc::new(SelectionStep::new(
            "powers",
            CatalogKind::Power,
            "Force Powers",
        )));
        registry.register(Arc::new(BackgroundStep));
        registry.register(Arc::new(SelectionStep::new(
            "languages",
            CatalogKind::Language,
            "Languages",
        )));
        registry.register(Arc::new(EquipmentStep));
        registry
    }

    /// Register a step, replacing any step with the same id.
    pub fn register(&mut self, step: Arc<dyn StepCompiler>) {
        let id = step.id();
        match self.steps.iter().position(|s| s.id() == id) {
            Some(index) => self.steps[index] = step,
            None => self.steps.push(step),
        }
    }

    pub fn get(&self, id: &StepId) -> Option<Arc<dyn StepCompiler>> {
        self.steps.iter().find(|s| &s.id() == id).cloned()
    }

    pub fn ids(&self) -> Vec<StepId> {
        self.steps.iter().map(|s| s.id()).collect()
    }

    /// Step following `id` in builder order.
    pub fn next_after(&self, id: &StepId) -> Option<StepId> {
        let index = self.steps.iter().position(|s| &s.id() == id)?;
        self.steps.get(index + 1).map(|s| s.id())
    }

    pub fn describe_all(&self, snapshot: &Snapshot) -> Vec<StepDescription> {
        self.steps.iter().map(|s| s.describe(snapshot)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_steps_are_registered_in_order() {
        let registry = StepRegistry::with_builtin_steps();
        let ids: Vec<String> = registry.ids().iter().map(|s| s.to_string()).collect();
        assert_eq!(
            ids,
            vec![
                "name",
                "species",
                "class",
                "abilities",
                "skills",
                "feats",
                "talents",
                "powers",
                "background",
                "languages",
                "equipment"
            ]
        );
        assert_eq!(
            registry.next_after(&StepId::from("class")),
            Some(StepId::from("abilities"))
        );
        assert_eq!(registry.next_after(&StepId::from("equipment")), None);
    }

    #[test]
    fn register_replaces_same_id() {
        let mut registry = StepRegistry::with_builtin_steps();
        let before = registry.ids().len();
        registry.register(Arc::new(NameStep));
        assert_eq!(registry.ids().len(), before);
    }

    #[test]
    fn fresh_snapshot_has_no_complete_required_steps() {
        let registry = StepRegistry::with_builtin_steps();
        let descriptions = registry.describe_all(&Snapshot::empty());
        let name = descriptions.iter().find(|d| d.id.as_str() == "name").unwrap();
        assert!(!name.complete);
    }
}
