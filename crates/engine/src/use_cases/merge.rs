//! Merge use case.

use charforge_domain::{merge, MergeOptions, MutationPlan, Patch, ProgressionResult};

/// Combines step patches into one plan, with engine-wide conflict defaults.
pub struct MergePatches {
    defaults: MergeOptions,
}

impl MergePatches {
    pub fn new(defaults: MergeOptions) -> Self {
        Self { defaults }
    }

    pub fn defaults(&self) -> MergeOptions {
        self.defaults
    }

    /// Merge with explicit options, or the configured defaults when `None`.
    pub fn execute(
        &self,
        patches: &[Patch],
        options: Option<MergeOptions>,
    ) -> ProgressionResult<MutationPlan> {
        let options = options.unwrap_or(self.defaults);
        match merge(patches, options) {
            Ok(plan) => {
                tracing::debug!(
                    patches = patches.len(),
                    ops = plan.len(),
                    detect_conflicts = options.detect_conflicts,
                    "Patches merged"
                );
                Ok(plan)
            }
            Err(conflict) => {
                tracing::info!(
                    target_field = %conflict.target,
                    first_step = %conflict.first_step,
                    second_step = %conflict.second_step,
                    "Merge conflict"
                );
                Err(conflict.into())
            }
        }
    }
}

impl Default for MergePatches {
    fn default() -> Self {
        Self::new(MergeOptions::default())
    }
}
