//! Application composition.

use std::sync::Arc;

use tokio::sync::broadcast;

use charforge_domain::{CatalogEntry, EffectSanitizer, MergeOptions, ProgressionResult, Snapshot};

use crate::infrastructure::{
    catalog::InMemoryCatalog,
    clock::SystemClock,
    config::EngineConfig,
    memory_store::InMemoryCharacterStore,
    notifier::BroadcastNotifier,
    ports::{
        CatalogPort, CharacterStore, ClockPort, CompletionNotifier, FinalizationCompleted,
        RuleEvaluator,
    },
    record_locks::RecordLocks,
    rules::BasicRules,
};
use crate::use_cases::{
    ApplyMutation, ApplyOptions, BuilderSession, CompileStep, FinalizeCharacter, MergePatches,
    StepRegistry,
};

/// Collaborators the engine calls out to.
#[derive(Clone)]
pub struct Ports {
    pub store: Arc<dyn CharacterStore>,
    pub catalog: Arc<dyn CatalogPort>,
    pub rules: Arc<dyn RuleEvaluator>,
    pub notifier: Arc<dyn CompletionNotifier>,
    pub clock: Arc<dyn ClockPort>,
}

/// Container for all use cases.
pub struct UseCases {
    pub compile: Arc<CompileStep>,
    pub merge: Arc<MergePatches>,
    pub apply: Arc<ApplyMutation>,
    pub finalize: Arc<FinalizeCharacter>,
}

/// Main application state.
pub struct App {
    pub config: EngineConfig,
    pub ports: Ports,
    pub use_cases: UseCases,
    broadcast: Option<Arc<BroadcastNotifier>>,
}

impl App {
    /// Wire use cases over the given collaborators and the built-in steps.
    pub fn new(config: EngineConfig, ports: Ports) -> Self {
        Self::with_registry(config, ports, StepRegistry::with_builtin_steps())
    }

    pub fn with_registry(config: EngineConfig, ports: Ports, registry: StepRegistry) -> Self {
        // Apply and finalize share one lock table so they exclude each other.
        let locks = RecordLocks::new();
        let merge_defaults = if config.detect_conflicts {
            MergeOptions::strict()
        } else {
            MergeOptions::lenient()
        };
        let sanitizer =
            EffectSanitizer::default().with_extra_kinds(config.extra_effect_kinds.iter());

        let use_cases = UseCases {
            compile: Arc::new(CompileStep::new(
                Arc::new(registry),
                ports.catalog.clone(),
                ports.rules.clone(),
                ports.clock.clone(),
            )),
            merge: Arc::new(MergePatches::new(merge_defaults)),
            apply: Arc::new(ApplyMutation::new(
                ports.store.clone(),
                ports.rules.clone(),
                locks.clone(),
            )),
            finalize: Arc::new(FinalizeCharacter::new(
                ports.store.clone(),
                ports.catalog.clone(),
                ports.rules.clone(),
                ports.notifier.clone(),
                ports.clock.clone(),
                sanitizer,
                locks,
            )),
        };

        Self {
            config,
            ports,
            use_cases,
            broadcast: None,
        }
    }

    /// Self-contained engine: in-memory store, seeded catalog (plus the
    /// configured catalog file), baseline rules and a broadcast notifier.
    pub fn in_memory(config: EngineConfig, seed: Vec<CatalogEntry>) -> Self {
        let mut catalog = InMemoryCatalog::new(seed);
        if let Some(path) = &config.catalog_path {
            catalog = catalog.with_file(path.clone());
        }
        let broadcast = Arc::new(BroadcastNotifier::new());
        let ports = Ports {
            store: Arc::new(InMemoryCharacterStore::new()),
            catalog: Arc::new(catalog),
            rules: Arc::new(BasicRules::new()),
            notifier: broadcast.clone(),
            clock: Arc::new(SystemClock::new()),
        };

        let mut app = Self::new(config, ports);
        app.broadcast = Some(broadcast);
        app
    }

    /// Open the catalog. Must be called before compiling or finalizing.
    pub async fn open(&self) -> ProgressionResult<()> {
        self.ports.catalog.open().await?;
        tracing::info!(
            detect_conflicts = self.config.detect_conflicts,
            validate_on_apply = self.config.validate_on_apply,
            rederive_on_apply = self.config.rederive_on_apply,
            "Charforge engine ready"
        );
        Ok(())
    }

    pub async fn close(&self) {
        self.ports.catalog.close().await;
    }

    /// Listen for finalizations. Only available with the built-in notifier.
    pub fn subscribe_completions(&self) -> Option<broadcast::Receiver<FinalizationCompleted>> {
        self.broadcast.as_ref().map(|b| b.subscribe())
    }

    /// Apply options carrying the configured validate/rederive defaults.
    pub fn apply_options(&self, source: &str) -> ApplyOptions {
        ApplyOptions::from_config(&self.config, source)
    }

    /// Start a builder session for one character.
    pub fn session(&self, snapshot: Snapshot) -> BuilderSession {
        BuilderSession::new(
            self.use_cases.compile.clone(),
            self.use_cases.merge.clone(),
            self.use_cases.finalize.clone(),
            self.ports.clock.clone(),
            snapshot,
        )
    }
}
