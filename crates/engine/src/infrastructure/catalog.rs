//! In-memory catalog with an explicit open/close lifecycle.
//!
//! Entries come from two places: entries seeded at construction, and an
//! optional JSON file read on `open`. Nothing is loaded lazily and nothing
//! is process-global; tests build their own catalog.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;

use charforge_domain::{CatalogEntry, CatalogKind};

use crate::infrastructure::ports::{CatalogError, CatalogPort};

/// On-disk catalog format.
#[derive(Debug, Deserialize)]
struct CatalogFile {
    entries: Vec<CatalogEntry>,
}

pub struct InMemoryCatalog {
    /// Entries by kind, in insertion order.
    entries: DashMap<CatalogKind, Vec<CatalogEntry>>,
    /// Seeded entries, restored on every open.
    seed: Vec<CatalogEntry>,
    path: Option<PathBuf>,
    open: AtomicBool,
}

impl InMemoryCatalog {
    pub fn new(seed: Vec<CatalogEntry>) -> Self {
        Self {
            entries: DashMap::new(),
            seed,
            path: None,
            open: AtomicBool::new(false),
        }
    }

    /// Also load entries from a JSON file when opened.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn insert(&self, entry: CatalogEntry) {
        self.entries.entry(entry.kind).or_default().push(entry);
    }

    fn ensure_open(&self) -> Result<(), CatalogError> {
        if self.is_open() {
            Ok(())
        } else {
            Err(CatalogError::NotOpen)
        }
    }
}

#[async_trait]
impl CatalogPort for InMemoryCatalog {
    async fn open(&self) -> Result<(), CatalogError> {
        if self.is_open() {
            return Ok(());
        }

        let mut loaded = Vec::new();
        if let Some(path) = &self.path {
            let raw = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| CatalogError::Load {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })?;
            let file: CatalogFile =
                serde_json::from_str(&raw).map_err(|e| CatalogError::Load {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })?;
            loaded = file.entries;
        }

        self.entries.clear();
        let from_file = loaded.len();
        for entry in self.seed.iter().cloned().chain(loaded) {
            self.insert(entry);
        }
        self.open.store(true, Ordering::Release);

        tracing::info!(
            seeded = self.seed.len(),
            from_file,
            "Catalog opened"
        );
        Ok(())
    }

    async fn close(&self) {
        self.open.store(false, Ordering::Release);
        self.entries.clear();
        tracing::debug!("Catalog closed");
    }

    async fn lookup(
        &self,
        kind: CatalogKind,
        id_or_name: &str,
    ) -> Result<Option<CatalogEntry>, CatalogError> {
        self.ensure_open()?;
        Ok(self.entries.get(&kind).and_then(|entries| {
            entries
                .value()
                .iter()
                .find(|e| e.matches(id_or_name))
                .cloned()
        }))
    }

    async fn list(&self, kind: CatalogKind) -> Result<Vec<CatalogEntry>, CatalogError> {
        self.ensure_open()?;
        Ok(self
            .entries
            .get(&kind)
            .map(|r| r.value().clone())
            .unwrap_or_default())
    }
}
