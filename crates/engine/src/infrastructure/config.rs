//! Engine configuration from environment variables.

use std::path::{Path, PathBuf};

/// Engine-wide defaults.
///
/// Supported environment variables:
/// - CHARFORGE_DETECT_CONFLICTS: merge conflict detection (default: true)
/// - CHARFORGE_VALIDATE_ON_APPLY: validate records after apply (default: true)
/// - CHARFORGE_REDERIVE_ON_APPLY: recompute derived fields on apply (default: true)
/// - CHARFORGE_CATALOG_PATH: JSON catalog file loaded when the catalog opens
/// - CHARFORGE_EXTRA_EFFECT_KINDS: comma-separated effect kinds to accept
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub detect_conflicts: bool,
    pub validate_on_apply: bool,
    pub rederive_on_apply: bool,
    pub catalog_path: Option<PathBuf>,
    pub extra_effect_kinds: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            detect_conflicts: true,
            validate_on_apply: true,
            rederive_on_apply: true,
            catalog_path: None,
            extra_effect_kinds: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Load `.env` / `.env.local` from `dir` (if present), then read the environment.
    pub fn from_env_in(dir: &Path) -> Self {
        // Prefer local overrides.
        for filename in [".env.local", ".env"] {
            let path = dir.join(filename);
            if path.exists() {
                load_env_file(&path);
            }
        }
        Self::read_env()
    }

    /// Load `.env` from the working directory (if present), then read the environment.
    pub fn from_env() -> Self {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                tracing::warn!(error = %e, "Could not parse .env, ignoring it");
            }
        }
        Self::read_env()
    }

    fn read_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from any key lookup. Invalid values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            detect_conflicts: bool_var(
                &lookup,
                "CHARFORGE_DETECT_CONFLICTS",
                defaults.detect_conflicts,
            ),
            validate_on_apply: bool_var(
                &lookup,
                "CHARFORGE_VALIDATE_ON_APPLY",
                defaults.validate_on_apply,
            ),
            rederive_on_apply: bool_var(
                &lookup,
                "CHARFORGE_REDERIVE_ON_APPLY",
                defaults.rederive_on_apply,
            ),
            catalog_path: lookup("CHARFORGE_CATALOG_PATH")
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
            extra_effect_kinds: lookup("CHARFORGE_EXTRA_EFFECT_KINDS")
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|k| !k.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

/// Returns false when the file could not be read or parsed.
fn load_env_file(path: &Path) -> bool {
    match dotenvy::from_path(path) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Could not parse env file, ignoring it");
            false
        }
    }
}

fn bool_var(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    let Some(val) = lookup(key) else {
        return default;
    };
    match val.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => {
            tracing::warn!(key, val = %val, default, "Not a valid boolean, using default");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        assert_eq!(EngineConfig::from_lookup(lookup(&[])), EngineConfig::default());
    }

    #[test]
    fn reads_every_variable() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("CHARFORGE_DETECT_CONFLICTS", "false"),
            ("CHARFORGE_VALIDATE_ON_APPLY", "0"),
            ("CHARFORGE_REDERIVE_ON_APPLY", "OFF"),
            ("CHARFORGE_CATALOG_PATH", "/data/catalog.json"),
            ("CHARFORGE_EXTRA_EFFECT_KINDS", "initiative, ,reroll"),
        ]));

        assert!(!config.detect_conflicts);
        assert!(!config.validate_on_apply);
        assert!(!config.rederive_on_apply);
        assert_eq!(config.catalog_path, Some(PathBuf::from("/data/catalog.json")));
        assert_eq!(config.extra_effect_kinds, vec!["initiative", "reroll"]);
    }

    #[test]
    fn invalid_boolean_falls_back_to_default() {
        let config = EngineConfig::from_lookup(lookup(&[("CHARFORGE_DETECT_CONFLICTS", "maybe")]));
        assert!(config.detect_conflicts);
    }

    #[test]
    fn dotenv_file_is_loaded_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(".env"),
            "CHARFORGE_EXTRA_EFFECT_KINDS=dotenv_marker_kind\n",
        )
        .unwrap();

        let config = EngineConfig::from_env_in(dir.path());
        assert!(config
            .extra_effect_kinds
            .contains(&"dotenv_marker_kind".to_string()));
    }

    #[test]
    fn malformed_env_file_is_reported_and_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env.local");
        std::fs::write(&path, "this line has no equals sign\n").unwrap();

        assert!(!load_env_file(&path));
        assert!(!load_env_file(&dir.path().join("missing.env")));
        assert_eq!(
            EngineConfig::from_env_in(dir.path()).detect_conflicts,
            EngineConfig::default().detect_conflicts
        );
    }
}
