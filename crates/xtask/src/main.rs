use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::Context;
use serde::Deserialize;

/// Crates the pure domain crate must never depend on.
const DOMAIN_FORBIDDEN_DEPS: &[&str] = &["tokio", "async-trait", "dashmap", "tracing"];

/// Files allowed to call the sub-record write primitive: the finalization
/// use case, the port declaration and the store adapters.
const SUB_RECORD_WRITERS: &[&str] = &[
    "use_cases/finalize.rs",
    "infrastructure/ports/collaborators.rs",
    "infrastructure/memory_store.rs",
];

static SUB_RECORD_CALL: OnceLock<regex_lite::Regex> = OnceLock::new();

#[derive(Debug, Deserialize)]
struct Metadata {
    packages: Vec<Package>,
    workspace_root: PathBuf,
}

#[derive(Debug, Deserialize)]
struct Package {
    name: String,
    dependencies: Vec<Dependency>,
}

#[derive(Debug, Deserialize)]
struct Dependency {
    name: String,
}

fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        Some("arch-check") => arch_check(),
        Some(cmd) => anyhow::bail!("Unknown xtask command: {cmd}"),
        None => anyhow::bail!("Usage: cargo xtask <command>\n\nCommands:\n  arch-check"),
    }
}

fn arch_check() -> anyhow::Result<()> {
    let output = std::process::Command::new("cargo")
        .args(["metadata", "--format-version", "1", "--no-deps"])
        .output()
        .context("running cargo metadata")?;

    if !output.status.success() {
        anyhow::bail!("cargo metadata failed")
    }
    let metadata: Metadata =
        serde_json::from_slice(&output.stdout).context("parsing cargo metadata")?;

    let mut violations = domain_purity(&metadata);
    violations.extend(sub_record_writers(&metadata.workspace_root)?);

    if violations.is_empty() {
        println!("arch-check: ok");
        return Ok(());
    }
    for violation in &violations {
        eprintln!("arch-check: {violation}");
    }
    anyhow::bail!("{} architecture violation(s)", violations.len())
}

/// The domain crate stays free of I/O and runtime crates.
fn domain_purity(metadata: &Metadata) -> Vec<String> {
    metadata
        .packages
        .iter()
        .filter(|p| p.name == "charforge-domain")
        .flat_map(|p| &p.dependencies)
        .filter(|d| DOMAIN_FORBIDDEN_DEPS.contains(&d.name.as_str()))
        .map(|d| format!("charforge-domain depends on '{}'", d.name))
        .collect()
}

/// Only finalization may create sub-records.
fn sub_record_writers(root: &Path) -> anyhow::Result<Vec<String>> {
    let re = SUB_RECORD_CALL.get_or_init(|| {
        regex_lite::Regex::new(r"\.create_sub_records\s*\(")
            .expect("sub-record call pattern is invalid")
    });

    let src = root.join("crates/engine/src");
    let mut files = Vec::new();
    collect_rust_files(&src, &mut files)?;

    let mut violations = Vec::new();
    for file in files {
        let relative = file
            .strip_prefix(&src)
            .unwrap_or(&file)
            .to_string_lossy()
            .replace('\\', "/");
        if SUB_RECORD_WRITERS.contains(&relative.as_str()) {
            continue;
        }

        let source = std::fs::read_to_string(&file)
            .with_context(|| format!("reading {}", file.display()))?;
        // Test modules may drive the store directly.
        let production = source.split("#[cfg(test)]").next().unwrap_or_default();
        for (line_no, line) in production.lines().enumerate() {
            if re.is_match(line) {
                violations.push(format!(
                    "{relative}:{} creates sub-records outside finalization",
                    line_no + 1
                ));
            }
        }
    }
    Ok(violations)
}

fn collect_rust_files(dir: &Path, out: &mut Vec<PathBuf>) -> anyhow::Result<()> {
    for entry in std::fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))? {
        let path = entry?.path();
        if path.is_dir() {
            collect_rust_files(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "rs") {
            out.push(path);
        }
    }
    Ok(())
}
