use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::style;
use crate::config::Config;
use crate::indexer::Indexer;
use crate::storage::SqliteStorage;

/// One-shot manual pipeline run, for local/scripted use outside the MCP
/// server (which indexes lazily on first tool call instead).
pub fn run(path: Option<PathBuf>) -> Result<()> {
    let path = path.unwrap_or(std::env::current_dir()?);
    let abs_path = path
        .canonicalize()
        .with_context(|| format!("'{}' is not a valid directory", path.display()))?;
    let abs_path_str = abs_path.to_string_lossy().to_string();

    let config = Config::load(&abs_path_str).unwrap_or_default();
    let storage = SqliteStorage::open(&abs_path_str)?;
    let repo_id = ensure_repo_id(&storage, &abs_path_str)?;

    println!("{}", style::heading(&format!("Indexing {abs_path_str}")));
    let indexer = Indexer::new(abs_path.clone(), config);
    let stats = indexer.run(&storage, repo_id)?;

    println!(
        "  files: {} new, {} changed, {} unchanged, {} deleted",
        stats.files_new, stats.files_changed, stats.files_unchanged, stats.files_deleted,
    );
    println!(
        "  symbols: {} | references: {} ({} resolved)",
        stats.symbols_extracted, stats.references_found, stats.references_resolved,
    );
    println!("{} in {}ms", style::done(), stats.duration_ms);
    Ok(())
}

fn ensure_repo_id(storage: &SqliteStorage, abs_path: &str) -> Result<i64> {
    let basename = Path::new(abs_path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(abs_path);
    let full_name = format!("local/{basename}");
    Ok(storage.ensure_repo(abs_path, &full_name, basename)?)
}
