//! Discovery → parallel parse/extract → resolve → atomic persist (§4.6).
//!
//! Parsing and extraction are the CPU-bound, parallelizable part and run
//! across a rayon pool; everything downstream (alias discovery, reference
//! resolution, the SQLite write) is single-threaded and deterministic so two
//! runs over unchanged content produce the same row set.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use rayon::prelude::*;
use tree_sitter::Parser;

use crate::config::Config;
pub use crate::storage::PipelineStats;
use crate::storage::SqliteStorage;

use super::hasher::hash_bytes;
use super::import_resolver::{self, AliasTable, ResolverInput};
use super::languages::{detect_language, extract_file_level_refs, extractor_for};
use super::{ExtractedRef, ExtractedSymbol, RefKind, count_refs, count_symbols};

/// A fully-resolved file ready for `SqliteStorage::persist_index_run`.
pub struct ResolvedFile {
    pub rel_path: String,
    pub content: String,
    pub language: String,
    pub size_bytes: usize,
    pub content_hash: String,
    pub symbols: Vec<ExtractedSymbol>,
    pub references: Vec<ResolvedRef>,
}

pub struct ResolvedRef {
    /// Name of the top-level symbol this reference was found inside, if any.
    pub from_symbol_name: Option<String>,
    pub to_name: String,
    pub ref_kind: RefKind,
    pub line: usize,
    pub column: usize,
    pub import_source: Option<String>,
    pub target_file_path: Option<String>,
    pub target_symbol_file: Option<String>,
}

struct ParsedFile {
    rel_path: String,
    content: String,
    language: String,
    size_bytes: usize,
    content_hash: String,
    symbols: Vec<ExtractedSymbol>,
    file_level_refs: Vec<ExtractedRef>,
}

pub struct Indexer {
    root: PathBuf,
    config: Config,
}

impl Indexer {
    pub fn new(root: impl Into<PathBuf>, config: Config) -> Self {
        Self {
            root: root.into(),
            config,
        }
    }

    /// Runs one full indexing pass and persists it under `repo_id`. Returns
    /// the stats the `index_repository` tool reports (§4.6 step 5).
    pub fn run(&self, storage: &SqliteStorage, repo_id: i64) -> Result<PipelineStats> {
        let ignore_set = build_ignore_set(&self.config.indexer.ignore);
        let paths = self.discover_files(&ignore_set)?;

        let parsed: Vec<ParsedFile> = paths
            .par_iter()
            .filter_map(|path| self.parse_file(path).ok().flatten())
            .collect();

        let known_files: HashSet<String> = parsed.iter().map(|f| f.rel_path.clone()).collect();
        let unambiguous_symbols = build_unambiguous_symbols(&parsed);
        let aliases = AliasTable::discover(&self.root);

        let input = ResolverInput {
            root: &self.root,
            known_files: &known_files,
            unambiguous_symbols: &unambiguous_symbols,
        };

        let resolved: Vec<ResolvedFile> = parsed
            .into_iter()
            .map(|f| resolve_file(f, &input, &aliases))
            .collect();

        storage.persist_index_run(repo_id, &resolved)
    }

    /// Re-runs the pipeline restricted to `changed_paths` (repo-root-relative),
    /// for the watcher's debounced batch (§4.6, §10). Resolution still needs
    /// the full known-file set and symbol table to resolve cross-file
    /// references correctly, so this re-walks the tree for that context but
    /// only re-parses the paths the watcher actually reported.
    pub fn update_files(
        &self,
        storage: &SqliteStorage,
        repo_id: i64,
        changed_paths: &[PathBuf],
    ) -> Result<PipelineStats> {
        let ignore_set = build_ignore_set(&self.config.indexer.ignore);
        let all_paths = self.discover_files(&ignore_set)?;
        let all_rel: HashSet<String> = all_paths
            .iter()
            .map(|p| {
                p.strip_prefix(&self.root)
                    .unwrap_or(p)
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect();

        let changed_rel: HashSet<String> = changed_paths
            .iter()
            .filter(|p| p.exists())
            .map(|p| {
                p.strip_prefix(&self.root)
                    .unwrap_or(p)
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect();

        let deleted_rel: Vec<String> = changed_paths
            .iter()
            .filter(|p| !p.exists())
            .map(|p| {
                p.strip_prefix(&self.root)
                    .unwrap_or(p)
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect();
        if !deleted_rel.is_empty() {
            storage.delete_files_by_rel_paths(repo_id, &deleted_rel)?;
        }

        let to_parse: Vec<PathBuf> = all_paths
            .into_iter()
            .filter(|p| {
                let rel = p
                    .strip_prefix(&self.root)
                    .unwrap_or(p)
                    .to_string_lossy()
                    .replace('\\', "/");
                changed_rel.contains(&rel)
            })
            .collect();

        let parsed: Vec<ParsedFile> = to_parse
            .par_iter()
            .filter_map(|path| self.parse_file(path).ok().flatten())
            .collect();

        let unambiguous_symbols = build_unambiguous_symbols(&parsed);
        let aliases = AliasTable::discover(&self.root);

        let input = ResolverInput {
            root: &self.root,
            known_files: &all_rel,
            unambiguous_symbols: &unambiguous_symbols,
        };

        let resolved: Vec<ResolvedFile> = parsed
            .into_iter()
            .map(|f| resolve_file(f, &input, &aliases))
            .collect();

        storage.persist_partial_update(repo_id, &resolved)
    }

    fn discover_files(&self, ignore_set: &GlobSet) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let walker = WalkBuilder::new(&self.root)
            .hidden(false)
            .git_ignore(true)
            .build();

        for entry in walker.filter_map(|e| e.ok()) {
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            let path = entry.path();
            let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
                continue;
            };
            if detect_language(ext).is_none() {
                continue;
            }

            let rel = path.strip_prefix(&self.root).unwrap_or(path);
            if ignore_set.is_match(rel) {
                continue;
            }

            if let Ok(meta) = std::fs::metadata(path) {
                if meta.len() > self.config.indexer.max_file_size {
                    continue;
                }
            }

            files.push(path.to_path_buf());
        }
        Ok(files)
    }

    fn parse_file(&self, path: &Path) -> Result<Option<ParsedFile>> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let Some(language) = detect_language(ext) else {
            return Ok(None);
        };
        let Some(extractor) = extractor_for(language) else {
            return Ok(None);
        };

        // Binary/non-UTF8 files are silently skipped — they can't carry
        // indexable symbols anyway.
        let Ok(content) = std::fs::read_to_string(path) else {
            return Ok(None);
        };

        let rel_path = path
            .strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");

        let mut parser = Parser::new();
        parser.set_language(&extractor.language())?;
        let Some(tree) = parser.parse(&content, None) else {
            return Ok(None);
        };

        let symbols = extractor.extract(content.as_bytes(), &tree);
        let file_level_refs = extract_file_level_refs(language, content.as_bytes(), &tree);

        Ok(Some(ParsedFile {
            content_hash: hash_bytes(content.as_bytes()),
            size_bytes: content.len(),
            language: language.to_string(),
            rel_path,
            content,
            symbols,
            file_level_refs,
        }))
    }
}

pub(crate) fn build_ignore_set(patterns: &[String]) -> GlobSet {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        if let Ok(glob) = Glob::new(pattern) {
            builder.add(glob);
        }
    }
    builder.build().unwrap_or_else(|_| GlobSet::empty())
}

/// `name -> file` for every top-level declaration that names exactly one
/// file, the input the resolver needs for `Call`/`TypeReference`/`Extends`
/// lookups (§4.5 step 5 / §4.7.3).
fn build_unambiguous_symbols(parsed: &[ParsedFile]) -> HashMap<String, String> {
    let mut occurrences: HashMap<String, Vec<String>> = HashMap::new();
    for f in parsed {
        for sym in &f.symbols {
            occurrences
                .entry(sym.name.clone())
                .or_default()
                .push(f.rel_path.clone());
        }
    }

    occurrences
        .into_iter()
        .filter_map(|(name, mut files)| {
            files.dedup();
            if files.len() == 1 {
                Some((name, files.remove(0)))
            } else {
                None
            }
        })
        .collect()
}

fn resolve_file(f: ParsedFile, input: &ResolverInput, aliases: &AliasTable) -> ResolvedFile {
    let mut references = Vec::new();

    for r in &f.file_level_refs {
        references.push(resolve_one(r, None, &f.rel_path, input, aliases));
    }
    for sym in &f.symbols {
        collect_symbol_refs(sym, &f.rel_path, input, aliases, &mut references);
    }

    ResolvedFile {
        rel_path: f.rel_path,
        content: f.content,
        language: f.language,
        size_bytes: f.size_bytes,
        content_hash: f.content_hash,
        symbols: f.symbols,
        references,
    }
}

fn collect_symbol_refs(
    sym: &ExtractedSymbol,
    file: &str,
    input: &ResolverInput,
    aliases: &AliasTable,
    out: &mut Vec<ResolvedRef>,
) {
    for r in &sym.references {
        out.push(resolve_one(r, Some(sym.name.clone()), file, input, aliases));
    }
    for child in &sym.children {
        collect_symbol_refs(child, file, input, aliases, out);
    }
}

fn resolve_one(
    r: &ExtractedRef,
    from_symbol_name: Option<String>,
    file: &str,
    input: &ResolverInput,
    aliases: &AliasTable,
) -> ResolvedRef {
    let resolved = import_resolver::resolve(
        input,
        aliases,
        file,
        r.kind,
        &r.name,
        r.import_source.as_deref(),
    );

    ResolvedRef {
        from_symbol_name,
        to_name: r.name.clone(),
        ref_kind: r.kind,
        line: r.line,
        column: r.column,
        import_source: r.import_source.clone(),
        target_file_path: resolved.target_file_path,
        target_symbol_file: resolved.target_symbol_file,
    }
}

/// Total symbol/ref counts across an already-extracted file, used for
/// pre-persistence logging.
pub(crate) fn summarize(symbols: &[ExtractedSymbol]) -> (usize, usize) {
    let syms = symbols.iter().map(count_symbols).sum();
    let refs = symbols.iter().map(count_refs).sum();
    (syms, refs)
}
