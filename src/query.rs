//! Cross-scope search, dependency traversal, and usage resolution (§4.7).
//!
//! Everything here is pure query logic over an already-open `SqliteStorage`;
//! argument validation and repository-identifier resolution happen one
//! layer up, in the tool dispatcher.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::Result;
use globset::Glob;
use serde_json::{Value, json};

use crate::config::OutputConfig;
use crate::output::{TokenBudget, normalize_signature, truncate_doc};
use crate::storage::SqliteStorage;

const TEST_PATH_MARKERS: &[&str] = &["/__tests__/", "/tests/", ".test.", ".spec."];

fn is_test_path(path: &str) -> bool {
    TEST_PATH_MARKERS.iter().any(|m| path.contains(m))
}

/// Splits on whitespace and phrase-quotes any token containing characters
/// the FTS5 tokenizer treats as syntax (`-`, `.`, `/`), per §4.7.1.
pub fn sanitize_fts_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|tok| {
            if tok.contains(['-', '.', '/']) && !tok.starts_with('"') {
                format!("\"{tok}\"")
            } else {
                tok.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub glob: Option<String>,
    pub language: Option<String>,
    pub symbol_kind: Vec<String>,
    pub exported_only: bool,
}

/// Suppresses a tip once it's been shown, for the process lifetime of one
/// connected client (§4.7.4: "in-memory, process-lifetime").
pub struct TipSuppressor {
    shown: Mutex<HashMap<&'static str, Instant>>,
}

const TIP_TTL: Duration = Duration::from_secs(600);

impl Default for TipSuppressor {
    fn default() -> Self {
        Self::new()
    }
}

impl TipSuppressor {
    pub fn new() -> Self {
        Self {
            shown: Mutex::new(HashMap::new()),
        }
    }

    fn allow(&self, id: &'static str) -> bool {
        let mut shown = self.shown.lock().unwrap();
        if let Some(at) = shown.get(id) {
            if at.elapsed() < TIP_TTL {
                return false;
            }
        }
        shown.insert(id, Instant::now());
        true
    }
}

struct Tip {
    id: &'static str,
    text: String,
    high_priority: bool,
}

/// `\bword\b` equivalent: true if `word` occurs in `text` with a
/// non-alphanumeric (or absent) character on both sides, so "however" does
/// not match "how" and "a failure occurred" does not match "fail". `word`
/// may itself contain an internal space (e.g. "best practice").
fn word_boundary_match(text: &str, word: &str) -> bool {
    let is_boundary = |c: Option<char>| !matches!(c, Some(c) if c.is_alphanumeric() || c == '_');
    let bytes_len = word.len();
    let mut start = 0;
    while let Some(rel) = text[start..].find(word) {
        let idx = start + rel;
        let before = text[..idx].chars().next_back();
        let after = text[idx + bytes_len..].chars().next();
        if is_boundary(before) && is_boundary(after) {
            return true;
        }
        let advance = text[idx..].chars().next().map_or(1, |c| c.len_utf8());
        start = idx + advance;
        if start >= text.len() {
            break;
        }
    }
    false
}

/// The §4.7.4 table. Evaluated in row order; callers cap the output at two
/// and sort high-priority first.
#[allow(clippy::too_many_arguments)]
fn generate_tips(
    query: &str,
    scopes: &[String],
    filters: &SearchFilters,
    has_repository_filter: bool,
    counts: &HashMap<String, usize>,
    total: usize,
    suppressor: &TipSuppressor,
) -> Vec<String> {
    let lower = query.to_lowercase();
    let mut tips: Vec<Tip> = Vec::new();
    let has = |scope: &str| scopes.iter().any(|s| s == scope);
    let has_word = |word: &str| word_boundary_match(&lower, word);

    if total == 0 {
        tips.push(Tip {
            id: "E",
            text: "No results found. Try broader terms.".to_string(),
            high_priority: true,
        });
        if !filters.glob.is_none()
            || !filters.symbol_kind.is_empty()
            || filters.exported_only
            || filters.language.is_some()
        {
            tips.push(Tip {
                id: "E2",
                text: "Active filters may be excluding matches.".to_string(),
                high_priority: true,
            });
        }
    }

    let code_kind_words = [
        "function",
        "class",
        "interface",
        "type",
        "method",
        "component",
    ];
    if code_kind_words.iter().any(|w| has_word(w)) && !has("symbols") {
        tips.push(Tip {
            id: "1",
            text: "Try scope=[\"symbols\"] to search declarations directly.".to_string(),
            high_priority: true,
        });
    }

    let looks_like_path = query.contains('/') && query.contains('.');
    if looks_like_path && has("code") {
        tips.push(Tip {
            id: "2",
            text: "Use search_dependencies to trace what this file imports or is imported by."
                .to_string(),
            high_priority: true,
        });
    }

    if has("symbols") && !filters.exported_only && counts.get("symbols").copied().unwrap_or(0) > 10
    {
        tips.push(Tip {
            id: "3",
            text: "Add exported_only:true to narrow to public symbols.".to_string(),
            high_priority: false,
        });
    }

    if !has_repository_filter && total > 20 {
        tips.push(Tip {
            id: "4",
            text: "Add a repository filter to scope results to one project.".to_string(),
            high_priority: false,
        });
    }

    if has("code")
        && filters.glob.is_none()
        && filters.language.is_none()
        && counts.get("code").copied().unwrap_or(0) > 15
    {
        tips.push(Tip {
            id: "5",
            text: "Add a glob or language filter to narrow code results.".to_string(),
            high_priority: false,
        });
    }

    let decision_words = ["why", "reason", "decision", "chose", "choice"];
    if decision_words.iter().any(|w| has_word(w)) && !has("decisions") {
        tips.push(Tip {
            id: "6",
            text: "Add scope=[\"decisions\"] to search recorded rationale.".to_string(),
            high_priority: true,
        });
    }

    let pattern_words = ["how", "pattern", "best practice", "convention"];
    if pattern_words.iter().any(|w| has_word(w)) && !has("patterns") {
        tips.push(Tip {
            id: "7",
            text: "Add scope=[\"patterns\"] to search recorded patterns.".to_string(),
            high_priority: true,
        });
    }

    let failure_words = ["error", "bug", "fail", "issue", "problem", "fix"];
    if failure_words.iter().any(|w| has_word(w)) && !has("failures") {
        tips.push(Tip {
            id: "8",
            text: "Add scope=[\"failures\"] to search recorded failures.".to_string(),
            high_priority: true,
        });
    }

    if scopes == ["code"] {
        tips.push(Tip {
            id: "9",
            text: "Try additional scopes (symbols, decisions) for a fuller picture.".to_string(),
            high_priority: false,
        });
    }

    if total > 30 {
        tips.push(Tip {
            id: "10",
            text: "Use output=\"compact\" to reduce response size.".to_string(),
            high_priority: false,
        });
    }

    tips.retain(|t| suppressor.allow(t.id));
    tips.sort_by_key(|t| !t.high_priority);
    tips.into_iter().take(2).map(|t| t.text).collect()
}

fn matches_glob(glob: &Option<String>, path: &str) -> bool {
    match glob {
        None => true,
        Some(pattern) => Glob::new(pattern)
            .map(|g| g.compile_matcher().is_match(path))
            .unwrap_or(true),
    }
}

#[allow(clippy::too_many_arguments)]
pub fn search(
    storage: &SqliteStorage,
    repo_path: Option<&str>,
    query: &str,
    scopes: &[String],
    filters: &SearchFilters,
    limit: usize,
    output: &str,
    context_lines: usize,
    suppressor: &TipSuppressor,
    output_config: &OutputConfig,
) -> Result<Value> {
    let fts_query = sanitize_fts_query(query);
    let context_lines = context_lines.clamp(1, 10);

    let mut scope_results: serde_json::Map<String, Value> = serde_json::Map::new();
    let mut counts: HashMap<String, usize> = HashMap::new();

    if scopes.iter().any(|s| s == "code") {
        let hits = storage.search_code(repo_path, &fts_query, limit * 4)?;
        let mut filtered: Vec<_> = hits
            .into_iter()
            .filter(|h| matches_glob(&filters.glob, &h.rel_path))
            .take(limit)
            .collect();
        filtered.truncate(limit);
        counts.insert("code".to_string(), filtered.len());

        let value = match output {
            "paths" => json!(
                filtered
                    .iter()
                    .map(|h| h.rel_path.clone())
                    .collect::<Vec<_>>()
            ),
            "compact" => json!(
                filtered
                    .iter()
                    .map(|h| json!({"path": h.rel_path, "matches": h.match_count}))
                    .collect::<Vec<_>>()
            ),
            "snippet" => {
                let mut out = Vec::new();
                for h in &filtered {
                    let content = repo_path
                        .and_then(|rp| storage.get_file_content(rp, &h.rel_path).ok())
                        .unwrap_or_default();
                    out.push(json!({
                        "path": h.rel_path,
                        "rank": h.rank,
                        "matches": build_snippets(&content, query, context_lines),
                    }));
                }
                json!(out)
            }
            _ => json!(filtered
                .iter()
                .map(|h| json!({"path": h.rel_path, "rank": h.rank, "match_count": h.match_count}))
                .collect::<Vec<_>>()),
        };
        scope_results.insert("code".to_string(), value);
    }

    if scopes.iter().any(|s| s == "symbols") {
        let hits = storage.search_symbols(
            repo_path,
            &fts_query,
            &filters.symbol_kind,
            filters.exported_only,
            limit * 4,
        )?;
        let mut filtered: Vec<_> = hits
            .into_iter()
            .filter(|h| matches_glob(&filters.glob, &h.file_rel_path))
            .take(limit)
            .collect();
        filtered.truncate(limit);
        counts.insert("symbols".to_string(), filtered.len());

        let value = match output {
            "paths" => json!(filtered.iter().map(|h| h.file_rel_path.clone()).collect::<Vec<_>>()),
            "compact" => json!(filtered
                .iter()
                .map(|h| json!({"name": h.name, "kind": h.kind, "file": h.file_rel_path}))
                .collect::<Vec<_>>()),
            _ => json!(filtered
                .iter()
                .map(|h| json!({
                    "id": h.id,
                    "uuid": h.uuid,
                    "name": h.name,
                    "kind": h.kind,
                    "file": h.file_rel_path,
                    "signature": h.signature.as_deref().map(|s| normalize_signature(s, output_config.truncate_signatures)),
                    "doc": h.doc_comment.as_deref().map(|d| truncate_doc(d, output_config.truncate_doc_comments)),
                    "start_line": h.start_line,
                    "end_line": h.end_line,
                    "rank": h.rank,
                }))
                .collect::<Vec<_>>()),
        };
        scope_results.insert("symbols".to_string(), value);
    }

    for (scope, method) in [
        (
            "decisions",
            SqliteStorage::search_decisions
                as fn(
                    &SqliteStorage,
                    Option<&str>,
                    &str,
                    usize,
                ) -> Result<Vec<crate::storage::MemoryHit>>,
        ),
        ("patterns", SqliteStorage::search_patterns),
        ("failures", SqliteStorage::search_failures),
    ] {
        if scopes.iter().any(|s| s == scope) {
            let hits = method(storage, repo_path, &fts_query, limit)?;
            counts.insert(scope.to_string(), hits.len());
            let value = json!(hits
                .iter()
                .map(|h| json!({"uuid": h.uuid, "title": h.title, "content": h.content, "rank": h.rank}))
                .collect::<Vec<_>>());
            scope_results.insert(scope.to_string(), value);
        }
    }

    let total: usize = counts.values().sum();
    let mut counts_obj: serde_json::Map<String, Value> =
        counts.iter().map(|(k, v)| (k.clone(), json!(v))).collect();
    counts_obj.insert("total".to_string(), json!(total));

    let tips = generate_tips(
        query,
        scopes,
        filters,
        repo_path.is_some(),
        &counts,
        total,
        suppressor,
    );

    let mut response = serde_json::Map::new();
    response.insert("results".to_string(), Value::Object(scope_results));
    response.insert("counts".to_string(), Value::Object(counts_obj));
    if !tips.is_empty() {
        response.insert("tips".to_string(), json!(tips));
    }

    if let Some(max_tokens) = output_config.max_tokens {
        return Ok(shrink_to_budget(Value::Object(response), max_tokens));
    }
    Ok(Value::Object(response))
}

/// Drops the lowest-ranked hits from the largest `results.{scope}` array,
/// one at a time, until the serialized response fits `max_tokens`
/// (§9 "dynamic JSON payloads" / §10 output token budget).
fn shrink_to_budget(mut response: Value, max_tokens: usize) -> Value {
    let budget = TokenBudget::from_tokens(max_tokens);
    if budget.fits(&response.to_string()) {
        return response;
    }

    loop {
        let serialized = response.to_string();
        if budget.fits(&serialized) {
            response["truncated"] = json!(true);
            return response;
        }
        let Some(results) = response.get_mut("results").and_then(|r| r.as_object_mut()) else {
            break;
        };
        let largest_scope = results
            .iter()
            .filter_map(|(k, v)| v.as_array().map(|a| (k.clone(), a.len())))
            .max_by_key(|(_, len)| *len)
            .filter(|(_, len)| *len > 0)
            .map(|(k, _)| k);
        let Some(scope) = largest_scope else { break };
        if let Some(arr) = results.get_mut(&scope).and_then(|v| v.as_array_mut()) {
            arr.pop();
        }
    }
    response["truncated"] = json!(true);
    response
}

fn build_snippets(content: &str, query: &str, context_lines: usize) -> Vec<Value> {
    let lines: Vec<&str> = content.lines().collect();
    let needle = query.to_lowercase();
    let mut matches = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        if matches.len() >= 20 {
            break;
        }
        if !line.to_lowercase().contains(&needle) {
            continue;
        }
        let start = i.saturating_sub(context_lines);
        let end = (i + context_lines + 1).min(lines.len());
        matches.push(json!({
            "line": i + 1,
            "content": line,
            "context_before": lines[start..i],
            "context_after": lines[i + 1..end],
        }));
    }
    matches
}

fn filter_test_paths(paths: Vec<String>, include_tests: bool) -> Vec<String> {
    if include_tests {
        paths
    } else {
        paths.into_iter().filter(|p| !is_test_path(p)).collect()
    }
}

/// Breadth-first walk over the direct-dependency edge function, returning
/// `direct` (depth 1) plus `depth_N` buckets for 2..=depth (§4.7.2).
fn bfs_levels(
    storage: &SqliteStorage,
    repo_path: &str,
    start: &str,
    depth: usize,
    edge_fn: impl Fn(&SqliteStorage, &str, &str) -> Result<Vec<String>>,
) -> Result<(Vec<String>, HashMap<usize, Vec<String>>)> {
    let mut visited: HashSet<String> = HashSet::from([start.to_string()]);
    let mut frontier: Vec<String> = vec![start.to_string()];
    let mut direct = Vec::new();
    let mut by_depth: HashMap<usize, Vec<String>> = HashMap::new();

    for level in 1..=depth {
        let mut next_frontier = Vec::new();
        for node in &frontier {
            for neighbor in edge_fn(storage, repo_path, node)? {
                if visited.insert(neighbor.clone()) {
                    next_frontier.push(neighbor);
                }
            }
        }
        if level == 1 {
            direct = next_frontier.clone();
        } else {
            by_depth.insert(level, next_frontier.clone());
        }
        if next_frontier.is_empty() {
            break;
        }
        frontier = next_frontier;
    }

    Ok((direct, by_depth))
}

pub fn search_dependencies(
    storage: &SqliteStorage,
    repo_path: &str,
    file_path: &str,
    direction: &str,
    depth: usize,
    include_tests: bool,
) -> Result<Value> {
    let depth = depth.clamp(1, 5);
    let mut response = serde_json::Map::new();

    if direction == "dependents" || direction == "both" {
        let (direct, indirect) = bfs_levels(storage, repo_path, file_path, depth, |s, r, f| {
            s.direct_dependents(r, f)
        })?;
        response.insert(
            "dependents".to_string(),
            shape_traversal(direct, indirect, include_tests),
        );
    }
    if direction == "dependencies" || direction == "both" {
        let (direct, indirect) = bfs_levels(storage, repo_path, file_path, depth, |s, r, f| {
            s.direct_dependencies(r, f)
        })?;
        response.insert(
            "dependencies".to_string(),
            shape_traversal(direct, indirect, include_tests),
        );
    }
    Ok(Value::Object(response))
}

fn shape_traversal(
    direct: Vec<String>,
    indirect: HashMap<usize, Vec<String>>,
    include_tests: bool,
) -> Value {
    let direct = filter_test_paths(direct, include_tests);
    let mut indirect_obj = serde_json::Map::new();
    let mut indirect_count = 0usize;
    let mut depths: Vec<&usize> = indirect.keys().collect();
    depths.sort();
    for d in depths {
        let paths = filter_test_paths(indirect[d].clone(), include_tests);
        indirect_count += paths.len();
        indirect_obj.insert(format!("depth_{d}"), json!(paths));
    }
    json!({
        "direct": direct,
        "indirect": indirect_obj,
        "count": direct.len() + indirect_count,
    })
}

pub fn find_usages(
    storage: &SqliteStorage,
    repo_path: &str,
    symbol: &str,
    file: Option<&str>,
    include_tests: bool,
    include_definitions: bool,
) -> Result<Value> {
    let mut definitions = storage.get_symbol_definitions(repo_path, symbol)?;
    if let Some(file) = file {
        definitions.retain(|d| d.file_rel_path == file);
    }
    let defined_in: Vec<String> = definitions
        .iter()
        .map(|d| d.file_rel_path.clone())
        .collect();
    let kind = definitions.first().map(|d| d.kind.clone());

    let spans: Vec<(&str, i64, i64)> = definitions
        .iter()
        .map(|d| (d.file_rel_path.as_str(), d.start_line, d.end_line))
        .collect();

    let refs = storage.get_refs_by_name(repo_path, symbol)?;
    let mut usages = Vec::new();
    for r in refs {
        let Some(from_file) = r.from_file.clone() else {
            continue;
        };
        if !include_tests && is_test_path(&from_file) {
            continue;
        }
        let inside_definition = spans
            .iter()
            .any(|(f, s, e)| *f == from_file && r.line >= *s && r.line <= *e);
        if inside_definition && !include_definitions {
            continue;
        }
        usages.push(json!({
            "file": from_file,
            "line": r.line,
            "column": r.column_number,
            "usage_type": r.ref_kind,
            "target_file": r.target_file_path,
        }));
    }

    let files_with_usages: HashSet<String> = usages
        .iter()
        .filter_map(|u| u.get("file").and_then(|v| v.as_str()).map(String::from))
        .collect();

    Ok(json!({
        "symbol": symbol,
        "kind": kind,
        "defined_in": defined_in,
        "usages": usages,
        "total_usages": usages.len(),
        "files_with_usages": files_with_usages.len(),
    }))
}

const IMPACT_TRAVERSAL_DEPTH: usize = 3;

pub fn analyze_change_impact(
    storage: &SqliteStorage,
    repo_path: &str,
    files_to_modify: &[String],
    files_to_create: &[String],
    files_to_delete: &[String],
    breaking_changes: bool,
) -> Result<Value> {
    let mut affected: HashSet<String> = HashSet::new();
    let mut per_file = serde_json::Map::new();

    for file in files_to_modify.iter().chain(files_to_delete.iter()) {
        let (direct, indirect) = bfs_levels(
            storage,
            repo_path,
            file,
            IMPACT_TRAVERSAL_DEPTH,
            |s, r, f| s.direct_dependents(r, f),
        )?;
        let mut all = direct.clone();
        for v in indirect.values() {
            all.extend(v.clone());
        }
        per_file.insert(
            file.clone(),
            json!({"direct_dependents": direct, "total_dependents": all.len()}),
        );
        affected.extend(all);
    }

    let test_files: Vec<String> = affected
        .iter()
        .filter(|p| is_test_path(p))
        .cloned()
        .collect();
    let breadth = affected.len();
    let risk = match (breaking_changes, breadth) {
        (true, b) if b > 5 => "high",
        (true, _) => "medium",
        (false, b) if b > 15 => "high",
        (false, b) if b > 5 => "medium",
        _ => "low",
    };

    Ok(json!({
        "files_to_modify": files_to_modify,
        "files_to_create": files_to_create,
        "files_to_delete": files_to_delete,
        "affected_files": affected.into_iter().collect::<Vec<_>>(),
        "per_file_impact": per_file,
        "test_files": test_files,
        "breadth": breadth,
        "risk": risk,
    }))
}

pub fn generate_task_context(
    storage: &SqliteStorage,
    repo_path: &str,
    files: &[String],
    include_tests: bool,
    include_symbols: bool,
) -> Result<Value> {
    let status = storage.get_index_status(repo_path).ok();
    let index_stale = status
        .as_ref()
        .map(|s| s.indexed_at.is_none())
        .unwrap_or(true);

    let mut per_file = Vec::new();
    for file in files {
        let dependents = storage.direct_dependents(repo_path, file)?;
        let mut entry = serde_json::Map::new();
        entry.insert("file".to_string(), json!(file));
        entry.insert("dependent_count".to_string(), json!(dependents.len()));
        entry.insert("dependents".to_string(), json!(dependents));

        if include_symbols {
            let symbols = storage.get_file_symbols(repo_path, file)?;
            entry.insert(
                "symbols".to_string(),
                json!(symbols
                    .iter()
                    .map(|s| json!({"name": s.name, "kind": s.kind, "start_line": s.start_line, "end_line": s.end_line}))
                    .collect::<Vec<_>>()),
            );
        }
        if include_tests {
            let test_dependents: Vec<String> =
                dependents.into_iter().filter(|p| is_test_path(p)).collect();
            entry.insert("test_files".to_string(), json!(test_dependents));
        }
        per_file.push(Value::Object(entry));
    }

    Ok(json!({
        "files": per_file,
        "indexStale": index_stale,
    }))
}

pub fn get_index_statistics(storage: &SqliteStorage) -> Result<Value> {
    let counts = storage.entity_counts()?;
    Ok(json!(counts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_punctuated_tokens() {
        assert_eq!(sanitize_fts_query("foo.bar baz"), "\"foo.bar\" baz");
        assert_eq!(sanitize_fts_query("src/lib.rs"), "\"src/lib.rs\"");
    }

    #[test]
    fn glob_filter_matches_suffix() {
        assert!(matches_glob(&Some("*.ts".to_string()), "src/a.ts"));
        assert!(!matches_glob(&Some("*.ts".to_string()), "src/a.rs"));
        assert!(matches_glob(&None, "anything"));
    }

    #[test]
    fn tip_suppressor_dedupes_within_ttl() {
        let s = TipSuppressor::new();
        assert!(s.allow("E"));
        assert!(!s.allow("E"));
    }

    #[test]
    fn test_path_detection() {
        assert!(is_test_path("src/__tests__/foo.ts"));
        assert!(is_test_path("src/foo.test.ts"));
        assert!(!is_test_path("src/foo.ts"));
    }

    #[test]
    fn word_boundary_match_rejects_substring_hits() {
        assert!(!word_boundary_match("however it works", "how"));
        assert!(!word_boundary_match("a failure occurred", "fail"));
        assert!(word_boundary_match("how does this work", "how"));
        assert!(word_boundary_match(
            "what's the best practice here",
            "best practice"
        ));
        assert!(!word_boundary_match("a bug-free build", "fail"));
    }
}
