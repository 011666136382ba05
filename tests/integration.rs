//! End-to-end coverage over the real pipeline: discover → parse → resolve →
//! persist → query, exercising the same request shapes the MCP tools build
//! on top of `query::search` / `query::search_dependencies` / `query::find_usages`.

use std::path::Path;

use ctxhelpr::config::Config;
use ctxhelpr::indexer::Indexer;
use ctxhelpr::query::{self, SearchFilters, TipSuppressor};
use ctxhelpr::storage::SqliteStorage;

fn fixture(name: &str) -> String {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
        .to_string_lossy()
        .to_string()
}

fn index_fixture(name: &str) -> (SqliteStorage, String, i64) {
    let repo_path = fixture(name);
    let storage = SqliteStorage::open_memory().expect("open in-memory db");
    let repo_id = storage
        .ensure_repo(&repo_path, &format!("local/{name}"), name)
        .expect("ensure_repo");
    let indexer = Indexer::new(repo_path.clone(), Config::default());
    let stats = indexer.run(&storage, repo_id).expect("index run");
    assert!(
        stats.files_indexed > 0,
        "expected at least one file indexed"
    );
    (storage, repo_path, repo_id)
}

#[test]
fn indexes_rust_fixture_and_extracts_symbols() {
    let (storage, repo_path, _repo_id) = index_fixture("rust");

    let symbols = storage
        .get_file_symbols(&repo_path, "sample.rs")
        .expect("get_file_symbols");
    let names: Vec<&str> = symbols.iter().map(|s| s.name.as_str()).collect();

    assert!(names.contains(&"Point"), "expected struct Point: {names:?}");
    assert!(
        names.contains(&"distance"),
        "expected fn distance: {names:?}"
    );
    assert!(
        names.contains(&"HasArea"),
        "expected trait HasArea: {names:?}"
    );
    assert!(
        names.contains(&"MAX_SIZE"),
        "expected const MAX_SIZE: {names:?}"
    );

    let point = symbols.iter().find(|s| s.name == "Point").unwrap();
    assert_eq!(
        point.kind, "class",
        "structs map onto the closed 'class' kind"
    );

    let max_size = symbols.iter().find(|s| s.name == "MAX_SIZE").unwrap();
    assert_eq!(max_size.kind, "constant");
}

#[test]
fn reindexing_unchanged_tree_reports_zero_churn() {
    let (storage, repo_path, repo_id) = index_fixture("rust");
    let indexer = Indexer::new(repo_path, Config::default());

    let second = indexer.run(&storage, repo_id).expect("second run");
    assert_eq!(second.files_new, 0);
    assert_eq!(second.files_changed, 0);
    assert!(second.files_unchanged > 0);
    assert_eq!(second.files_deleted, 0);
}

#[test]
fn reindexing_a_changed_file_does_not_duplicate_its_symbols() {
    let dir = tempfile::tempdir().expect("tempdir");
    let sample_path = dir.path().join("sample.rs");
    std::fs::copy(fixture("rust") + "/sample.rs", &sample_path).expect("copy fixture");

    let repo_path = dir.path().to_string_lossy().to_string();
    let storage = SqliteStorage::open_memory().expect("open in-memory db");
    let repo_id = storage
        .ensure_repo(&repo_path, "local/rust-edit", "rust-edit")
        .expect("ensure_repo");
    let indexer = Indexer::new(repo_path.clone(), Config::default());
    indexer.run(&storage, repo_id).expect("initial run");

    let before = storage
        .get_file_symbols(&repo_path, "sample.rs")
        .expect("get_file_symbols before edit");
    let distance_before = before.iter().filter(|s| s.name == "distance").count();
    assert_eq!(distance_before, 1);

    let mut content = std::fs::read_to_string(&sample_path).expect("read sample.rs");
    content.push_str("\npub fn scaled(a: &Point, factor: f64) -> f64 {\n    factor\n}\n");
    std::fs::write(&sample_path, content).expect("write edited sample.rs");

    let second = indexer.run(&storage, repo_id).expect("second run");
    assert_eq!(second.files_changed, 1);
    assert_eq!(second.files_new, 0);

    let after = storage
        .get_file_symbols(&repo_path, "sample.rs")
        .expect("get_file_symbols after edit");
    let distance_after = after.iter().filter(|s| s.name == "distance").count();
    assert_eq!(
        distance_after, 1,
        "re-indexing a changed file must not leave the old `distance` symbol row behind: {after:?}"
    );
    assert_eq!(
        after.iter().filter(|s| s.name == "scaled").count(),
        1,
        "the newly added symbol should appear exactly once: {after:?}"
    );
    assert_eq!(
        after.len(),
        before.len() + 1,
        "only the one new symbol should have been added, no stale duplicates: before={before:?} after={after:?}"
    );
}

#[test]
fn search_finds_symbol_by_name_and_reports_counts() {
    let (storage, repo_path, _repo_id) = index_fixture("rust");
    let tips = TipSuppressor::new();
    let filters = SearchFilters::default();

    let response = query::search(
        &storage,
        Some(repo_path.as_str()),
        "distance",
        &["symbols".to_string()],
        &filters,
        20,
        "full",
        3,
        &tips,
        &Config::default().output,
    )
    .expect("search");

    let hits = response["results"]["symbols"]
        .as_array()
        .expect("symbols array");
    assert!(hits.iter().any(|h| h["name"] == "distance"));
    assert_eq!(response["counts"]["symbols"], hits.len());
}

#[test]
fn search_with_no_matches_emits_the_no_results_tip() {
    let (storage, repo_path, _repo_id) = index_fixture("rust");
    let tips = TipSuppressor::new();
    let filters = SearchFilters::default();

    let response = query::search(
        &storage,
        Some(repo_path.as_str()),
        "nonexistent_token_xyz",
        &["symbols".to_string(), "code".to_string()],
        &filters,
        20,
        "full",
        3,
        &tips,
        &Config::default().output,
    )
    .expect("search");

    assert_eq!(response["counts"]["total"], 0);
    let tip_texts: Vec<&str> = response["tips"]
        .as_array()
        .expect("tips array")
        .iter()
        .map(|t| t.as_str().unwrap())
        .collect();
    assert!(tip_texts.iter().any(|t| t.contains("No results found")));
}

#[test]
fn snippet_output_includes_matched_file_content() {
    let (storage, repo_path, _repo_id) = index_fixture("rust");
    let tips = TipSuppressor::new();
    let filters = SearchFilters::default();

    let response = query::search(
        &storage,
        Some(repo_path.as_str()),
        "GLOBAL_NAME",
        &["code".to_string()],
        &filters,
        20,
        "snippet",
        2,
        &tips,
        &Config::default().output,
    )
    .expect("search");

    let hits = response["results"]["code"].as_array().expect("code array");
    assert!(!hits.is_empty(), "expected at least one file-content match");
    assert!(hits[0]["matches"].is_array());
}

#[test]
fn resolves_path_alias_and_extensionless_relative_imports() {
    let (storage, repo_path, _repo_id) = index_fixture("typescript");

    let deps = storage
        .direct_dependencies(&repo_path, "src/index.ts")
        .expect("direct_dependencies");
    assert!(
        deps.contains(&"src/utils/math.ts".to_string()),
        "alias import '@utils/math' should resolve via tsconfig paths: {deps:?}"
    );
    assert!(
        deps.contains(&"src/helpers.ts".to_string()),
        "extensionless relative import with .js substitution should resolve to helpers.ts: {deps:?}"
    );
}

#[test]
fn transitive_dependents_are_reachable_through_the_import_chain() {
    let (storage, repo_path, _repo_id) = index_fixture("typescript");

    let response = query::search_dependencies(
        &storage,
        &repo_path,
        "src/utils/math.ts",
        "dependents",
        5,
        true,
    )
    .expect("search_dependencies");

    let dependents = &response["dependents"];
    let direct = dependents["direct"].as_array().unwrap();
    assert!(direct.iter().any(|v| v == "src/index.ts"));

    let indirect_depth_2 = dependents["indirect"]["depth_2"]
        .as_array()
        .expect("depth_2 entries");
    assert!(
        indirect_depth_2.iter().any(|v| v == "src/consumer.ts"),
        "consumer.ts imports index.ts, which imports math.ts, so it's two hops away: {indirect_depth_2:?}"
    );
}

#[test]
fn find_usages_locates_import_and_call_sites_across_files() {
    let (storage, repo_path, _repo_id) = index_fixture("typescript");

    let response =
        query::find_usages(&storage, &repo_path, "add", None, true, false).expect("find_usages");

    let defined_in = response["defined_in"].as_array().unwrap();
    assert_eq!(defined_in, &vec![serde_json::json!("src/utils/math.ts")]);

    let usages = response["usages"].as_array().unwrap();
    assert!(
        usages.iter().all(|u| u["file"] == "src/index.ts"),
        "both the import and the call to add() live in index.ts: {usages:?}"
    );
    assert!(
        usages.len() >= 2,
        "expected the import ref and the call ref: {usages:?}"
    );
}

#[test]
fn analyze_change_impact_reports_breadth_and_affected_files() {
    let (storage, repo_path, _repo_id) = index_fixture("typescript");

    let response = query::analyze_change_impact(
        &storage,
        &repo_path,
        &["src/utils/math.ts".to_string()],
        &[],
        &[],
        true,
    )
    .expect("analyze_change_impact");

    let affected = response["affected_files"].as_array().unwrap();
    assert!(affected.iter().any(|v| v == "src/index.ts"));
    assert!(affected.iter().any(|v| v == "src/consumer.ts"));
    assert_eq!(response["breadth"], affected.len());
}

#[test]
fn get_index_statistics_counts_files_symbols_and_refs() {
    let (storage, _repo_path, _repo_id) = index_fixture("typescript");

    let stats = query::get_index_statistics(&storage).expect("get_index_statistics");
    assert_eq!(stats["files"], 4);
    assert!(stats["symbols"].as_i64().unwrap() > 0);
    assert!(stats["refs"].as_i64().unwrap() > 0);
}

#[test]
fn incremental_update_reparses_only_the_changed_file() {
    let repo_path = fixture("rust");
    let storage = SqliteStorage::open_memory().expect("open in-memory db");
    let repo_id = storage
        .ensure_repo(&repo_path, "local/rust", "rust")
        .expect("ensure_repo");
    let indexer = Indexer::new(repo_path.clone(), Config::default());
    indexer.run(&storage, repo_id).expect("initial run");

    let changed = vec![Path::new(&repo_path).join("sample.rs")];
    let stats = indexer
        .update_files(&storage, repo_id, &changed)
        .expect("update_files");
    assert_eq!(
        stats.files_changed + stats.files_new + stats.files_unchanged,
        1
    );
}
