pub mod indexing_tracker;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::*;
use rmcp::schemars;
use rmcp::serde;
use rmcp::{ServerHandler, tool, tool_handler, tool_router};
use schemars::JsonSchema;
use serde::Deserialize;

use crate::config::{ConfigCache, ToolTier};
use crate::indexer::Indexer;
use crate::query::{self, SearchFilters, TipSuppressor};
use crate::storage::{self, SqliteStorage};
use crate::watcher::WatcherHandle;

use self::indexing_tracker::IndexingTracker;

type McpError = rmcp::ErrorData;

/// Memory tables round-tripped by `sync_export`/`sync_import` — the code
/// tables (files/symbols/refs) are regenerated by `index_repository`, not
/// synced.
const SYNC_TABLES: &[&str] = &["decisions", "failures", "patterns"];

fn internal_err(msg: impl Into<String>) -> McpError {
    McpError::internal_error(msg.into(), None)
}

fn not_available_at_tier(tool: &str) -> McpError {
    internal_err(format!(
        "tool '{tool}' is not available at the configured MCP tier"
    ))
}

fn ensure_repo_id(storage: &SqliteStorage, abs_path: &str) -> anyhow::Result<i64> {
    let basename = Path::new(abs_path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(abs_path);
    let full_name = format!("local/{basename}");
    storage.ensure_repo(abs_path, &full_name, basename)
}

// ── Parameter structs ────────────────────────────────────────

#[derive(Debug, Deserialize, JsonSchema)]
pub struct IndexRepositoryParams {
    /// Absolute path to the repository root, or an already-indexed repository identifier
    pub repository: String,
    /// Git ref to record as the indexed revision (informational only)
    pub r#ref: Option<String>,
    /// Local filesystem path to index, used when `repository` is an identifier rather than a path
    pub local_path: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema, Default)]
pub struct SearchFiltersParams {
    pub glob: Option<String>,
    pub language: Option<String>,
    pub symbol_kind: Option<Vec<String>>,
    pub exported_only: Option<bool>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchParams {
    pub query: String,
    pub repository: Option<String>,
    /// Scopes to search: any of code, symbols, decisions, patterns, failures
    pub scope: Option<Vec<String>>,
    pub filters: Option<SearchFiltersParams>,
    pub limit: Option<usize>,
    /// full | paths | compact | snippet
    pub output: Option<String>,
    pub context_lines: Option<usize>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListRecentFilesParams {
    pub repository: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchDependenciesParams {
    pub file_path: String,
    pub repository: Option<String>,
    /// dependents | dependencies | both
    pub direction: Option<String>,
    pub depth: Option<usize>,
    pub include_tests: Option<bool>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AnalyzeChangeImpactParams {
    pub change_type: String,
    pub description: String,
    pub files_to_modify: Option<Vec<String>>,
    pub files_to_create: Option<Vec<String>>,
    pub files_to_delete: Option<Vec<String>>,
    pub breaking_changes: Option<bool>,
    pub repository: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GenerateTaskContextParams {
    pub files: Vec<String>,
    pub include_tests: Option<bool>,
    pub include_symbols: Option<bool>,
    pub repository: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetIndexStatisticsParams {}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct FindUsagesParams {
    pub symbol: String,
    pub file: Option<String>,
    pub repository: Option<String>,
    pub include_tests: Option<bool>,
    pub include_definitions: Option<bool>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SyncExportParams {
    pub repository: Option<String>,
    pub export_dir: Option<String>,
    pub force: Option<bool>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SyncImportParams {
    pub repository: Option<String>,
    pub import_dir: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RecordEntryParams {
    pub repository: Option<String>,
    pub title: String,
    pub content: String,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchMemoryParams {
    pub query: String,
    pub repository: Option<String>,
    pub limit: Option<usize>,
}

// ── Server ────────────────────────────────────────────────

#[derive(Clone)]
pub struct CtxhelprServer {
    config_cache: Arc<ConfigCache>,
    watcher: WatcherHandle,
    indexing_tracker: Arc<IndexingTracker>,
    tips: Arc<TipSuppressor>,
    tool_router: ToolRouter<Self>,
}

fn open_storage(path: &str) -> Result<SqliteStorage, McpError> {
    SqliteStorage::open(path).map_err(|e| internal_err(format!("Storage error for {path}: {e}")))
}

#[tool_router]
impl CtxhelprServer {
    pub fn new(
        config_cache: Arc<ConfigCache>,
        watcher: WatcherHandle,
        indexing_tracker: Arc<IndexingTracker>,
    ) -> Self {
        Self {
            config_cache,
            watcher,
            indexing_tracker,
            tips: Arc::new(TipSuppressor::new()),
            tool_router: Self::tool_router(),
        }
    }

    /// Tier is per-repository (§10, `.ctxhelpr.json`'s `mcp.tier`), not a
    /// process-wide setting, so this is checked against the resolved repo's
    /// own config rather than a field on the server.
    fn check_tier(&self, path: &str, required: ToolTier, tool: &str) -> Result<(), McpError> {
        if self.config_cache.get(path).mcp.tier.includes(required) {
            Ok(())
        } else {
            Err(not_available_at_tier(tool))
        }
    }

    /// Resolves a `repository` argument per §4.8: a directory passes through
    /// verbatim; otherwise it's matched against indexed repos by `full_name`
    /// or `abs_path`; absent, the most recently created indexed repo is used.
    fn resolve_repository_path(&self, identifier: Option<&str>) -> Result<String, McpError> {
        if let Some(id) = identifier {
            if Path::new(id).is_dir() {
                return Ok(id.to_string());
            }
        }
        let repos = storage::list_indexed_repos()
            .map_err(|e| internal_err(format!("Failed to resolve repository: {e}")))?;
        if let Some(id) = identifier {
            return repos
                .iter()
                .find(|r| r.full_name == id || r.abs_path == id)
                .map(|r| r.abs_path.clone())
                .ok_or_else(|| internal_err(format!("Unknown repository identifier: {id}")));
        }
        repos
            .into_iter()
            .max_by(|a, b| a.created_at.cmp(&b.created_at))
            .map(|r| r.abs_path)
            .ok_or_else(|| internal_err("No indexed repositories found"))
    }

    fn auto_index_message(path: &str, status: &str) -> CallToolResult {
        let msg = format!(
            "Repository '{path}' is not indexed yet ({status}). Indexing has been triggered in the background.\n\n\
             Call `index_repository` with this path to wait for it to finish, or retry this call shortly."
        );
        CallToolResult::error(vec![Content::text(msg)])
    }

    fn ensure_indexed(&self, path: &str) -> Option<CallToolResult> {
        if storage::has_index_db(path) && storage::is_repo_indexed(path).unwrap_or(false) {
            return None;
        }
        Some(self.trigger_background_index(path))
    }

    fn trigger_background_index(&self, path: &str) -> CallToolResult {
        if self.indexing_tracker.is_indexing(path) {
            return Self::auto_index_message(path, "currently being indexed");
        }
        let handle = match self.indexing_tracker.start_indexing(path) {
            Some(h) => h,
            None => return Self::auto_index_message(path, "currently being indexed"),
        };

        let config_cache = self.config_cache.clone();
        let watcher = self.watcher.clone();
        let path_owned = path.to_string();

        tokio::spawn(async move {
            let config = config_cache.get(&path_owned);
            let p = path_owned.clone();
            let result = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
                let storage = SqliteStorage::open(&p)?;
                let repo_id = ensure_repo_id(&storage, &p)?;
                let indexer = Indexer::new(p.clone(), config);
                indexer.run(&storage, repo_id)
            })
            .await;

            match result {
                Ok(Ok(stats)) => {
                    tracing::info!(
                        path = %path_owned,
                        files = stats.files_indexed,
                        symbols = stats.symbols_extracted,
                        duration_ms = stats.duration_ms,
                        "Background auto-index complete"
                    );
                    watcher.watch_repo(&path_owned).await;
                }
                Ok(Err(e)) => {
                    tracing::warn!(path = %path_owned, error = %e, "Background auto-index failed");
                }
                Err(e) => {
                    tracing::warn!(path = %path_owned, error = %e, "Background auto-index task panicked");
                }
            }
            handle.complete();
        });

        Self::auto_index_message(path, "indexing started")
    }

    fn text_result(value: serde_json::Value) -> CallToolResult {
        CallToolResult::success(vec![Content::text(value.to_string())])
    }

    #[tool(
        description = "Index or re-index a repository. Incrementally updates: only re-parses files whose content hash has changed, and drops rows for files that were deleted."
    )]
    async fn index_repository(
        &self,
        Parameters(params): Parameters<IndexRepositoryParams>,
    ) -> Result<CallToolResult, McpError> {
        let path = params
            .local_path
            .clone()
            .unwrap_or_else(|| params.repository.clone());
        if !Path::new(&path).is_dir() {
            return Err(internal_err(format!("'{path}' is not a local directory")));
        }
        tracing::info!(path = %path, "index_repository");

        if let Some(mut rx) = self.indexing_tracker.wait_for_completion(&path) {
            tracing::info!(path = %path, "Waiting for background auto-index to complete");
            while !*rx.borrow() {
                if rx.changed().await.is_err() {
                    break;
                }
            }
        }

        let config = self.config_cache.get(&path);
        let path_owned = path.clone();
        let stats = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
            let storage = SqliteStorage::open(&path_owned)?;
            let repo_id = ensure_repo_id(&storage, &path_owned)?;
            let indexer = Indexer::new(path_owned.clone(), config);
            indexer.run(&storage, repo_id)
        })
        .await
        .map_err(|e| internal_err(format!("Indexing task failed: {e}")))?
        .map_err(|e| internal_err(format!("Indexing failed: {e}")))?;

        self.watcher.watch_repo(&path).await;
        Ok(Self::text_result(
            serde_json::to_value(&stats).unwrap_or_default(),
        ))
    }

    #[tool(
        description = "Full-text search across code, symbols, and recorded decisions/patterns/failures in one call. Prefer this over Grep for anything semantic (finding a function, understanding why a choice was made, or locating recorded failures)."
    )]
    async fn search(
        &self,
        Parameters(params): Parameters<SearchParams>,
    ) -> Result<CallToolResult, McpError> {
        let path = self.resolve_repository_path(params.repository.as_deref())?;
        if let Some(result) = self.ensure_indexed(&path) {
            return Ok(result);
        }
        tracing::info!(path = %path, query = %params.query, "search");

        let config = self.config_cache.get(&path);
        let scopes = params
            .scope
            .unwrap_or_else(|| vec!["code".to_string(), "symbols".to_string()]);
        let filters_param = params.filters.unwrap_or_default();
        let filters = SearchFilters {
            glob: filters_param.glob,
            language: filters_param.language,
            symbol_kind: filters_param.symbol_kind.unwrap_or_default(),
            exported_only: filters_param.exported_only.unwrap_or(false),
        };
        let limit = params.limit.unwrap_or(config.search.max_results);
        let output = params.output.unwrap_or_else(|| "full".to_string());
        let context_lines = params.context_lines.unwrap_or(3);

        let tips = self.tips.clone();
        let query_text = params.query.clone();
        let path_owned = path.clone();
        let output_config = config.output.clone();
        let result = tokio::task::spawn_blocking(move || -> anyhow::Result<serde_json::Value> {
            let storage = SqliteStorage::open(&path_owned)?;
            query::search(
                &storage,
                Some(path_owned.as_str()),
                &query_text,
                &scopes,
                &filters,
                limit,
                &output,
                context_lines,
                &tips,
                &output_config,
            )
        })
        .await
        .map_err(|e| internal_err(format!("Search task failed: {e}")))?
        .map_err(|e| internal_err(format!("Search failed: {e}")))?;

        Ok(Self::text_result(result))
    }

    #[tool(description = "List the most recently indexed files, newest first.")]
    async fn list_recent_files(
        &self,
        Parameters(params): Parameters<ListRecentFilesParams>,
    ) -> Result<CallToolResult, McpError> {
        let path = self.resolve_repository_path(params.repository.as_deref())?;
        if let Some(result) = self.ensure_indexed(&path) {
            return Ok(result);
        }
        let limit = params.limit.unwrap_or(20);
        let storage = open_storage(&path)?;
        let files = storage
            .list_recent_files(Some(&path), limit)
            .map_err(|e| internal_err(format!("Query failed: {e}")))?;
        let items: Vec<_> = files
            .iter()
            .map(|f| {
                serde_json::json!({
                    "path": f.rel_path,
                    "language": f.language,
                    "content_hash": f.content_hash,
                    "indexed_at": f.indexed_at,
                })
            })
            .collect();
        Ok(Self::text_result(serde_json::json!({"files": items})))
    }

    #[tool(
        description = "Trace what a file depends on, or what depends on it, across import/re-export edges. Not possible with text search -- requires the resolved reference graph."
    )]
    async fn search_dependencies(
        &self,
        Parameters(params): Parameters<SearchDependenciesParams>,
    ) -> Result<CallToolResult, McpError> {
        let path = self.resolve_repository_path(params.repository.as_deref())?;
        if let Some(result) = self.ensure_indexed(&path) {
            return Ok(result);
        }
        let direction = params.direction.unwrap_or_else(|| "both".to_string());
        let depth = params.depth.unwrap_or(2).clamp(1, 5);
        let include_tests = params.include_tests.unwrap_or(false);
        let storage = open_storage(&path)?;
        let result = query::search_dependencies(
            &storage,
            &path,
            &params.file_path,
            &direction,
            depth,
            include_tests,
        )
        .map_err(|e| internal_err(format!("Query failed: {e}")))?;
        Ok(Self::text_result(result))
    }

    #[tool(
        description = "Find every reference to a symbol by name: callers, importers, and type references, with optional inclusion of the definition sites and test files."
    )]
    async fn find_usages(
        &self,
        Parameters(params): Parameters<FindUsagesParams>,
    ) -> Result<CallToolResult, McpError> {
        let path = self.resolve_repository_path(params.repository.as_deref())?;
        if let Some(result) = self.ensure_indexed(&path) {
            return Ok(result);
        }
        let storage = open_storage(&path)?;
        let result = query::find_usages(
            &storage,
            &path,
            &params.symbol,
            params.file.as_deref(),
            params.include_tests.unwrap_or(true),
            params.include_definitions.unwrap_or(false),
        )
        .map_err(|e| internal_err(format!("Query failed: {e}")))?;
        Ok(Self::text_result(result))
    }

    #[tool(
        description = "Estimate the blast radius of a proposed change: aggregates dependent files for each file touched, enumerates affected test files, and reports a low/medium/high risk estimate."
    )]
    async fn analyze_change_impact(
        &self,
        Parameters(params): Parameters<AnalyzeChangeImpactParams>,
    ) -> Result<CallToolResult, McpError> {
        let path = self.resolve_repository_path(params.repository.as_deref())?;
        if let Some(result) = self.ensure_indexed(&path) {
            return Ok(result);
        }
        let storage = open_storage(&path)?;
        let modify = params.files_to_modify.unwrap_or_default();
        let create = params.files_to_create.unwrap_or_default();
        let delete = params.files_to_delete.unwrap_or_default();
        let breaking = params.breaking_changes.unwrap_or(false);
        let mut result =
            query::analyze_change_impact(&storage, &path, &modify, &create, &delete, breaking)
                .map_err(|e| internal_err(format!("Query failed: {e}")))?;
        if let Value::Object(ref mut obj) = result {
            obj.insert(
                "change_type".to_string(),
                serde_json::json!(params.change_type),
            );
            obj.insert(
                "description".to_string(),
                serde_json::json!(params.description),
            );
        }
        Ok(Self::text_result(result))
    }

    #[tool(
        description = "Assemble everything a coding task needs up front for a set of files: dependent counts, optional symbol listings, and optional test-file discovery, in one call instead of several Glob/Read round trips."
    )]
    async fn generate_task_context(
        &self,
        Parameters(params): Parameters<GenerateTaskContextParams>,
    ) -> Result<CallToolResult, McpError> {
        let path = self.resolve_repository_path(params.repository.as_deref())?;
        if let Some(result) = self.ensure_indexed(&path) {
            return Ok(result);
        }
        let storage = open_storage(&path)?;
        let result = query::generate_task_context(
            &storage,
            &path,
            &params.files,
            params.include_tests.unwrap_or(false),
            params.include_symbols.unwrap_or(false),
        )
        .map_err(|e| internal_err(format!("Query failed: {e}")))?;
        Ok(Self::text_result(result))
    }

    #[tool(
        description = "Aggregate row counts (repositories, files, symbols, references, decisions, failures, patterns) across every indexed repository."
    )]
    async fn get_index_statistics(
        &self,
        Parameters(_params): Parameters<GetIndexStatisticsParams>,
    ) -> Result<CallToolResult, McpError> {
        let result = tokio::task::spawn_blocking(move || -> anyhow::Result<serde_json::Value> {
            let repos = storage::list_indexed_repos()?;
            let mut totals: HashMap<String, i64> = HashMap::new();
            for repo in &repos {
                if let Ok(storage) = SqliteStorage::open(&repo.abs_path) {
                    if let Ok(counts) = storage.entity_counts() {
                        for (k, v) in counts {
                            *totals.entry(k).or_insert(0) += v;
                        }
                    }
                }
            }
            Ok(serde_json::json!({"repositories_indexed": repos.len(), "totals": totals}))
        })
        .await
        .map_err(|e| internal_err(format!("Statistics task failed: {e}")))?
        .map_err(|e| internal_err(format!("Statistics query failed: {e}")))?;
        Ok(Self::text_result(result))
    }

    #[tool(
        description = "Export decisions, failures, and patterns to newline-delimited JSON files, one per table, for offline transfer to another machine."
    )]
    async fn sync_export(
        &self,
        Parameters(params): Parameters<SyncExportParams>,
    ) -> Result<CallToolResult, McpError> {
        let path = self.resolve_repository_path(params.repository.as_deref())?;
        self.check_tier(&path, ToolTier::Default, "sync_export")?;
        let export_dir = params
            .export_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| storage::db_path_for_repo(&path).with_extension("sync"));
        let force = params.force.unwrap_or(false);

        let result = tokio::task::spawn_blocking(move || -> anyhow::Result<serde_json::Value> {
            std::fs::create_dir_all(&export_dir)?;
            let storage = SqliteStorage::open(&path)?;
            let mut written = serde_json::Map::new();
            for table in SYNC_TABLES {
                let file_path = export_dir.join(format!("{table}.jsonl"));
                if file_path.exists() && !force {
                    anyhow::bail!("{table}.jsonl already exists (pass force:true to overwrite)");
                }
                let lines = storage.export_table_jsonl(table)?;
                std::fs::write(&file_path, lines.join("\n"))?;
                written.insert((*table).to_string(), serde_json::json!(lines.len()));
            }
            Ok(serde_json::json!({"export_dir": export_dir.display().to_string(), "tables": written}))
        })
        .await
        .map_err(|e| internal_err(format!("Export task failed: {e}")))?
        .map_err(|e| internal_err(format!("Export failed: {e}")))?;

        Ok(Self::text_result(result))
    }

    #[tool(
        description = "Import decisions, failures, and patterns from newline-delimited JSON files previously written by sync_export. Transactional per table: a malformed record rejects the whole file before any row is written."
    )]
    async fn sync_import(
        &self,
        Parameters(params): Parameters<SyncImportParams>,
    ) -> Result<CallToolResult, McpError> {
        let path = self.resolve_repository_path(params.repository.as_deref())?;
        self.check_tier(&path, ToolTier::Default, "sync_import")?;
        let import_dir = params
            .import_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| storage::db_path_for_repo(&path).with_extension("sync"));

        let result = tokio::task::spawn_blocking(move || -> anyhow::Result<serde_json::Value> {
            let storage = SqliteStorage::open(&path)?;
            let repo_id = ensure_repo_id(&storage, &path)?;
            let mut imported = serde_json::Map::new();
            for table in SYNC_TABLES {
                let file_path = import_dir.join(format!("{table}.jsonl"));
                if !file_path.exists() {
                    continue;
                }
                let content = std::fs::read_to_string(&file_path)?;
                let lines: Vec<String> = content.lines().map(|l| l.to_string()).collect();
                let n = storage.import_table_jsonl(table, Some(repo_id), &lines)?;
                imported.insert((*table).to_string(), serde_json::json!(n));
            }
            Ok(serde_json::json!({"import_dir": import_dir.display().to_string(), "tables": imported}))
        })
        .await
        .map_err(|e| internal_err(format!("Import task failed: {e}")))?
        .map_err(|e| internal_err(format!("Import failed: {e}")))?;

        Ok(Self::text_result(result))
    }

    #[tool(
        description = "Record an architectural decision and its rationale, searchable later via search or search_decisions."
    )]
    async fn record_decision(
        &self,
        Parameters(params): Parameters<RecordEntryParams>,
    ) -> Result<CallToolResult, McpError> {
        let path = self.resolve_repository_path(params.repository.as_deref())?;
        self.check_tier(&path, ToolTier::Memory, "record_decision")?;
        let storage = open_storage(&path)?;
        let repo_id = ensure_repo_id(&storage, &path).map_err(|e| internal_err(format!("{e}")))?;
        let tags = params.tags.unwrap_or_default();
        let uuid = storage
            .record_decision(Some(repo_id), &params.title, &params.content, &tags)
            .map_err(|e| internal_err(format!("Record failed: {e}")))?;
        Ok(Self::text_result(serde_json::json!({"uuid": uuid})))
    }

    #[tool(
        description = "Record a failure mode (a bug, outage, or bad approach) and its resolution, searchable later via search or search_failures."
    )]
    async fn record_failure(
        &self,
        Parameters(params): Parameters<RecordEntryParams>,
    ) -> Result<CallToolResult, McpError> {
        let path = self.resolve_repository_path(params.repository.as_deref())?;
        self.check_tier(&path, ToolTier::Memory, "record_failure")?;
        let storage = open_storage(&path)?;
        let repo_id = ensure_repo_id(&storage, &path).map_err(|e| internal_err(format!("{e}")))?;
        let tags = params.tags.unwrap_or_default();
        let uuid = storage
            .record_failure(Some(repo_id), &params.title, &params.content, &tags)
            .map_err(|e| internal_err(format!("Record failed: {e}")))?;
        Ok(Self::text_result(serde_json::json!({"uuid": uuid})))
    }

    #[tool(
        description = "Record a reusable pattern or insight, searchable later via search or search_patterns."
    )]
    async fn record_insight(
        &self,
        Parameters(params): Parameters<RecordEntryParams>,
    ) -> Result<CallToolResult, McpError> {
        let path = self.resolve_repository_path(params.repository.as_deref())?;
        self.check_tier(&path, ToolTier::Memory, "record_insight")?;
        let storage = open_storage(&path)?;
        let repo_id = ensure_repo_id(&storage, &path).map_err(|e| internal_err(format!("{e}")))?;
        let tags = params.tags.unwrap_or_default();
        let uuid = storage
            .record_insight(Some(repo_id), &params.title, &params.content, &tags)
            .map_err(|e| internal_err(format!("Record failed: {e}")))?;
        Ok(Self::text_result(serde_json::json!({"uuid": uuid})))
    }

    #[tool(description = "Search recorded architectural decisions.")]
    async fn search_decisions(
        &self,
        Parameters(params): Parameters<SearchMemoryParams>,
    ) -> Result<CallToolResult, McpError> {
        let path = self.resolve_repository_path(params.repository.as_deref())?;
        self.check_tier(&path, ToolTier::Memory, "search_decisions")?;
        self.search_memory(&path, params, SqliteStorage::search_decisions)
            .await
    }

    #[tool(description = "Search recorded failures and their resolutions.")]
    async fn search_failures(
        &self,
        Parameters(params): Parameters<SearchMemoryParams>,
    ) -> Result<CallToolResult, McpError> {
        let path = self.resolve_repository_path(params.repository.as_deref())?;
        self.check_tier(&path, ToolTier::Memory, "search_failures")?;
        self.search_memory(&path, params, SqliteStorage::search_failures)
            .await
    }

    #[tool(description = "Search recorded patterns and insights.")]
    async fn search_patterns(
        &self,
        Parameters(params): Parameters<SearchMemoryParams>,
    ) -> Result<CallToolResult, McpError> {
        let path = self.resolve_repository_path(params.repository.as_deref())?;
        self.check_tier(&path, ToolTier::Memory, "search_patterns")?;
        self.search_memory(&path, params, SqliteStorage::search_patterns)
            .await
    }
}

type MemorySearchFn =
    fn(&SqliteStorage, Option<&str>, &str, usize) -> anyhow::Result<Vec<crate::storage::MemoryHit>>;

impl CtxhelprServer {
    async fn search_memory(
        &self,
        path: &str,
        params: SearchMemoryParams,
        search_fn: MemorySearchFn,
    ) -> Result<CallToolResult, McpError> {
        let storage = open_storage(path)?;
        let fts_query = query::sanitize_fts_query(&params.query);
        let limit = params.limit.unwrap_or(20);
        let hits = search_fn(&storage, Some(path), &fts_query, limit)
            .map_err(|e| internal_err(format!("Search failed: {e}")))?;
        let items: Vec<_> = hits
            .iter()
            .map(|h| serde_json::json!({"uuid": h.uuid, "title": h.title, "content": h.content, "rank": h.rank}))
            .collect();
        Ok(Self::text_result(serde_json::json!({"results": items})))
    }
}

use serde_json::Value;

#[tool_handler]
impl ServerHandler for CtxhelprServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "PREFER these tools over Grep/Glob/Read for code navigation (finding symbols, \
                 tracing dependencies, understanding structure). They return resolved, structured \
                 data -- signatures, call graphs, and cross-references -- in one call rather than \
                 several text searches. Workflow: search -> drill with search_dependencies, \
                 find_usages, or generate_task_context. The index is kept fresh automatically via \
                 background file watching. An unindexed repository triggers background indexing \
                 automatically on first use; call index_repository directly to wait for it."
                    .into(),
            ),
        }
    }
}
