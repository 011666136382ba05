pub mod tokenizer;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use crate::indexer::RefKind;
use crate::indexer::pipeline::ResolvedFile;

use self::tokenizer::split_code_identifier;

const SCHEMA: &str = include_str!("schema.sql");

/// Append-only migration ledger (§3, §4.1). `SCHEMA` itself is migration
/// zero — later entries are plain `ALTER`/`CREATE` statements appended as
/// the schema evolves, never edits to an already-shipped migration.
const MIGRATIONS: &[(&str, &str)] = &[("0000_init", "")];

#[derive(Debug, Clone)]
pub struct FileRecord {
    pub id: i64,
    pub uuid: String,
    pub rel_path: String,
    pub content_hash: String,
    pub language: String,
    pub indexed_at: String,
}

#[derive(Debug, Clone)]
pub struct SymbolRecord {
    pub id: i64,
    pub uuid: String,
    pub name: String,
    pub kind: String,
    pub signature: Option<String>,
    pub doc_comment: Option<String>,
    pub start_line: i64,
    pub end_line: i64,
    pub file_rel_path: String,
    pub parent_symbol_id: Option<i64>,
}

impl SymbolRecord {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            uuid: row.get(1)?,
            name: row.get(2)?,
            kind: row.get(3)?,
            signature: row.get(4)?,
            doc_comment: row.get(5)?,
            start_line: row.get(6)?,
            end_line: row.get(7)?,
            file_rel_path: row.get(8)?,
            parent_symbol_id: row.get(9)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct RefRecord {
    pub from_symbol_id: Option<i64>,
    pub from_name: Option<String>,
    pub from_file: Option<String>,
    pub to_symbol_id: Option<i64>,
    pub to_name: String,
    pub target_file_path: Option<String>,
    pub ref_kind: String,
    pub line: i64,
    pub column_number: i64,
}

#[derive(Debug, Clone)]
pub struct SymbolSearchHit {
    pub id: i64,
    pub uuid: String,
    pub name: String,
    pub kind: String,
    pub file_rel_path: String,
    pub signature: Option<String>,
    pub doc_comment: Option<String>,
    pub start_line: i64,
    pub end_line: i64,
    pub rank: f64,
}

#[derive(Debug, Clone)]
pub struct CodeSearchHit {
    pub rel_path: String,
    pub rank: f64,
    pub match_count: i64,
}

#[derive(Debug, Clone)]
pub struct MemoryHit {
    pub uuid: String,
    pub title: String,
    pub content: String,
    pub rank: f64,
}

#[derive(Debug, Clone)]
pub struct ModuleInfo {
    pub path: String,
    pub file_count: i64,
    pub symbol_count: i64,
}

#[derive(Debug, Clone)]
pub struct OverviewData {
    pub repo_name: String,
    pub languages: Vec<(String, i64)>,
    pub modules: Vec<ModuleInfo>,
    pub top_types: Vec<SymbolRecord>,
    pub entry_points: Vec<SymbolRecord>,
}

/// Stats returned by a completed indexing run (§4.6 step 5).
#[derive(Debug, Clone, serde::Serialize)]
pub struct PipelineStats {
    pub files_indexed: usize,
    pub files_new: usize,
    pub files_changed: usize,
    pub files_unchanged: usize,
    pub files_deleted: usize,
    pub symbols_extracted: usize,
    pub references_found: usize,
    pub references_resolved: usize,
    pub duration_ms: u128,
}

#[derive(Debug, Clone)]
pub struct IndexStatus {
    pub repo_path: String,
    pub indexed_at: Option<String>,
    pub total_files: i64,
    pub total_symbols: i64,
    pub total_refs: i64,
    pub languages: Vec<(String, i64)>,
}

#[derive(Debug, Clone)]
pub struct RepoInfo {
    pub abs_path: String,
    pub full_name: String,
    pub last_indexed_at: Option<String>,
    pub created_at: String,
    pub file_count: i64,
    pub symbol_count: i64,
    pub db_path: PathBuf,
    pub db_size_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct DecisionRecord {
    pub uuid: String,
    pub title: String,
    pub content: String,
    pub status: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct FailureRecord {
    pub uuid: String,
    pub title: String,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct PatternRecord {
    pub uuid: String,
    pub entry_kind: String,
    pub title: String,
    pub content: String,
    pub created_at: String,
}

pub fn db_path_for_repo(repo_path: &str) -> PathBuf {
    use sha2::{Digest, Sha256};
    let hash = hex::encode(Sha256::digest(repo_path.as_bytes()));
    let short_hash = &hash[..16];
    db_cache_dir().join(format!("{short_hash}.db"))
}

/// Base directory for per-repo database files. Overridable via the single
/// `CTXHELPR_DB_DIR` environment variable.
fn db_cache_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("CTXHELPR_DB_DIR") {
        return PathBuf::from(dir);
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("ctxhelpr")
}

/// List all indexed repos by scanning the cache directory's DB files.
pub fn list_indexed_repos() -> Result<Vec<RepoInfo>> {
    let dir = db_cache_dir();
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut repos = Vec::new();
    for entry in std::fs::read_dir(&dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("db") {
            continue;
        }

        let Ok(conn) = Connection::open(&path) else {
            continue;
        };

        let has_repos: bool = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='repositories'",
                [],
                |row| row.get::<_, i64>(0),
            )
            .map(|c| c > 0)
            .unwrap_or(false);
        if !has_repos {
            continue;
        }

        let Ok(mut stmt) = conn
            .prepare("SELECT abs_path, full_name, last_indexed_at, created_at FROM repositories")
        else {
            continue;
        };

        let rows: Vec<(String, String, Option<String>, String)> = stmt
            .query_map([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })
            .ok()
            .map(|r| r.filter_map(|r| r.ok()).collect())
            .unwrap_or_default();

        for (abs_path, full_name, last_indexed_at, created_at) in rows {
            let file_count: i64 = conn
                .query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))
                .unwrap_or(0);
            let symbol_count: i64 = conn
                .query_row("SELECT COUNT(*) FROM symbols", [], |row| row.get(0))
                .unwrap_or(0);
            let db_size_bytes = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);

            repos.push(RepoInfo {
                abs_path,
                full_name,
                last_indexed_at,
                created_at,
                file_count,
                symbol_count,
                db_path: path.clone(),
                db_size_bytes,
            });
        }
    }

    repos.sort_by(|a, b| a.abs_path.cmp(&b.abs_path));
    Ok(repos)
}

/// `true` if a database file exists for `repo_path`, without opening it.
/// Used by the auto-index gate (§4.9) to decide whether a bare `search`
/// call needs to trigger an index before it can answer anything.
pub fn has_index_db(repo_path: &str) -> bool {
    db_path_for_repo(repo_path).exists()
}

/// Opens the on-disk database for `repo_path` (if any) and reports whether
/// it actually holds a completed index, as opposed to an empty shell left
/// behind by a prior failed run.
pub fn is_repo_indexed(repo_path: &str) -> Result<bool> {
    if !has_index_db(repo_path) {
        return Ok(false);
    }
    let storage = SqliteStorage::open(repo_path)?;
    let Some(repo_id) = storage.resolve_repo_identifier(None)? else {
        return Ok(false);
    };
    storage.is_indexed(repo_id)
}

pub fn delete_repo_index(repo_path: &str) -> Result<()> {
    let db_path = db_path_for_repo(repo_path);
    if !db_path.exists() {
        anyhow::bail!("No index found for {repo_path}");
    }
    remove_db_files(&db_path)
}

pub fn delete_all_repo_indexes() -> Result<usize> {
    let dir = db_cache_dir();
    if !dir.exists() {
        return Ok(0);
    }

    let mut count = 0;
    for entry in std::fs::read_dir(&dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("db") {
            remove_db_files(&path)?;
            count += 1;
        }
    }
    Ok(count)
}

fn remove_db_files(db_path: &Path) -> Result<()> {
    if db_path.exists() {
        std::fs::remove_file(db_path)?;
    }
    for suffix in ["-shm", "-wal"] {
        let sibling = PathBuf::from(format!("{}{suffix}", db_path.display()));
        if sibling.exists() {
            std::fs::remove_file(sibling)?;
        }
    }
    Ok(())
}

pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    pub fn open(repo_path: &str) -> Result<Self> {
        let db_path = db_path_for_repo(repo_path);
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&db_path)
            .with_context(|| format!("Failed to open database at {}", db_path.display()))?;
        Self::set_connection_pragmas(&conn)?;
        let storage = Self { conn };
        storage.run_migrations()?;
        Ok(storage)
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::set_connection_pragmas(&conn)?;
        let storage = Self { conn };
        storage.run_migrations()?;
        Ok(storage)
    }

    /// Connection-scoped pragmas that must be set outside any transaction
    /// (`foreign_keys` is a no-op once a transaction has started) and before
    /// `run_migrations` so the schema's CASCADE/SET NULL actions are live
    /// from the very first write.
    fn set_connection_pragmas(conn: &Connection) -> Result<()> {
        conn.pragma_update(None, "journal_mode", "WAL")
            .context("Failed to enable WAL journal mode")?;
        conn.pragma_update(None, "foreign_keys", true)
            .context("Failed to enable foreign key enforcement")?;
        Ok(())
    }

    /// Applies every migration whose name is absent from the ledger, in
    /// order, each wrapped in its own transaction (§4.1).
    fn run_migrations(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_migrations (name TEXT PRIMARY KEY, applied_at TEXT NOT NULL DEFAULT (datetime('now')));",
        )?;

        for (name, extra_sql) in MIGRATIONS {
            let already_applied: bool = self
                .conn
                .query_row(
                    "SELECT COUNT(*) FROM schema_migrations WHERE name = ?1",
                    params![name],
                    |row| row.get::<_, i64>(0),
                )
                .map(|c| c > 0)
                .unwrap_or(false);
            if already_applied {
                continue;
            }

            self.conn.execute_batch("BEGIN")?;
            let result = (|| -> Result<()> {
                if *name == "0000_init" {
                    self.conn.execute_batch(SCHEMA)?;
                } else if !extra_sql.is_empty() {
                    self.conn.execute_batch(extra_sql)?;
                }
                self.conn.execute(
                    "INSERT INTO schema_migrations (name) VALUES (?1)",
                    params![name],
                )?;
                Ok(())
            })();

            match result {
                Ok(()) => self.conn.execute_batch("COMMIT")?,
                Err(e) => {
                    self.conn.execute_batch("ROLLBACK").ok();
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    // ── Transaction control ──

    pub fn begin_transaction(&self) -> Result<()> {
        self.conn
            .execute_batch("BEGIN IMMEDIATE")
            .context("Failed to begin transaction")?;
        Ok(())
    }

    pub fn commit(&self) -> Result<()> {
        self.conn
            .execute_batch("COMMIT")
            .context("Failed to commit transaction")?;
        Ok(())
    }

    pub fn rollback(&self) -> Result<()> {
        self.conn.execute_batch("ROLLBACK").ok();
        Ok(())
    }

    // ── Repository operations ──

    pub fn ensure_repo(&self, abs_path: &str, full_name: &str, name: &str) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO repositories (uuid, abs_path, full_name, name)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(abs_path) DO NOTHING",
            params![Uuid::new_v4().to_string(), abs_path, full_name, name],
        )?;
        let id = self.conn.query_row(
            "SELECT id FROM repositories WHERE abs_path = ?1",
            params![abs_path],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn repo_id_for_path(&self, abs_path: &str) -> Result<i64> {
        self.conn
            .query_row(
                "SELECT id FROM repositories WHERE abs_path = ?1",
                params![abs_path],
                |row| row.get(0),
            )
            .context("Repository not indexed. Run index_repository first.")
    }

    /// Resolves a repository identifier per §4.8: a 36-char id passes
    /// through verbatim with no existence check; otherwise it's looked up
    /// case-sensitively by `full_name`; if `None`, the most recently
    /// created repository is used.
    pub fn resolve_repo_identifier(&self, identifier: Option<&str>) -> Result<Option<i64>> {
        if let Some(id) = identifier {
            if id.len() == 36 && id.chars().filter(|c| *c == '-').count() == 4 {
                return Ok(self
                    .conn
                    .query_row(
                        "SELECT id FROM repositories WHERE uuid = ?1",
                        params![id],
                        |row| row.get(0),
                    )
                    .optional()?);
            }
            return Ok(self
                .conn
                .query_row(
                    "SELECT id FROM repositories WHERE full_name = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .optional()?);
        }
        Ok(self
            .conn
            .query_row(
                "SELECT id FROM repositories ORDER BY created_at DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn repo_abs_path(&self, repo_id: i64) -> Result<String> {
        Ok(self.conn.query_row(
            "SELECT abs_path FROM repositories WHERE id = ?1",
            params![repo_id],
            |row| row.get(0),
        )?)
    }

    pub fn is_indexed(&self, repo_id: i64) -> Result<bool> {
        let has_timestamp: bool = self
            .conn
            .query_row(
                "SELECT last_indexed_at IS NOT NULL FROM repositories WHERE id = ?1",
                params![repo_id],
                |row| row.get(0),
            )
            .unwrap_or(false);
        if !has_timestamp {
            return Ok(false);
        }
        let has_files: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM files WHERE repo_id = ?1",
            params![repo_id],
            |row| row.get(0),
        )?;
        Ok(has_files > 0)
    }

    // ── Atomic delete-then-insert persistence (§4.6 step 4) ──

    /// Full pass: `files` is the complete current file set for the repo, so
    /// anything previously persisted but absent from it is treated as
    /// deleted.
    pub fn persist_index_run(&self, repo_id: i64, files: &[ResolvedFile]) -> Result<PipelineStats> {
        self.persist_run(repo_id, files, true)
    }

    /// Partial pass for the watcher's `update_files` (§4.6, §10): `files` is
    /// only the subset that was re-parsed. Files not mentioned are left
    /// alone rather than treated as deleted — the watcher reports removals
    /// separately via `delete_files_by_rel_paths`.
    pub fn persist_partial_update(
        &self,
        repo_id: i64,
        files: &[ResolvedFile],
    ) -> Result<PipelineStats> {
        self.persist_run(repo_id, files, false)
    }

    fn persist_run(
        &self,
        repo_id: i64,
        files: &[ResolvedFile],
        full_snapshot: bool,
    ) -> Result<PipelineStats> {
        let start = std::time::Instant::now();

        self.begin_transaction()?;
        let result = self.persist_index_run_inner(repo_id, files, full_snapshot);
        match result {
            Ok(mut stats) => {
                self.commit()?;
                stats.duration_ms = start.elapsed().as_millis();
                Ok(stats)
            }
            Err(e) => {
                self.rollback()?;
                Err(e)
            }
        }
    }

    /// Diffs `files` against the previously-persisted set for `repo_id` and
    /// writes only what changed (§4.6 step 4). File-level dependency edges
    /// (`direct_dependencies`/`direct_dependents`) key off `target_file_path`,
    /// which survives untouched on refs from unchanged files, so a run that
    /// only touches a handful of files still leaves the whole-repo graph
    /// consistent. `target_symbol_id` on an untouched ref pointing at a
    /// changed file's old symbol row is nulled out by the schema's
    /// `ON DELETE SET NULL` and is not re-resolved — name-based lookups
    /// (`get_refs_by_name`, `get_symbol_definitions`) don't depend on it.
    fn persist_index_run_inner(
        &self,
        repo_id: i64,
        files: &[ResolvedFile],
        full_snapshot: bool,
    ) -> Result<PipelineStats> {
        let mut existing: HashMap<String, (i64, String)> = HashMap::new();
        {
            let mut stmt = self
                .conn
                .prepare("SELECT rel_path, id, content_hash FROM files WHERE repo_id = ?1")?;
            let rows = stmt.query_map(params![repo_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?;
            for row in rows {
                let (rel_path, id, hash) = row?;
                existing.insert(rel_path, (id, hash));
            }
        }

        let incoming: HashMap<&str, &ResolvedFile> =
            files.iter().map(|f| (f.rel_path.as_str(), f)).collect();

        let mut new_paths: Vec<&ResolvedFile> = Vec::new();
        let mut changed_paths: Vec<&ResolvedFile> = Vec::new();
        let mut unchanged_paths: Vec<String> = Vec::new();
        for f in files {
            match existing.get(&f.rel_path) {
                None => new_paths.push(f),
                Some((_, hash)) if *hash != f.content_hash => changed_paths.push(f),
                Some(_) => unchanged_paths.push(f.rel_path.clone()),
            }
        }
        let deleted_paths: Vec<String> = if full_snapshot {
            existing
                .keys()
                .filter(|p| !incoming.contains_key(p.as_str()))
                .cloned()
                .collect()
        } else {
            Vec::new()
        };
        let files_new = new_paths.len();
        let files_changed = changed_paths.len();

        for rel_path in changed_paths
            .iter()
            .map(|f| &f.rel_path)
            .chain(deleted_paths.iter())
        {
            self.conn.execute(
                "DELETE FROM files WHERE repo_id = ?1 AND rel_path = ?2",
                params![repo_id, rel_path],
            )?;
        }

        let to_insert: Vec<&ResolvedFile> = new_paths.into_iter().chain(changed_paths).collect();

        let mut path_to_file_id: HashMap<String, i64> = HashMap::new();
        for f in &to_insert {
            let file_id = self.insert_file(repo_id, f)?;
            path_to_file_id.insert(f.rel_path.clone(), file_id);
        }

        let mut name_in_file_to_symbol_id: HashMap<(String, String), i64> = HashMap::new();
        if !unchanged_paths.is_empty() {
            let placeholders: Vec<String> = (0..unchanged_paths.len())
                .map(|i| format!("?{}", i + 2))
                .collect();
            let sql = format!(
                "SELECT name, file_rel_path, id FROM symbols WHERE repo_id = ?1 AND file_rel_path IN ({})",
                placeholders.join(",")
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = vec![Box::new(repo_id)];
            for p in &unchanged_paths {
                param_values.push(Box::new(p.clone()));
            }
            let params_ref: Vec<&dyn rusqlite::types::ToSql> =
                param_values.iter().map(|p| p.as_ref()).collect();
            let rows = stmt.query_map(params_ref.as_slice(), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?;
            for row in rows {
                let (name, file, id) = row?;
                name_in_file_to_symbol_id.insert((file, name), id);
            }
        }

        let mut symbols_extracted = 0usize;
        for f in &to_insert {
            let file_id = path_to_file_id[&f.rel_path];
            for sym in &f.symbols {
                symbols_extracted += self.insert_resolved_symbol_tree(
                    file_id,
                    repo_id,
                    &f.rel_path,
                    sym,
                    None,
                    &mut name_in_file_to_symbol_id,
                )?;
            }
        }

        let mut references_found = 0usize;
        let mut references_resolved = 0usize;
        for f in &to_insert {
            let file_id = path_to_file_id[&f.rel_path];
            for r in &f.references {
                references_found += 1;
                let target_symbol_id = r.target_symbol_file.as_ref().and_then(|target_file| {
                    name_in_file_to_symbol_id
                        .get(&(target_file.clone(), r.to_name.clone()))
                        .copied()
                });
                let target_file_path = r
                    .target_file_path
                    .clone()
                    .or_else(|| r.target_symbol_file.clone());
                if target_symbol_id.is_some() || target_file_path.is_some() {
                    references_resolved += 1;
                }

                let from_symbol_id = r.from_symbol_name.as_ref().and_then(|name| {
                    name_in_file_to_symbol_id
                        .get(&(f.rel_path.clone(), name.clone()))
                        .copied()
                });

                self.conn.execute(
                    "INSERT INTO refs (uuid, file_id, repo_id, from_symbol_id, to_name, target_symbol_id, target_file_path, ref_kind, line, column_number, metadata)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                    params![
                        Uuid::new_v4().to_string(),
                        file_id,
                        repo_id,
                        from_symbol_id,
                        r.to_name,
                        target_symbol_id,
                        target_file_path,
                        r.ref_kind.as_str(),
                        r.line as i64,
                        r.column as i64,
                        r.import_source.as_ref().map(|s| format!(r#"{{"importSource":{s:?}}}"#)).unwrap_or_else(|| "{}".to_string()),
                    ],
                )?;
            }
        }

        self.conn.execute(
            "UPDATE repositories SET last_indexed_at = datetime('now') WHERE id = ?1",
            params![repo_id],
        )?;

        Ok(PipelineStats {
            files_indexed: files.len(),
            files_new,
            files_changed,
            files_unchanged: unchanged_paths.len(),
            files_deleted: deleted_paths.len(),
            symbols_extracted,
            references_found,
            references_resolved,
            duration_ms: 0,
        })
    }

    /// Deletes file rows (and their symbols/refs, via cascade) for paths no
    /// longer present on disk — the watcher's remove-event path, outside a
    /// full `persist_index_run`.
    pub fn delete_files_by_rel_paths(&self, repo_id: i64, rel_paths: &[String]) -> Result<usize> {
        self.begin_transaction()?;
        let result = (|| -> Result<usize> {
            let mut deleted = 0usize;
            for rel_path in rel_paths {
                deleted += self.conn.execute(
                    "DELETE FROM files WHERE repo_id = ?1 AND rel_path = ?2",
                    params![repo_id, rel_path],
                )?;
            }
            Ok(deleted)
        })();
        match result {
            Ok(n) => {
                self.commit()?;
                Ok(n)
            }
            Err(e) => {
                self.rollback()?;
                Err(e)
            }
        }
    }

    fn insert_file(&self, repo_id: i64, f: &ResolvedFile) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO files (uuid, repo_id, rel_path, content, language, size_bytes, content_hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                Uuid::new_v4().to_string(),
                repo_id,
                f.rel_path,
                f.content,
                f.language,
                f.size_bytes as i64,
                f.content_hash,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn insert_resolved_symbol_tree(
        &self,
        file_id: i64,
        repo_id: i64,
        file_rel_path: &str,
        sym: &crate::indexer::ExtractedSymbol,
        parent_id: Option<i64>,
        name_in_file_to_symbol_id: &mut HashMap<(String, String), i64>,
    ) -> Result<usize> {
        let name_tokens = split_code_identifier(&sym.name);
        self.conn.execute(
            "INSERT INTO symbols (uuid, file_id, repo_id, file_rel_path, parent_symbol_id, name, name_tokens, kind, start_line, end_line, signature, doc_comment)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                Uuid::new_v4().to_string(),
                file_id,
                repo_id,
                file_rel_path,
                parent_id,
                sym.name,
                name_tokens,
                sym.kind.db_kind(),
                sym.start_line as i64,
                sym.end_line as i64,
                sym.signature,
                sym.doc_comment,
            ],
        )?;
        let sym_id = self.conn.last_insert_rowid();
        name_in_file_to_symbol_id
            .entry((file_rel_path.to_string(), sym.name.clone()))
            .or_insert(sym_id);

        let mut count = 1;
        for child in &sym.children {
            count += self.insert_resolved_symbol_tree(
                file_id,
                repo_id,
                file_rel_path,
                child,
                Some(sym_id),
                name_in_file_to_symbol_id,
            )?;
        }
        Ok(count)
    }

    // ── Query operations ──

    pub fn get_overview(&self, repo_path: &str) -> Result<OverviewData> {
        let repo_id = self.repo_id_for_path(repo_path)?;

        let repo_name = repo_path
            .rsplit('/')
            .next()
            .unwrap_or(repo_path)
            .to_string();

        let mut stmt = self.conn.prepare(
            "SELECT language, COUNT(*) FROM files WHERE repo_id = ?1 GROUP BY language ORDER BY COUNT(*) DESC",
        )?;
        let languages: Vec<(String, i64)> = stmt
            .query_map(params![repo_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = self.conn.prepare(
            "SELECT
                CASE
                    WHEN INSTR(rel_path, '/') > 0 THEN SUBSTR(rel_path, 1, INSTR(rel_path, '/'))
                    ELSE './'
                END as dir,
                COUNT(DISTINCT f.id) as file_count,
                COUNT(s.id) as sym_count
             FROM files f
             LEFT JOIN symbols s ON s.file_id = f.id
             WHERE f.repo_id = ?1
             GROUP BY dir
             ORDER BY sym_count DESC
             LIMIT 20",
        )?;
        let modules: Vec<ModuleInfo> = stmt
            .query_map(params![repo_id], |row| {
                Ok(ModuleInfo {
                    path: row.get(0)?,
                    file_count: row.get(1)?,
                    symbol_count: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let top_types = self.query_symbols_where(
            repo_id,
            "kind",
            &["class", "interface", "enum"],
            "ORDER BY (end_line - start_line) DESC",
            10,
        )?;

        let entry_points =
            self.query_symbols_where(repo_id, "name", &["main", "index", "app", "server"], "", 5)?;

        Ok(OverviewData {
            repo_name,
            languages,
            modules,
            top_types,
            entry_points,
        })
    }

    fn query_symbols_where(
        &self,
        repo_id: i64,
        column: &str,
        values: &[&str],
        order_by: &str,
        limit: usize,
    ) -> Result<Vec<SymbolRecord>> {
        const VALID_COLUMNS: &[&str] =
            &["name", "kind", "file_rel_path", "signature", "doc_comment"];
        anyhow::ensure!(
            VALID_COLUMNS.contains(&column),
            "Invalid column for symbol query: {column}"
        );

        const VALID_ORDER_BY: &[&str] = &[
            "",
            "ORDER BY (end_line - start_line) DESC",
            "ORDER BY start_line",
            "ORDER BY name",
        ];
        anyhow::ensure!(
            VALID_ORDER_BY.contains(&order_by),
            "Invalid order_by clause: {order_by}"
        );

        let placeholders: Vec<String> = (0..values.len()).map(|i| format!("?{}", i + 2)).collect();
        let sql = format!(
            "SELECT id, uuid, name, kind, signature, doc_comment, start_line, end_line, file_rel_path, parent_symbol_id
             FROM symbols WHERE repo_id = ?1 AND {column} IN ({})
             {order_by} LIMIT {limit}",
            placeholders.join(","),
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = vec![Box::new(repo_id)];
        for v in values {
            param_values.push(Box::new(v.to_string()));
        }
        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let rows = stmt.query_map(params_ref.as_slice(), SymbolRecord::from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn get_file_symbols(&self, repo_path: &str, file: &str) -> Result<Vec<SymbolRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT s.id, s.uuid, s.name, s.kind, s.signature, s.doc_comment, s.start_line, s.end_line, s.file_rel_path, s.parent_symbol_id
             FROM symbols s
             JOIN repositories r ON s.repo_id = r.id
             WHERE r.abs_path = ?1 AND s.file_rel_path = ?2
             ORDER BY s.start_line",
        )?;
        let rows = stmt.query_map(params![repo_path, file], SymbolRecord::from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn get_symbol_detail(&self, repo_path: &str, symbol_id: i64) -> Result<SymbolRecord> {
        self.conn.query_row(
            "SELECT s.id, s.uuid, s.name, s.kind, s.signature, s.doc_comment, s.start_line, s.end_line, s.file_rel_path, s.parent_symbol_id
             FROM symbols s
             JOIN repositories r ON s.repo_id = r.id
             WHERE r.abs_path = ?1 AND s.id = ?2",
            params![repo_path, symbol_id],
            SymbolRecord::from_row,
        ).context("Symbol not found")
    }

    /// FTS search over the `symbols` scope (§4.7.1).
    pub fn search_symbols(
        &self,
        repo_path: Option<&str>,
        fts_query: &str,
        symbol_kinds: &[String],
        exported_only: bool,
        limit: usize,
    ) -> Result<Vec<SymbolSearchHit>> {
        let _ = exported_only; // no export-visibility column tracked yet; accepted and ignored
        let mut sql = String::from(
            "SELECT s.id, s.uuid, s.name, s.kind, s.file_rel_path, s.signature, s.doc_comment, s.start_line, s.end_line, fts.rank
             FROM fts_symbols fts
             JOIN symbols s ON s.id = fts.rowid
             JOIN repositories r ON s.repo_id = r.id
             WHERE fts_symbols MATCH ?1",
        );
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> =
            vec![Box::new(fts_query.to_string())];

        if let Some(path) = repo_path {
            sql.push_str(&format!(" AND r.abs_path = ?{}", param_values.len() + 1));
            param_values.push(Box::new(path.to_string()));
        }
        if !symbol_kinds.is_empty() {
            let placeholders: Vec<String> = symbol_kinds
                .iter()
                .enumerate()
                .map(|(i, _)| format!("?{}", param_values.len() + i + 1))
                .collect();
            sql.push_str(&format!(" AND s.kind IN ({})", placeholders.join(",")));
            for k in symbol_kinds {
                param_values.push(Box::new(k.clone()));
            }
        }
        sql.push_str(&format!(" ORDER BY fts.rank LIMIT {limit}"));

        let mut stmt = self.conn.prepare(&sql)?;
        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let rows = stmt.query_map(params_ref.as_slice(), |row| {
            Ok(SymbolSearchHit {
                id: row.get(0)?,
                uuid: row.get(1)?,
                name: row.get(2)?,
                kind: row.get(3)?,
                file_rel_path: row.get(4)?,
                signature: row.get(5)?,
                doc_comment: row.get(6)?,
                start_line: row.get(7)?,
                end_line: row.get(8)?,
                rank: row.get(9)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// FTS search over the `code` scope (full file content).
    pub fn search_code(
        &self,
        repo_path: Option<&str>,
        fts_query: &str,
        limit: usize,
    ) -> Result<Vec<CodeSearchHit>> {
        let mut sql = String::from(
            "SELECT f.rel_path, fts.rank, 1
             FROM fts_files fts
             JOIN files f ON f.id = fts.rowid
             JOIN repositories r ON f.repo_id = r.id
             WHERE fts_files MATCH ?1",
        );
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> =
            vec![Box::new(fts_query.to_string())];
        if let Some(path) = repo_path {
            sql.push_str(&format!(" AND r.abs_path = ?{}", param_values.len() + 1));
            param_values.push(Box::new(path.to_string()));
        }
        sql.push_str(&format!(" ORDER BY fts.rank LIMIT {limit}"));

        let mut stmt = self.conn.prepare(&sql)?;
        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let rows = stmt.query_map(params_ref.as_slice(), |row| {
            Ok(CodeSearchHit {
                rel_path: row.get(0)?,
                rank: row.get(1)?,
                match_count: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn get_file_content(&self, repo_path: &str, rel_path: &str) -> Result<String> {
        Ok(self.conn.query_row(
            "SELECT f.content FROM files f JOIN repositories r ON f.repo_id = r.id
             WHERE r.abs_path = ?1 AND f.rel_path = ?2",
            params![repo_path, rel_path],
            |row| row.get(0),
        )?)
    }

    fn search_memory_table(
        &self,
        fts_table: &str,
        repo_path: Option<&str>,
        fts_query: &str,
        limit: usize,
    ) -> Result<Vec<MemoryHit>> {
        let base_table = fts_table.trim_start_matches("fts_");
        let mut sql = format!(
            "SELECT m.uuid, m.title, m.content, fts.rank
             FROM {fts_table} fts
             JOIN {base_table} m ON m.id = fts.rowid"
        );
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        if let Some(path) = repo_path {
            sql.push_str(" JOIN repositories r ON m.repo_id = r.id");
            sql.push_str(&format!(" WHERE {fts_table} MATCH ?1 AND r.abs_path = ?2"));
            param_values.push(Box::new(fts_query.to_string()));
            param_values.push(Box::new(path.to_string()));
        } else {
            sql.push_str(&format!(" WHERE {fts_table} MATCH ?1"));
            param_values.push(Box::new(fts_query.to_string()));
        }
        sql.push_str(&format!(" ORDER BY fts.rank LIMIT {limit}"));

        let mut stmt = self.conn.prepare(&sql)?;
        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let rows = stmt.query_map(params_ref.as_slice(), |row| {
            Ok(MemoryHit {
                uuid: row.get(0)?,
                title: row.get(1)?,
                content: row.get(2)?,
                rank: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn search_decisions(
        &self,
        repo_path: Option<&str>,
        fts_query: &str,
        limit: usize,
    ) -> Result<Vec<MemoryHit>> {
        self.search_memory_table("fts_decisions", repo_path, fts_query, limit)
    }

    pub fn search_failures(
        &self,
        repo_path: Option<&str>,
        fts_query: &str,
        limit: usize,
    ) -> Result<Vec<MemoryHit>> {
        self.search_memory_table("fts_failures", repo_path, fts_query, limit)
    }

    pub fn search_patterns(
        &self,
        repo_path: Option<&str>,
        fts_query: &str,
        limit: usize,
    ) -> Result<Vec<MemoryHit>> {
        self.search_memory_table("fts_patterns", repo_path, fts_query, limit)
    }

    // ── Memory entity writes ──

    pub fn record_decision(
        &self,
        repo_id: Option<i64>,
        title: &str,
        content: &str,
        tags: &[String],
    ) -> Result<String> {
        let uuid = Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO decisions (uuid, repo_id, title, content, tags) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![uuid, repo_id, title, content, serde_json::to_string(tags)?],
        )?;
        Ok(uuid)
    }

    pub fn record_failure(
        &self,
        repo_id: Option<i64>,
        title: &str,
        content: &str,
        tags: &[String],
    ) -> Result<String> {
        let uuid = Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO failures (uuid, repo_id, title, content, tags) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![uuid, repo_id, title, content, serde_json::to_string(tags)?],
        )?;
        Ok(uuid)
    }

    pub fn record_insight(
        &self,
        repo_id: Option<i64>,
        title: &str,
        content: &str,
        tags: &[String],
    ) -> Result<String> {
        let uuid = Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO patterns (uuid, repo_id, entry_kind, title, content, tags) VALUES (?1, ?2, 'insight', ?3, ?4, ?5)",
            params![uuid, repo_id, title, content, serde_json::to_string(tags)?],
        )?;
        Ok(uuid)
    }

    // ── Reference / dependency queries ──

    pub fn get_references(&self, repo_path: &str, symbol_id: i64) -> Result<Vec<RefRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT r.from_symbol_id, s.name, s.file_rel_path, r.target_symbol_id, r.to_name, r.target_file_path, r.ref_kind, r.line, r.column_number
             FROM refs r
             LEFT JOIN symbols s ON s.id = r.from_symbol_id
             JOIN repositories repo ON r.repo_id = repo.id
             WHERE repo.abs_path = ?1 AND r.target_symbol_id = ?2
             ORDER BY s.file_rel_path, r.line",
        )?;
        let rows = stmt.query_map(params![repo_path, symbol_id], |row| {
            Ok(RefRecord {
                from_symbol_id: row.get(0)?,
                from_name: row.get(1)?,
                from_file: row.get(2)?,
                to_symbol_id: row.get(3)?,
                to_name: row.get(4)?,
                target_file_path: row.get(5)?,
                ref_kind: row.get(6)?,
                line: row.get(7)?,
                column_number: row.get(8)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// All references matching `symbol_name` across the repository, for
    /// `find_usages` (§4.7.3).
    pub fn get_refs_by_name(&self, repo_path: &str, symbol_name: &str) -> Result<Vec<RefRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT r.from_symbol_id, s.name, f.rel_path, r.target_symbol_id, r.to_name, r.target_file_path, r.ref_kind, r.line, r.column_number
             FROM refs r
             JOIN files f ON f.id = r.file_id
             LEFT JOIN symbols s ON s.id = r.from_symbol_id
             JOIN repositories repo ON r.repo_id = repo.id
             WHERE repo.abs_path = ?1 AND r.to_name = ?2
             ORDER BY f.rel_path, r.line",
        )?;
        let rows = stmt.query_map(params![repo_path, symbol_name], |row| {
            Ok(RefRecord {
                from_symbol_id: row.get(0)?,
                from_name: row.get(1)?,
                from_file: row.get(2)?,
                to_symbol_id: row.get(3)?,
                to_name: row.get(4)?,
                target_file_path: row.get(5)?,
                ref_kind: row.get(6)?,
                line: row.get(7)?,
                column_number: row.get(8)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// All definition sites (symbols) named `symbol_name`.
    pub fn get_symbol_definitions(
        &self,
        repo_path: &str,
        symbol_name: &str,
    ) -> Result<Vec<SymbolRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT s.id, s.uuid, s.name, s.kind, s.signature, s.doc_comment, s.start_line, s.end_line, s.file_rel_path, s.parent_symbol_id
             FROM symbols s
             JOIN repositories r ON s.repo_id = r.id
             WHERE r.abs_path = ?1 AND s.name = ?2
             ORDER BY s.file_rel_path",
        )?;
        let rows = stmt.query_map(params![repo_path, symbol_name], SymbolRecord::from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Direct import-like edges in the `import_source → target_file_path`
    /// direction, i.e. `dependencies(subject)` at depth 1 (§4.7.2).
    pub fn direct_dependencies(&self, repo_path: &str, file_path: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT r.target_file_path
             FROM refs r
             JOIN files f ON f.id = r.file_id
             JOIN repositories repo ON r.repo_id = repo.id
             WHERE repo.abs_path = ?1 AND f.rel_path = ?2
               AND r.ref_kind IN ('import', 're_export', 'export_all', 'dynamic_import')
               AND r.target_file_path IS NOT NULL",
        )?;
        let rows = stmt.query_map(params![repo_path, file_path], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Direct `dependents(subject)` at depth 1: files whose refs target
    /// `file_path`.
    pub fn direct_dependents(&self, repo_path: &str, file_path: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT f.rel_path
             FROM refs r
             JOIN files f ON f.id = r.file_id
             JOIN repositories repo ON r.repo_id = repo.id
             WHERE repo.abs_path = ?1 AND r.target_file_path = ?2
               AND r.ref_kind IN ('import', 're_export', 'export_all', 'dynamic_import')",
        )?;
        let rows = stmt.query_map(params![repo_path, file_path], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn list_recent_files(
        &self,
        repo_path: Option<&str>,
        limit: usize,
    ) -> Result<Vec<FileRecord>> {
        let mut sql = String::from(
            "SELECT f.id, f.uuid, f.rel_path, f.content_hash, f.language, f.indexed_at
             FROM files f JOIN repositories r ON f.repo_id = r.id",
        );
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        if let Some(path) = repo_path {
            sql.push_str(" WHERE r.abs_path = ?1");
            param_values.push(Box::new(path.to_string()));
        }
        sql.push_str(&format!(" ORDER BY f.indexed_at DESC LIMIT {limit}"));

        let mut stmt = self.conn.prepare(&sql)?;
        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let rows = stmt.query_map(params_ref.as_slice(), |row| {
            Ok(FileRecord {
                id: row.get(0)?,
                uuid: row.get(1)?,
                rel_path: row.get(2)?,
                content_hash: row.get(3)?,
                language: row.get(4)?,
                indexed_at: row.get(5)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn get_index_status(&self, repo_path: &str) -> Result<IndexStatus> {
        let (repo_id, indexed_at): (i64, Option<String>) = self
            .conn
            .query_row(
                "SELECT id, last_indexed_at FROM repositories WHERE abs_path = ?1",
                params![repo_path],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .context("Repository not indexed")?;

        let total_files: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM files WHERE repo_id = ?1",
            params![repo_id],
            |row| row.get(0),
        )?;
        let total_symbols: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM symbols WHERE repo_id = ?1",
            params![repo_id],
            |row| row.get(0),
        )?;
        let total_refs: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM refs WHERE repo_id = ?1",
            params![repo_id],
            |row| row.get(0),
        )?;

        let mut stmt = self
            .conn
            .prepare("SELECT language, COUNT(*) FROM files WHERE repo_id = ?1 GROUP BY language")?;
        let languages: Vec<(String, i64)> = stmt
            .query_map(params![repo_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(IndexStatus {
            repo_path: repo_path.to_string(),
            indexed_at,
            total_files,
            total_symbols,
            total_refs,
            languages,
        })
    }

    /// Aggregate row counts per entity, for `get_index_statistics`.
    pub fn entity_counts(&self) -> Result<HashMap<String, i64>> {
        let mut counts = HashMap::new();
        for table in [
            "repositories",
            "files",
            "symbols",
            "refs",
            "decisions",
            "failures",
            "patterns",
        ] {
            let n: i64 =
                self.conn
                    .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                        row.get(0)
                    })?;
            counts.insert(table.to_string(), n);
        }
        Ok(counts)
    }

    // ── Sync export/import ──

    pub fn export_table_jsonl(&self, table: &str) -> Result<Vec<String>> {
        let columns: &[&str] = match table {
            "repositories" => &[
                "uuid",
                "full_name",
                "name",
                "abs_path",
                "git_url",
                "default_branch",
                "last_indexed_at",
                "created_at",
                "metadata",
            ],
            "files" => &[
                "uuid",
                "rel_path",
                "language",
                "size_bytes",
                "content_hash",
                "indexed_at",
            ],
            "symbols" => &[
                "uuid",
                "name",
                "kind",
                "file_rel_path",
                "start_line",
                "end_line",
                "signature",
                "doc_comment",
            ],
            "refs" => &[
                "uuid",
                "to_name",
                "target_file_path",
                "ref_kind",
                "line",
                "column_number",
            ],
            "decisions" => &["uuid", "title", "content", "status", "tags", "created_at"],
            "failures" => &["uuid", "title", "content", "tags", "created_at"],
            "patterns" => &[
                "uuid",
                "entry_kind",
                "title",
                "content",
                "tags",
                "created_at",
            ],
            other => anyhow::bail!("unknown sync table: {other}"),
        };
        let sql = format!("SELECT {} FROM {table}", columns.join(", "));
        let mut stmt = self.conn.prepare(&sql)?;
        let column_count = columns.len();
        let rows = stmt.query_map([], |row| {
            let mut obj = serde_json::Map::new();
            for (i, col) in columns.iter().enumerate() {
                let value: rusqlite::types::Value = row.get(i)?;
                obj.insert((*col).to_string(), sqlite_value_to_json(value));
            }
            let _ = column_count;
            Ok(serde_json::Value::Object(obj).to_string())
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Transactional import: the whole file is staged in memory first, so a
    /// malformed record at line N rejects the entire import before any row
    /// is written, backing the `sync_import` tool.
    pub fn import_table_jsonl(
        &self,
        table: &str,
        repo_id: Option<i64>,
        lines: &[String],
    ) -> Result<usize> {
        let mut records = Vec::with_capacity(lines.len());
        for (i, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let value: serde_json::Value = serde_json::from_str(line)
                .with_context(|| format!("malformed record at line {} in {table}.jsonl", i + 1))?;
            records.push(value);
        }

        self.begin_transaction()?;
        let result = (|| -> Result<usize> {
            for record in &records {
                self.import_one_record(table, repo_id, record)?;
            }
            Ok(records.len())
        })();

        match result {
            Ok(n) => {
                self.commit()?;
                Ok(n)
            }
            Err(e) => {
                self.rollback()?;
                Err(e)
            }
        }
    }

    fn import_one_record(
        &self,
        table: &str,
        repo_id: Option<i64>,
        record: &serde_json::Value,
    ) -> Result<()> {
        let get = |key: &str| {
            record
                .get(key)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };
        match table {
            "decisions" => {
                self.conn.execute(
                    "INSERT INTO decisions (uuid, repo_id, title, content, status, tags) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT(uuid) DO NOTHING",
                    params![get("uuid"), repo_id, get("title"), get("content"), get("status"), get("tags")],
                )?;
            }
            "failures" => {
                self.conn.execute(
                    "INSERT INTO failures (uuid, repo_id, title, content, tags) VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(uuid) DO NOTHING",
                    params![get("uuid"), repo_id, get("title"), get("content"), get("tags")],
                )?;
            }
            "patterns" => {
                self.conn.execute(
                    "INSERT INTO patterns (uuid, repo_id, entry_kind, title, content, tags) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT(uuid) DO NOTHING",
                    params![get("uuid"), repo_id, get("entry_kind"), get("title"), get("content"), get("tags")],
                )?;
            }
            other => anyhow::bail!("unsupported sync import table: {other}"),
        }
        Ok(())
    }
}

fn sqlite_value_to_json(value: rusqlite::types::Value) -> serde_json::Value {
    match value {
        rusqlite::types::Value::Null => serde_json::Value::Null,
        rusqlite::types::Value::Integer(i) => serde_json::Value::from(i),
        rusqlite::types::Value::Real(f) => serde_json::Value::from(f),
        rusqlite::types::Value::Text(s) => serde_json::Value::from(s),
        rusqlite::types::Value::Blob(b) => serde_json::Value::from(hex::encode(b)),
    }
}
