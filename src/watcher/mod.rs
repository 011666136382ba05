//! Background filesystem watcher (§10). Watches each indexed repository for
//! changes, debounces bursts of events, and folds them into a single
//! `Indexer::update_files` pass, gated through the same `IndexingTracker`
//! lock that guards tool-triggered runs so the two never race.

pub mod debouncer;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ignore::gitignore::Gitignore;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::ConfigCache;
use crate::indexer::Indexer;
use crate::indexer::pipeline::build_ignore_set;
use crate::mcp::indexing_tracker::IndexingTracker;
use crate::storage::{self, SqliteStorage};
use debouncer::{Debouncer, FileChangeKind};

/// Directory components never worth watching or re-indexing over.
const IGNORED_COMPONENTS: &[&str] = &[
    ".git",
    "node_modules",
    "target",
    "__pycache__",
    ".venv",
    "dist",
    "build",
];

enum WatcherCommand {
    Watch {
        repo_path: String,
    },
    Unwatch {
        repo_path: String,
    },
    #[allow(dead_code)]
    Shutdown,
}

/// Filesystem event bridged from notify's OS thread to the tokio event loop.
struct FsEvent {
    repo_path: String,
    rel_path: String,
    kind: FileChangeKind,
}

/// Handle for the MCP server (and its tool handlers) to talk to the watcher.
#[derive(Clone)]
pub struct WatcherHandle {
    cmd_tx: mpsc::Sender<WatcherCommand>,
}

impl WatcherHandle {
    /// Start watching a newly-indexed repo.
    pub async fn watch_repo(&self, path: &str) {
        let _ = self
            .cmd_tx
            .send(WatcherCommand::Watch {
                repo_path: path.to_string(),
            })
            .await;
    }

    /// Stop watching a repo (e.g. after its index was deleted).
    #[allow(dead_code)]
    pub async fn unwatch_repo(&self, path: &str) {
        let _ = self
            .cmd_tx
            .send(WatcherCommand::Unwatch {
                repo_path: path.to_string(),
            })
            .await;
    }

    #[allow(dead_code)]
    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(WatcherCommand::Shutdown).await;
    }
}

/// Per-repo OS watch plus the filters its callback needs.
struct RepoWatcher {
    /// Dropping this stops the OS-level watch.
    _watcher: RecommendedWatcher,
    ignore_patterns: Vec<String>,
    gitignore: Option<Gitignore>,
}

/// Starts the watcher subsystem: re-syncs every already-indexed repo that
/// still exists on disk, then watches all of them for further changes.
pub async fn start(
    config_cache: Arc<ConfigCache>,
    indexing_tracker: Arc<IndexingTracker>,
) -> WatcherHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel::<WatcherCommand>(64);
    let (fs_tx, fs_rx) = mpsc::channel::<FsEvent>(512);

    let repos = storage::list_indexed_repos().unwrap_or_default();
    let mut watchers: HashMap<String, RepoWatcher> = HashMap::new();

    for repo in &repos {
        let repo_path = repo.abs_path.clone();
        if !Path::new(&repo_path).is_dir() {
            tracing::info!(path = %repo_path, "Skipping missing repo directory");
            continue;
        }

        if let Some(handle) = indexing_tracker.start_indexing(&repo_path) {
            let config = config_cache.get(&repo_path);
            let path = repo_path.clone();
            let result = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
                let storage = SqliteStorage::open(&path)?;
                let repo_id = storage.repo_id_for_path(&path)?;
                let indexer = Indexer::new(path.clone(), config);
                indexer.run(&storage, repo_id)
            })
            .await;
            handle.complete();

            match result {
                Ok(Ok(stats)) => {
                    tracing::info!(
                        path = %repo_path,
                        files = stats.files_changed + stats.files_new,
                        duration_ms = stats.duration_ms,
                        "Startup resync complete"
                    );
                }
                Ok(Err(e)) => {
                    tracing::warn!(path = %repo_path, error = %e, "Startup resync failed")
                }
                Err(e) => {
                    tracing::warn!(path = %repo_path, error = %e, "Startup resync task panicked")
                }
            }
        }

        if let Some(rw) = create_repo_watcher(&repo_path, &config_cache, &fs_tx) {
            watchers.insert(repo_path, rw);
        }
    }

    tokio::spawn(event_loop(
        config_cache,
        indexing_tracker,
        cmd_rx,
        fs_tx,
        fs_rx,
        watchers,
    ));

    WatcherHandle { cmd_tx }
}

fn load_gitignore(repo_path: &str) -> Option<Gitignore> {
    let path = Path::new(repo_path).join(".gitignore");
    if !path.exists() {
        return None;
    }
    let (gi, err) = Gitignore::new(&path);
    if let Some(e) = err {
        tracing::debug!(path = %repo_path, error = %e, "Error parsing .gitignore");
    }
    Some(gi)
}

fn is_ignored_component(name: &str) -> bool {
    IGNORED_COMPONENTS.contains(&name)
}

fn create_repo_watcher(
    repo_path: &str,
    config_cache: &ConfigCache,
    fs_tx: &mpsc::Sender<FsEvent>,
) -> Option<RepoWatcher> {
    let config = config_cache.get(repo_path);
    let ignore_patterns = config.indexer.ignore.clone();
    let gitignore = load_gitignore(repo_path);
    let repo_path_owned = repo_path.to_string();
    let repo_path_buf = PathBuf::from(repo_path);
    let callback_gitignore = load_gitignore(repo_path);
    let tx = fs_tx.clone();

    let watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        let event = match res {
            Ok(e) => e,
            Err(e) => {
                tracing::debug!(error = %e, "Filesystem watcher error");
                return;
            }
        };

        let kind = match event.kind {
            EventKind::Create(_) | EventKind::Modify(_) => FileChangeKind::Modified,
            EventKind::Remove(_) => FileChangeKind::Deleted,
            _ => return,
        };

        for path in &event.paths {
            let Ok(rel_path) = path.strip_prefix(&repo_path_buf) else {
                continue;
            };
            let Some(rel_str) = rel_path.to_str() else {
                continue;
            };

            if rel_path.components().any(|c| {
                matches!(c, std::path::Component::Normal(name)
                    if name.to_str().map(is_ignored_component).unwrap_or(false))
            }) {
                continue;
            }

            if let Some(ref gi) = callback_gitignore {
                if gi.matched(rel_path, path.is_dir()).is_ignore() {
                    continue;
                }
            }

            let _ = tx.try_send(FsEvent {
                repo_path: repo_path_owned.clone(),
                rel_path: rel_str.to_string(),
                kind,
            });
        }
    });

    match watcher {
        Ok(mut w) => {
            if let Err(e) = w.watch(Path::new(repo_path), RecursiveMode::Recursive) {
                tracing::warn!(path = %repo_path, error = %e, "Failed to watch repo");
                return None;
            }
            tracing::info!(path = %repo_path, "Watching for file changes");
            Some(RepoWatcher {
                _watcher: w,
                ignore_patterns,
                gitignore,
            })
        }
        Err(e) => {
            tracing::warn!(path = %repo_path, error = %e, "Failed to create watcher");
            None
        }
    }
}

async fn event_loop(
    config_cache: Arc<ConfigCache>,
    indexing_tracker: Arc<IndexingTracker>,
    mut cmd_rx: mpsc::Receiver<WatcherCommand>,
    fs_tx: mpsc::Sender<FsEvent>,
    mut fs_rx: mpsc::Receiver<FsEvent>,
    mut watchers: HashMap<String, RepoWatcher>,
) {
    let mut debouncer = Debouncer::new();

    loop {
        let sleep_duration = debouncer
            .time_until_flush()
            .unwrap_or(tokio::time::Duration::from_secs(3600));

        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(WatcherCommand::Watch { repo_path }) => {
                        if !watchers.contains_key(&repo_path) {
                            if let Some(rw) = create_repo_watcher(&repo_path, &config_cache, &fs_tx) {
                                watchers.insert(repo_path, rw);
                            }
                        }
                    }
                    Some(WatcherCommand::Unwatch { repo_path }) => {
                        watchers.remove(&repo_path);
                        tracing::info!(path = %repo_path, "Stopped watching repo");
                    }
                    Some(WatcherCommand::Shutdown) | None => {
                        tracing::info!("Watcher shutting down");
                        break;
                    }
                }
            }

            event = fs_rx.recv() => {
                if let Some(fs_event) = event {
                    if let Some(rw) = watchers.get(&fs_event.repo_path) {
                        let glob_ignore = build_ignore_set(&rw.ignore_patterns);
                        if glob_ignore.is_match(&fs_event.rel_path) {
                            continue;
                        }
                        if let Some(ref gi) = rw.gitignore {
                            if gi.matched(Path::new(&fs_event.rel_path), false).is_ignore() {
                                continue;
                            }
                        }
                    }

                    tracing::debug!(
                        repo = %fs_event.repo_path,
                        file = %fs_event.rel_path,
                        kind = ?fs_event.kind,
                        "File change detected"
                    );
                    debouncer.record(&fs_event.repo_path, &fs_event.rel_path, fs_event.kind);
                }
            }

            _ = tokio::time::sleep(sleep_duration) => {
                if debouncer.is_ready() {
                    for (repo_path, changes) in debouncer.flush() {
                        if !watchers.contains_key(&repo_path) {
                            continue;
                        }

                        let Some(handle) = indexing_tracker.start_indexing(&repo_path) else {
                            tracing::debug!(repo = %repo_path, "Skipping debounced flush, index already in progress");
                            continue;
                        };

                        let config = config_cache.get(&repo_path);
                        let paths: Vec<PathBuf> = changes
                            .keys()
                            .map(|rel| Path::new(&repo_path).join(rel))
                            .collect();
                        let repo = repo_path.clone();
                        let total = paths.len();

                        tokio::spawn(async move {
                            let result = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
                                let storage = SqliteStorage::open(&repo)?;
                                let repo_id = storage.repo_id_for_path(&repo)?;
                                let indexer = Indexer::new(repo.clone(), config);
                                indexer.update_files(&storage, repo_id, &paths)
                            })
                            .await;

                            match result {
                                Ok(Ok(stats)) => {
                                    tracing::info!(
                                        changed = total,
                                        files = stats.files_changed + stats.files_new,
                                        deleted = stats.files_deleted,
                                        duration_ms = stats.duration_ms,
                                        "Background reindex complete"
                                    );
                                }
                                Ok(Err(e)) => tracing::warn!(error = %e, "Background reindex failed"),
                                Err(e) => tracing::warn!(error = %e, "Background reindex task panicked"),
                            }
                            handle.complete();
                        });
                    }
                }
            }
        }
    }
}
