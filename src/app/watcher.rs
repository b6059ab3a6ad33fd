// LogMedic - app/watcher.rs
//
// Live follow of service log files, publishing every new line as a
// `LogEntry` event on the bus.
//
// Architecture:
//   - `LogWatcher` owns a registry of active watches, one background thread
//     per source. Each watch has an `Arc<AtomicBool>` cancel flag and a wake
//     channel.
//   - A `notify` watcher on the file's parent directory pushes a wake-up
//     into the channel whenever the directory changes. The thread blocks on
//     the channel with the poll interval as timeout, so it still polls when
//     native notifications are unavailable or missed.
//   - Lines are classified and published synchronously on the watch thread,
//     in file order.
//
// Follow semantics:
//   - The offset is seeded to end-of-file when the watch starts; history is
//     never replayed.
//   - A changed file identity (inode) means the path was rotated to a new
//     file: the new file is read from the start.
//   - A file shorter than the offset was truncated: the offset resets to 0.
//   - Per-tick I/O errors are logged and retried on the next tick.
//   - MAX_TAIL_READ_BYTES_PER_TICK caps a single read so cancel stays
//     responsive during large bursts.

use crate::app::bus::EventBus;
use crate::core::classify;
use crate::core::model::{Event, LogEntry, LogSource};
use crate::platform::config::AppConfig;
use crate::platform::fs::{self, file_identity};
use crate::platform::sources::SourcePathProvider;
use crate::util::constants::{
    LARAVEL_LOG_RELATIVE_PATH, MAX_TAIL_LINES, MAX_TAIL_PARTIAL_BYTES,
    MAX_TAIL_READ_BYTES_PER_TICK,
};
use crate::util::error::WatchError;
use chrono::Utc;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Provider keys in resolution order. The first key mapping to a source
/// whose file exists wins, so `php_fpm` is preferred over `php_error`.
const PROVIDER_KEYS: &[&str] = &["nginx_error", "nginx_access", "php_fpm", "php_error"];

/// Process-wide entry sequence, shared by every watch thread.
static ENTRY_SEQUENCE: AtomicU64 = AtomicU64::new(0);

// =============================================================================
// LogWatcher
// =============================================================================

/// Handle to a running watch thread.
struct ActiveWatch {
    path: PathBuf,
    cancel: Arc<AtomicBool>,
    wake: mpsc::Sender<()>,
    /// Dropping the notifier releases the native watch.
    _notifier: Option<RecommendedWatcher>,
}

/// Discovers log sources and follows them on background threads.
pub struct LogWatcher {
    bus: Arc<EventBus>,
    provider: Arc<dyn SourcePathProvider>,
    poll_interval: Duration,
    read_chunk_bytes: usize,
    watches: Mutex<HashMap<LogSource, ActiveWatch>>,
    /// Laravel project name -> project root.
    laravel_projects: Mutex<HashMap<String, PathBuf>>,
}

impl LogWatcher {
    pub fn new(
        bus: Arc<EventBus>,
        provider: Arc<dyn SourcePathProvider>,
        config: &AppConfig,
    ) -> Self {
        Self {
            bus,
            provider,
            poll_interval: config.poll_interval,
            read_chunk_bytes: config.read_chunk_bytes,
            watches: Mutex::new(HashMap::new()),
            laravel_projects: Mutex::new(HashMap::new()),
        }
    }

    /// Sources whose log file exists right now.
    ///
    /// The provider is consulted on every call, so files that appear or
    /// disappear are picked up without restarting.
    pub fn available_sources(&self) -> HashMap<LogSource, PathBuf> {
        let provided = self.provider.log_paths();
        let mut available = HashMap::new();

        for key in PROVIDER_KEYS {
            let (Some(source), Some(path)) = (LogSource::from_provider_key(key), provided.get(*key))
            else {
                continue;
            };
            if !available.contains_key(&source) && path.is_file() {
                available.insert(source, path.clone());
            }
        }

        let projects = self.laravel_projects.lock().unwrap_or_else(|p| p.into_inner());
        for (project, root) in projects.iter() {
            let path = root.join(LARAVEL_LOG_RELATIVE_PATH);
            if path.is_file() {
                available.insert(LogSource::laravel(project.clone()), path);
            }
        }

        tracing::debug!(count = available.len(), "Watcher: available sources");
        available
    }

    /// Begin following `source` from its current end. Idempotent.
    pub fn start_watching(&self, source: &LogSource) -> Result<(), WatchError> {
        let mut watches = self.watches.lock().unwrap_or_else(|p| p.into_inner());
        if watches.contains_key(source) {
            tracing::debug!(source = %source, "Watcher: already watching");
            return Ok(());
        }

        let path = self.resolve_path(source)?;
        let key = source.key();
        let tail_init = |reason: std::io::Error| WatchError::TailInit {
            key: key.clone(),
            path: path.clone(),
            reason,
        };

        // Opening up front surfaces permission problems to the caller rather
        // than as a stream of per-tick warnings.
        let meta = std::fs::File::open(&path)
            .and_then(|f| f.metadata())
            .map_err(tail_init)?;

        let (wake_tx, wake_rx) = mpsc::channel();
        let notifier = match spawn_notifier(&path, wake_tx.clone()) {
            Ok(n) => Some(n),
            Err(e) => {
                tracing::warn!(
                    source = %source,
                    error = %e,
                    "Watcher: native notifications unavailable, polling only"
                );
                None
            }
        };

        let cancel = Arc::new(AtomicBool::new(false));
        let mut follow = FollowState {
            source: source.clone(),
            path: path.clone(),
            offset: meta.len(),
            identity: file_identity(&meta),
            partial: Vec::new(),
            missing: false,
        };
        tracing::debug!(
            source = %source,
            file = %path.display(),
            offset = follow.offset,
            "Watcher: seeding initial offset"
        );

        let bus = Arc::clone(&self.bus);
        let thread_cancel = Arc::clone(&cancel);
        let poll_interval = self.poll_interval;
        std::thread::Builder::new()
            .name(format!("logmedic-watch-{key}"))
            .spawn(move || run_follow(&mut follow, &bus, &wake_rx, &thread_cancel, poll_interval))
            .map_err(tail_init)?;

        tracing::info!(source = %source, file = %path.display(), "Watcher: started");
        watches.insert(
            source.clone(),
            ActiveWatch {
                path,
                cancel,
                wake: wake_tx,
                _notifier: notifier,
            },
        );
        Ok(())
    }

    /// Stop following `source`. No-op if it is not watched.
    ///
    /// The thread finishes any publish in flight and exits; it is not joined.
    pub fn stop_watching(&self, source: &LogSource) {
        let removed = self
            .watches
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(source);
        if let Some(watch) = removed {
            cancel_watch(&watch);
            tracing::info!(source = %source, file = %watch.path.display(), "Watcher: stopped");
        }
    }

    /// Stop every active watch.
    pub fn stop_all(&self) {
        let drained: Vec<(LogSource, ActiveWatch)> = self
            .watches
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .drain()
            .collect();
        for (_, watch) in &drained {
            cancel_watch(watch);
        }
        if !drained.is_empty() {
            tracing::info!(count = drained.len(), "Watcher: all watches stopped");
        }
    }

    pub fn is_watching(&self, source: &LogSource) -> bool {
        self.watches
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .contains_key(source)
    }

    /// Currently watched sources, sorted by key.
    pub fn watched_sources(&self) -> Vec<LogSource> {
        let mut sources: Vec<LogSource> = self
            .watches
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .keys()
            .cloned()
            .collect();
        sources.sort();
        sources
    }

    /// The last `lines` non-empty lines of `source`, oldest first, as
    /// classified entries. Nothing is published.
    pub fn get_last_lines(&self, source: &LogSource, lines: usize) -> Result<Vec<LogEntry>, WatchError> {
        let path = self.resolve_path(source)?;
        let raw = fs::read_last_lines(&path, lines.min(MAX_TAIL_LINES), self.read_chunk_bytes)
            .map_err(|reason| WatchError::Io {
                path: path.clone(),
                reason,
            })?;
        Ok(raw.iter().map(|line| build_entry(source, line)).collect())
    }

    /// Register a Laravel project and follow its application log.
    ///
    /// The source is `laravel:<directory name>`; watching the same project
    /// twice is a no-op.
    pub fn watch_laravel_log(&self, project_path: &Path) -> Result<LogSource, WatchError> {
        let source = self.register_laravel_project(project_path)?;
        self.start_watching(&source)?;
        Ok(source)
    }

    /// Make a Laravel project resolvable as `laravel:<directory name>`
    /// without following it.
    ///
    /// The path is canonicalised first so `.` or `app/..` name the real
    /// directory; a path that cannot be canonicalised is used as given.
    pub fn register_laravel_project(&self, project_path: &Path) -> Result<LogSource, WatchError> {
        let root = std::fs::canonicalize(project_path)
            .unwrap_or_else(|_| project_path.to_path_buf());
        let Some(name) = root.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            return Err(WatchError::SourceNotFound {
                key: project_path.display().to_string(),
            });
        };
        tracing::debug!(project = %name, root = %root.display(), "Watcher: Laravel project registered");
        let source = LogSource::laravel(name.clone());
        self.laravel_projects
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(name, root);
        Ok(source)
    }

    /// Map a source to its log file, checking that the file exists.
    fn resolve_path(&self, source: &LogSource) -> Result<PathBuf, WatchError> {
        let candidates: Vec<PathBuf> = match source {
            LogSource::Laravel { project } => self
                .laravel_projects
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .get(project)
                .map(|root| vec![root.join(LARAVEL_LOG_RELATIVE_PATH)])
                .unwrap_or_default(),
            _ => {
                let provided = self.provider.log_paths();
                PROVIDER_KEYS
                    .iter()
                    .filter(|key| LogSource::from_provider_key(key).as_ref() == Some(source))
                    .filter_map(|key| provided.get(*key).cloned())
                    .collect()
            }
        };

        let Some(first) = candidates.first().cloned() else {
            return Err(WatchError::SourceNotFound { key: source.key() });
        };
        candidates
            .into_iter()
            .find(|path| path.is_file())
            .ok_or_else(|| WatchError::FileNotFound {
                key: source.key(),
                path: first,
            })
    }
}

impl Drop for LogWatcher {
    fn drop(&mut self) {
        self.stop_all();
    }
}

fn cancel_watch(watch: &ActiveWatch) {
    watch.cancel.store(true, Ordering::SeqCst);
    // The thread may already have exited; a closed channel is fine.
    let _ = watch.wake.send(());
}

/// Watch the parent directory of `path` and send a wake-up for every change
/// touching the file. Directory-level watching keeps working when the file
/// itself is replaced by rotation.
fn spawn_notifier(path: &Path, wake: mpsc::Sender<()>) -> notify::Result<RecommendedWatcher> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let file_name = path.file_name().map(|n| n.to_os_string());

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        if let Ok(event) = res {
            let relevant = event.paths.is_empty()
                || event
                    .paths
                    .iter()
                    .any(|p| p.file_name() == file_name.as_deref());
            if relevant {
                let _ = wake.send(());
            }
        }
    })?;
    watcher.watch(&dir, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

// =============================================================================
// Per-source follow state (private to the watch thread)
// =============================================================================

struct FollowState {
    source: LogSource,
    path: PathBuf,
    /// Byte position of the next unread byte.
    offset: u64,
    /// Identity of the file the offset refers to.
    identity: Option<u64>,
    /// Bytes after the last newline seen: an in-progress line. Kept undecoded
    /// so a character split across reads is never mangled.
    partial: Vec<u8>,
    /// Whether the last stat failed (suppresses repeated warnings).
    missing: bool,
}

impl FollowState {
    /// Consume new content and publish complete lines. Returns `true` when
    /// the read cap was hit and more bytes are already waiting.
    fn poll(&mut self, bus: &EventBus) -> bool {
        // ---------------------------------------------------------------------
        // 1. Stat the path.
        // ---------------------------------------------------------------------
        let meta = match std::fs::metadata(&self.path) {
            Ok(m) => {
                if self.missing {
                    tracing::info!(file = %self.path.display(), "Watcher: file is back");
                    self.missing = false;
                }
                m
            }
            Err(e) => {
                if !self.missing {
                    tracing::warn!(file = %self.path.display(), error = %e, "Watcher: stat error");
                    self.missing = true;
                }
                return false;
            }
        };

        // ---------------------------------------------------------------------
        // 2. Rotation / truncation.
        // ---------------------------------------------------------------------
        let identity = file_identity(&meta);
        let len = meta.len();
        if identity != self.identity {
            tracing::info!(
                file = %self.path.display(),
                "Watcher: file replaced (rotation), reading new file from start"
            );
            self.identity = identity;
            self.offset = 0;
            self.partial.clear();
        } else if len < self.offset {
            tracing::info!(
                file = %self.path.display(),
                old_offset = self.offset,
                new_size = len,
                "Watcher: file truncated, resetting offset to 0"
            );
            self.offset = 0;
            self.partial.clear();
        }

        if len == self.offset {
            return false;
        }

        // ---------------------------------------------------------------------
        // 3. Read new bytes (capped per tick).
        // ---------------------------------------------------------------------
        let available = usize::try_from(len - self.offset).unwrap_or(usize::MAX);
        let limit = available.min(MAX_TAIL_READ_BYTES_PER_TICK);
        let bytes = match fs::read_bytes_at(&self.path, self.offset, limit) {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(file = %self.path.display(), error = %e, "Watcher: read error");
                return false;
            }
        };
        if bytes.is_empty() {
            return false;
        }
        self.offset += bytes.len() as u64;
        self.partial.extend_from_slice(&bytes);

        // ---------------------------------------------------------------------
        // 4. Publish complete lines; carry the in-progress tail forward.
        // ---------------------------------------------------------------------
        // A newline byte never occurs inside a multi-byte UTF-8 sequence, so
        // everything up to it decodes cleanly.
        let complete = match self.partial.iter().rposition(|&b| b == b'\n') {
            Some(nl) => {
                let rest = self.partial.split_off(nl + 1);
                std::mem::replace(&mut self.partial, rest)
            }
            None if self.partial.len() > MAX_TAIL_PARTIAL_BYTES => {
                tracing::warn!(
                    file = %self.path.display(),
                    bytes = self.partial.len(),
                    "Watcher: unterminated line exceeds buffer cap, flushing it as one line"
                );
                let cut = self.partial.len() - fs::incomplete_utf8_suffix(&self.partial);
                let rest = self.partial.split_off(cut);
                std::mem::replace(&mut self.partial, rest)
            }
            None => return limit < available,
        };

        let text = String::from_utf8_lossy(&complete);
        let mut published = 0usize;
        for line in text.split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.trim().is_empty() {
                continue;
            }
            bus.publish(Event::log_entry(build_entry(&self.source, line)));
            published += 1;
        }
        if published > 0 {
            tracing::debug!(source = %self.source, count = published, "Watcher: new entries");
        }

        limit < available
    }
}

/// Background follow loop: wait for a wake-up or the poll timeout, then read.
fn run_follow(
    state: &mut FollowState,
    bus: &EventBus,
    wake: &mpsc::Receiver<()>,
    cancel: &AtomicBool,
    poll_interval: Duration,
) {
    let mut backlog = false;
    loop {
        if !backlog {
            match wake.recv_timeout(poll_interval) {
                Ok(()) | Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            // Collapse a burst of notifications into one read.
            while wake.try_recv().is_ok() {}
        }
        if cancel.load(Ordering::SeqCst) {
            break;
        }
        backlog = state.poll(bus);
    }
    tracing::debug!(source = %state.source, "Watcher: thread exiting");
}

/// Classify one raw line into an entry with a fresh id.
fn build_entry(source: &LogSource, line: &str) -> LogEntry {
    let now = Utc::now();
    let seq = ENTRY_SEQUENCE.fetch_add(1, Ordering::SeqCst);
    LogEntry {
        id: format!(
            "{}-{}-{seq}",
            source.key(),
            now.timestamp_nanos_opt().unwrap_or_default()
        ),
        source: source.clone(),
        level: classify::parse_level(source, line),
        message: classify::truncate_message(line),
        timestamp: now,
        raw: line.to_string(),
    }
}
