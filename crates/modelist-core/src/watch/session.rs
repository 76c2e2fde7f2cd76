use crate::config::{InitialScan, WatchSettings};
use crate::error::Error;
use crate::formats;
use crate::import::{ImportOutcome, Importer};
use crate::scanner;
use notify::event::{AccessKind, AccessMode, CreateKind, EventKind, ModifyKind, RenameMode};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

enum WatchMessage {
    Event(Event),
    Error(String),
}

/// A live subscription on one watched folder.
///
/// Dropping the session without calling [`WatchSession::stop`] still detaches
/// the subscription, but only `stop` waits for the processing task to finish.
pub struct WatchSession {
    folder_id: i64,
    root: PathBuf,
    watcher: RecommendedWatcher,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl fmt::Debug for WatchSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchSession")
            .field("folder_id", &self.folder_id)
            .field("root", &self.root)
            .field("task_finished", &self.task.is_finished())
            .finish()
    }
}

impl WatchSession {
    /// Attach a recursive subscription to `path` and start processing its
    /// events. Must be called from within a tokio runtime.
    pub fn start(
        folder_id: i64,
        path: &Path,
        importer: Arc<Importer>,
        settings: WatchSettings,
    ) -> Result<WatchSession, Error> {
        let root = match std::fs::canonicalize(path) {
            Ok(root) if root.is_dir() => root,
            Ok(_) => return Err(Error::FolderNotFound(path.to_path_buf())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::FolderNotFound(path.to_path_buf()))
            }
            Err(e) => return Err(Error::Io(e)),
        };

        let (tx, rx) = mpsc::unbounded_channel::<WatchMessage>();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let message = match res {
                Ok(event) => WatchMessage::Event(event),
                Err(e) => WatchMessage::Error(e.to_string()),
            };
            // The receiver is gone once the session stops.
            let _ = tx.send(message);
        })?;
        watcher.watch(&root, RecursiveMode::Recursive)?;

        let (shutdown, shutdown_rx) = oneshot::channel();
        let state = SessionState {
            folder_id,
            root: root.clone(),
            importer,
            settings,
            pending: HashMap::new(),
            next_seq: 0,
        };
        let task = tokio::spawn(run_session(state, rx, shutdown_rx));

        info!("Now watching folder {}: {}", folder_id, root.display());
        Ok(WatchSession {
            folder_id,
            root,
            watcher,
            shutdown,
            task,
        })
    }

    pub fn folder_id(&self) -> i64 {
        self.folder_id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Detach the subscription and wait for the processing task to exit.
    /// Once this returns no further events are applied to the catalog.
    pub async fn stop(self) {
        let WatchSession {
            folder_id,
            root,
            watcher,
            shutdown,
            task,
        } = self;

        drop(watcher);
        let _ = shutdown.send(());
        if let Err(e) = task.await {
            error!("Watch task for folder {} ended abnormally: {}", folder_id, e);
        }
        info!("Stopped watching folder {}: {}", folder_id, root.display());
    }
}

struct PendingWrite {
    seq: u64,
    last_change: Instant,
    last_size: Option<u64>,
}

struct SessionState {
    folder_id: i64,
    root: PathBuf,
    importer: Arc<Importer>,
    settings: WatchSettings,
    pending: HashMap<PathBuf, PendingWrite>,
    next_seq: u64,
}

async fn run_session(
    mut state: SessionState,
    mut rx: mpsc::UnboundedReceiver<WatchMessage>,
    mut shutdown: oneshot::Receiver<()>,
) {
    if state.settings.initial_scan == InitialScan::Emit {
        let root = state.root.clone();
        state.queue_tree(&root).await;
        debug!(
            "Initial scan queued {} files for folder {}",
            state.pending.len(),
            state.folder_id
        );
    }

    let mut ticker = tokio::time::interval(state.settings.poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            message = rx.recv() => match message {
                Some(WatchMessage::Event(event)) => state.handle_event(event).await,
                Some(WatchMessage::Error(e)) => {
                    error!("Watcher error for {}: {}", state.root.display(), e);
                }
                None => break,
            },
            _ = ticker.tick(), if !state.pending.is_empty() => state.flush_stable().await,
        }
    }

    if !state.pending.is_empty() {
        debug!(
            "Dropping {} unsettled files for folder {}",
            state.pending.len(),
            state.folder_id
        );
    }
}

impl SessionState {
    async fn handle_event(&mut self, event: Event) {
        match event.kind {
            EventKind::Create(CreateKind::Folder) => {
                for path in &event.paths {
                    self.queue_tree(path).await;
                }
            }
            EventKind::Create(_)
            | EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Modify(ModifyKind::Any)
            | EventKind::Access(AccessKind::Close(AccessMode::Write)) => {
                for path in &event.paths {
                    self.observe(path).await;
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) | EventKind::Remove(_) => {
                for path in &event.paths {
                    self.handle_remove(path);
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                for path in &event.paths {
                    self.observe(path).await;
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                if let [from, to] = event.paths.as_slice() {
                    self.handle_remove(from);
                    self.observe(to).await;
                }
            }
            EventKind::Modify(ModifyKind::Name(_)) => {
                // Backend could not tell which side of the rename this is.
                for path in &event.paths {
                    if path.exists() {
                        self.observe(path).await;
                    } else {
                        self.handle_remove(path);
                    }
                }
            }
            _ => {}
        }
    }

    /// Something appeared or was written at `path`.
    async fn observe(&mut self, path: &Path) {
        if formats::is_hidden_below(&self.root, path) {
            return;
        }
        if path.is_dir() {
            self.queue_tree(path).await;
        } else if formats::is_supported(path) {
            self.mark_pending(path.to_path_buf());
        } else {
            debug!("Ignored file (unsupported extension): {}", path.display());
        }
    }

    /// Queue every model file under `dir`. Covers files that landed in a new
    /// directory before the backend started watching it.
    async fn queue_tree(&mut self, dir: &Path) {
        if formats::is_hidden_below(&self.root, dir) {
            return;
        }
        let dir_owned = dir.to_path_buf();
        match tokio::task::spawn_blocking(move || scanner::scan_folder(&dir_owned)).await {
            Ok(Ok(paths)) => {
                for path in paths {
                    if !formats::is_hidden_below(&self.root, &path) {
                        self.mark_pending(path);
                    }
                }
            }
            Ok(Err(e)) => warn!("Failed to scan {}: {}", dir.display(), e),
            Err(e) => error!("Scan of {} panicked: {}", dir.display(), e),
        }
    }

    fn mark_pending(&mut self, path: PathBuf) {
        let now = Instant::now();
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending
            .entry(path)
            .and_modify(|pending| pending.last_change = now)
            .or_insert(PendingWrite {
                seq,
                last_change: now,
                last_size: None,
            });
    }

    /// Import every pending file whose size has held still for the
    /// stability threshold, in the order the files were first seen.
    async fn flush_stable(&mut self) {
        let threshold = self.settings.stability_threshold();
        let now = Instant::now();
        let mut ready: Vec<(u64, PathBuf)> = Vec::new();
        let mut vanished: Vec<PathBuf> = Vec::new();

        for (path, pending) in self.pending.iter_mut() {
            match tokio::fs::metadata(path).await {
                Ok(metadata) => {
                    let size = metadata.len();
                    if pending.last_size != Some(size) {
                        pending.last_size = Some(size);
                        pending.last_change = now;
                    } else if now.duration_since(pending.last_change) >= threshold {
                        ready.push((pending.seq, path.clone()));
                    }
                }
                Err(_) => vanished.push(path.clone()),
            }
        }

        for path in vanished {
            debug!("Pending file disappeared before settling: {}", path.display());
            self.pending.remove(&path);
        }

        ready.sort_by_key(|(seq, _)| *seq);
        for (_, path) in ready {
            self.pending.remove(&path);
            self.handle_add(&path).await;
        }
    }

    async fn handle_add(&self, path: &Path) {
        info!("New file detected: {}", path.display());
        match self.importer.import_file(path, Some(self.folder_id)).await {
            Ok(outcome) if outcome.changed_catalog() => self.importer.notify_changed(),
            Ok(ImportOutcome::Unsupported) => {
                debug!("Skipped {} (not a model file)", path.display())
            }
            Ok(_) => {}
            Err(e) => error!("Failed to import {}: {}", path.display(), e),
        }
    }

    fn handle_remove(&mut self, path: &Path) {
        if formats::is_hidden_below(&self.root, path) {
            return;
        }
        self.pending.remove(path);

        match self.importer.remove_file(path) {
            Ok(Some(_)) => {
                self.importer.notify_changed();
                return;
            }
            Ok(None) => {}
            Err(e) => {
                error!("Failed to remove {}: {}", path.display(), e);
                return;
            }
        }

        // A removed directory takes its catalogued contents with it.
        if let Err(e) = self.remove_below(path) {
            error!("Failed to remove models under {}: {}", path.display(), e);
        }
    }

    fn remove_below(&mut self, dir: &Path) -> Result<(), Error> {
        self.pending.retain(|pending, _| !pending.starts_with(dir));

        let rows = self
            .importer
            .catalog()
            .list_models_by_collection(self.folder_id)?;
        let mut removed = 0usize;
        for row in rows {
            let filepath = Path::new(&row.filepath);
            if filepath != dir && filepath.starts_with(dir) {
                match self.importer.remove_file(filepath) {
                    Ok(Some(_)) => removed += 1,
                    Ok(None) => {}
                    Err(e) => error!("Failed to remove {}: {}", row.filepath, e),
                }
            }
        }
        if removed > 0 {
            info!("Removed {} models under {}", removed, dir.display());
            self.importer.notify_changed();
        }
        Ok(())
    }
}
