use super::session::WatchSession;
use crate::config::WatchSettings;
use crate::error::Error;
use crate::import::Importer;
use crate::storage::models::WatchedFolder;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::join_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Owns the live [`WatchSession`] for every watched folder, keyed by
/// collection id. At most one session exists per folder.
pub struct WatchRegistry {
    sessions: DashMap<i64, WatchSession>,
    importer: Arc<Importer>,
    settings: WatchSettings,
}

impl WatchRegistry {
    pub fn new(importer: Arc<Importer>, settings: WatchSettings) -> Self {
        Self {
            sessions: DashMap::new(),
            importer,
            settings,
        }
    }

    /// Start watching `path` for collection `folder_id`. Returns `false` if a
    /// session for that folder is already running.
    pub fn start(&self, folder_id: i64, path: &Path) -> Result<bool, Error> {
        match self.sessions.entry(folder_id) {
            Entry::Occupied(_) => {
                info!("Folder {} is already being watched", folder_id);
                Ok(false)
            }
            Entry::Vacant(slot) => {
                let session = WatchSession::start(
                    folder_id,
                    path,
                    Arc::clone(&self.importer),
                    self.settings.clone(),
                )?;
                slot.insert(session);
                Ok(true)
            }
        }
    }

    /// Stop the session for `folder_id`. Returns `false` if none was running.
    pub async fn stop(&self, folder_id: i64) -> bool {
        // Release the shard lock before awaiting the session.
        let removed = self.sessions.remove(&folder_id);
        match removed {
            Some((_, session)) => {
                session.stop().await;
                true
            }
            None => false,
        }
    }

    pub fn is_watching(&self, folder_id: i64) -> bool {
        self.sessions.contains_key(&folder_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Folders with a live session, ordered by id.
    pub fn watched_folders(&self) -> Vec<(i64, PathBuf)> {
        let mut folders: Vec<(i64, PathBuf)> = self
            .sessions
            .iter()
            .map(|entry| (*entry.key(), entry.value().root().to_path_buf()))
            .collect();
        folders.sort_by_key(|(id, _)| *id);
        folders
    }

    /// Start a session for every active watched folder in the catalog.
    /// Folders missing from disk are skipped with a warning. Returns the
    /// folders that now have a session.
    pub fn initialize(&self) -> Result<Vec<WatchedFolder>, Error> {
        let folders = self.importer.catalog().list_active_watched_collections()?;
        info!("Initializing {} watched folders", folders.len());

        let mut started = Vec::with_capacity(folders.len());
        for folder in folders {
            let path = Path::new(&folder.folder_path);
            if !path.is_dir() {
                warn!(
                    "Watched folder {} does not exist: {}",
                    folder.id, folder.folder_path
                );
                continue;
            }
            match self.start(folder.id, path) {
                Ok(_) => started.push(folder),
                Err(e) => error!(
                    "Failed to start watcher for {}: {}",
                    folder.folder_path, e
                ),
            }
        }
        Ok(started)
    }

    /// Stop every session and wait for all of them to wind down.
    pub async fn shutdown_all(&self) {
        let ids: Vec<i64> = self.sessions.iter().map(|entry| *entry.key()).collect();
        let sessions: Vec<WatchSession> = ids
            .into_iter()
            .filter_map(|id| self.sessions.remove(&id).map(|(_, session)| session))
            .collect();

        if sessions.is_empty() {
            return;
        }
        let count = sessions.len();
        join_all(sessions.into_iter().map(WatchSession::stop)).await;
        info!("Stopped {} folder watchers", count);
    }
}
