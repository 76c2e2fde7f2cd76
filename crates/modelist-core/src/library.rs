use crate::config::AppConfig;
use crate::duplicates::{DuplicateFinder, DuplicateGroup, WastedSpace};
use crate::error::Error;
use crate::events::{CatalogEvent, ChangeNotifier};
use crate::import::{ImportOutcome, Importer};
use crate::progress::ProgressReporter;
use crate::storage::models::{Collection, CollectionKind, Model};
use crate::storage::Catalog;
use crate::sync::{self, SyncReport};
use crate::thumbnail::{ThumbnailGenerator, ThumbnailJob, ThumbnailQueue, ThumbnailWorker};
use crate::watch::WatchRegistry;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Top-level owner of the catalog, the thumbnail worker and every watch
/// session. Construct one per process (or per test) inside a tokio runtime
/// and call [`Library::shutdown`] before exit.
pub struct Library {
    config: AppConfig,
    catalog: Arc<Catalog>,
    notifier: ChangeNotifier,
    importer: Arc<Importer>,
    thumbnails: ThumbnailQueue,
    thumbnail_task: JoinHandle<()>,
    registry: WatchRegistry,
    duplicates: DuplicateFinder,
}

impl Library {
    /// Open (or create) the catalog at `config.database_path`.
    pub fn open(config: AppConfig, generator: Arc<dyn ThumbnailGenerator>) -> Result<Self, Error> {
        let catalog = Catalog::open(&config.database_path)?;
        info!("Catalog ready at {}", config.database_path);
        Ok(Self::with_catalog(config, Arc::new(catalog), generator))
    }

    pub fn with_catalog(
        config: AppConfig,
        catalog: Arc<Catalog>,
        generator: Arc<dyn ThumbnailGenerator>,
    ) -> Self {
        let notifier = ChangeNotifier::new();
        let (thumbnails, thumbnail_task) =
            ThumbnailWorker::spawn(Arc::clone(&catalog), generator, notifier.clone());
        let importer = Arc::new(Importer::new(
            Arc::clone(&catalog),
            thumbnails.clone(),
            notifier.clone(),
        ));
        let registry = WatchRegistry::new(Arc::clone(&importer), config.watch.clone());
        let duplicates = DuplicateFinder::new(Arc::clone(&catalog), config.duplicates.clone());

        Self {
            config,
            catalog,
            notifier,
            importer,
            thumbnails,
            thumbnail_task,
            registry,
            duplicates,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn registry(&self) -> &WatchRegistry {
        &self.registry
    }

    /// Receive a [`CatalogEvent::Changed`] after every catalog mutation.
    pub fn subscribe(&self) -> broadcast::Receiver<CatalogEvent> {
        self.notifier.subscribe()
    }

    // ── Watched folders ──────────────────────────────────────────

    /// Start watching every active watched folder, then reconcile each one
    /// so files removed while the application was closed are retired.
    /// Returns the number of sessions started.
    pub async fn initialize_watchers(&self, reporter: &dyn ProgressReporter) -> Result<usize, Error> {
        let started = self.registry.initialize()?;
        if self.config.watch.sync_on_startup {
            for folder in &started {
                let path = Path::new(&folder.folder_path);
                if let Err(e) = sync::reconcile_folder(&self.importer, folder.id, path, reporter).await {
                    error!("Startup sync failed for {}: {}", folder.folder_path, e);
                }
            }
        }
        info!("{} folder watchers running", self.registry.len());
        Ok(started.len())
    }

    /// Register `path` as a watched folder and start its session. Adding a
    /// folder that is already watched returns the existing collection.
    pub async fn add_watched_folder(&self, path: &Path) -> Result<Collection, Error> {
        let folder = canonical_dir(path).await?;
        let folder_path = folder.to_string_lossy().into_owned();

        let existing = self
            .catalog
            .list_active_watched_collections()?
            .into_iter()
            .find(|watched| watched.folder_path == folder_path);
        if let Some(watched) = existing {
            self.registry.start(watched.id, &folder)?;
            return self
                .catalog
                .get_collection(watched.id)?
                .ok_or(Error::CollectionNotFound(watched.id));
        }

        let name = folder
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| folder_path.clone());
        let collection = self.catalog.create_watched_collection(&name, &folder_path)?;

        if let Err(e) = self.registry.start(collection.id, &folder) {
            warn!("Could not watch {}: {}", folder_path, e);
            self.catalog.deactivate_collection(collection.id)?;
            return Err(e);
        }

        info!("Added watched folder {}: {}", collection.id, folder_path);
        self.notifier.notify_changed();
        Ok(collection)
    }

    /// Stop watching a folder and retire its catalog entries and generated
    /// thumbnails. Files in the folder itself are never touched. Models that
    /// another active watched folder still covers only lose this membership.
    /// Returns the number of models removed.
    pub async fn remove_watched_folder(&self, folder_id: i64) -> Result<usize, Error> {
        self.watched_collection(folder_id)?;

        self.registry.stop(folder_id).await;
        self.catalog.deactivate_collection(folder_id)?;

        let mut removed = 0usize;
        let mut kept = 0usize;
        for row in self.catalog.list_models_by_collection(folder_id)? {
            match self.catalog.is_in_other_watched_folder(row.id, folder_id) {
                Ok(true) => {
                    if let Err(e) = self.catalog.remove_model_from_collection(row.id, folder_id) {
                        error!("Failed to unlink model {}: {}", row.id, e);
                    } else {
                        kept += 1;
                    }
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    error!("Failed to check folders for model {}: {}", row.id, e);
                    continue;
                }
            }
            match self.catalog.delete_model(row.id) {
                Ok(true) => removed += 1,
                Ok(false) => continue,
                Err(e) => {
                    error!("Failed to remove model {}: {}", row.id, e);
                    continue;
                }
            }
            if let Some(thumbnail) = row.thumbnail_path {
                match tokio::fs::remove_file(&thumbnail).await {
                    Ok(()) => debug!("Deleted thumbnail {}", thumbnail),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => warn!("Failed to delete thumbnail {}: {}", thumbnail, e),
                }
            }
        }

        info!(
            "Removed watched folder {} and {} models from catalog ({} kept by other folders)",
            folder_id, removed, kept
        );
        self.notifier.notify_changed();
        Ok(removed)
    }

    /// Reconcile one watched folder against the disk now.
    pub async fn refresh_folder(
        &self,
        folder_id: i64,
        reporter: &dyn ProgressReporter,
    ) -> Result<SyncReport, Error> {
        let collection = self.watched_collection(folder_id)?;
        let folder_path = collection
            .folder_path
            .ok_or(Error::NotWatched(folder_id))?;
        sync::reconcile_folder(&self.importer, folder_id, Path::new(&folder_path), reporter).await
    }

    fn watched_collection(&self, folder_id: i64) -> Result<Collection, Error> {
        let collection = self
            .catalog
            .get_collection(folder_id)?
            .ok_or(Error::CollectionNotFound(folder_id))?;
        if collection.kind != CollectionKind::Watched {
            return Err(Error::NotWatched(folder_id));
        }
        Ok(collection)
    }

    // ── Manual import ────────────────────────────────────────────

    /// Catalog a single file outside any collection. Returns `None` when the
    /// path was already catalogued.
    pub async fn import_file(&self, path: &Path) -> Result<Option<Model>, Error> {
        match self.importer.import_file(path, None).await? {
            ImportOutcome::Imported(id) => {
                self.notifier.notify_changed();
                Ok(self.catalog.get_model(id)?)
            }
            ImportOutcome::Unsupported => Err(Error::UnsupportedFile(path.to_path_buf())),
            ImportOutcome::Linked(_) | ImportOutcome::AlreadyPresent(_) => Ok(None),
        }
    }

    /// Import each path, skipping (and logging) any that fail. Returns the
    /// models that were newly created.
    pub async fn import_files(&self, paths: &[PathBuf]) -> Vec<Model> {
        let mut imported = Vec::new();
        for path in paths {
            match self.import_file(path).await {
                Ok(Some(model)) => imported.push(model),
                Ok(None) => debug!("Already in catalog: {}", path.display()),
                Err(e) => warn!("Skipped {}: {}", path.display(), e),
            }
        }
        info!("Imported {} of {} files", imported.len(), paths.len());
        imported
    }

    /// Queue a fresh thumbnail for a model, replacing any existing one.
    pub fn regenerate_thumbnail(&self, model_id: i64) -> Result<(), Error> {
        let model = self
            .catalog
            .get_model(model_id)?
            .ok_or(Error::ModelNotFound(model_id))?;
        self.thumbnails.enqueue(ThumbnailJob {
            model_id,
            filepath: PathBuf::from(model.filepath),
            recapture: true,
        });
        Ok(())
    }

    // ── Duplicates ───────────────────────────────────────────────

    pub async fn find_duplicates(
        &self,
        reporter: &dyn ProgressReporter,
    ) -> Result<Vec<DuplicateGroup>, Error> {
        self.duplicates.find_duplicates(reporter).await
    }

    pub async fn calculate_wasted_space(
        &self,
        reporter: &dyn ProgressReporter,
    ) -> Result<WastedSpace, Error> {
        self.duplicates.calculate_wasted_space(reporter).await
    }

    /// Remove a duplicate's catalog entry. The file stays on disk.
    pub fn delete_duplicate(&self, model_id: i64) -> Result<Model, Error> {
        let model = self.duplicates.delete_duplicate(model_id)?;
        self.notifier.notify_changed();
        Ok(model)
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Stop every watch session, stop the thumbnail worker and close the
    /// catalog.
    pub async fn shutdown(self) -> Result<(), Error> {
        self.registry.shutdown_all().await;
        self.thumbnail_task.abort();
        self.catalog.close()?;
        info!("Library shut down");
        Ok(())
    }
}

async fn canonical_dir(path: &Path) -> Result<PathBuf, Error> {
    match tokio::fs::canonicalize(path).await {
        Ok(folder) if folder.is_dir() => Ok(folder),
        Ok(_) => Err(Error::FolderNotFound(path.to_path_buf())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Err(Error::FolderNotFound(path.to_path_buf()))
        }
        Err(e) => Err(Error::Io(e)),
    }
}
