use crate::error::Error;
use crate::events::ChangeNotifier;
use crate::formats::FileType;
use crate::storage::models::NewModel;
use crate::storage::Catalog;
use crate::thumbnail::{ThumbnailJob, ThumbnailQueue};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    /// A new model row was created.
    Imported(i64),
    /// The path was already catalogued and has now joined the collection.
    Linked(i64),
    /// The path was already catalogued; nothing changed.
    AlreadyPresent(i64),
    /// Not a supported model file.
    Unsupported,
}

impl ImportOutcome {
    pub fn changed_catalog(&self) -> bool {
        matches!(self, ImportOutcome::Imported(_) | ImportOutcome::Linked(_))
    }
}

/// Idempotent add/remove of single files, shared by live watching, folder
/// reconciliation and manual import.
pub struct Importer {
    catalog: Arc<Catalog>,
    thumbnails: ThumbnailQueue,
    notifier: ChangeNotifier,
}

impl Importer {
    pub fn new(catalog: Arc<Catalog>, thumbnails: ThumbnailQueue, notifier: ChangeNotifier) -> Self {
        Self {
            catalog,
            thumbnails,
            notifier,
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn notify_changed(&self) {
        self.notifier.notify_changed();
    }

    /// Catalog `path`, capturing its size and type as they are right now, and
    /// queue a thumbnail for it. A path that is already catalogued is never
    /// inserted twice.
    pub async fn import_file(
        &self,
        path: &Path,
        collection_id: Option<i64>,
    ) -> Result<ImportOutcome, Error> {
        let Some(file_type) = FileType::from_path(path) else {
            debug!("Ignored file (unsupported extension): {}", path.display());
            return Ok(ImportOutcome::Unsupported);
        };

        let filepath = path.to_string_lossy().into_owned();
        if let Some(existing) = self.catalog.find_model_by_filepath(&filepath)? {
            return self.link_existing(existing.id, &filepath, collection_id);
        }

        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            debug!("Ignored non-file entry: {}", path.display());
            return Ok(ImportOutcome::Unsupported);
        }

        let filename = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_else(|| filepath.clone());

        let new_model = NewModel {
            filename: filename.clone(),
            filepath: filepath.clone(),
            file_size: metadata.len() as i64,
            file_type,
            collection_id,
        };

        match self.catalog.insert_model(&new_model)? {
            Some(model_id) => {
                info!("Imported {} with id {}", filename, model_id);
                self.thumbnails.enqueue(ThumbnailJob {
                    model_id,
                    filepath: path.to_path_buf(),
                    recapture: false,
                });
                Ok(ImportOutcome::Imported(model_id))
            }
            None => {
                // Another importer catalogued the path between our lookup and insert.
                match self.catalog.find_model_by_filepath(&filepath)? {
                    Some(existing) => self.link_existing(existing.id, &filepath, collection_id),
                    None => Err(Error::Other(format!(
                        "Model for {} vanished during import",
                        filepath
                    ))),
                }
            }
        }
    }

    fn link_existing(
        &self,
        model_id: i64,
        filepath: &str,
        collection_id: Option<i64>,
    ) -> Result<ImportOutcome, Error> {
        if let Some(collection_id) = collection_id {
            if self.catalog.add_model_to_collection(model_id, collection_id)? {
                debug!("Linked existing model {} to collection {}", filepath, collection_id);
                return Ok(ImportOutcome::Linked(model_id));
            }
        }
        debug!("File already exists in catalog: {}", filepath);
        Ok(ImportOutcome::AlreadyPresent(model_id))
    }

    /// Drop the model catalogued at `path`, if any. Returns the removed id.
    pub fn remove_file(&self, path: &Path) -> Result<Option<i64>, Error> {
        let filepath = path.to_string_lossy();
        match self.catalog.find_model_by_filepath(&filepath)? {
            Some(model) => {
                self.catalog.delete_model(model.id)?;
                info!("Removed {} from catalog", filepath);
                Ok(Some(model.id))
            }
            None => Ok(None),
        }
    }
}
