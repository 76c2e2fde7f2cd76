//! Best-effort thumbnail generation decoupled from import.
//!
//! Importers push a [`ThumbnailJob`] onto the queue and move on; a single
//! worker task drains the queue, asks the configured [`ThumbnailGenerator`]
//! for an image, and writes the resulting path back to the catalog. A failed
//! job is logged and forgotten; the imported model stays in the catalog.

use crate::error::Error;
use crate::events::ChangeNotifier;
use crate::storage::Catalog;
use futures::future::BoxFuture;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbnailJob {
    pub model_id: i64,
    pub filepath: PathBuf,
    /// Replacing an existing thumbnail; bumps the model's cache token.
    pub recapture: bool,
}

/// Produces a preview image for a model file.
///
/// `Ok(None)` means the generator has nothing to offer for this file.
pub trait ThumbnailGenerator: Send + Sync {
    fn generate<'a>(
        &'a self,
        filepath: &'a Path,
        model_id: i64,
    ) -> BoxFuture<'a, Result<Option<PathBuf>, Error>>;
}

/// Generator used when no renderer is wired in: never produces an image.
pub struct DisabledThumbnailer;

impl ThumbnailGenerator for DisabledThumbnailer {
    fn generate<'a>(
        &'a self,
        filepath: &'a Path,
        model_id: i64,
    ) -> BoxFuture<'a, Result<Option<PathBuf>, Error>> {
        Box::pin(async move {
            debug!(
                "Thumbnail generation disabled, skipping model {} ({})",
                model_id,
                filepath.display()
            );
            Ok(None)
        })
    }
}

/// Sending half handed to importers.
#[derive(Debug, Clone)]
pub struct ThumbnailQueue {
    tx: mpsc::UnboundedSender<ThumbnailJob>,
}

impl ThumbnailQueue {
    pub fn enqueue(&self, job: ThumbnailJob) {
        let model_id = job.model_id;
        if self.tx.send(job).is_err() {
            warn!("Thumbnail worker is gone, dropping job for model {}", model_id);
        }
    }
}

pub struct ThumbnailWorker;

impl ThumbnailWorker {
    /// Spawn the worker task. It exits once every `ThumbnailQueue` clone has
    /// been dropped and the queue is drained.
    pub fn spawn(
        catalog: Arc<Catalog>,
        generator: Arc<dyn ThumbnailGenerator>,
        notifier: ChangeNotifier,
    ) -> (ThumbnailQueue, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<ThumbnailJob>();

        let handle = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                process_job(&catalog, generator.as_ref(), &notifier, job).await;
            }
            debug!("Thumbnail worker stopped");
        });

        (ThumbnailQueue { tx }, handle)
    }
}

async fn process_job(
    catalog: &Catalog,
    generator: &dyn ThumbnailGenerator,
    notifier: &ChangeNotifier,
    job: ThumbnailJob,
) {
    let thumbnail = match generator.generate(&job.filepath, job.model_id).await {
        Ok(Some(path)) => path,
        Ok(None) => return,
        Err(e) => {
            warn!(
                "Failed to generate thumbnail for {}: {}",
                job.filepath.display(),
                e
            );
            return;
        }
    };

    let thumbnail = thumbnail.to_string_lossy();
    let stored = if job.recapture {
        catalog.replace_thumbnail_path(job.model_id, &thumbnail)
    } else {
        catalog.update_thumbnail_path(job.model_id, &thumbnail)
    };

    match stored {
        Ok(()) => {
            info!("Thumbnail generated for {}", job.filepath.display());
            notifier.notify_changed();
        }
        Err(e) => warn!(
            "Failed to record thumbnail for model {}: {}",
            job.model_id, e
        ),
    }
}
