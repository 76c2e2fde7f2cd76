use crate::config::DuplicateSettings;
use crate::error::Error;
use crate::hasher;
use crate::progress::ProgressReporter;
use crate::storage::models::Model;
use crate::storage::Catalog;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Models whose files hash identically. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateGroup {
    pub hash: String,
    /// In catalog order.
    pub models: Vec<Model>,
    /// Sum of the recorded sizes, not re-measured from disk.
    pub total_size: i64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WastedSpace {
    pub total_wasted: i64,
    pub group_count: usize,
}

pub struct DuplicateFinder {
    catalog: Arc<Catalog>,
    settings: DuplicateSettings,
}

impl DuplicateFinder {
    pub fn new(catalog: Arc<Catalog>, settings: DuplicateSettings) -> Self {
        Self { catalog, settings }
    }

    /// Hash every catalogued file and group the ones that share content.
    /// Missing, unreadable or stalled files are logged and left out.
    /// Groups come back largest total first, then by ascending hash.
    pub async fn find_duplicates(
        &self,
        reporter: &dyn ProgressReporter,
    ) -> Result<Vec<DuplicateGroup>, Error> {
        let models = self.catalog.list_all_models()?;
        let total = models.len();
        info!("Scanning {} files for duplicates...", total);

        let start = Instant::now();
        reporter.on_hash_start(total);

        let timeout = self.settings.hash_timeout();
        let mut hashed = stream::iter(models)
            .map(move |model| async move {
                let digest = hash_model(&model, timeout).await;
                (model, digest)
            })
            .buffered(self.settings.hash_concurrency.max(1));

        let mut by_hash: HashMap<String, Vec<Model>> = HashMap::new();
        let mut done = 0usize;
        while let Some((model, digest)) = hashed.next().await {
            done += 1;
            reporter.on_hash_progress(done, total);
            if let Some(digest) = digest {
                by_hash.entry(digest).or_default().push(model);
            }
        }

        let groups = group_duplicates(by_hash);
        let elapsed = start.elapsed().as_secs_f64();
        info!(
            "Found {} duplicate groups in {:.2}s",
            groups.len(),
            elapsed
        );
        reporter.on_hash_complete(groups.len(), elapsed);

        Ok(groups)
    }

    /// Run a full duplicate pass and total the bytes that would be freed by
    /// keeping one copy per group.
    pub async fn calculate_wasted_space(
        &self,
        reporter: &dyn ProgressReporter,
    ) -> Result<WastedSpace, Error> {
        let groups = self.find_duplicates(reporter).await?;
        Ok(wasted_space(&groups))
    }

    /// Drop a duplicate from the catalog. The file on disk is left alone.
    pub fn delete_duplicate(&self, model_id: i64) -> Result<Model, Error> {
        let model = self
            .catalog
            .get_model(model_id)?
            .ok_or(Error::ModelNotFound(model_id))?;
        self.catalog.delete_model(model_id)?;
        info!(
            "Removed duplicate {} from catalog; file kept at {}",
            model_id, model.filepath
        );
        Ok(model)
    }
}

async fn hash_model(model: &Model, timeout: Duration) -> Option<String> {
    let path = Path::new(&model.filepath);
    match tokio::fs::try_exists(path).await {
        Ok(true) => {}
        Ok(false) => {
            warn!("File not found, skipping: {}", model.filepath);
            return None;
        }
        Err(e) => {
            warn!("Cannot access {}, skipping: {}", model.filepath, e);
            return None;
        }
    }

    match tokio::time::timeout(timeout, hasher::hash_file(path)).await {
        Ok(Ok(digest)) => {
            debug!("{} {}", digest, model.filepath);
            Some(digest)
        }
        Ok(Err(e)) => {
            error!("Failed to hash {}: {}", model.filepath, e);
            None
        }
        Err(_) => {
            error!(
                "Timed out hashing {} after {}s",
                model.filepath,
                timeout.as_secs()
            );
            None
        }
    }
}

fn group_duplicates(by_hash: HashMap<String, Vec<Model>>) -> Vec<DuplicateGroup> {
    let mut groups: Vec<DuplicateGroup> = by_hash
        .into_iter()
        .filter(|(_, models)| models.len() > 1)
        .map(|(hash, models)| {
            let total_size = models.iter().map(|m| m.file_size).sum();
            DuplicateGroup {
                hash,
                models,
                total_size,
            }
        })
        .collect();

    groups.sort_by(|a, b| {
        b.total_size
            .cmp(&a.total_size)
            .then_with(|| a.hash.cmp(&b.hash))
    });
    groups
}

/// `(members - 1) * size of first member`, summed over all groups.
pub fn wasted_space(groups: &[DuplicateGroup]) -> WastedSpace {
    let total_wasted = groups
        .iter()
        .filter_map(|group| {
            let first = group.models.first()?;
            Some((group.models.len() as i64 - 1) * first.file_size)
        })
        .sum();

    WastedSpace {
        total_wasted,
        group_count: groups.len(),
    }
}
