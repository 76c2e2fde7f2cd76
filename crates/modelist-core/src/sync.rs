//! One-shot reconciliation of a watched folder against the catalog.

use crate::error::Error;
use crate::import::{ImportOutcome, Importer};
use crate::progress::ProgressReporter;
use crate::scanner;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info};

/// Counts from one reconciliation pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    /// New model rows created for files found on disk.
    pub added: usize,
    /// Files already catalogued elsewhere that joined this folder.
    pub linked: usize,
    /// Model rows retired because their file is gone.
    pub removed: usize,
    /// Files whose add or removal failed and was skipped.
    pub failed: usize,
}

impl SyncReport {
    pub fn changed(&self) -> bool {
        self.added + self.linked + self.removed > 0
    }
}

/// Diff `folder_path` against the models filed under `folder_id` and repair
/// the catalog until the two agree. All additions happen before any removal.
/// Per-file failures are logged and counted, never returned.
pub async fn reconcile_folder(
    importer: &Importer,
    folder_id: i64,
    folder_path: &Path,
    reporter: &dyn ProgressReporter,
) -> Result<SyncReport, Error> {
    if !tokio::fs::metadata(folder_path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
    {
        return Err(Error::FolderNotFound(folder_path.to_path_buf()));
    }

    let start = Instant::now();
    let display_path = folder_path.to_string_lossy();
    info!("Starting full sync for folder {}: {}", folder_id, display_path);
    reporter.on_sync_start(&display_path);

    let root = folder_path.to_path_buf();
    let disk_set = tokio::task::spawn_blocking(move || scanner::scan_folder(&root))
        .await
        .map_err(|e| Error::Other(format!("Folder scan task failed: {}", e)))??;

    let db_set: BTreeMap<String, i64> = importer
        .catalog()
        .list_models_by_collection(folder_id)?
        .into_iter()
        .map(|row| (row.filepath, row.id))
        .collect();

    let mut report = SyncReport::default();

    for path in &disk_set {
        if db_set.contains_key(path.to_string_lossy().as_ref()) {
            continue;
        }
        match importer.import_file(path, Some(folder_id)).await {
            Ok(ImportOutcome::Imported(_)) => report.added += 1,
            Ok(ImportOutcome::Linked(_)) => report.linked += 1,
            Ok(_) => {}
            Err(e) => {
                error!("Failed to import {}: {}", path.display(), e);
                report.failed += 1;
            }
        }
    }

    let on_disk: HashSet<String> = disk_set
        .iter()
        .map(|path| path.to_string_lossy().into_owned())
        .collect();

    for filepath in db_set.keys() {
        if on_disk.contains(filepath) {
            continue;
        }
        match importer.remove_file(&PathBuf::from(filepath)) {
            Ok(Some(_)) => report.removed += 1,
            Ok(None) => {}
            Err(e) => {
                error!("Failed to remove {}: {}", filepath, e);
                report.failed += 1;
            }
        }
    }

    if report.changed() {
        importer.notify_changed();
    }

    let elapsed = start.elapsed().as_secs_f64();
    info!(
        "Sync complete for {}: {} added, {} linked, {} removed, {} failed in {:.2}s",
        display_path, report.added, report.linked, report.removed, report.failed, elapsed
    );
    reporter.on_sync_complete(report.added + report.linked, report.removed, elapsed);

    Ok(report)
}
