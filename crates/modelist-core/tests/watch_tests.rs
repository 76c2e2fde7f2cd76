use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::tempdir;

use modelist_core::config::{InitialScan, WatchSettings};
use modelist_core::events::ChangeNotifier;
use modelist_core::import::Importer;
use modelist_core::storage::Catalog;
use modelist_core::thumbnail::{DisabledThumbnailer, ThumbnailWorker};
use modelist_core::watch::WatchRegistry;
use modelist_core::CatalogEvent;

const WAIT: Duration = Duration::from_secs(10);

fn settings(initial_scan: InitialScan) -> WatchSettings {
    settings_with_threshold(initial_scan, 150)
}

fn settings_with_threshold(initial_scan: InitialScan, stability_threshold_ms: u64) -> WatchSettings {
    WatchSettings {
        stability_threshold_ms,
        poll_interval_ms: 20,
        initial_scan,
        sync_on_startup: false,
    }
}

struct Fixture {
    catalog: Arc<Catalog>,
    notifier: ChangeNotifier,
    registry: WatchRegistry,
}

fn fixture(initial_scan: InitialScan) -> Fixture {
    fixture_with(settings(initial_scan))
}

fn fixture_with(settings: WatchSettings) -> Fixture {
    let catalog = Arc::new(Catalog::open_in_memory().unwrap());
    let notifier = ChangeNotifier::new();
    let (queue, _task) = ThumbnailWorker::spawn(
        Arc::clone(&catalog),
        Arc::new(DisabledThumbnailer),
        notifier.clone(),
    );
    let importer = Arc::new(Importer::new(Arc::clone(&catalog), queue, notifier.clone()));
    let registry = WatchRegistry::new(importer, settings);
    Fixture {
        catalog,
        notifier,
        registry,
    }
}

fn watched_root(fixture: &Fixture, dir: &Path) -> (i64, PathBuf) {
    let root = dir.canonicalize().unwrap();
    let folder = fixture
        .catalog
        .create_watched_collection("lib", &root.to_string_lossy())
        .unwrap();
    (folder.id, root)
}

fn is_catalogued(catalog: &Catalog, path: &Path) -> bool {
    catalog
        .find_model_by_filepath(&path.to_string_lossy())
        .unwrap()
        .is_some()
}

async fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    condition()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_created_file_imported_once_then_removed() {
    let dir = tempdir().unwrap();
    let fx = fixture(InitialScan::Emit);
    let (folder_id, root) = watched_root(&fx, dir.path());
    let mut events = fx.notifier.subscribe();

    assert!(fx.registry.start(folder_id, &root).unwrap());

    let model = root.join("benchy.stl");
    fs::write(&model, vec![0u8; 2048]).unwrap();

    assert!(wait_for(|| is_catalogued(&fx.catalog, &model)).await);
    assert_eq!(fx.catalog.count_models().unwrap(), 1);
    let rows = fx.catalog.list_models_by_collection(folder_id).unwrap();
    assert_eq!(rows.len(), 1);
    let stored = fx.catalog.get_model(rows[0].id).unwrap().unwrap();
    assert_eq!(stored.file_size, 2048);
    assert_eq!(events.recv().await.unwrap(), CatalogEvent::Changed);

    fs::remove_file(&model).unwrap();
    assert!(wait_for(|| !is_catalogued(&fx.catalog, &model)).await);
    assert_eq!(fx.catalog.count_models().unwrap(), 0);

    fx.registry.shutdown_all().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_start_and_stop_are_idempotent() {
    let dir = tempdir().unwrap();
    let fx = fixture(InitialScan::Emit);
    let (folder_id, root) = watched_root(&fx, dir.path());

    assert!(fx.registry.start(folder_id, &root).unwrap());
    assert!(!fx.registry.start(folder_id, &root).unwrap());
    assert_eq!(fx.registry.len(), 1);
    assert_eq!(fx.registry.watched_folders(), vec![(folder_id, root.clone())]);

    assert!(fx.registry.stop(folder_id).await);
    assert!(!fx.registry.stop(folder_id).await);
    assert!(fx.registry.is_empty());

    fx.registry.shutdown_all().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_start_on_missing_folder_fails() {
    let dir = tempdir().unwrap();
    let fx = fixture(InitialScan::Emit);

    let result = fx.registry.start(1, &dir.path().join("missing"));
    assert!(matches!(result, Err(modelist_core::Error::FolderNotFound(_))));
    assert!(!fx.registry.is_watching(1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_initial_scan_imports_existing_files() {
    let dir = tempdir().unwrap();
    fs::create_dir_all(dir.path().join("sub")).unwrap();
    fs::write(dir.path().join("one.stl"), b"one").unwrap();
    fs::write(dir.path().join("sub/two.3mf"), b"two").unwrap();
    fs::write(dir.path().join("skip.txt"), b"text").unwrap();

    let fx = fixture(InitialScan::Emit);
    let (folder_id, root) = watched_root(&fx, dir.path());
    fx.registry.start(folder_id, &root).unwrap();

    assert!(wait_for(|| fx.catalog.count_models().unwrap() == 2).await);
    assert!(is_catalogued(&fx.catalog, &root.join("sub/two.3mf")));

    fx.registry.shutdown_all().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_initial_scan_suppressed_ignores_existing_files() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("old.stl"), b"old").unwrap();

    let fx = fixture(InitialScan::Suppress);
    let (folder_id, root) = watched_root(&fx, dir.path());
    fx.registry.start(folder_id, &root).unwrap();

    let fresh = root.join("new.obj");
    fs::write(&fresh, b"v 1 1 1").unwrap();

    assert!(wait_for(|| is_catalogued(&fx.catalog, &fresh)).await);
    assert!(!is_catalogued(&fx.catalog, &root.join("old.stl")));
    assert_eq!(fx.catalog.count_models().unwrap(), 1);

    fx.registry.shutdown_all().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_hidden_and_unsupported_files_ignored() {
    let dir = tempdir().unwrap();
    let fx = fixture(InitialScan::Emit);
    let (folder_id, root) = watched_root(&fx, dir.path());
    fx.registry.start(folder_id, &root).unwrap();

    fs::create_dir_all(root.join(".trash")).unwrap();
    fs::write(root.join(".trash/deleted.stl"), b"hidden").unwrap();
    fs::write(root.join(".partial.stl"), b"hidden").unwrap();
    fs::write(root.join("notes.md"), b"notes").unwrap();
    let real = root.join("real.stl");
    fs::write(&real, b"real").unwrap();

    assert!(wait_for(|| is_catalogued(&fx.catalog, &real)).await);
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(fx.catalog.count_models().unwrap(), 1);

    fx.registry.shutdown_all().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_files_in_new_directory_imported_and_directory_removal_retires_them() {
    let dir = tempdir().unwrap();
    let fx = fixture(InitialScan::Emit);
    let (folder_id, root) = watched_root(&fx, dir.path());
    fx.registry.start(folder_id, &root).unwrap();

    let batch = root.join("batch");
    fs::create_dir_all(batch.join("inner")).unwrap();
    fs::write(batch.join("a.stl"), b"a").unwrap();
    fs::write(batch.join("inner/b.stl"), b"b").unwrap();

    assert!(wait_for(|| fx.catalog.count_models().unwrap() == 2).await);

    fs::remove_dir_all(&batch).unwrap();
    assert!(wait_for(|| fx.catalog.count_models().unwrap() == 0).await);

    fx.registry.shutdown_all().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_no_imports_after_stop() {
    let dir = tempdir().unwrap();
    let fx = fixture(InitialScan::Emit);
    let (folder_id, root) = watched_root(&fx, dir.path());
    fx.registry.start(folder_id, &root).unwrap();
    assert!(fx.registry.stop(folder_id).await);

    fs::write(root.join("late.stl"), b"late").unwrap();
    tokio::time::sleep(Duration::from_millis(800)).await;
    assert_eq!(fx.catalog.count_models().unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_initialize_and_shutdown_all() {
    let first = tempdir().unwrap();
    let second = tempdir().unwrap();
    let fx = fixture(InitialScan::Suppress);
    let (first_id, _) = watched_root(&fx, first.path());
    let (second_id, _) = watched_root(&fx, second.path());
    let gone = fx
        .catalog
        .create_watched_collection("gone", "/no/such/folder")
        .unwrap();
    let retired = fx
        .catalog
        .create_watched_collection("retired", &first.path().to_string_lossy())
        .unwrap();
    fx.catalog.deactivate_collection(retired.id).unwrap();

    let started: Vec<i64> = fx.registry.initialize().unwrap().into_iter().map(|f| f.id).collect();
    assert_eq!(started, vec![first_id, second_id]);
    assert!(!fx.registry.is_watching(gone.id));
    assert!(!fx.registry.is_watching(retired.id));

    fx.registry.shutdown_all().await;
    assert!(fx.registry.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_file_written_in_chunks_imported_only_after_writes_stop() {
    let dir = tempdir().unwrap();
    let fx = fixture_with(settings_with_threshold(InitialScan::Emit, 400));
    let (folder_id, root) = watched_root(&fx, dir.path());
    fx.registry.start(folder_id, &root).unwrap();

    let model = root.join("slow_export.3mf");
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&model)
        .unwrap();
    for _ in 0..10 {
        file.write_all(&[9u8; 100]).unwrap();
        file.flush().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(
            !is_catalogued(&fx.catalog, &model),
            "imported while still being written"
        );
    }
    drop(file);

    assert!(wait_for(|| is_catalogued(&fx.catalog, &model)).await);
    let stored = fx
        .catalog
        .find_model_by_filepath(&model.to_string_lossy())
        .unwrap()
        .unwrap();
    assert_eq!(stored.file_size, 1000);
    assert_eq!(fx.catalog.count_models().unwrap(), 1);

    fx.registry.shutdown_all().await;
}
