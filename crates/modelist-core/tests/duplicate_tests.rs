use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::tempdir;

use modelist_core::config::DuplicateSettings;
use modelist_core::duplicates::{wasted_space, DuplicateFinder, WastedSpace};
use modelist_core::formats::FileType;
use modelist_core::storage::models::NewModel;
use modelist_core::storage::Catalog;
use modelist_core::{Error, ProgressReporter, SilentReporter};

fn write(root: &Path, name: &str, contents: &[u8]) -> PathBuf {
    let path = root.join(name);
    fs::write(&path, contents).unwrap();
    path
}

fn catalogue(catalog: &Catalog, path: &Path) -> i64 {
    let size = fs::metadata(path).map(|m| m.len() as i64).unwrap_or(0);
    catalog
        .insert_model(&NewModel {
            filename: path.file_name().unwrap().to_string_lossy().into_owned(),
            filepath: path.to_string_lossy().into_owned(),
            file_size: size,
            file_type: FileType::from_path(path).unwrap(),
            collection_id: None,
        })
        .unwrap()
        .unwrap()
}

fn finder(catalog: &Arc<Catalog>) -> DuplicateFinder {
    DuplicateFinder::new(Arc::clone(catalog), DuplicateSettings::default())
}

#[tokio::test]
async fn test_identical_pair_forms_one_group() {
    let dir = tempdir().unwrap();
    let catalog = Arc::new(Catalog::open_in_memory().unwrap());

    let body = vec![7u8; 500];
    let a = catalogue(&catalog, &write(dir.path(), "a.stl", &body));
    let b = catalogue(&catalog, &write(dir.path(), "b.stl", &body));
    catalogue(&catalog, &write(dir.path(), "c.obj", &[1u8; 200]));

    let finder = finder(&catalog);
    let groups = finder.find_duplicates(&SilentReporter).await.unwrap();

    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].total_size, 1000);
    assert_eq!(groups[0].hash.len(), 64);
    let ids: Vec<i64> = groups[0].models.iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![a, b]);

    let wasted = finder.calculate_wasted_space(&SilentReporter).await.unwrap();
    assert_eq!(
        wasted,
        WastedSpace {
            total_wasted: 500,
            group_count: 1
        }
    );
}

#[tokio::test]
async fn test_same_size_different_content_never_grouped() {
    let dir = tempdir().unwrap();
    let catalog = Arc::new(Catalog::open_in_memory().unwrap());

    catalogue(&catalog, &write(dir.path(), "left.stl", b"aaaaaaaaaa"));
    catalogue(&catalog, &write(dir.path(), "right.stl", b"aaaaaaaaab"));
    fs::create_dir_all(dir.path().join("copy")).unwrap();
    catalogue(&catalog, &write(&dir.path().join("copy"), "left.stl", b"zzzz"));

    let groups = finder(&catalog).find_duplicates(&SilentReporter).await.unwrap();
    assert!(groups.is_empty());
}

#[tokio::test]
async fn test_missing_file_is_skipped() {
    let dir = tempdir().unwrap();
    let catalog = Arc::new(Catalog::open_in_memory().unwrap());

    let body = b"duplicated mesh data";
    let a = write(dir.path(), "a.stl", body);
    let b = write(dir.path(), "b.stl", body);
    let c = write(dir.path(), "c.stl", body);
    let a_id = catalogue(&catalog, &a);
    let b_id = catalogue(&catalog, &b);
    let c_id = catalogue(&catalog, &c);
    fs::remove_file(&b).unwrap();

    let groups = finder(&catalog).find_duplicates(&SilentReporter).await.unwrap();
    assert_eq!(groups.len(), 1);
    let ids: Vec<i64> = groups[0].models.iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![a_id, c_id]);
    assert!(!ids.contains(&b_id));
}

#[tokio::test]
async fn test_groups_ordered_by_total_size() {
    let dir = tempdir().unwrap();
    let catalog = Arc::new(Catalog::open_in_memory().unwrap());

    // Three small copies (3 * 100) versus two large ones (2 * 400).
    for name in ["s1.stl", "s2.stl", "s3.stl"] {
        catalogue(&catalog, &write(dir.path(), name, &[1u8; 100]));
    }
    for name in ["l1.3mf", "l2.3mf"] {
        catalogue(&catalog, &write(dir.path(), name, &[2u8; 400]));
    }
    // Two groups tied at 2 * 50.
    for name in ["t1.obj", "t2.obj"] {
        catalogue(&catalog, &write(dir.path(), name, &[3u8; 50]));
    }
    for name in ["u1.obj", "u2.obj"] {
        catalogue(&catalog, &write(dir.path(), name, &[4u8; 50]));
    }

    let groups = finder(&catalog).find_duplicates(&SilentReporter).await.unwrap();
    let totals: Vec<i64> = groups.iter().map(|g| g.total_size).collect();
    assert_eq!(totals, vec![800, 300, 100, 100]);
    assert!(groups[2].hash < groups[3].hash);

    assert_eq!(
        wasted_space(&groups),
        WastedSpace {
            total_wasted: 400 + 200 + 50 + 50,
            group_count: 4
        }
    );
}

#[tokio::test]
async fn test_delete_duplicate_keeps_file() {
    let dir = tempdir().unwrap();
    let catalog = Arc::new(Catalog::open_in_memory().unwrap());

    let body = b"same";
    let a = write(dir.path(), "a.stl", body);
    let b = write(dir.path(), "b.stl", body);
    catalogue(&catalog, &a);
    let b_id = catalogue(&catalog, &b);

    let finder = finder(&catalog);
    let removed = finder.delete_duplicate(b_id).unwrap();
    assert_eq!(removed.filepath, b.to_string_lossy());
    assert!(b.exists());
    assert!(catalog.get_model(b_id).unwrap().is_none());
    assert!(finder.find_duplicates(&SilentReporter).await.unwrap().is_empty());

    assert!(matches!(
        finder.delete_duplicate(b_id),
        Err(Error::ModelNotFound(_))
    ));
}

#[derive(Default)]
struct CountingReporter {
    started_with: AtomicUsize,
    progress_calls: AtomicUsize,
    groups: AtomicUsize,
}

impl ProgressReporter for CountingReporter {
    fn on_hash_start(&self, total_files: usize) {
        self.started_with.store(total_files, Ordering::SeqCst);
    }

    fn on_hash_progress(&self, _files_hashed: usize, _total_files: usize) {
        self.progress_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn on_hash_complete(&self, duplicate_groups: usize, _duration_secs: f64) {
        self.groups.store(duplicate_groups, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_progress_reports_every_model() {
    let dir = tempdir().unwrap();
    let catalog = Arc::new(Catalog::open_in_memory().unwrap());
    catalogue(&catalog, &write(dir.path(), "a.stl", b"x"));
    catalogue(&catalog, &write(dir.path(), "b.stl", b"x"));
    let missing = write(dir.path(), "c.stl", b"y");
    catalogue(&catalog, &missing);
    fs::remove_file(&missing).unwrap();

    let reporter = CountingReporter::default();
    finder(&catalog).find_duplicates(&reporter).await.unwrap();

    assert_eq!(reporter.started_with.load(Ordering::SeqCst), 3);
    assert_eq!(reporter.progress_calls.load(Ordering::SeqCst), 3);
    assert_eq!(reporter.groups.load(Ordering::SeqCst), 1);
}
