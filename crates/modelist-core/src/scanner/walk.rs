use crate::error::Error;
use crate::formats;
use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Recursively collect every supported model file under `root`.
///
/// Entries whose name starts with `.` are skipped along with everything
/// beneath them. A root that does not exist yields an empty set; a root that
/// exists but cannot be read is an error. Unreadable entries deeper in the
/// tree are logged and skipped so one bad subdirectory does not hide its
/// siblings.
pub fn scan_folder(root: &Path) -> Result<BTreeSet<PathBuf>, Error> {
    let mut found = BTreeSet::new();

    if !root.exists() {
        debug!("Scan root {} does not exist", root.display());
        return Ok(found);
    }

    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.file_name()));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                if err.depth() == 0 {
                    let kind = err.io_error().map(|e| e.kind()).unwrap_or(io::ErrorKind::Other);
                    return Err(Error::Io(io::Error::new(
                        kind,
                        format!("Error reading directory {}: {}", root.display(), err),
                    )));
                }
                warn!("Skipping unreadable entry under {}: {}", root.display(), err);
                continue;
            }
        };

        if entry.file_type().is_file() && formats::is_supported(entry.path()) {
            found.insert(entry.into_path());
        }
    }

    debug!("Found {} model files under {}", found.len(), root.display());
    Ok(found)
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}
