use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Metadata error: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("Catalog is not initialized")]
    NotInitialized,

    #[error("Folder not found: {}", .0.display())]
    FolderNotFound(PathBuf),

    #[error("Model {0} not found")]
    ModelNotFound(i64),

    #[error("Collection {0} not found")]
    CollectionNotFound(i64),

    #[error("Collection {0} is not a watched folder")]
    NotWatched(i64),

    #[error("Unsupported file type: {}", .0.display())]
    UnsupportedFile(PathBuf),

    #[error("{0}")]
    Other(String),
}
