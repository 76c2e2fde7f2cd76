pub mod config;
pub mod duplicates;
pub mod error;
pub mod events;
pub mod formats;
pub mod hasher;
pub mod import;
pub mod library;
pub mod progress;
pub mod scanner;
pub mod storage;
pub mod sync;
pub mod thumbnail;
pub mod watch;

pub use self::config::AppConfig;
pub use duplicates::{DuplicateFinder, DuplicateGroup, WastedSpace};
pub use error::Error;
pub use events::CatalogEvent;
pub use library::Library;
pub use progress::{ProgressReporter, SilentReporter};
pub use storage::Catalog;
pub use sync::SyncReport;
