//! Live mirroring of watched folders into the catalog.
//!
//! Each watched folder gets one [`WatchSession`]: a recursive `notify`
//! subscription feeding a tokio task. New or rewritten files sit in a pending
//! table until their size has stopped changing for the configured quiet
//! period, then go through the importer. Removals are applied as soon as they
//! arrive. The [`WatchRegistry`] owns every live session.

mod registry;
mod session;

pub use registry::WatchRegistry;
pub use session::WatchSession;
