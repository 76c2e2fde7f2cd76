pub mod walk;

pub use walk::scan_folder;
