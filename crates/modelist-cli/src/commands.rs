use clap::{Parser, Subcommand, ValueEnum};
use modelist_core::formats::FileType;
use modelist_core::storage::models::{SortBy, SortOrder};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "modelist")]
#[command(about = "Keeps a catalog of 3D model files in sync with watched folders", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Watch every active folder until interrupted
    Watch,
    /// Register a folder to be watched and import its contents
    AddFolder { path: PathBuf },
    /// Stop watching a folder and drop its models from the catalog (files are kept)
    RemoveFolder { id: i64 },
    /// Reconcile one watched folder, or all of them, with the disk
    Sync { id: Option<i64> },
    /// Find byte-identical model files
    Duplicates {
        /// Print groups as JSON
        #[arg(long)]
        json: bool,
    },
    /// Total bytes taken by redundant copies
    WastedSpace,
    /// Remove a duplicate from the catalog (the file stays on disk)
    DeleteDuplicate { model_id: i64 },
    /// Add individual model files to the catalog
    Import {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// List models, optionally filtered
    Models {
        #[arg(long)]
        collection: Option<i64>,
        /// Only models carrying all of these tag ids
        #[arg(long = "tag")]
        tags: Vec<i64>,
        #[arg(long = "type")]
        file_type: Option<FileType>,
        #[arg(long)]
        search: Option<String>,
        #[arg(long, value_enum, default_value_t = SortArg::Created)]
        sort: SortArg,
        #[arg(long)]
        asc: bool,
    },
    /// List active collections and watched folders
    Collections,
    /// List tags
    Tags,
    /// Print configuration values
    PrintConfig,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SortArg {
    Name,
    Created,
    Modified,
    Size,
}

impl From<SortArg> for SortBy {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Name => SortBy::Name,
            SortArg::Created => SortBy::Created,
            SortArg::Modified => SortBy::Modified,
            SortArg::Size => SortBy::Size,
        }
    }
}

pub fn sort_order(asc: bool) -> SortOrder {
    if asc {
        SortOrder::Asc
    } else {
        SortOrder::Desc
    }
}
