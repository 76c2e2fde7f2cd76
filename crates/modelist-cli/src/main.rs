mod commands;
mod logging;
mod progress;

use std::process;
use std::sync::Arc;

use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands};
use dotenv::dotenv;
use logging::LogMode;
use modelist_core::storage::models::{CollectionKind, FilterOptions};
use modelist_core::thumbnail::DisabledThumbnailer;
use modelist_core::{CatalogEvent, Library};
use progress::CliReporter;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let args = Cli::parse();
    let log_mode = match args.command {
        Some(Commands::Watch) => LogMode::Daemon,
        _ => LogMode::OneShot,
    };
    let _guard = logging::init_logger(log_mode);

    let config = match modelist_core::config::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let Some(command) = args.command else {
        let _ = Cli::command().print_long_help();
        return Ok(());
    };

    if let Commands::PrintConfig = command {
        println!("Configuration: {:#?}", config);
        return Ok(());
    }

    let library = match Library::open(config, Arc::new(DisabledThumbnailer)) {
        Ok(library) => library,
        Err(err) => {
            error!("Error opening catalog: {}", err);
            process::exit(1);
        }
    };

    if let Err(err) = run(&library, command).await {
        error!("Error: {}", err);
    }

    library.shutdown().await?;
    Ok(())
}

async fn run(library: &Library, command: Commands) -> Result<(), Box<dyn std::error::Error>> {
    let reporter = CliReporter::new();

    match command {
        Commands::Watch => run_watch(library, &reporter).await?,
        Commands::AddFolder { path } => {
            let collection = library.add_watched_folder(&path).await?;
            info!(
                "Watching {} as folder {}",
                collection.folder_path.as_deref().unwrap_or_default().cyan(),
                collection.id
            );
            let report = library.refresh_folder(collection.id, &reporter).await?;
            info!("{} models imported", format!("{}", report.added + report.linked).green());
        }
        Commands::RemoveFolder { id } => {
            let removed = library.remove_watched_folder(id).await?;
            info!(
                "Folder {} removed, {} catalog entries dropped",
                id,
                format!("{}", removed).red()
            );
        }
        Commands::Sync { id } => {
            let ids: Vec<i64> = match id {
                Some(id) => vec![id],
                None => library
                    .catalog()
                    .list_active_watched_collections()?
                    .into_iter()
                    .map(|folder| folder.id)
                    .collect(),
            };
            for id in ids {
                match library.refresh_folder(id, &reporter).await {
                    Ok(report) => info!(
                        "Folder {}: {} added, {} linked, {} removed, {} failed",
                        id,
                        format!("{}", report.added).green(),
                        format!("{}", report.linked).green(),
                        format!("{}", report.removed).red(),
                        report.failed
                    ),
                    Err(err) => error!("Folder {}: {}", id, err),
                }
            }
        }
        Commands::Duplicates { json } => {
            let groups = library.find_duplicates(&reporter).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&groups)?);
            } else {
                for group in &groups {
                    println!(
                        "{} {} copies, {} bytes",
                        group.hash[..12.min(group.hash.len())].yellow(),
                        group.models.len(),
                        group.total_size
                    );
                    for model in &group.models {
                        println!("    [{}] {}", model.id, model.filepath);
                    }
                }
                info!("{} duplicate groups", format!("{}", groups.len()).red());
            }
        }
        Commands::WastedSpace => {
            let wasted = library.calculate_wasted_space(&reporter).await?;
            info!(
                "{} bytes wasted across {} duplicate groups",
                format!("{}", wasted.total_wasted).red(),
                wasted.group_count
            );
        }
        Commands::DeleteDuplicate { model_id } => {
            let model = library.delete_duplicate(model_id)?;
            info!(
                "Removed model {} from catalog; {} left on disk",
                model_id,
                model.filepath.cyan()
            );
        }
        Commands::Import { paths } => {
            let imported = library.import_files(&paths).await;
            for model in &imported {
                println!("  [{}] {}", model.id, model.filepath);
            }
            info!("{} files imported", format!("{}", imported.len()).green());
        }
        Commands::Models {
            collection,
            tags,
            file_type,
            search,
            sort,
            asc,
        } => {
            let filters = FilterOptions {
                collection_id: collection,
                tag_ids: tags,
                file_type,
                search_query: search,
                sort_by: sort.into(),
                sort_order: commands::sort_order(asc),
            };
            for entry in library.catalog().query_models(&filters)? {
                let tags: Vec<&str> = entry.tags.iter().map(|t| t.name.as_str()).collect();
                println!(
                    "  [{}] {} ({}, {} bytes) {}",
                    entry.model.id,
                    entry.model.display_name.as_deref().unwrap_or(&entry.model.filename),
                    entry.model.file_type,
                    entry.model.file_size,
                    tags.join(", ").dimmed()
                );
            }
        }
        Commands::Collections => {
            for collection in library.catalog().list_collections()? {
                match collection.kind {
                    CollectionKind::Watched => println!(
                        "  [{}] {} {}",
                        collection.id,
                        collection.name.cyan(),
                        collection.folder_path.unwrap_or_default().dimmed()
                    ),
                    CollectionKind::Collection => {
                        println!("  [{}] {}", collection.id, collection.name)
                    }
                }
            }
        }
        Commands::Tags => {
            for tag in library.catalog().list_tags()? {
                println!("  [{}] {} {}", tag.id, tag.name, tag.color.dimmed());
            }
        }
        Commands::PrintConfig => println!("Configuration: {:#?}", library.config()),
    }

    Ok(())
}

async fn run_watch(
    library: &Library,
    reporter: &CliReporter,
) -> Result<(), Box<dyn std::error::Error>> {
    let started = library.initialize_watchers(reporter).await?;
    if started == 0 {
        warn!("No watched folders; add one with `modelist add-folder <path>`");
    }

    let mut events = library.subscribe();
    info!("Watching {} folders, press Ctrl-C to stop", started);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(CatalogEvent::Changed) => {
                    let count = library.catalog().count_models()?;
                    info!("Catalog changed, {} models", format!("{}", count).green());
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Missed {} change notifications", skipped);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    info!("Shutting down watchers...");
    Ok(())
}
