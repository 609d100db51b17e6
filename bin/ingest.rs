use clap::{Arg, ArgAction, ArgMatches, Command};
use offering_ingest::{FileStore, IngestConfig, Ingestor, MemoryStore, OfferingBook};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("ingest")
        .about("Bulk offering CSV ingestion")
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(clap::value_parser!(PathBuf))
                .help("TOML config file"),
        )
        .arg(
            Arg::new("store-dir")
                .long("store-dir")
                .global(true)
                .value_parser(clap::value_parser!(PathBuf))
                .help("Directory of the JSON file store"),
        )
        .arg(
            Arg::new("collection")
                .long("collection")
                .global(true)
                .help("Target collection (default: offerings)"),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("upload")
                .about("Validate a CSV upload and commit it as one batch")
                .arg(
                    Arg::new("path")
                        .required(true)
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("dry-run")
                        .long("dry-run")
                        .help("Validate and commit against an in-memory store only")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(Command::new("list").about("Print recorded offerings, newest first"))
        .subcommand(Command::new("totals").about("Print offering totals by type"))
}

fn load_config(matches: &ArgMatches) -> anyhow::Result<IngestConfig> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => IngestConfig::load(path)?,
        None => IngestConfig::default(),
    };
    config.apply_env_overrides();
    if let Some(dir) = matches.get_one::<PathBuf>("store-dir") {
        config.store_dir = dir.clone();
    }
    if let Some(collection) = matches.get_one::<String>("collection") {
        config.collection = collection.clone();
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let matches = cli().get_matches();
    let config = load_config(&matches)?;

    match matches.subcommand() {
        Some(("upload", sub)) => {
            let path = sub
                .get_one::<PathBuf>("path")
                .ok_or_else(|| anyhow::anyhow!("missing upload path"))?;
            let start = Instant::now();
            let result = if sub.get_flag("dry-run") {
                let ingestor = Ingestor::new(Arc::new(MemoryStore::new()), &config)?;
                ingestor.ingest_path(path, &config).await?
            } else {
                let store = Arc::new(FileStore::open(&config.store_dir).await?);
                let ingestor = Ingestor::new(store, &config)?;
                ingestor.ingest_path(path, &config).await?
            };
            tracing::info!(
                elapsed_ms = start.elapsed().as_millis() as u64,
                success = result.success,
                "upload finished"
            );
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.success {
                std::process::exit(2);
            }
        }
        Some(("list", _)) => {
            let store = Arc::new(FileStore::open(&config.store_dir).await?);
            let book = OfferingBook::new(store, config.collection.clone());
            println!("{}", serde_json::to_string_pretty(&book.list().await?)?);
        }
        Some(("totals", _)) => {
            let store = Arc::new(FileStore::open(&config.store_dir).await?);
            let book = OfferingBook::new(store, config.collection.clone());
            println!("{}", serde_json::to_string_pretty(&book.totals().await?)?);
        }
        _ => unreachable!("subcommand_required"),
    }
    Ok(())
}
