use std::io::{self, Write};
use std::path::PathBuf;

use clap::Parser;

use unlocode_loader::store::PostgresStore;
use unlocode_loader::{DatabaseConfig, Pipeline, PipelineConfig};

#[derive(Parser, Debug)]
#[command(
    name = "unlocode-loader",
    about = "Bulk-load a UN/LOCODE code list into PostGIS"
)]
struct Args {
    /// Code-list CSV file to load.
    input: PathBuf,

    /// Writer workers, each with its own connection (default: LOADER_WORKERS or 3).
    #[arg(long)]
    workers: Option<usize>,

    /// Records per batch (default: LOADER_BATCH_SIZE or 24000).
    #[arg(long)]
    batch_size: Option<usize>,

    /// Destination database (default: DATABASE_URL).
    #[arg(long)]
    database_url: Option<String>,

    /// Treat the first line as data instead of a header.
    #[arg(long)]
    no_header: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    unlocode_loader::init_logger();

    let args = Args::parse();

    let mut config = PipelineConfig::from_env();
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if args.no_header {
        config.skip_header = false;
    }
    let config = config.clamped();

    let database = match DatabaseConfig::resolve(args.database_url) {
        Ok(database) => database,
        Err(err) => {
            writeln!(io::stderr(), "error: {err}")?;
            std::process::exit(1);
        }
    };
    let store = PostgresStore::from_config(&database)?;

    match store.check_config().await {
        Ok(snapshot) => {
            log::info!("{}", snapshot);
            // One extra connection for schema setup
            if snapshot.allows_connections(config.workers + 1) == Some(false) {
                log::warn!(
                    "{} workers may exceed max_connections ({})",
                    config.workers,
                    snapshot.max_connections
                );
            }
        }
        Err(err) => log::warn!("could not read server configuration: {}", err),
    }

    log::info!(
        "starting load: {} worker(s), batch size {}, queue capacity {}",
        config.workers,
        config.batch_size,
        config.queue_capacity
    );

    let pipeline = Pipeline::new(store, config);
    match pipeline.run(&args.input).await {
        Ok(report) => {
            if let Err(err) = pipeline.store().analyze().await {
                log::warn!("ANALYZE after load failed: {}", err);
            }
            println!("{}", report);
            Ok(())
        }
        Err(err) => {
            log::error!("load failed: {}", err);
            writeln!(io::stderr(), "error: {err}")?;
            std::process::exit(1);
        }
    }
}
