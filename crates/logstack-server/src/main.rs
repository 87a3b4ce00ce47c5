use clap::Parser;
use logstack_server::IndexStore;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(
    name = "logstack-server",
    about = "Stand-in search engine admin API for logstack"
)]
struct Cli {
    /// Port to listen on.
    #[arg(long, default_value_t = 7280)]
    port: u16,

    /// Directory to store index configs and ingested documents.
    #[arg(long, default_value = "./logstack-search-data")]
    data_dir: PathBuf,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let store = match IndexStore::open(cli.data_dir.clone()) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("failed to open data directory {}: {e}", cli.data_dir.display());
            return ExitCode::FAILURE;
        }
    };

    let addr = format!("0.0.0.0:{}", cli.port);
    info!("starting logstack-server on {addr}");
    info!("data directory: {}", store.data_dir().display());

    match logstack_server::run_server(&store, &addr) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("failed to serve on {addr}: {e}");
            ExitCode::FAILURE
        }
    }
}
