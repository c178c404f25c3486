//! natcg scoring server entry point.

use std::path::PathBuf;

use clap::Parser;
use natcg_flow::select_device;
use natcg_server::state::AppState;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "natcg-server", about = "Serve anomaly scores from a trained natcg run")]
struct Args {
    /// Run directory written by `train-natcg`.
    #[arg(long)]
    results: PathBuf,

    #[arg(long, default_value = "0.0.0.0:8080")]
    addr: String,

    /// Stay on the CPU even if an accelerator is available.
    #[arg(long)]
    cpu: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let device = select_device(args.cpu);
    let state = AppState::load(&args.results, &device).unwrap_or_else(|e| {
        tracing::error!("cannot load {}: {e}", args.results.display());
        std::process::exit(1);
    });

    let app = natcg_server::build_app_with_state(state);

    let listener = tokio::net::TcpListener::bind(&args.addr).await.unwrap_or_else(|e| {
        tracing::error!("failed to bind to {}: {e}", args.addr);
        std::process::exit(1);
    });

    tracing::info!("natcg server listening on {}", args.addr);

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("server error: {e}");
        std::process::exit(1);
    }
}
