// printcloud_simulator/src/main.rs - Standalone simulated print service
use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use url::Url;

use printcloud_simulator::{SimOptions, SimState, serve};

#[derive(Debug, Parser)]
#[command(name = "printcloud-simulator", about = "In-memory print service for local runs")]
struct Args {
    #[arg(long, default_value = "127.0.0.1:8080")]
    bind: String,
    /// Public base URL, when it differs from the bind address
    #[arg(long)]
    base_url: Option<String>,
    #[arg(long, default_value = "sim-key")]
    api_key: String,
    #[arg(long, default_value = "sim-secret")]
    api_secret: String,
    /// Acknowledgement reads before a command reports ok
    #[arg(long, default_value_t = 2)]
    ack_delay_reads: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let listener = TcpListener::bind(&args.bind).await?;
    let base_url = match args.base_url {
        Some(url) => Url::parse(&url)?,
        None => Url::parse(&format!("http://{}/", listener.local_addr()?))?,
    };

    let state = SimState::new(
        base_url.clone(),
        SimOptions {
            api_key: args.api_key,
            api_secret: args.api_secret,
            ack_delay_reads: args.ack_delay_reads,
        },
    );
    tracing::info!("Print service simulator listening on {}", base_url);
    serve(listener, state).await?;
    Ok(())
}
