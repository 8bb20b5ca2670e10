// src/main.rs - Runs the bridge against the configured print service
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;
use url::Url;

use printcloud_bridge::estimation::EstimatorConfig;
use printcloud_bridge::host::HostAdapter;
use printcloud_bridge::{
    ChannelEventSink, CloudComm, CommSettings, Credentials, HttpPrintService, load_config,
};

#[derive(Debug, Parser)]
#[command(name = "printcloud-bridge", about = "Drive a cloud connected printer like a serial device")]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = "bridge.toml")]
    config: String,
    /// Port of the printer on the client node, overrides the configuration
    #[arg(long)]
    port: Option<String>,
    /// Baud rate, overrides the configuration
    #[arg(long)]
    baud_rate: Option<u32>,
    /// Print every published state update as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    tracing::info!("Loading configuration from: {}", args.config);
    let mut config = load_config(&args.config).map_err(|e| {
        tracing::error!("Failed to load config from '{}': {}", args.config, e);
        Box::new(e) as Box<dyn std::error::Error + Send + Sync + 'static>
    })?;
    if let Some(port) = args.port {
        config.connection.port = port;
    }
    if let Some(baud_rate) = args.baud_rate {
        config.connection.baud_rate = baud_rate;
    }
    config.validate()?;

    let service_url = Url::parse(&config.service.url)?;
    let service = HttpPrintService::with_timeout(
        service_url,
        Credentials::new(&config.service.api_key, &config.service.api_secret),
        Duration::from_millis(config.service.request_timeout_ms),
    )?;
    let settings = CommSettings::from_config(&config)?;

    let json = args.json;
    let host = Arc::new(HostAdapter::new(
        &config.monitor,
        EstimatorConfig::from_config(&config.estimation, settings.status_interval),
        move |data| {
            if json {
                match serde_json::to_string(&data) {
                    Ok(line) => println!("{line}"),
                    Err(e) => tracing::warn!("Cannot serialize current data: {}", e),
                }
            } else {
                tracing::info!(
                    "State: {} | progress: {:?}% | time left: {:?}s",
                    data.state.text,
                    data.progress.completion,
                    data.progress.print_time_left
                );
            }
        },
    ));

    let (sink, mut events) = ChannelEventSink::new();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            tracing::info!("Event: {:?}", event);
        }
    });

    let comm = CloudComm::new(settings, Arc::new(service), host.clone(), Arc::new(sink));
    let state = comm
        .connect(&config.connection.port, config.connection.baud_rate)
        .await;
    tracing::info!("Connection state: {}", comm.state_label().await);
    if state.is_error() {
        return Err(comm
            .last_error()
            .await
            .unwrap_or_else(|| "connection failed".to_string())
            .into());
    }

    // Lines typed on stdin go to the printer, like a serial terminal.
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                break;
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    if !line.trim().is_empty() && comm.send_command(&line).await.is_none() {
                        tracing::warn!("Command not sent, printer is {}", comm.state_label().await);
                    }
                }
                Ok(None) => stdin_open = false,
                Err(e) => {
                    tracing::warn!("Reading stdin failed: {}", e);
                    stdin_open = false;
                }
            }
        }
    }

    tracing::info!("Shutting down");
    comm.close().await;
    Ok(())
}
