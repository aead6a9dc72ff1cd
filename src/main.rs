mod config;
mod emotion;
mod error;
mod event_store;
mod openai;
mod serial_listener;
mod server;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use log::{debug, error, info, warn, LevelFilter};
use simple_logger::SimpleLogger;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::net::TcpListener;
use tokio::sync::watch;

use event_store::EventStore;
use openai::OpenAiClient;
use serial_listener::SerialListener;
use server::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Filtering happens through the global max level so the config can lower it later
    SimpleLogger::new().with_level(LevelFilter::Trace).init()?;
    log::set_max_level(LevelFilter::Info);

    info!("Starting emotion-bridge");

    // Parse command-line arguments
    let cli = config::Cli::parse();

    // Load configuration
    let config = config::load_config(&cli)?;
    log::set_max_level(config.log_level);
    info!("Configuration loaded successfully");

    let store = Arc::new(EventStore::new(config.serial.line_prefix.clone()));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Spawn serial listener task, if the device is there
    let listener_handle = match serial_listener::open(&config.serial) {
        Ok(port) => {
            let listener = SerialListener::new(Arc::clone(&store), config.serial.read_timeout());
            Some(tokio::spawn(listener.run(BufReader::new(port), shutdown_rx)))
        }
        Err(e) => {
            warn!("{} ({}); continuing without live events", e, config.serial.port);
            None
        }
    };

    if config.openai.api_key.is_empty() {
        warn!("No OpenAI API key configured; /predict and /speak will fail");
    }
    let openai = Arc::new(
        OpenAiClient::new(config.openai.clone()).context("Failed to create OpenAI client")?,
    );

    let state = Arc::new(AppState {
        store,
        classifier: openai.clone(),
        synthesizer: openai,
        index_path: config.server.index_path.clone(),
        started_at: Utc::now(),
        serial_connected: listener_handle.is_some(),
    });

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let tcp = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);

    axum::serve(tcp, server::create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Shutting down");
    if let Err(e) = shutdown_tx.send(true) {
        debug!("Serial listener not running, nothing to stop: {}", e);
    }
    if let Some(handle) = listener_handle {
        if let Err(e) = handle.await {
            error!("Serial listener task terminated unexpectedly: {}", e);
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
