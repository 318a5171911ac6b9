use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use session_server::config::ServerConfig;
use session_server::metrics::{self, Metrics};
use session_server::net::transport::WebTransportServer;
use session_server::session::scheduler::run_session_loop;
use session_server::session::{SessionCommand, SessionManager};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("Session Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = ServerConfig::load_or_default();
    config.validate().map_err(|e| anyhow::anyhow!(e))?;
    info!(
        "Configuration loaded: {}:{}, max_connections={}, min_players={}, tick_rate={}",
        config.bind_address, config.port, config.max_connections, config.min_players, config.tick_rate
    );

    // Initialize metrics
    let metrics = Arc::new(Metrics::new());

    let metrics_clone = metrics.clone();
    let metrics_port = config.metrics_port;
    tokio::spawn(async move {
        if let Err(e) = metrics::start_metrics_server(metrics_clone, metrics_port).await {
            error!("Metrics server error: {}", e);
        }
    });

    // Create WebTransport server
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let server = WebTransportServer::new(config.clone(), event_tx, metrics.clone()).await?;

    info!("Server ready on https://{}", server.bind_addr());
    info!("Certificate hash: {}", server.cert_hash());
    info!(
        "Chrome flag: --ignore-certificate-errors-spki-list={}",
        server.cert_hash()
    );

    // Session state and scheduler
    let manager = SessionManager::new(&config, server.transport(), metrics.clone());
    let session = Arc::new(RwLock::new(manager));

    let (command_tx, command_rx) = mpsc::unbounded_channel();
    command_tx.send(SessionCommand::EnterWaitingRoom)?;

    let scheduler = tokio::spawn(run_session_loop(
        session.clone(),
        event_rx,
        command_rx,
        config.tick_duration(),
    ));

    // Shutdown signal handler
    let shutdown = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        info!("Shutdown signal received");
    };

    // Run server with graceful shutdown
    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        _ = shutdown => {
            info!("Shutting down...");
        }
    }

    // Cleanup
    session.write().await.stop_all();
    drop(command_tx);
    scheduler.abort();
    info!("Server stopped");

    Ok(())
}
