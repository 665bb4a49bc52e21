//! Edge API gateway.
//!
//! # Request Pipeline
//!
//! ```text
//!     Client Request
//!     ──────────────▶ security headers → request id → trace/log → CORS → timeout → body limit
//!                                                                                   │
//!                                                                                   ▼
//!                          ┌──────────────┐    ┌──────────────┐    ┌──────────────────┐
//!                          │   routing    │───▶│  auth guard  │───▶│   rate limiter   │
//!                          │ prefix match │    │ cache+verify │    │  fixed window    │
//!                          └──────────────┘    └──────┬───────┘    └────────┬─────────┘
//!                                                     │                     │
//!                                                     ▼                     ▼
//!                                              ┌─────────────┐     ┌────────────────┐
//!                                              │shared store │     │ circuit breaker│
//!                                              │memory/redis │     │  per backend   │
//!                                              └─────────────┘     └───────┬────────┘
//!                                                                          ▼
//!     Client Response                                              ┌───────────────┐
//!     ◀──────────────────────────────────────────────────────────── │ proxy engine  │◀──── Backend
//!                                                                  └───────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use edge_gateway::config::load_config;
use edge_gateway::lifecycle::wait_for_signal;
use edge_gateway::observability::{logging::init_logging, metrics::init_metrics};
use edge_gateway::{admin, store, AppState, HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "edge-gateway", version, about = "Edge API gateway", long_about = None)]
struct Args {
    /// Path to a TOML config file. Defaults plus environment overrides apply when omitted.
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "edge-gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        environment = ?config.environment,
        services = config.services.len(),
        store = ?config.store.backend,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    let store = store::connect(&config.store, &shutdown).await?;

    let admin_config = config.admin.clone();
    let bind_address = config.listener.bind_address.clone();
    let state = AppState::new(config, store.store)?;

    let listener = TcpListener::bind(&bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    tokio::spawn(wait_for_signal(shutdown.clone()));

    let admin_task = if admin_config.enabled {
        let admin_listener = TcpListener::bind(&admin_config.bind_address).await?;
        Some(tokio::spawn(admin::serve(
            admin_listener,
            state.clone(),
            shutdown.clone(),
        )))
    } else {
        None
    };

    HttpServer::new(state).run(listener, shutdown).await?;

    if let Some(task) = admin_task {
        match task.await {
            Ok(Err(e)) => tracing::error!(error = %e, "Admin API failed"),
            Err(e) => tracing::error!(error = %e, "Admin API task panicked"),
            Ok(Ok(())) => {}
        }
    }
    if let Some(janitor) = store.janitor {
        let _ = janitor.await;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
