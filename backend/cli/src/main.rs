mod config;

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use dockhand_gateway::{AuthClient, GatewayState, TerminalRelay, build_router};
use dockhand_sandbox::DockerCli;
use dockhand_session::{Reclaimer, SessionManager, ValidationRunner};

use config::Config;

#[derive(Parser)]
#[command(name = "dockhand")]
#[command(about = "Dockhand - sandbox session orchestrator for browser tutorials")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the orchestrator server
    Serve {
        /// Port to bind the HTTP server to
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Show current orchestrator status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env();

    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .json()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port } => {
            let config = Config { port: port.unwrap_or(config.port), ..config };
            run_server(config).await?;
        }
        Commands::Status => {
            let client = reqwest::Client::new();
            match client
                .get(format!("http://localhost:{}/api/status", config.port))
                .send()
                .await
            {
                Ok(resp) => {
                    let body: serde_json::Value = resp.json().await?;
                    println!("{}", serde_json::to_string_pretty(&body)?);
                }
                Err(_) => {
                    println!("dockhand is not running on port {}", config.port);
                }
            }
        }
    }

    Ok(())
}

async fn run_server(config: Config) -> Result<()> {
    info!(
        port = config.port,
        bind = %config.bind_address,
        auth_url = %config.auth_url,
        image = %config.sandbox_image,
        "starting dockhand orchestrator"
    );

    let provider = Arc::new(DockerCli::new(config.docker_config()));
    let verifier = Arc::new(AuthClient::new(&config.auth_url));

    let manager = Arc::new(
        SessionManager::new(verifier, provider.clone()).with_idle_budget(config.session_ttl()),
    );
    let runner = Arc::new(ValidationRunner::new(manager.clone(), provider.clone()));
    let relay = TerminalRelay::new(manager.clone(), provider.clone());

    let sweeper = Reclaimer::new(manager.clone())
        .with_interval(config.sweep_interval())
        .spawn();

    let state = GatewayState::new(manager.clone(), runner, relay);
    let app = build_router(state).layer(CorsLayer::permissive());

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "HTTP API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Sandboxes do not outlive the orchestrator.
    sweeper.abort();
    let released = manager.shutdown_all().await;
    if released > 0 {
        warn!(released, "tore down live sessions on shutdown");
    }
    info!("dockhand stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => {
            warn!(error = %e, "failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}
