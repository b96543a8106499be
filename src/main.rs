use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod encoding;
mod error;
mod handlers;
mod renderer;
mod resolver;
mod routes;
mod transfer;

use config::Config;
use resolver::PathResolver;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Maps request paths into the served root
    pub resolver: Arc<PathResolver>,
    /// Configuration
    pub config: Arc<Config>,
}

#[derive(Parser, Debug)]
#[command(name = "servedir")]
#[command(about = "HTTP server exposing a directory tree for browsing and download")]
#[command(version)]
struct Cli {
    /// Port to listen on
    #[arg(short, long, env = "SERVEDIR_PORT", default_value = "9000")]
    port: u16,

    /// Address to bind to
    #[arg(short, long, env = "SERVEDIR_BIND", default_value = "0.0.0.0")]
    bind: String,

    /// Root directory to serve files from
    #[arg(short, long, env = "SERVEDIR_ROOT", default_value = ".")]
    root: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, env = "SERVEDIR_VERBOSE")]
    verbose: bool,

    /// Config file path (optional)
    #[arg(short, long, env = "SERVEDIR_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose {
        "servedir=debug,tower_http=debug"
    } else {
        "servedir=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load config from file if provided, otherwise use defaults
    let config = if let Some(config_path) = &cli.config {
        Config::from_file(config_path)?
    } else {
        Config::default()
    };

    // The root must resolve to an existing directory before anything binds
    let root = cli.root.canonicalize().map_err(|err| {
        format!(
            "Root directory is not usable: {}: {}",
            cli.root.display(),
            err
        )
    })?;

    if !root.is_dir() {
        return Err(format!("Root path is not a directory: {}", root.display()).into());
    }

    info!("Serving files from: {}", root.display());

    let state = AppState {
        resolver: Arc::new(PathResolver::new(root)),
        config: Arc::new(config),
    };

    let app = routes::create_router(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", cli.bind, cli.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Listening on http://{}", addr);
    if let Some(ip) = local_ip() {
        info!("Reachable on the local network at http://{}:{}", ip, cli.port);
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Best-effort LAN address for the startup banner. Connecting a UDP socket
/// picks the outbound interface without sending any packets.
fn local_ip() -> Option<std::net::IpAddr> {
    let socket = std::net::UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    socket.local_addr().ok().map(|addr| addr.ip())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
