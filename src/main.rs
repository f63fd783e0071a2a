use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use contact_gate::config::ContactGateConfig;
use contact_gate::server::ContactServer;

/// Contact form backend with token checks and rate limiting.
#[derive(Parser, Debug)]
#[command(name = "contact-gate", version)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long, env = "CONTACT_GATE_CONFIG")]
    config: Option<PathBuf>,

    /// Override the listen address
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    /// Parse and validate the configuration file, then exit
    #[arg(long, requires = "config")]
    check_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("contact_gate=info,tower_http=info"));
    if args.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init();
    }

    if args.check_config {
        if let Some(path) = args.config.as_deref() {
            let config = ContactGateConfig::from_file(path)?;
            config.validate()?;
            info!(path = %path.display(), "Configuration is valid");
        }
        return Ok(());
    }

    info!("Starting contact gate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = ContactGateConfig::load(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.server.bind_addr = bind;
    }
    info!(
        bind_addr = %config.server.bind_addr,
        max_submissions = config.rate_limiting.max_submissions,
        window_ms = config.rate_limiting.window_ms,
        min_interval_ms = config.rate_limiting.min_interval_ms,
        "Configuration loaded"
    );

    let server = ContactServer::new(config);

    // Run the server with graceful shutdown on Ctrl+C
    server.serve_with_shutdown(shutdown_signal()).await?;

    info!("Contact gate stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
