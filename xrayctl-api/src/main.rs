//! xrayctl-api - HTTP control plane for adding and removing proxy users.

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use xrayctl_api::config::{ApiConfig, env_filter};
use xrayctl_api::server::{ApiServer, ApiServerConfig, DEFAULT_BIND, DEFAULT_PORT};
use xrayctl_api::state::AppState;
use xrayctl_core::ManagementClient;

/// Command-line options. Everything else comes from the environment.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Bind address
    #[arg(short, long, env = "XRAYCTL_BIND", default_value = DEFAULT_BIND)]
    bind: String,

    /// Listen port
    #[arg(short, long, env = "XRAYCTL_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // The guard must live until exit so buffered log lines are flushed.
    let (non_blocking, _guard) = tracing_appender::non_blocking(std::io::stdout());
    tracing_subscriber::fmt()
        .json()
        .with_writer(non_blocking)
        .with_env_filter(env_filter())
        .init();

    let cli = Cli::parse();

    let config = ApiConfig::from_env().unwrap_or_else(|e| {
        error!(error = %e, "Invalid configuration, refusing to start");
        std::process::exit(1);
    });

    let client = ManagementClient::new(config.management.clone()).unwrap_or_else(|e| {
        error!(error = %e, "Failed to construct management client");
        std::process::exit(1);
    });
    let client = Arc::new(client);

    if let Err(e) = client.start().await {
        warn!(error = %e, endpoint = %config.management.endpoint_uri(), "xray_unavailable_on_startup");
    }

    let shutdown = CancellationToken::new();
    setup_signal_handlers(shutdown.clone());

    let state = AppState::new(&config, client.clone());
    state.rate_limiter.spawn_cleanup_task(shutdown.clone());

    info!(
        bind = %cli.bind,
        port = cli.port,
        management = %config.management.endpoint_uri(),
        inbound_tag = %config.management.inbound_tag,
        max_sessions_per_user = state.sessions.max_sessions(),
        session_limit_log_only = state.sessions.log_only(),
        "xrayctl-api starting"
    );

    let server = ApiServer::new(
        state,
        ApiServerConfig {
            bind_addr: cli.bind,
            port: cli.port,
        },
    );
    let result = server.run(shutdown.clone()).await;

    shutdown.cancel();
    client.close().await;

    if let Err(e) = result {
        error!(error = %e, "Control API server error");
        return Err(e);
    }

    info!("xrayctl-api stopped");
    Ok(())
}

/// Cancel `shutdown` on SIGINT (Ctrl+C) or SIGTERM.
fn setup_signal_handlers(shutdown: CancellationToken) {
    let shutdown_sigint = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
                shutdown_sigint.cancel();
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGINT");
            }
        }
    });

    #[cfg(unix)]
    {
        tokio::spawn(async move {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                    info!("Received SIGTERM, initiating graceful shutdown");
                    shutdown.cancel();
                }
                Err(e) => {
                    error!(error = %e, "Failed to install SIGTERM handler");
                }
            }
        });
    }
}
