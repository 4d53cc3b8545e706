//! RepoStore -- object store server backed by a repository contents API.
//!
//! Nothing is persisted locally: every object lives in the remote
//! repository, and the upload log starts empty on each boot.

use std::sync::Arc;

use clap::Parser;
use tracing::info;

use repostore::config::LoggingConfig;
use repostore::credentials::CredentialPair;
use repostore::storage::contents::ContentsStore;
use repostore::upload_log::UploadLog;

/// Command-line arguments for the RepoStore server.
#[derive(Parser, Debug)]
#[command(
    name = "repostore",
    version,
    about = "Object store server backed by a repository contents API"
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "repostore.example.yaml")]
    config: String,

    /// Override the bind address (host:port).
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = repostore::config::load_config(&cli.config)?;
    init_tracing(&config.logging);
    info!("Loaded configuration from {}", cli.config);

    let bind_addr = cli
        .bind
        .unwrap_or_else(|| format!("{}:{}", config.server.host, config.server.port));

    // Missing primary token is fatal.
    let credentials = CredentialPair::from_env(
        &config.upstream.primary_token_env,
        &config.upstream.fallback_token_env,
    )?;
    info!(
        "Upstream credentials loaded from {} (fallback configured: {})",
        config.upstream.primary_token_env,
        credentials.has_fallback()
    );

    if config.observability.metrics {
        repostore::metrics::init_metrics()?;
        repostore::metrics::describe_metrics();
        info!("Prometheus metrics initialized");
    }

    let store = ContentsStore::from_config(
        &config.upstream,
        credentials,
        Arc::new(UploadLog::new()),
    )?;
    info!(
        "Remote store: {}/{} on branch {}",
        config.upstream.owner, config.upstream.repo, config.upstream.branch
    );

    let state = Arc::new(repostore::AppState::new(config, store));
    let app = repostore::server::app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("RepoStore listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("RepoStore shut down");

    Ok(())
}

/// Install the global tracing subscriber.  `RUST_LOG` wins over the
/// configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Wait for SIGTERM or SIGINT (Ctrl+C), then return to trigger graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, shutting down");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        },
    }
}
