//! Remotebuild API server.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use remotebuild_api::{routes, AppState};
use remotebuild_config::Config;
use remotebuild_db::PgJobStore;
use remotebuild_executor::DockerDriver;
use remotebuild_scheduler::{DataManagerClient, Engine, EngineConfig, JobService};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Deadline for in-flight HTTP connections during shutdown.
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(15);

#[derive(Parser)]
#[command(name = "remotebuild-server", about = "Package build server")]
struct Args {
    /// Path to the config file.
    #[arg(long, env = "REMOTEBUILD_CONFIG", default_value = "remotebuild.toml")]
    config: PathBuf,

    /// Write a default config file and exit.
    #[arg(long)]
    create_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    if args.create_config {
        Config::create_default(&args.config)?;
        return Ok(());
    }

    let config = Arc::new(Config::load(&args.config)?);
    config.check()?;

    info!("Connecting to database...");
    let pool = remotebuild_db::create_pool(&config.server.database.connection_string()).await?;
    remotebuild_db::run_migrations(&pool).await?;
    info!("Database connected");

    let engine = Arc::new(Engine::new(
        Arc::new(PgJobStore::new(pool)),
        Arc::new(DockerDriver::new()?),
        Arc::new(DataManagerClient::new()),
        EngineConfig {
            images: config.server.jobs.images.clone(),
            ccache_dir: config.ccache_dir(),
            keep_build_container: config.server.keep_build_container,
        },
    ));

    let jobs = Arc::new(JobService::new(engine).await?);
    jobs.start()?;

    let app = routes::router(AppState::new(Arc::clone(&config), Arc::clone(&jobs)))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.webserver.read_timeout_secs,
        )))
        .layer(RequestBodyLimitLayer::new(
            config.webserver.max_request_body_length as usize,
        ));

    let addr = listen_address(&config.webserver.http.listen_address);
    info!("Starting server on {addr}");
    let listener = TcpListener::bind(&addr).await?;

    let shutdown = CancellationToken::new();
    let server = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
        })
    };

    info!("Startup completed");

    wait_for_signal().await;

    // Stop all jobs before the HTTP server goes away.
    jobs.stop().await;

    info!("Shutting down server");
    shutdown.cancel();
    match tokio::time::timeout(SHUTDOWN_DEADLINE, server).await {
        Ok(result) => result??,
        Err(_) => warn!("Shutdown deadline exceeded, closing connections"),
    }

    info!("Shutting down complete");
    Ok(())
}

/// Addresses in the config may be given as ":80"; bind all interfaces then.
fn listen_address(configured: &str) -> String {
    if let Some(port) = configured.strip_prefix(':') {
        return format!("0.0.0.0:{port}");
    }
    configured.to_string()
}

async fn wait_for_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {e}");
                let _ = ctrl_c.await;
                return;
            }
        };

        tokio::select! {
            _ = ctrl_c => {}
            _ = term.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
