use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use interview_session::{
    create_router, AppState, Config, FileHandoffStore, HttpInterviewApi, LocalMediaProvider,
    NatsClient, ResultHub, SessionDeps,
};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "interview-session")]
#[command(about = "Interview practice session orchestrator")]
struct Args {
    /// Config file (extension optional)
    #[arg(short, long, default_value = "config/interview-session")]
    config: String,

    /// Override the HTTP port from the config
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    info!("Interview Session v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);

    let hub = Arc::new(ResultHub::default());
    let nats = NatsClient::connect(&cfg.nats.url, cfg.nats.user_id.clone(), cfg.nats.subject_prefix.clone()).await?;
    let feed = nats.start_result_feed(Arc::clone(&hub)).await?;

    let store = FileHandoffStore::new(&cfg.storage.handoff_dir)
        .with_context(|| format!("Failed to open handoff store at {}", cfg.storage.handoff_dir))?;
    let api = HttpInterviewApi::new(&cfg.api).context("Failed to build interview API client")?;

    let deps = SessionDeps {
        api: Arc::new(api),
        media: Arc::new(LocalMediaProvider),
        store: Arc::new(store),
        hub: Arc::clone(&hub),
        settings: cfg.session.clone(),
    };
    let app = create_router(AppState::new(deps));

    let port = args.port.unwrap_or(cfg.service.http.port);
    let addr = format!("{}:{}", cfg.service.http.bind, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP server listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    if !hub.can_release() {
        warn!("Shutting down with an interview still waiting for results");
    }
    feed.abort();
    let _ = feed.await;
    nats.flush_and_close().await?;

    info!("Stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
