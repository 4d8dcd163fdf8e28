use std::sync::Arc;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crawl_orchestrator::api::crawl_routes;
use crawl_orchestrator::config::OrchestratorConfig;
use crawl_orchestrator::orchestrator::Orchestrator;

/// Console logging, plus a daily-rolling file when `CRAWL_SERVICE_LOG_DIR` is set.
fn init_tracing() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match std::env::var("CRAWL_SERVICE_LOG_DIR") {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "crawl-orchestrator.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false);
            (Some(layer), Some(guard))
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .init();

    guard
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _log_guard = init_tracing();

    let config = OrchestratorConfig::from_env();
    config.validate()?;

    eprintln!("🕷️  Crawl Orchestrator v{}", env!("CARGO_PKG_VERSION"));
    eprintln!(
        "   Worker: {} {}",
        config.worker_program,
        config.worker_args.join(" ")
    );
    eprintln!("   Results: {}", config.results_dir.display());
    eprintln!("   Logs: {}", config.logs_dir.display());
    eprintln!(
        "   Timeout: {} ticks of {:?} (grace {:?})",
        config.max_ticks, config.tick_interval, config.kill_grace
    );

    let orchestrator = Arc::new(Orchestrator::new(&config));
    orchestrator
        .init()
        .await
        .context("failed to prepare artifact directories")?;

    let app = crawl_routes(Arc::clone(&orchestrator));

    let addr = format!("{}:{}", config.bind_addr, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    eprintln!("   API: http://{}/api/v1/crawl\n", addr);
    tracing::info!(addr = %addr, "Crawl API started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown requested");
        })
        .await?;

    Ok(())
}
