use std::net::SocketAddr;
use std::process::ExitCode;

use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use credential_gateway::{AppState, Config, build_router, metrics, utils};

#[tokio::main]
async fn main() -> ExitCode {
    // Configuration decides the log format, so it is loaded first
    let config = Config::from_env();
    init_tracing(config.as_ref().ok());

    info!(
        "Starting Credential Gateway v{}",
        env!("CARGO_PKG_VERSION")
    );

    let result = match config {
        Ok(config) => run(config).await,
        Err(e) => {
            error!("Configuration error: {e}");
            Err(exitcode::CONFIG)
        }
    };

    match result {
        Ok(()) => ExitCode::from(exitcode::OK as u8),
        Err(exit_code) => ExitCode::from(exit_code as u8),
    }
}

/// Initialize logging. `RUST_LOG` wins over the configured level.
fn init_tracing(config: Option<&Config>) {
    let level = config.map_or("info", |c| c.log_level.as_str());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true);

    if config.is_some_and(|c| c.log_json) {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Run the application, returning an exit code on error.
async fn run(config: Config) -> Result<(), exitcode::ExitCode> {
    info!(
        host = %config.host,
        port = %config.port,
        allowed_ips = config.allowed_ips.len(),
        aliyun_region = %config.aliyun_region,
        tencent_region = %config.tencent_region,
        "Configuration loaded"
    );

    // Metrics exporter (optional)
    if let Some(metrics_addr) = config.metrics_addr() {
        metrics::try_init_metrics(metrics_addr);
    } else {
        info!("Metrics disabled (METRICS_PORT=0)");
    }

    // Build application state and router
    let state = AppState::new(config.clone()).map_err(|e| {
        error!("Failed to build application state: {e}");
        exitcode::CONFIG
    })?;
    let app = build_router(state.clone());

    // Start server
    let addr: SocketAddr = config.server_addr().parse().map_err(|e| {
        error!("Invalid server address: {e}");
        exitcode::CONFIG
    })?;
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind to {addr}: {e}");
        exitcode::UNAVAILABLE
    })?;

    info!("Server listening on http://{addr}");
    info!("API endpoints:");
    info!("  GET  /health                      - Health check");
    info!("  POST /api/auth/token              - Issue a bearer token");
    info!("  POST /api/auth/sts                - Assume a RAM role");
    info!("  POST /api/submit/url              - Submit a DocMind structure job");
    info!("  POST /api/result                  - Fetch a structure job");
    info!("  POST /api/wait                    - Wait for a structure job");
    info!("  POST /api/parser/submit/url       - Submit a DocMind parser job");
    info!("  POST /api/parser/status           - Fetch a parser job's status");
    info!("  POST /api/parser/result           - Fetch a parser job's result");
    info!("  POST /api/jobs/wait               - Wait for any DocMind job");
    info!("  POST /api/tencent/sign            - Compute TC3 headers");
    info!("  POST /api/tencent/call            - Call a Tencent Cloud action");
    info!("  POST /api/tencent/parser/submit   - Start a reconstruction task");
    info!("  POST /api/tencent/parser/result   - Fetch a reconstruction result");

    // Job waits are cancelled as soon as shutdown starts, not after the drain
    let shutdown_state = state.clone();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        utils::shutdown_signal().await;
        shutdown_state.shutdown();
    })
    .await
    .map_err(|e| {
        error!("Server error: {e}");
        exitcode::SOFTWARE
    })?;

    info!("Server shutdown complete");
    Ok(())
}
