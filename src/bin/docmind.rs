use std::process::ExitCode;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use credential_gateway::cli::Cli;
use credential_gateway::utils;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // Ctrl+C ends a wait with `Cancelled` instead of killing the process mid-request
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        utils::shutdown_signal().await;
        trigger.cancel();
    });

    let output = match cli.command.execute(&cancel).await {
        Ok(body) => serde_json::to_string_pretty(&body),
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    match output {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: failed to format result: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr so stdout stays valid JSON.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };

    // Allow RUST_LOG env var to override verbosity flag
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
