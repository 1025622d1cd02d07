//! Headless engine runner.
//!
//! Starts the QuickTrans engine worker, prints its status, and keeps it
//! supervised until SIGINT/SIGTERM. Useful for development and for smoke
//! testing a packaged engine without the desktop shell.

use std::path::PathBuf;
use std::process;

use quicktrans_sidecar::{EngineContext, RunMode, logging};

#[tokio::main]
async fn main() {
    logging::init_tracing();

    let mode = match parse_args(&std::env::args().collect::<Vec<_>>()) {
        Ok(mode) => mode,
        Err(msg) => {
            if !msg.is_empty() {
                eprintln!("error: {msg}");
                eprintln!();
            }
            eprintln!("Usage: quicktrans-sidecar [--dev <engine-dir> | --packaged <resources-dir>]");
            eprintln!();
            eprintln!("Options:");
            eprintln!("  --dev <dir>        Run the engine from a development checkout");
            eprintln!("                     (venv interpreter + api_server.py) [default: ./python-engine]");
            eprintln!("  --packaged <dir>   Run the bundled engine binary from a resources directory");
            process::exit(2);
        }
    };

    if let Err(e) = run(mode).await {
        tracing::error!(error = %e, "sidecar failed");
        process::exit(1);
    }
}

fn parse_args(args: &[String]) -> Result<RunMode, String> {
    let mut mode = None;

    let mut i = 1; // skip argv[0]
    while i < args.len() {
        match args[i].as_str() {
            "--dev" => {
                i += 1;
                let dir = args.get(i).ok_or("--dev requires a directory")?;
                mode = Some(RunMode::Development {
                    engine_dir: PathBuf::from(dir),
                });
            }
            "--packaged" => {
                i += 1;
                let dir = args.get(i).ok_or("--packaged requires a directory")?;
                mode = Some(RunMode::Packaged {
                    resources_dir: PathBuf::from(dir),
                });
            }
            "--help" | "-h" => return Err(String::new()),
            arg => return Err(format!("unknown argument: {arg}")),
        }
        i += 1;
    }

    Ok(mode.unwrap_or(RunMode::Development {
        engine_dir: PathBuf::from("python-engine"),
    }))
}

async fn run(mode: RunMode) -> anyhow::Result<()> {
    let ctx = EngineContext::new(&mode);

    ctx.supervisor().start().await?;
    tracing::info!(endpoint = %ctx.supervisor().endpoint_url(), "engine is up");

    match ctx.api().system_status().await {
        Ok(status) => tracing::info!(
            version = %status.version,
            features = status.features.len(),
            "engine status: {}",
            status.message
        ),
        Err(e) => tracing::warn!(error = %e, "engine status not available yet"),
    }

    shutdown_signal().await;

    tracing::info!("shutting down engine");
    ctx.supervisor().stop().await;
    Ok(())
}

/// Wait for SIGINT or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler - is tokio runtime configured correctly?");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler - is tokio runtime configured correctly?")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received SIGINT, shutting down...");
        }
        _ = terminate => {
            tracing::info!("received SIGTERM, shutting down...");
        }
    }
}
