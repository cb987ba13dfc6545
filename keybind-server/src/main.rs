//! keybind server
//!
//! Checks license keys against a shared record collection, binds each key to
//! the first device that uses it, and runs the media transform for
//! authorized callers.
//!
//! Usage:
//!   KEYBIND_ADMIN_KEY=... JSONBIN_ID=... JSONBIN_KEY=... keybind-server
//!   keybind-server --admin-key s3cret --store file --store-path licenses.json

use anyhow::{Context, Result};
use clap::Parser;
use keybind_license::BindingEngine;
use keybind_server::config::Args;
use keybind_server::{build_router, wait_for_shutdown, AppState, FfmpegTransform};
use tokio::net::TcpListener;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    info!("keybind server starting...");

    let store = args.build_store();
    store
        .open()
        .await
        .with_context(|| format!("Failed to open {} record store", store.backend_name()))?;
    info!("Using {} record store", store.backend_name());

    let state = AppState::new(
        BindingEngine::new(store.clone()),
        &args.admin_key,
        FfmpegTransform::new(&args.ffmpeg),
    )
    .with_max_upload_bytes(args.max_upload_bytes());

    let listener = TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("Failed to bind {}", args.listen))?;
    info!("HTTP API listening on {}", listener.local_addr()?);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    store.close().await.context("Failed to close record store")?;
    info!("keybind server stopped");
    Ok(())
}

async fn shutdown_signal() {
    wait_for_shutdown(tokio::signal::ctrl_c()).await;
}
