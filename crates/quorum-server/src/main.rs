mod cli;
mod config;
mod delivery;
mod dispatch;

use anyhow::Result;
use clap::Parser;
use quorum_core::AppState;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")),
        )
        .init();

    let args = cli::Args::parse();
    let config = config::Config::load(&args.config)?;

    ensure_db_dir(&config);

    let db = quorum_db::create_pool(&config.database.url, config.database.max_connections).await?;
    quorum_db::run_migrations(&db).await?;

    let state = AppState::new(db, config.runtime_settings());

    // The retention sweep must exist exactly once per deployment; seeding is
    // idempotent across restarts.
    quorum_core::dispatcher::ensure_cleanup_task(&state).await?;

    let dispatch_status;
    let dispatcher = match &config.transport.webhook_url {
        Some(url) => {
            let sink = delivery::WebhookSink::new(
                url,
                Duration::from_secs(config.transport.delivery_timeout_secs),
            )?;
            dispatch_status = format!("Push to {url}");
            Some(tokio::spawn(dispatch::run(state.clone(), sink)))
        }
        None => {
            dispatch_status = "Pull (transport claims tasks over HTTP)".to_string();
            None
        }
    };

    let app = quorum_api::build_router().with_state(state.clone());

    let listener = tokio::net::TcpListener::bind(&config.server.bind_address).await?;

    print_startup_banner(&config, &dispatch_status);

    let shutdown = state.shutdown.clone();
    let shutdown_signal = async move {
        let _ = tokio::signal::ctrl_c().await;
        println!();
        tracing::info!("shutting down");
        shutdown.notify_one();
    };

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    if let Some(handle) = dispatcher {
        let _ = handle.await;
    }

    Ok(())
}

/// Ensure the database parent directory exists before the pool opens the file.
fn ensure_db_dir(config: &config::Config) {
    if let Some(db_path) = config
        .database
        .url
        .strip_prefix("sqlite://")
        .and_then(|s| s.split('?').next())
    {
        if let Some(parent) = std::path::Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    tracing::warn!("could not create directory '{}': {}", parent.display(), e);
                }
            }
        }
    }
}

fn print_startup_banner(config: &config::Config, dispatch_status: &str) {
    println!();
    println!("   ___                                ");
    println!("  / _ \\ _   _  ___  _ __ _   _ _ __ ___");
    println!(" | | | | | | |/ _ \\| '__| | | | '_ ` _ \\");
    println!(" | |_| | |_| | (_) | |  | |_| | | | | | |");
    println!("  \\__\\_\\\\__,_|\\___/|_|   \\__,_|_| |_| |_|");
    println!();
    println!("  Listening:   http://{}", config.server.bind_address);
    println!("  Database:    {}", config.database.url);
    println!("  Dispatch:    {}", dispatch_status);
    println!();
}
