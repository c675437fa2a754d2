#![doc = include_str!("../README.md")]

mod server;

use anyhow::Context;
use clap::Parser;
use server::config::{CliArgs, Mode, ServerConfig};
use server::fs::{Layout, Namespace};
use server::service::{IdService, http, stream};
use server::telemetry::init_telemetry;
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    init_telemetry()?;

    let service = IdService::from_config(&config);
    let shutdown = CancellationToken::new();
    let mut servers = JoinSet::new();

    let listener = bind(config.listen_addr).await?;
    log_startup_info(&config);
    match config.mode {
        Mode::Tcp => {
            servers.spawn(stream::serve(
                listener,
                service.clone(),
                shutdown.clone(),
            ));
        }
        Mode::Http => {
            servers.spawn(http::serve(
                listener,
                service.clone(),
                shutdown.clone(),
            ));
        }
        Mode::Ninep => {
            let ns = Namespace::new(
                service.clone(),
                Layout::Full,
                config.owner.clone(),
                config.max_batch,
            );
            servers.spawn(server::ninep::serve(
                listener,
                Arc::new(ns),
                shutdown.clone(),
            ));
        }
    }

    if let Some(stats_addr) = config.stats_addr {
        let listener = bind(stats_addr).await?;
        tracing::info!("Serving 9P stats on {stats_addr}");
        let ns = Namespace::new(
            service.clone(),
            Layout::StatsOnly,
            config.owner.clone(),
            config.max_batch,
        );
        servers.spawn(server::ninep::serve(
            listener,
            Arc::new(ns),
            shutdown.clone(),
        ));
    }

    tokio::select! {
        () = shutdown_signal() => {}
        Some(res) = servers.join_next() => {
            // A listener stopped on its own; take the others down with it.
            if let Err(e) = res.context("listener task panicked")? {
                tracing::error!("Listener failed: {e:#}");
            }
        }
    }

    tracing::info!("Shutting down, waiting for open connections...");
    shutdown.cancel();
    while let Some(res) = servers.join_next().await {
        res.context("listener task panicked")??;
    }

    let stats = service.stats().snapshot();
    tracing::info!(
        requests = stats.requests,
        ids = stats.ids,
        "Service shut down successfully"
    );
    Ok(())
}

async fn bind(addr: SocketAddr) -> anyhow::Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to listen on {addr}"))
}

fn log_startup_info(config: &ServerConfig) {
    if cfg!(debug_assertions) {
        tracing::info!(
            "Starting ID service on {} with full config: {:#?}",
            config.listen_addr,
            config
        );
    } else {
        tracing::info!(
            "Starting {:?} ID service on {} (datacenter {}, worker {})",
            config.mode,
            config.listen_addr,
            config.datacenter_id,
            config.worker_id
        );
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        () = terminate => {
            tracing::info!("Received SIGTERM signal");
        },
    }
}
