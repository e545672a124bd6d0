use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::signal::unix::{signal, SignalKind};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wuzei::cache::CachePool;
use wuzei::config::{whitelist, Settings, DEFAULT_CONFIG_PATH, DEFAULT_WHITELIST_PATH};
use wuzei::services::{black_set, DdosGuard};
use wuzei::store::{MemStore, StoreDriver, StoreOptions};
use wuzei::{routes, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;

    let config_path =
        std::env::var("WUZEI_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let settings = Settings::load(&config_path)?;
    tracing::info!("starting wuzei gateway: {settings:?}");

    let ddos = if settings.ddos {
        tracing::info!(
            "DDoS protection on: a URL accessed more than {} times in {} seconds is blocked",
            settings.throttle_nums,
            settings.throttle_interval
        );
        let whitelist_path =
            std::env::var("WUZEI_WHITELIST").unwrap_or_else(|_| DEFAULT_WHITELIST_PATH.to_string());
        Some(Arc::new(DdosGuard::new(whitelist::load(&whitelist_path))))
    } else {
        tracing::info!("no DDoS protection");
        None
    };

    let cache = Arc::new(CachePool::new(
        settings.name.as_str(),
        settings.my_ip_addr.as_str(),
        settings.peers.clone(),
        settings.port,
        settings.cache_budget_bytes(),
        settings.cache_chunk_bytes(),
    ));

    // The in-memory driver stands in wherever no cluster is reachable; a
    // librados-backed driver plugs in behind the same trait.
    let store: Arc<dyn StoreDriver> = Arc::new(MemStore::connect(StoreOptions::default()));
    tracing::info!("store driver ready");

    if let Some(guard) = &ddos {
        guard.black_set().spawn_sweeper(black_set::SWEEP_INTERVAL);
    }

    let listen_port = settings.listen_port;
    let state = AppState::new(store, cache.clone(), settings, ddos);
    let app = routes::router(state.clone());

    let listener = TcpListener::bind(("0.0.0.0", listen_port))
        .await
        .with_context(|| format!("failed to listen on port {listen_port}"))?;
    tracing::info!("serving HTTP on port {listen_port}");

    let shutdown = Arc::new(tokio::sync::Notify::new());
    let server = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move { shutdown.notified().await })
            .await
        })
    };

    let mut hangup = signal(SignalKind::hangup())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut quit = signal(SignalKind::quit())?;
    let mut terminate = signal(SignalKind::terminate())?;

    loop {
        tokio::select! {
            _ = hangup.recv() => {
                tracing::info!("reloading config file");
                match Settings::load(&config_path) {
                    Ok(reloaded) => {
                        tracing::info!(
                            "updating peers to {:?} with port {}",
                            reloaded.peers,
                            reloaded.port
                        );
                        cache.set_peers(reloaded.peers.clone(), reloaded.port);
                        state.install_settings(reloaded);
                    }
                    Err(err) => tracing::error!("failed to reload config: {err:#}"),
                }
            }
            _ = interrupt.recv() => break,
            _ = quit.recv() => break,
            _ = terminate.recv() => break,
        }
    }

    tracing::info!("stopping listener, waiting on in-flight requests");
    shutdown.notify_one();
    state.wait_group.wait().await;
    server.await??;
    tracing::info!("server shutdown");
    Ok(())
}

/// `WUZEI_LOG` redirects output to an append-mode log file; default is
/// stdout.
fn init_tracing() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "wuzei=info,tower_http=info".into());

    match std::env::var("WUZEI_LOG") {
        Ok(path) if !path.is_empty() => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("failed to open log file {path}"))?;
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(Arc::new(file))
                        .with_ansi(false),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }
    Ok(())
}
