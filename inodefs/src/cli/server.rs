use crate::config::Settings;
use crate::dispatch::Dispatcher;
use crate::fs::{FsOptions, InodeFs};
use crate::http::HttpServer;
use anyhow::{Context, Result};
use slatedb::DbBuilder;
use slatedb::object_store::{ObjectStore, parse_url_opts, path::Path};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub fn build_object_store(settings: &Settings) -> Result<(Arc<dyn ObjectStore>, Path)> {
    let url: url::Url = settings
        .storage
        .url
        .parse()
        .with_context(|| format!("Invalid storage url {}", settings.storage.url))?;

    let (object_store, path) = parse_url_opts(&url, settings.storage.options.clone())
        .with_context(|| format!("Failed to create object store for {}", url))?;

    Ok((Arc::from(object_store), path))
}

pub async fn build_slatedb(settings: &Settings) -> Result<Arc<slatedb::Db>> {
    let (object_store, path) = build_object_store(settings)?;
    info!("Opening database at {} ({})", settings.storage.url, path);

    let db = DbBuilder::new(path, object_store)
        .build()
        .await
        .context("Failed to open database")?;
    Ok(Arc::new(db))
}

pub async fn run_server(config_path: PathBuf) -> Result<()> {
    let settings = Settings::from_file(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let slatedb = build_slatedb(&settings).await?;
    let options = FsOptions {
        resolve_parent_entry: settings.namespace.resolve_parent_entry,
    };
    let fs = Arc::new(InodeFs::new_with_slatedb(slatedb, options).await?);

    let shutdown = CancellationToken::new();

    let gc = Arc::new(fs.garbage_collector(settings.gc.interval()));
    let gc_handle = gc.start(shutdown.clone());

    let stats_handle = {
        let stats = fs.stats.clone();
        let shutdown = shutdown.clone();
        let interval = Duration::from_secs(settings.server.stats_interval_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => stats.output_report_debug(),
                }
            }
        })
    };

    let server = HttpServer::new(Dispatcher::new(fs.clone()), settings.server.http_addr);
    let server_shutdown = shutdown.clone();
    let server_handle = tokio::spawn(async move { server.start(server_shutdown).await });

    info!("InodeFS is serving on http://{}", settings.server.http_addr);

    tokio::select! {
        _ = wait_for_signal() => {
            info!("Received shutdown signal");
        }
        _ = shutdown.cancelled() => {}
    }
    shutdown.cancel();

    match server_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("HTTP server failed: {}", e),
        Err(e) => error!("HTTP server task panicked: {}", e),
    }
    if let Err(e) = gc_handle.await {
        error!("Garbage collector task panicked: {}", e);
    }
    if let Err(e) = stats_handle.await {
        error!("Stats task panicked: {}", e);
    }

    info!("Flushing database...");
    fs.db.flush().await?;
    fs.db.close().await?;
    info!("Shutdown complete");

    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
