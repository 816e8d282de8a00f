//! Standalone notification worker.
//!
//! Reads block change events as JSON lines on stdin and runs them through
//! the notification service. Without `DATABASE_URL` the worker keeps block
//! history in memory, recording every event's block as it arrives.

use std::sync::Arc;

use anyhow::Context;
use boardwatch_core::BlockChangeEvent;
use boardwatch_db::{MemoryStore, PgStore, Store};
use boardwatch_notify::delivery::{Delivery, LogDelivery, WebhookDelivery};
use boardwatch_notify::{NotifyConfig, NotifyService};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "boardwatch_worker=debug,boardwatch_notify=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = NotifyConfig::from_env();
    tracing::info!(
        workers = config.pool.workers,
        queue_capacity = config.pool.queue_capacity,
        language = %config.language,
        "Loaded notification configuration"
    );

    // --- Store ---
    let (store, memory): (Arc<dyn Store>, Option<Arc<MemoryStore>>) = match &config.database_url {
        Some(url) => {
            let pool = boardwatch_db::create_pool(url)
                .await
                .context("failed to connect to database")?;
            boardwatch_db::migrate(&pool)
                .await
                .context("failed to run database migrations")?;
            tracing::info!("Database connected and migrated");
            (Arc::new(PgStore::new(pool)) as Arc<dyn Store>, None)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store");
            let memory = Arc::new(MemoryStore::new());
            (memory.clone() as Arc<dyn Store>, Some(memory))
        }
    };

    // --- Delivery ---
    let delivery: Arc<dyn Delivery> = match &config.webhook_url {
        Some(url) => {
            tracing::info!(url = %url, "Delivering notifications by webhook");
            Arc::new(WebhookDelivery::new(url.clone()).context("failed to build webhook client")?)
        }
        None => Arc::new(LogDelivery::new()),
    };

    // --- Service ---
    let service = NotifyService::with_default_backends(store, delivery, &config)
        .context("failed to build notification service")?;
    service
        .start()
        .await
        .context("failed to start notification backends")?;
    tracing::info!(backends = service.backends().len(), "Notification service started");

    tokio::select! {
        _ = read_events(&service, memory.as_deref()) => {
            tracing::info!("Event stream closed");
        }
        _ = shutdown_signal() => {}
    }

    // --- Shutdown ---
    tracing::info!("Shutting down notification service");
    if !service.shutdown().await {
        tracing::warn!("Notification service did not stop cleanly");
    }
    Ok(())
}

/// Feed JSON-line events from stdin to the service until EOF.
async fn read_events(service: &NotifyService, memory: Option<&MemoryStore>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => return,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read event stream");
                return;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let event: BlockChangeEvent = match serde_json::from_str(&line) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring malformed event");
                continue;
            }
        };

        if let Some(memory) = memory {
            record_event(memory, &event).await;
        }

        service.block_changed(event).await;
    }
}

/// Write the event's blocks to the in-memory store. The board and card are
/// only recorded the first time they are seen.
async fn record_event(memory: &MemoryStore, event: &BlockChangeEvent) {
    for context in [event.board.as_ref(), event.card.as_ref()].into_iter().flatten() {
        if context.id != event.block_changed.id && memory.get_block(&context.id).await.is_err() {
            memory.save_block(context.clone()).await;
        }
    }
    memory.save_block(event.block_changed.clone()).await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl-C"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}
