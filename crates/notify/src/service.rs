//! The notification service.
//!
//! [`NotifyService`] owns the [`AsyncTaskPool`] and the registered
//! [`Backend`]s. Every block change is fanned out to every backend as a
//! separate pool task, so a slow or failing backend never holds up the
//! caller or its siblings.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use boardwatch_core::BlockChangeEvent;
use boardwatch_db::Store;

use crate::backend::{Backend, LoggerBackend, MentionsBackend, SubscriptionBackend};
use crate::config::NotifyConfig;
use crate::delivery::Delivery;
use crate::error::NotifyError;
use crate::pool::AsyncTaskPool;
use crate::render::{AttachmentOptions, MarkdownHelpers, TemplateHelpers, TemplateRegistry};

const POOL_NAME: &str = "notify";

pub struct NotifyService {
    pool: AsyncTaskPool,
    backends: Vec<Arc<dyn Backend>>,
    shutdown_timeout: Duration,
}

impl NotifyService {
    pub fn new(config: &NotifyConfig, backends: Vec<Arc<dyn Backend>>) -> Self {
        Self {
            pool: AsyncTaskPool::start(POOL_NAME, config.pool),
            backends,
            shutdown_timeout: config.shutdown_timeout,
        }
    }

    /// Wire the standard backends: subscriptions, mentions and logging.
    ///
    /// The subscription backend listens for mentions so a mentioned user is
    /// added to the board and subscribed to the card.
    pub fn with_default_backends(
        store: Arc<dyn Store>,
        delivery: Arc<dyn Delivery>,
        config: &NotifyConfig,
    ) -> Result<Self, NotifyError> {
        let helpers: Arc<dyn TemplateHelpers> = Arc::new(MarkdownHelpers::new(&config.site_url));
        let registry = Arc::new(TemplateRegistry::new()?);
        let attachments = AttachmentOptions::new(registry, Arc::clone(&helpers))
            .with_language(config.language.clone());

        let subscriptions = Arc::new(SubscriptionBackend::new(
            Arc::clone(&store),
            Arc::clone(&delivery),
            Arc::new(config.frequencies()),
            attachments,
        ));
        let mentions = Arc::new(MentionsBackend::new(store, delivery, helpers));
        mentions.add_listener(subscriptions.clone());

        let backends: Vec<Arc<dyn Backend>> =
            vec![subscriptions, mentions, Arc::new(LoggerBackend::new())];
        Ok(Self::new(config, backends))
    }

    pub fn backends(&self) -> &[Arc<dyn Backend>] {
        &self.backends
    }

    pub fn pool(&self) -> &AsyncTaskPool {
        &self.pool
    }

    /// Start every backend. Stops at the first one that fails.
    pub async fn start(&self) -> Result<(), NotifyError> {
        for backend in &self.backends {
            backend.start().await?;
            tracing::info!(backend = backend.name(), "Notification backend started");
        }
        Ok(())
    }

    /// Hand `event` to every backend on the pool.
    pub async fn block_changed(&self, event: BlockChangeEvent) {
        let event = Arc::new(event);
        for backend in &self.backends {
            let backend = Arc::clone(backend);
            let event = Arc::clone(&event);
            self.pool
                .enqueue(move || async move {
                    backend.block_changed(&event).await.with_context(|| {
                        format!(
                            "backend {} failed on block {}",
                            backend.name(),
                            event.block_changed.id
                        )
                    })
                })
                .await;
        }
    }

    /// Drain the pool, then stop the backends.
    ///
    /// Returns `false` if the pool's workers missed the shutdown deadline.
    pub async fn shutdown(&self) -> bool {
        let clean = self.pool.shutdown(self.shutdown_timeout).await;
        for backend in &self.backends {
            if let Err(e) = backend.shutdown().await {
                tracing::error!(backend = backend.name(), error = %e, "Notification backend shutdown failed");
            }
        }
        tracing::info!(clean, "Notification service stopped");
        clean
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
