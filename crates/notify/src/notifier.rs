//! The notification scheduling loop.
//!
//! One Tokio task owns the wake-up time. It waits on three things at once:
//! a new hint arriving on the inbox, the wake-up timer, and cancellation.
//!
//! - A hint can only bring the wake-up time forward, never push it back.
//! - When the timer fires the loop runs one batch pass through its
//!   [`HintProcessor`] and takes the next wake-up time from the hints that
//!   remain pending.
//! - With nothing pending the loop parks without a timer.
//! - On start the loop runs one pass immediately, so hints stored before a
//!   restart are not stranded.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use boardwatch_core::types::duration_millis;
use boardwatch_core::{now_millis, Millis, NotificationHint, NotifyFrequencies};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::NotifyError;

/// Sentinel stored in the shared wake-up slot when the loop is parked.
const NO_WAKE: Millis = Millis::MAX;

// ---------------------------------------------------------------------------
// Batch pass contract
// ---------------------------------------------------------------------------

/// Outcome of one batch pass.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Hints taken from the store.
    pub processed: usize,
    /// When the earliest remaining hint is due.
    pub next_notify_at: Option<Millis>,
    /// Failures that did not stop the pass.
    pub failures: Vec<NotifyError>,
}

impl BatchReport {
    /// `Ok` when the pass had no failures, otherwise the failures.
    pub fn into_result(self) -> Result<usize, NotifyError> {
        match self.failures.len() {
            0 => Ok(self.processed),
            _ => Err(NotifyError::Multiple(self.failures)),
        }
    }
}

/// Runs the batch-notify procedure for every due hint.
#[async_trait]
pub trait HintProcessor: Send + Sync {
    /// Process all hints due at `now`.
    ///
    /// An `Err` means the hint store itself could not be read; the loop
    /// will retry later.
    async fn process_due(&self, now: Millis) -> Result<BatchReport, NotifyError>;
}

/// Fold a candidate time into the current wake-up time.
pub fn earliest(current: Option<Millis>, candidate: Millis) -> Millis {
    current.map_or(candidate, |at| at.min(candidate))
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

struct Running {
    inbox: mpsc::UnboundedSender<NotificationHint>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Handle to the scheduling loop.
pub struct Notifier {
    frequencies: Arc<NotifyFrequencies>,
    processor: Arc<dyn HintProcessor>,
    wake_at: Arc<AtomicI64>,
    running: Mutex<Option<Running>>,
}

impl Notifier {
    pub fn new(frequencies: Arc<NotifyFrequencies>, processor: Arc<dyn HintProcessor>) -> Self {
        Self {
            frequencies,
            processor,
            wake_at: Arc::new(AtomicI64::new(NO_WAKE)),
            running: Mutex::new(None),
        }
    }

    /// Spawn the loop. Does nothing if it is already running.
    pub fn start(&self) {
        let mut running = self.lock_running();
        if running.is_some() {
            return;
        }

        let (inbox, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_loop(
            Arc::clone(&self.frequencies),
            Arc::clone(&self.processor),
            Arc::clone(&self.wake_at),
            rx,
            cancel.clone(),
        ));

        *running = Some(Running {
            inbox,
            cancel,
            handle,
        });
        tracing::info!("Notifier started");
    }

    /// Stop the loop and wait for it to exit. Does nothing if it is not
    /// running.
    pub async fn stop(&self) {
        let Some(running) = self.lock_running().take() else {
            return;
        };
        running.cancel.cancel();
        if let Err(e) = running.handle.await {
            tracing::error!(error = %e, "Notifier loop ended abnormally");
        }
        self.wake_at.store(NO_WAKE, Ordering::Release);
        tracing::info!("Notifier stopped");
    }

    pub fn is_running(&self) -> bool {
        self.lock_running().is_some()
    }

    /// Feed a stored hint to the loop.
    pub fn on_notification_hint(&self, hint: NotificationHint) {
        let running = self.lock_running();
        let Some(running) = running.as_ref() else {
            tracing::debug!(block_id = %hint.block_id, "Notifier not running, hint left in store");
            return;
        };
        if running.inbox.send(hint).is_err() {
            tracing::warn!("Notifier inbox closed, hint left in store");
        }
    }

    /// The loop's current wake-up time; `None` while parked or stopped.
    pub fn next_wake_at(&self) -> Option<Millis> {
        match self.wake_at.load(Ordering::Acquire) {
            NO_WAKE => None,
            at => Some(at),
        }
    }

    fn lock_running(&self) -> std::sync::MutexGuard<'_, Option<Running>> {
        self.running
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

async fn run_loop(
    frequencies: Arc<NotifyFrequencies>,
    processor: Arc<dyn HintProcessor>,
    shared_wake_at: Arc<AtomicI64>,
    mut inbox: mpsc::UnboundedReceiver<NotificationHint>,
    cancel: CancellationToken,
) {
    let mut wake_at: Option<Millis> = Some(now_millis());

    loop {
        shared_wake_at.store(wake_at.unwrap_or(NO_WAKE), Ordering::Release);
        let sleep_for = wake_at.map(|at| {
            let delta = at.saturating_sub(now_millis()).max(0);
            Duration::from_millis(u64::try_from(delta).unwrap_or(0))
        });

        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            _ = sleep_or_park(sleep_for) => {
                wake_at = run_pass(processor.as_ref(), &frequencies).await;
            }

            hint = inbox.recv() => match hint {
                Some(hint) => {
                    let at = frequencies.notify_at(&hint.block_type, hint.update_at);
                    wake_at = Some(earliest(wake_at, at));
                    tracing::debug!(block_id = %hint.block_id, notify_at = at, "Hint scheduled");
                }
                None => break,
            },
        }
    }

    tracing::debug!("Notifier loop exited");
}

async fn sleep_or_park(duration: Option<Duration>) {
    match duration {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending::<()>().await,
    }
}

/// Run one batch pass and decide the next wake-up time.
async fn run_pass(processor: &dyn HintProcessor, frequencies: &NotifyFrequencies) -> Option<Millis> {
    let now = now_millis();
    match processor.process_due(now).await {
        Ok(report) => {
            let next = report.next_notify_at;
            let processed = report.processed;
            if let Err(e) = report.into_result() {
                tracing::error!(processed, error = %e, "Notification batch finished with failures");
            } else if processed > 0 {
                tracing::info!(processed, "Notification batch finished");
            }
            next
        }
        Err(e) => {
            let retry = frequencies.fallback();
            tracing::error!(
                error = %e,
                retry_in_secs = retry.as_secs(),
                "Notification batch failed, retrying later"
            );
            Some(now.saturating_add(duration_millis(retry)))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
