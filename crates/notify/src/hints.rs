//! Notification hint persistence.
//!
//! [`HintStore`] is the only code that reads or writes hints. It applies
//! the per-kind frequency on upsert and hands out due hints one at a time,
//! removing each as it is taken.

use std::sync::Arc;

use boardwatch_core::{Millis, NotificationHint, NotifyFrequencies};
use boardwatch_db::Store;

use crate::error::NotifyError;

/// Outcome of asking for the next hint.
#[derive(Debug, Clone, PartialEq)]
pub enum NextHint {
    /// A hint whose time has come; it has been removed from the store.
    Due(NotificationHint),
    /// The earliest pending hint is not due until this time.
    Pending(Millis),
    /// No hints are pending.
    Empty,
}

/// Hint persistence over a [`Store`].
#[derive(Clone)]
pub struct HintStore {
    store: Arc<dyn Store>,
    frequencies: Arc<NotifyFrequencies>,
}

impl HintStore {
    pub fn new(store: Arc<dyn Store>, frequencies: Arc<NotifyFrequencies>) -> Self {
        Self { store, frequencies }
    }

    pub fn frequencies(&self) -> &NotifyFrequencies {
        &self.frequencies
    }

    /// Record a pending change, scheduling it by the hint's block kind.
    pub async fn upsert(&self, hint: &NotificationHint) -> Result<NotificationHint, NotifyError> {
        let freq = self.frequencies.get(&hint.block_type);
        self.store
            .upsert_notification_hint(hint, freq)
            .await
            .map_err(|e| NotifyError::store(format!("upsert hint for {}", hint.block_id), e))
    }

    /// Put a taken hint back so it comes due again one frequency period
    /// after `now`.
    pub async fn reschedule(
        &self,
        hint: &NotificationHint,
        now: Millis,
    ) -> Result<NotificationHint, NotifyError> {
        let mut retry = hint.clone();
        retry.update_at = retry.update_at.max(now);
        self.upsert(&retry).await
    }

    /// Take the earliest hint if it is due at `now`.
    pub async fn next_due(&self, now: Millis) -> Result<NextHint, NotifyError> {
        let next = match self.store.get_next_notification_hint(false).await {
            Ok(hint) => hint,
            Err(e) if e.is_not_found() => return Ok(NextHint::Empty),
            Err(e) => return Err(NotifyError::store("peek next hint", e)),
        };

        if next.notify_at > now {
            return Ok(NextHint::Pending(next.notify_at));
        }

        match self.store.get_next_notification_hint(true).await {
            Ok(hint) => Ok(NextHint::Due(hint)),
            // Taken by another instance between the peek and the take.
            Err(e) if e.is_not_found() => Ok(NextHint::Empty),
            Err(e) => Err(NotifyError::store("take next hint", e)),
        }
    }

    /// When the earliest pending hint is due, if any.
    pub async fn next_notify_at(&self) -> Result<Option<Millis>, NotifyError> {
        match self.store.get_next_notification_hint(false).await {
            Ok(hint) => Ok(Some(hint.notify_at)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(NotifyError::store("peek next hint", e)),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
