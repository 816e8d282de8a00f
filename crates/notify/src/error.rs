//! Error type for the notification core.

use boardwatch_core::CoreError;
use boardwatch_db::StoreError;

use crate::delivery::DeliveryError;

/// Errors raised while scheduling, diffing, rendering or delivering.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// A store call failed; `context` names the operation and the block.
    #[error("{context}: {source}")]
    Store {
        context: String,
        #[source]
        source: StoreError,
    },

    /// A block, board or card needed for a hint does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A domain-level error, e.g. a malformed board property schema.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A notification template failed to parse or render.
    #[error("Template {name} failed: {reason}")]
    Template { name: String, reason: String },

    /// Handing a rendered notification to a delivery channel failed.
    #[error("Delivery to {subscriber_id} failed: {source}")]
    Delivery {
        subscriber_id: String,
        #[source]
        source: DeliveryError,
    },

    /// A diff was attached below the supported tree depth.
    #[error("Diff for block {block_id} exceeds the maximum depth of {max}")]
    DiffTooDeep { block_id: String, max: usize },

    /// Several independent failures collected during one batch.
    #[error("{} notification failure(s): {}", .0.len(), join_errors(.0))]
    Multiple(Vec<NotifyError>),
}

impl NotifyError {
    /// Wrap a store error with the operation that produced it.
    pub fn store(context: impl Into<String>, source: StoreError) -> Self {
        Self::Store {
            context: context.into(),
            source,
        }
    }

    /// Whether the failure only affects one hint and should be logged and
    /// skipped rather than reported as a batch failure.
    pub fn is_skippable(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Core(CoreError::InvalidPropSchema { .. }) => true,
            Self::Core(CoreError::NotFound { .. }) => true,
            Self::Store { source, .. } => source.is_not_found(),
            _ => false,
        }
    }
}

fn join_errors(errors: &[NotifyError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
