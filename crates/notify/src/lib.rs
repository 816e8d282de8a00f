//! Change notifications for boards and cards.
//!
//! Block changes flow through [`NotifyService`], which fans each event out
//! to its [`Backend`]s on a bounded [`AsyncTaskPool`]. The subscription
//! backend coalesces changes into notification hints, and the [`Notifier`]
//! loop wakes when the earliest hint is due. For each due hint the
//! [`Dispatcher`] builds [`Diff`]s from block history, renders them to
//! markdown and hands them to a [`Delivery`] channel.
//!
//! - [`pool`]: bounded worker pool with panic isolation and graceful drain.
//! - [`hints`]: hint upsert and due-hint selection over the store.
//! - [`notifier`]: the wake-up scheduling loop.
//! - [`diff`]: diff generation from block history.
//! - [`render`]: markdown text diffs, templates and attachments.
//! - [`delivery`]: log and webhook delivery channels.
//! - [`backend`]: subscription, mention and logger backends.

pub mod backend;
pub mod config;
pub mod delivery;
pub mod diff;
pub mod dispatcher;
pub mod error;
pub mod hints;
pub mod notifier;
pub mod pool;
pub mod render;
pub mod service;

pub use backend::{
    extract_mentions, Backend, LoggerBackend, MentionListener, MentionsBackend,
    SubscriptionBackend,
};
pub use config::NotifyConfig;
pub use delivery::{
    Delivery, DeliveryError, LogDelivery, NotificationKind, RenderedNotification, WebhookDelivery,
};
pub use diff::{Diff, DiffGenerator, PropDiff, SchemaDiff};
pub use dispatcher::Dispatcher;
pub use error::NotifyError;
pub use hints::{HintStore, NextHint};
pub use notifier::{BatchReport, HintProcessor, Notifier};
pub use pool::{AsyncTaskPool, PoolConfig, PoolState};
pub use service::NotifyService;
