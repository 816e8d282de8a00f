//! Boardwatch domain model.
//!
//! Pure types and functions shared by the store and the notification
//! subsystem. This crate has no internal dependencies and performs no I/O.
//!
//! - [`block`]: content blocks (boards, cards, text, comments) and their
//!   schemaless field documents.
//! - [`hint`]: the [`NotificationHint`] record marking pending changes.
//! - [`subscription`]: subscriptions, subscribers, users and board members.
//! - [`event`]: the [`BlockChangeEvent`] emitted by the application layer.
//! - [`schema`]: a board's custom property schema.
//! - [`frequency`]: per-block-type notification frequencies.

pub mod block;
pub mod error;
pub mod event;
pub mod frequency;
pub mod hint;
pub mod schema;
pub mod subscription;
pub mod types;

pub use block::{Block, BlockKind};
pub use error::CoreError;
pub use event::{BlockChangeEvent, ChangeAction};
pub use frequency::NotifyFrequencies;
pub use hint::NotificationHint;
pub use schema::{PropDef, PropOption, PropSchema};
pub use subscription::{BoardMember, Subscriber, SubscriberType, Subscription, User};
pub use types::{now_millis, Millis};
