//! Status notifications.

mod webhook;

pub use webhook::*;

use crate::escalation::Status;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// Publish error types.
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("publish request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("topic rejected notification with status {0}")]
    Rejected(u16),
    #[error("invalid topic url: {0}")]
    InvalidTopic(String),
}

/// Notification payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub status: Status,
}

/// Fire-and-forget publish channel bound to one topic.
///
/// `target_id` travels as a message attribute so subscribers can filter on it.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, notification: &Notification, target_id: &str) -> Result<(), PublishError>;
}
