//! Webhook publisher: POSTs a JSON envelope to the topic URL.

use super::{Notification, PublishError, Publisher};

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::info;
use url::Url;

/// Attribute carrying the target ID.
pub const TARGET_ID_ATTRIBUTE: &str = "targetId";

#[derive(Debug, Serialize)]
struct Envelope<'a> {
    message: &'a Notification,
    attributes: BTreeMap<&'static str, &'a str>,
}

/// Publishes notifications to an HTTP topic endpoint.
#[derive(Clone)]
pub struct WebhookPublisher {
    client: reqwest::Client,
    topic: Url,
}

impl WebhookPublisher {
    pub fn new(topic: &str, timeout: Duration) -> Result<Self, PublishError> {
        let topic = Url::parse(topic).map_err(|e| PublishError::InvalidTopic(format!("{}: {}", topic, e)))?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, topic })
    }
}

#[async_trait]
impl Publisher for WebhookPublisher {
    async fn publish(&self, notification: &Notification, target_id: &str) -> Result<(), PublishError> {
        let envelope = Envelope {
            message: notification,
            attributes: BTreeMap::from([(TARGET_ID_ATTRIBUTE, target_id)]),
        };

        let response = self
            .client
            .post(self.topic.clone())
            .json(&envelope)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PublishError::Rejected(status.as_u16()));
        }

        info!(target_id, status = ?notification.status, topic = %self.topic, "notification published");
        Ok(())
    }
}
