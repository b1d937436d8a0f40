use std::sync::Arc;

use anyhow::{Context, Result};
use async_nats::Client;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::messages::{extract_attempt_id, payload_keys, ResultTopic};
use crate::correlator::{AttemptId, ResultHub};

pub struct NatsClient {
    client: Client,
    user_id: String,
    subject_prefix: String,
}

impl NatsClient {
    /// Connect to NATS server
    pub async fn connect(url: &str, user_id: impl Into<String>, subject_prefix: impl Into<String>) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self {
            client,
            user_id: user_id.into(),
            subject_prefix: subject_prefix.into(),
        })
    }

    pub fn subject(&self, topic: ResultTopic) -> String {
        topic.subject(&self.subject_prefix, &self.user_id)
    }

    /// Subscribe to every result subject of the user
    pub async fn subscribe_results(&self) -> Result<Vec<(ResultTopic, async_nats::Subscriber)>> {
        let mut subscriptions = Vec::with_capacity(ResultTopic::ALL.len());

        for topic in ResultTopic::ALL {
            let subject = self.subject(topic);
            let subscriber = self
                .client
                .subscribe(subject.clone())
                .await
                .with_context(|| format!("Failed to subscribe to {}", subject))?;
            info!("Subscribed to {}", subject);
            subscriptions.push((topic, subscriber));
        }

        Ok(subscriptions)
    }

    /// Subscribe and forward every extracted attempt id into the hub
    pub async fn start_result_feed(&self, hub: Arc<ResultHub>) -> Result<JoinHandle<()>> {
        let subscriptions = self.subscribe_results().await?;
        Ok(forward_results(subscriptions, hub))
    }

    /// Flush pending traffic and drop this client's connection handle.
    /// Subscriptions handed to the result feed keep their own handle, so stop
    /// the feed first.
    pub async fn flush_and_close(self) -> Result<()> {
        self.client.flush().await.context("Failed to flush NATS connection")?;
        drop(self.client);
        info!("NATS connection closed");
        Ok(())
    }
}

/// Spawn the task draining all result subscriptions into the hub
pub fn forward_results(
    subscriptions: Vec<(ResultTopic, async_nats::Subscriber)>,
    hub: Arc<ResultHub>,
) -> JoinHandle<()> {
    let streams = subscriptions
        .into_iter()
        .map(|(topic, subscriber)| subscriber.map(move |msg| (topic, msg)).boxed());
    let mut merged = stream::select_all(streams);

    tokio::spawn(async move {
        while let Some((topic, msg)) = merged.next().await {
            dispatch_payload(topic, &msg.payload, &hub);
        }
        info!("Result feed closed");
    })
}

/// Decode one message and publish its attempt id. Messages without an id
/// and malformed payloads are logged and dropped.
pub fn dispatch_payload(topic: ResultTopic, payload: &[u8], hub: &ResultHub) -> Option<AttemptId> {
    let value: Value = match serde_json::from_slice(payload) {
        Ok(value) => value,
        Err(e) => {
            error!("Failed to parse {} message: {}", topic.name(), e);
            return None;
        }
    };

    let Some(attempt_id) = extract_attempt_id(topic, &value) else {
        warn!(
            "{} message has no attempt id (keys: {:?})",
            topic.name(),
            payload_keys(&value)
        );
        return None;
    };

    let delivered = hub.publish(attempt_id.clone());
    debug!("Attempt {} from {} delivered to {} listeners", attempt_id, topic.name(), delivered);
    Some(attempt_id)
}
