//! event-bus: the normalized event envelope and its transport.
//!
//! Events are transient signals on one logical topic; they have no identity
//! beyond their report key once they reach storage. The transport delivers
//! at-least-once, so every consumer must be redelivery-safe.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::{Stream, StreamExt};
use intel_core::IntelError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;

/// Event kinds carried on the analysis topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "SIGNIFICANT_NEWS")]
    SignificantNews,
    #[serde(rename = "SEC_FILING")]
    SecFiling,
    #[serde(rename = "SCHEDULED")]
    Scheduled,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::SignificantNews => "SIGNIFICANT_NEWS",
            EventKind::SecFiling => "SEC_FILING",
            EventKind::Scheduled => "SCHEDULED",
        }
    }
}

/// The wire envelope. Field names are pinned to the JSON contract; consumers
/// must call `validate` before acting on a deserialized envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    pub event_type: EventKind,
    pub ticker: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

impl EventEnvelope {
    pub fn news(
        ticker: impl Into<String>,
        headline: impl Into<String>,
        url: impl Into<String>,
        published_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_type: EventKind::SignificantNews,
            ticker: ticker.into(),
            headline: Some(headline.into()),
            form: None,
            url: Some(url.into()),
            published_at: Some(published_at),
        }
    }

    pub fn filing(
        ticker: impl Into<String>,
        form: impl Into<String>,
        url: impl Into<String>,
        filed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_type: EventKind::SecFiling,
            ticker: ticker.into(),
            headline: None,
            form: Some(form.into()),
            url: Some(url.into()),
            published_at: Some(filed_at),
        }
    }

    pub fn scheduled(ticker: impl Into<String>, as_of: DateTime<Utc>) -> Self {
        Self {
            event_type: EventKind::Scheduled,
            ticker: ticker.into(),
            headline: None,
            form: None,
            url: None,
            published_at: Some(as_of),
        }
    }

    /// Boundary validation: required fields per event kind. Payloads are
    /// validated here, not trusted implicitly by downstream consumers.
    pub fn validate(&self) -> Result<(), IntelError> {
        if self.ticker.trim().is_empty() {
            return Err(IntelError::BusError("envelope missing ticker".to_string()));
        }
        match self.event_type {
            EventKind::SignificantNews => {
                if self.headline.as_deref().unwrap_or("").is_empty() {
                    return Err(IntelError::BusError(
                        "news envelope missing headline".to_string(),
                    ));
                }
                if self.url.as_deref().unwrap_or("").is_empty() {
                    return Err(IntelError::BusError("news envelope missing url".to_string()));
                }
            }
            EventKind::SecFiling => {
                if self.form.as_deref().unwrap_or("").is_empty() {
                    return Err(IntelError::BusError(
                        "filing envelope missing form".to_string(),
                    ));
                }
                if self.url.as_deref().unwrap_or("").is_empty() {
                    return Err(IntelError::BusError(
                        "filing envelope missing url".to_string(),
                    ));
                }
            }
            EventKind::Scheduled => {
                if self.published_at.is_none() {
                    return Err(IntelError::BusError(
                        "scheduled envelope missing publishedAt".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// The report idempotency key: the source URL, or for keyless events a
    /// digest over stable fields so redelivery of the same message dedups
    /// while genuinely different events do not.
    pub fn report_key(&self) -> String {
        if let Some(url) = self.url.as_deref().filter(|u| !u.is_empty()) {
            return url.to_string();
        }
        let mut hasher = Sha256::new();
        hasher.update(self.event_type.as_str().as_bytes());
        hasher.update(b"|");
        hasher.update(self.ticker.as_bytes());
        hasher.update(b"|");
        hasher.update(
            self.headline
                .as_deref()
                .or(self.form.as_deref())
                .unwrap_or("")
                .as_bytes(),
        );
        hasher.update(b"|");
        hasher.update(
            self.published_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_default()
                .as_bytes(),
        );
        format!("event:{}", hex::encode(hasher.finalize()))
    }
}

/// Publisher side of the analysis topic
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, event: &EventEnvelope) -> Result<(), IntelError>;
}

/// Redis pub/sub transport over one logical topic.
pub struct RedisEventBus {
    client: redis::Client,
    manager: redis::aio::ConnectionManager,
    topic: String,
}

impl RedisEventBus {
    pub async fn connect(redis_url: &str, topic: impl Into<String>) -> Result<Self, IntelError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| IntelError::BusError(format!("bad redis url: {}", e)))?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(|e| IntelError::BusError(format!("redis connect failed: {}", e)))?;
        Ok(Self {
            client,
            manager,
            topic: topic.into(),
        })
    }

    /// Subscribe to the topic. Undecodable payloads are logged and skipped;
    /// they are permanent data-shape failures, not retried.
    pub async fn subscribe(
        &self,
    ) -> Result<impl Stream<Item = EventEnvelope> + Send, IntelError> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| IntelError::BusError(format!("redis subscribe failed: {}", e)))?;
        pubsub
            .subscribe(&self.topic)
            .await
            .map_err(|e| IntelError::BusError(format!("redis subscribe failed: {}", e)))?;

        Ok(pubsub.into_on_message().filter_map(|msg| async move {
            let payload: String = match msg.get_payload() {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!("Dropping non-text bus message: {}", e);
                    return None;
                }
            };
            match serde_json::from_str::<EventEnvelope>(&payload) {
                Ok(envelope) => Some(envelope),
                Err(e) => {
                    tracing::warn!("Dropping undecodable bus message: {}", e);
                    None
                }
            }
        }))
    }
}

#[async_trait]
impl EventBus for RedisEventBus {
    async fn publish(&self, event: &EventEnvelope) -> Result<(), IntelError> {
        event.validate()?;
        let payload = serde_json::to_string(event)
            .map_err(|e| IntelError::BusError(e.to_string()))?;
        let mut conn = self.manager.clone();
        let _: i64 = redis::AsyncCommands::publish(&mut conn, &self.topic, payload)
            .await
            .map_err(|e| IntelError::BusError(format!("publish failed: {}", e)))?;
        Ok(())
    }
}

/// In-process transport for tests and single-process runs.
pub struct InMemoryBus {
    tx: mpsc::UnboundedSender<EventEnvelope>,
}

impl InMemoryBus {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<EventEnvelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl EventBus for InMemoryBus {
    async fn publish(&self, event: &EventEnvelope) -> Result<(), IntelError> {
        event.validate()?;
        self.tx
            .send(event.clone())
            .map_err(|_| IntelError::BusError("bus receiver dropped".to_string()))
    }
}
