//! # Plan Notification Publisher
//!
//! Fire-and-forget lifecycle notifications emitted after a committed
//! execution. Delivery runs on a spawned task; failures are logged and
//! never surfaced to the execution path.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Notification delivery failed: {0}")]
    DeliveryFailed(String),
}

/// Structured lifecycle notifications for plan owners.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlanNotification {
    PlanExecuted {
        plan_id: Uuid,
        owner_id: Uuid,
        execution_number: i32,
        amount_in: i64,
        amount_out: BigDecimal,
        ledger_tx_id: String,
        occurred_at: DateTime<Utc>,
    },
    PlanCompleted {
        plan_id: Uuid,
        owner_id: Uuid,
        total_executions: i32,
        occurred_at: DateTime<Utc>,
    },
    PlanExecutionFailed {
        plan_id: Uuid,
        owner_id: Uuid,
        execution_number: i32,
        reason: String,
        occurred_at: DateTime<Utc>,
    },
}

impl PlanNotification {
    pub fn plan_id(&self) -> Uuid {
        match self {
            PlanNotification::PlanExecuted { plan_id, .. }
            | PlanNotification::PlanCompleted { plan_id, .. }
            | PlanNotification::PlanExecutionFailed { plan_id, .. } => *plan_id,
        }
    }
}

/// Delivery channel for notifications (mail gateway, message bus, ...).
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, notification: &PlanNotification) -> Result<(), NotificationError>;

    fn sink_name(&self) -> &'static str;
}

/// Sink that logs notifications as structured JSON lines.
#[derive(Debug, Default)]
pub struct LoggingNotificationSink;

#[async_trait]
impl NotificationSink for LoggingNotificationSink {
    async fn deliver(&self, notification: &PlanNotification) -> Result<(), NotificationError> {
        let payload = serde_json::to_string(notification)
            .map_err(|e| NotificationError::DeliveryFailed(e.to_string()))?;
        info!(notification = %payload, "plan notification");
        Ok(())
    }

    fn sink_name(&self) -> &'static str {
        "logging"
    }
}

/// Publishes notifications without blocking the caller.
#[derive(Clone)]
pub struct NotificationPublisher {
    sink: Arc<dyn NotificationSink>,
}

impl std::fmt::Debug for NotificationPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationPublisher")
            .field("sink", &self.sink.sink_name())
            .finish()
    }
}

impl NotificationPublisher {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self { sink }
    }

    /// Dispatch on a spawned task. Never blocks, never fails the caller.
    pub fn publish(&self, notification: PlanNotification) {
        let sink = Arc::clone(&self.sink);
        tokio::spawn(async move {
            if let Err(e) = sink.deliver(&notification).await {
                warn!(
                    plan_id = %notification.plan_id(),
                    sink = sink.sink_name(),
                    error = %e,
                    "notification delivery failed"
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    struct ChannelSink {
        sender: mpsc::UnboundedSender<PlanNotification>,
    }

    #[async_trait]
    impl NotificationSink for ChannelSink {
        async fn deliver(&self, notification: &PlanNotification) -> Result<(), NotificationError> {
            self.sender
                .send(notification.clone())
                .map_err(|e| NotificationError::DeliveryFailed(e.to_string()))
        }

        fn sink_name(&self) -> &'static str {
            "channel"
        }
    }

    #[tokio::test]
    async fn test_publish_delivers_asynchronously() {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let publisher = NotificationPublisher::new(Arc::new(ChannelSink { sender }));

        let notification = PlanNotification::PlanCompleted {
            plan_id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            total_executions: 12,
            occurred_at: Utc::now(),
        };
        publisher.publish(notification.clone());

        let delivered = receiver.recv().await.unwrap();
        assert_eq!(delivered, notification);
    }

    #[tokio::test]
    async fn test_failed_delivery_does_not_propagate() {
        let (sender, receiver) = mpsc::unbounded_channel();
        drop(receiver); // every send now fails
        let publisher = NotificationPublisher::new(Arc::new(ChannelSink { sender }));

        publisher.publish(PlanNotification::PlanExecutionFailed {
            plan_id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            execution_number: 1,
            reason: "price unavailable".to_string(),
            occurred_at: Utc::now(),
        });

        // Nothing to assert beyond "no panic reaches the caller".
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
}
