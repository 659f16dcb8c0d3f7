//! Best-effort failure notifications.

use std::sync::Arc;

use tracing::{debug, error};

use crate::contract::Notifier;

/// Subject line of every failure notification.
pub const FAILURE_SUBJECT: &str = "CUR Manager Failure";

/// Publishes failure messages to the configured topic, if any. Publishing problems
/// are logged and otherwise ignored.
#[derive(Clone)]
pub struct FailureReporter {
    notifier: Arc<dyn Notifier>,
    topic: Option<String>,
}

impl FailureReporter {
    pub fn new(notifier: Arc<dyn Notifier>, topic: Option<String>) -> Self {
        Self { notifier, topic }
    }

    pub fn is_enabled(&self) -> bool {
        self.topic.is_some()
    }

    pub async fn report(&self, message: &str) {
        let Some(topic) = self.topic.as_deref() else {
            debug!(message, "[NOTIFY] No topic configured, skipping notification");
            return;
        };

        if let Err(e) = self.notifier.publish(topic, FAILURE_SUBJECT, message).await {
            error!(topic, error = %e, "[NOTIFY] Failed to send failure notification");
        }
    }
}
