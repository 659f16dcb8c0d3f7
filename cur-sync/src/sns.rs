//! [`Notifier`] backed by `aws-sdk-sns`.

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_sns::Client;

use cur_sync_core::contract::Notifier;
use cur_sync_core::error::BackendError;

use crate::aws::classify;

#[derive(Clone)]
pub struct SnsNotifier {
    client: Client,
}

impl SnsNotifier {
    pub fn new(sdk: &SdkConfig) -> Self {
        Self {
            client: Client::new(sdk),
        }
    }
}

#[async_trait]
impl Notifier for SnsNotifier {
    async fn publish(&self, topic: &str, subject: &str, message: &str) -> Result<(), BackendError> {
        self.client
            .publish()
            .topic_arn(topic)
            .subject(subject)
            .message(message)
            .send()
            .await
            .map_err(|e| classify("Publish", &e))?;
        Ok(())
    }
}
