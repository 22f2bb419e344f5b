//! Outbound SMS webhook dispatch.
//!
//! Fire-and-forget by contract: a failed dispatch is logged by the caller
//! and never rolls the message back.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::message::Message;
use crate::infra::error::AppError;
use crate::sync::contracts::{Notifier, NotifyError};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Serialize)]
struct SmsDispatch<'a> {
    message_id: String,
    recipient_phone: &'a str,
    content: &'a str,
}

#[derive(Debug, Clone)]
pub struct SmsWebhook {
    http: reqwest::Client,
    url: String,
    bearer: String,
}

impl SmsWebhook {
    pub fn new(url: String, bearer: String) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(AppError::HttpClient)?;

        Ok(Self { http, url, bearer })
    }
}

#[async_trait]
impl Notifier for SmsWebhook {
    async fn dispatch(&self, message: &Message) -> Result<(), NotifyError> {
        let Some(recipient) = message.recipient_phone.as_deref() else {
            tracing::debug!(message_id = %message.id, "no recipient phone; dispatch skipped");
            return Ok(());
        };

        let payload = SmsDispatch {
            message_id: message.id.to_string(),
            recipient_phone: recipient,
            content: &message.content,
        };
        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.bearer)
            .json(&payload)
            .send()
            .await
            .map_err(|error| NotifyError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

/// Used when no webhook is configured; sends complete without dispatch.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn dispatch(&self, _message: &Message) -> Result<(), NotifyError> {
        Ok(())
    }
}
