use serde::{Deserialize, Serialize};

use crate::sync::backoff::BackoffPolicy;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AppConfig {
    pub logging: LogConfig,
    pub backend: BackendConfig,
    pub sync: SyncConfig,
    pub notify: NotifyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogConfig {
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackendConfig {
    /// Project base URL; REST, auth, and realtime endpoints hang off it.
    pub url: String,
    pub anon_key: String,
    /// Signed-in user's JWT. Falls back to the anon key when absent.
    pub access_token: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:54321".to_owned(),
            anon_key: "replace-me".to_owned(),
            access_token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncConfig {
    pub page_size: usize,
    pub resubscribe_base_ms: u64,
    pub resubscribe_max_ms: u64,
    pub resubscribe_max_attempts: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: 50,
            resubscribe_base_ms: 500,
            resubscribe_max_ms: 30_000,
            resubscribe_max_attempts: 6,
        }
    }
}

impl SyncConfig {
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            base_ms: self.resubscribe_base_ms,
            max_ms: self.resubscribe_max_ms,
            max_attempts: self.resubscribe_max_attempts,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct NotifyConfig {
    /// SMS dispatch function URL. Unset disables outbound notification.
    pub sms_webhook_url: Option<String>,
}
