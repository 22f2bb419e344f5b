use serde::Deserialize;

use crate::infra::config::{AppConfig, BackendConfig, LogConfig, NotifyConfig, SyncConfig};

#[derive(Debug, Deserialize, Default)]
pub struct FileConfig {
    pub logging: Option<FileLogConfig>,
    pub backend: Option<FileBackendConfig>,
    pub sync: Option<FileSyncConfig>,
    pub notify: Option<FileNotifyConfig>,
}

impl FileConfig {
    pub fn merge_into(self, config: &mut AppConfig) {
        if let Some(logging) = self.logging {
            logging.merge_into(&mut config.logging);
        }

        if let Some(backend) = self.backend {
            backend.merge_into(&mut config.backend);
        }

        if let Some(sync) = self.sync {
            sync.merge_into(&mut config.sync);
        }

        if let Some(notify) = self.notify {
            notify.merge_into(&mut config.notify);
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileLogConfig {
    pub level: Option<String>,
}

impl FileLogConfig {
    fn merge_into(self, config: &mut LogConfig) {
        if let Some(level) = self.level {
            config.level = level;
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileBackendConfig {
    pub url: Option<String>,
    pub anon_key: Option<String>,
    pub access_token: Option<String>,
}

impl FileBackendConfig {
    fn merge_into(self, config: &mut BackendConfig) {
        if let Some(url) = self.url {
            config.url = url;
        }

        if let Some(anon_key) = self.anon_key {
            config.anon_key = anon_key;
        }

        if let Some(access_token) = self.access_token {
            config.access_token = Some(access_token);
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileSyncConfig {
    pub page_size: Option<usize>,
    pub resubscribe_base_ms: Option<u64>,
    pub resubscribe_max_ms: Option<u64>,
    pub resubscribe_max_attempts: Option<u32>,
}

impl FileSyncConfig {
    fn merge_into(self, config: &mut SyncConfig) {
        if let Some(page_size) = self.page_size {
            config.page_size = page_size;
        }

        if let Some(base_ms) = self.resubscribe_base_ms {
            config.resubscribe_base_ms = base_ms;
        }

        if let Some(max_ms) = self.resubscribe_max_ms {
            config.resubscribe_max_ms = max_ms;
        }

        if let Some(max_attempts) = self.resubscribe_max_attempts {
            config.resubscribe_max_attempts = max_attempts;
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileNotifyConfig {
    pub sms_webhook_url: Option<String>,
}

impl FileNotifyConfig {
    fn merge_into(self, config: &mut NotifyConfig) {
        if let Some(url) = self.sms_webhook_url {
            config.sms_webhook_url = Some(url);
        }
    }
}
