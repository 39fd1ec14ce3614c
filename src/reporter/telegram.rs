//! Telegram bot `sendDocument` channel.

use crate::config::TelegramConfig;
use crate::error::NotificationError;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use super::Notifier;

const CHANNEL: &str = "telegram";

/// Telegram caps document captions at 1024 characters
const MAX_CAPTION_CHARS: usize = 1024;

/// Uploads the report as a document to one chat
pub struct TelegramNotifier {
    client: reqwest::Client,
    endpoint: String,
    chat_id: String,
    timeout: Duration,
}

#[derive(Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

impl TelegramNotifier {
    /// Notifier for `[notification.primary]`
    pub fn from_config(config: &TelegramConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: format!(
                "{}/bot{}/sendDocument",
                config.api_base.trim_end_matches('/'),
                config.bot_token
            ),
            chat_id: config.chat_id.clone(),
            timeout: config.timeout,
        }
    }
}

#[async_trait::async_trait]
impl Notifier for TelegramNotifier {
    async fn send_document(&self, path: &Path, caption: &str) -> Result<(), NotificationError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| NotificationError::Report {
                path: path.to_path_buf(),
                source,
            })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "run.log".to_string());

        let form = Form::new()
            .text("chat_id", self.chat_id.clone())
            .text("caption", truncate_caption(caption))
            .part("document", Part::bytes(bytes).file_name(file_name));

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| NotificationError::Transport {
                channel: CHANNEL,
                reason: e.to_string(),
            })?;

        let status = response.status();
        // A failing gateway is as good as unreachable
        if status.is_server_error() {
            return Err(NotificationError::Transport {
                channel: CHANNEL,
                reason: format!("server returned {status}"),
            });
        }

        let body: Option<ApiResponse> = response.json().await.ok();
        match body {
            Some(ApiResponse { ok: true, .. }) if status.is_success() => {
                debug!(chat_id = %self.chat_id, "report uploaded");
                Ok(())
            }
            Some(ApiResponse { description, .. }) => Err(NotificationError::Rejected {
                channel: CHANNEL,
                reason: description.unwrap_or_else(|| format!("status {status}")),
            }),
            None => Err(NotificationError::Rejected {
                channel: CHANNEL,
                reason: format!("status {status}, unreadable response body"),
            }),
        }
    }

    fn channel(&self) -> &'static str {
        CHANNEL
    }
}

fn truncate_caption(caption: &str) -> String {
    caption.chars().take(MAX_CAPTION_CHARS).collect()
}
