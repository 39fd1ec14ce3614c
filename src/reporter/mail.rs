//! SMTP mail channel, implicit TLS.
//!
//! `lettre`'s blocking transport runs on the blocking pool.

use crate::config::MailConfig;
use crate::error::NotificationError;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use super::Notifier;

const CHANNEL: &str = "mail";

/// Mails the report as an attachment
pub struct MailNotifier {
    host: String,
    port: u16,
    username: String,
    password: String,
    from: String,
    to: String,
    timeout: Duration,
}

impl MailNotifier {
    /// Notifier for `[notification.fallback]`
    pub fn from_config(config: &MailConfig) -> Self {
        Self {
            host: config.smtp_host.clone(),
            port: config.smtp_port,
            username: config.username.clone(),
            password: config.password.clone(),
            from: config.from.clone(),
            to: config.to.clone(),
            timeout: config.timeout,
        }
    }

    fn build_message(
        &self,
        file_name: String,
        report: Vec<u8>,
        caption: &str,
    ) -> Result<Message, NotificationError> {
        let from: Mailbox = self.from.parse().map_err(|e| rejected(format!("from: {e}")))?;
        let to: Mailbox = self.to.parse().map_err(|e| rejected(format!("to: {e}")))?;
        let subject = caption.lines().next().unwrap_or("stockfetch run report");

        Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::plain(caption.to_string()))
                    .singlepart(Attachment::new(file_name).body(report, ContentType::TEXT_PLAIN)),
            )
            .map_err(|e| rejected(e.to_string()))
    }
}

#[async_trait::async_trait]
impl Notifier for MailNotifier {
    async fn send_document(&self, path: &Path, caption: &str) -> Result<(), NotificationError> {
        let report = tokio::fs::read(path)
            .await
            .map_err(|source| NotificationError::Report {
                path: path.to_path_buf(),
                source,
            })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "run.log".to_string());
        let message = self.build_message(file_name, report, caption)?;

        let mailer = SmtpTransport::relay(&self.host)
            .map_err(|e| NotificationError::Transport {
                channel: CHANNEL,
                reason: e.to_string(),
            })?
            .port(self.port)
            .credentials(Credentials::new(
                self.username.clone(),
                self.password.clone(),
            ))
            .timeout(Some(self.timeout))
            .build();

        let sent = tokio::task::spawn_blocking(move || mailer.send(&message))
            .await
            .map_err(|e| NotificationError::Transport {
                channel: CHANNEL,
                reason: format!("mail task failed: {e}"),
            })?;

        match sent {
            Ok(_) => {
                debug!(to = %self.to, "report mailed");
                Ok(())
            }
            Err(e) if e.is_permanent() => Err(rejected(e.to_string())),
            Err(e) => Err(NotificationError::Transport {
                channel: CHANNEL,
                reason: e.to_string(),
            }),
        }
    }

    fn channel(&self) -> &'static str {
        CHANNEL
    }
}

fn rejected(reason: String) -> NotificationError {
    NotificationError::Rejected {
        channel: CHANNEL,
        reason,
    }
}
