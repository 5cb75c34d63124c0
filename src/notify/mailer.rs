//! Outgoing mail
//!
//! Messages are queued on a bounded channel and delivered by a single worker
//! task. A full queue drops the message with a warning instead of blocking
//! the caller.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::Args;
use crate::types::{ApiError, Result};

/// A plain-text mail message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Mail transport
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &MailMessage) -> Result<()>;
}

/// Writes messages to the log instead of sending them
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &MailMessage) -> Result<()> {
        info!(to = %message.to, subject = %message.subject, "Mail (log only)");
        Ok(())
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    body: &'a str,
}

/// Relays messages as JSON to an HTTP endpoint
pub struct WebhookMailer {
    url: String,
    from: String,
    http_client: reqwest::Client,
}

impl WebhookMailer {
    pub fn new(url: String, from: String) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ApiError::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            url,
            from,
            http_client,
        })
    }
}

#[async_trait]
impl Mailer for WebhookMailer {
    async fn send(&self, message: &MailMessage) -> Result<()> {
        let response = self
            .http_client
            .post(&self.url)
            .json(&WebhookPayload {
                from: &self.from,
                to: &message.to,
                subject: &message.subject,
                body: &message.body,
            })
            .send()
            .await
            .map_err(|e| ApiError::Internal(format!("Mail relay unreachable: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Internal(format!("Mail relay answered {}", status)));
        }
        Ok(())
    }
}

/// Pick the mailer the configuration asks for
pub fn mailer_from_args(args: &Args) -> Result<Arc<dyn Mailer>> {
    match &args.mail_webhook_url {
        Some(url) => {
            info!("Mail relayed to {}", url);
            Ok(Arc::new(WebhookMailer::new(url.clone(), args.mail_from.clone())?))
        }
        None => {
            info!("No MAIL_WEBHOOK_URL set, mail is only logged");
            Ok(Arc::new(LogMailer))
        }
    }
}

/// Handle for queueing mail to the delivery worker
#[derive(Clone)]
pub struct MailOutbox {
    sender: mpsc::Sender<MailMessage>,
}

impl MailOutbox {
    /// Start the delivery worker
    pub fn start(mailer: Arc<dyn Mailer>, capacity: usize) -> (Self, tokio::task::JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::channel::<MailMessage>(capacity.max(1));

        let handle = tokio::spawn(async move {
            while let Some(message) = receiver.recv().await {
                match mailer.send(&message).await {
                    Ok(()) => debug!(to = %message.to, "Mail delivered"),
                    Err(e) => warn!(to = %message.to, "Mail delivery failed: {}", e),
                }
            }
            debug!("Mail outbox closed, stopping worker");
        });

        (Self { sender }, handle)
    }

    /// Queue a message. Returns false when it was dropped.
    pub fn enqueue(&self, message: MailMessage) -> bool {
        match self.sender.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(message)) => {
                warn!(to = %message.to, "Mail queue full, dropping message");
                false
            }
            Err(mpsc::error::TrySendError::Closed(message)) => {
                warn!(to = %message.to, "Mail worker stopped, dropping message");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::time::{timeout, Duration};

    /// Collects delivered messages
    struct RecordingMailer {
        sent: Mutex<Vec<MailMessage>>,
        notify: tokio::sync::Notify,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, message: &MailMessage) -> Result<()> {
            self.sent.lock().unwrap().push(message.clone());
            self.notify.notify_one();
            Ok(())
        }
    }

    fn message(to: &str) -> MailMessage {
        MailMessage {
            to: to.into(),
            subject: "Θέμα".into(),
            body: "Κείμενο".into(),
        }
    }

    #[tokio::test]
    async fn test_outbox_delivers() {
        let mailer = Arc::new(RecordingMailer {
            sent: Mutex::new(Vec::new()),
            notify: tokio::sync::Notify::new(),
        });
        let (outbox, _handle) = MailOutbox::start(mailer.clone(), 4);

        assert!(outbox.enqueue(message("a@example.org")));
        timeout(Duration::from_secs(1), mailer.notify.notified())
            .await
            .expect("mail not delivered");

        assert_eq!(mailer.sent.lock().unwrap()[0].to, "a@example.org");
    }

    #[tokio::test]
    async fn test_full_queue_drops() {
        // Channel with no worker draining it
        let (sender, _receiver) = mpsc::channel(1);
        let outbox = MailOutbox { sender };

        assert!(outbox.enqueue(message("a@example.org")));
        assert!(!outbox.enqueue(message("b@example.org")));
    }
}
