//! Outbound Mail
//!
//! [`MailSender`] is the delivery seam. Three implementations ship:
//! - [`HttpMailer`] posts to a transactional mail HTTP API (Brevo-style JSON)
//! - [`LogMailer`] writes the message to the log, for development
//! - [`RecordingMailer`] keeps messages in memory and can be told to fail

use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("No recipients")]
    NoRecipients,

    #[error("Mail transport error: {0}")]
    Transport(String),

    #[error("Mail API rejected the message ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// Mail delivery interface
#[trait_variant::make(MailSender: Send)]
pub trait LocalMailSender {
    async fn send(&self, subject: &str, html_body: &str, to: &[String]) -> Result<(), MailError>;
}

/// Sender identity shown in the `From` header
#[derive(Debug, Clone)]
pub struct MailIdentity {
    pub name: String,
    pub address: String,
}

impl Default for MailIdentity {
    fn default() -> Self {
        Self {
            name: "Auth Service".to_string(),
            address: "no-reply@localhost".to_string(),
        }
    }
}

#[derive(Serialize)]
struct Address<'a> {
    name: Option<&'a str>,
    email: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiMessage<'a> {
    sender: Address<'a>,
    to: Vec<Address<'a>>,
    subject: &'a str,
    html_content: &'a str,
}

/// HTTP API mail sender
pub struct HttpMailer {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    from: MailIdentity,
}

impl HttpMailer {
    pub fn new(endpoint: String, api_key: String, from: MailIdentity) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            endpoint,
            api_key,
            from,
        }
    }
}

impl MailSender for HttpMailer {
    async fn send(&self, subject: &str, html_body: &str, to: &[String]) -> Result<(), MailError> {
        if to.is_empty() {
            return Err(MailError::NoRecipients);
        }

        let message = ApiMessage {
            sender: Address {
                name: Some(&self.from.name),
                email: &self.from.address,
            },
            to: to
                .iter()
                .map(|email| Address {
                    name: None,
                    email: email.as_str(),
                })
                .collect(),
            subject,
            html_content: html_body,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("api-key", &self.api_key)
            .json(&message)
            .send()
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MailError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(recipients = to.len(), subject, "Mail accepted by API");
        Ok(())
    }
}

/// Logs instead of sending
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

impl MailSender for LogMailer {
    async fn send(&self, subject: &str, html_body: &str, to: &[String]) -> Result<(), MailError> {
        if to.is_empty() {
            return Err(MailError::NoRecipients);
        }
        tracing::info!(to = ?to, subject, body = html_body, "Mail (log only)");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMail {
    pub subject: String,
    pub html_body: String,
    pub to: Vec<String>,
}

/// In-memory sender that records every message
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<SentMail>>,
    failures_left: Mutex<u32>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` sends fail with a transport error
    pub fn fail_next(&self, n: u32) {
        if let Ok(mut left) = self.failures_left.lock() {
            *left = n;
        }
    }

    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl MailSender for RecordingMailer {
    async fn send(&self, subject: &str, html_body: &str, to: &[String]) -> Result<(), MailError> {
        if to.is_empty() {
            return Err(MailError::NoRecipients);
        }

        {
            let mut left = self
                .failures_left
                .lock()
                .map_err(|_| MailError::Transport("poisoned".to_string()))?;
            if *left > 0 {
                *left -= 1;
                return Err(MailError::Transport("injected failure".to_string()));
            }
        }

        self.sent
            .lock()
            .map_err(|_| MailError::Transport("poisoned".to_string()))?
            .push(SentMail {
                subject: subject.to_string(),
                html_body: html_body.to_string(),
                to: to.to_vec(),
            });
        Ok(())
    }
}
