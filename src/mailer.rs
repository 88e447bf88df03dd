#[cfg(test)]
use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

pub const ACTIVATION_SUBJECT: &str = "Account Activation";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
}

/// Outbound mail transport. A single attempt per call; no retries.
#[async_trait]
pub trait Mailer: Send + Sync {
    fn sender(&self) -> &str;

    async fn send(&self, email: &Email) -> anyhow::Result<()>;

    async fn send_account_activation(&self, to: &str, token: &str) -> anyhow::Result<()> {
        let email = Email {
            from: self.sender().to_string(),
            to: vec![to.to_string()],
            subject: ACTIVATION_SUBJECT.to_string(),
            html: format!("Token is {token}"),
        };
        self.send(&email).await
    }
}

/// Transport for deployments without an outbound relay: each message is
/// written to the log and nothing is kept.
#[derive(Clone)]
pub struct LogMailer {
    from: String,
}

impl LogMailer {
    pub fn new(from: impl Into<String>) -> Self {
        Self { from: from.into() }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    fn sender(&self) -> &str {
        &self.from
    }

    #[instrument(skip(self, email), fields(to = ?email.to, subject = %email.subject))]
    async fn send(&self, email: &Email) -> anyhow::Result<()> {
        info!("mail logged, not delivered");
        debug!(body = %email.html, "mail body");
        Ok(())
    }
}

/// Keeps every message in memory instead of delivering it.
#[cfg(test)]
#[derive(Clone)]
pub struct StubMailer {
    from: String,
    outbox: Arc<Mutex<Vec<Email>>>,
}

#[cfg(test)]
impl StubMailer {
    pub fn new(from: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            outbox: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub async fn last_mail(&self) -> Option<Email> {
        self.outbox.lock().await.last().cloned()
    }

    pub async fn count(&self) -> usize {
        self.outbox.lock().await.len()
    }
}

#[cfg(test)]
#[async_trait]
impl Mailer for StubMailer {
    fn sender(&self) -> &str {
        &self.from
    }

    #[instrument(skip(self, email), fields(to = ?email.to, subject = %email.subject))]
    async fn send(&self, email: &Email) -> anyhow::Result<()> {
        self.outbox.lock().await.push(email.clone());
        info!("mail stored in stub outbox");
        Ok(())
    }
}

/// Transport that rejects every message.
#[cfg(test)]
#[derive(Clone, Default)]
pub struct FailingMailer;

#[cfg(test)]
#[async_trait]
impl Mailer for FailingMailer {
    fn sender(&self) -> &str {
        "My App <info@my-app.com>"
    }

    async fn send(&self, _email: &Email) -> anyhow::Result<()> {
        anyhow::bail!("Failed to deliver email")
    }
}
