use async_trait::async_trait;
use tracing::info;

use crate::utils::error::AppError;

pub mod graph;
pub mod messages;

pub use graph::GraphMailer;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), AppError>;
}

/// Writes mail to the log instead of delivering it.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), AppError> {
        info!(to = %mail.to, subject = %mail.subject, body = %mail.body, "Mail not delivered (no mail credentials)");
        Ok(())
    }
}

/// Sends a mail whose failure must not undo the surrounding operation.
pub async fn send_best_effort(mailer: &dyn Mailer, mail: OutgoingMail) -> bool {
    match mailer.send(&mail).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(to = %mail.to, subject = %mail.subject, error = %e, "Mail delivery failed");
            false
        }
    }
}
