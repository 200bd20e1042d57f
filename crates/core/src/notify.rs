//! Notification seam.
//!
//! Outbound delivery (SMTP, SMS gateways) lives outside this crate. The
//! pipeline hands a finished report to a [`Notifier`] and is done; transport
//! construction is explicit and injected, nothing here initialises a mailer at
//! load time.

use crate::PipelineResult;
use async_trait::async_trait;
use labwatch_types::EmailAddress;

/// Delivers one report to one recipient.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, to: &EmailAddress, subject: &str, body: &str) -> PipelineResult<()>;
}

/// Writes the report to stdout, for local runs and cron-style mail piping.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConsoleNotifier;

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn send(&self, to: &EmailAddress, subject: &str, body: &str) -> PipelineResult<()> {
        println!("To: {to}");
        println!("Subject: {subject}");
        println!();
        println!("{body}");
        Ok(())
    }
}
