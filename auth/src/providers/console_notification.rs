//! Console notification dispatcher for development.

use crate::code::VerificationCode;
use crate::error::Result;
use crate::providers::notification::{message_body, minutes_valid, subject_line};
use crate::providers::NotificationDispatcher;
use crate::state::{Purpose, SubjectId};
use chrono::{DateTime, Utc};

/// Prints codes to stdout instead of sending them.
///
/// The code appears only in the printed message. The `tracing` event that
/// accompanies it carries the subject and purpose but never the code.
#[derive(Clone, Debug, Default)]
pub struct ConsoleDispatcher;

impl ConsoleDispatcher {
    /// Create a new console dispatcher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl NotificationDispatcher for ConsoleDispatcher {
    async fn send(
        &self,
        subject: &SubjectId,
        code: &VerificationCode,
        purpose: Purpose,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        tracing::info!(
            subject = %subject,
            purpose = %purpose,
            %expires_at,
            "Verification code written to console (development mode)"
        );

        println!("\n──────────────── verification code ────────────────");
        println!("To:      {subject}");
        println!("Subject: {}", subject_line(purpose));
        println!();
        println!("{}", message_body(code, purpose, minutes_valid(issued_at, expires_at)));
        println!("───────────────────────────────────────────────────\n");

        Ok(())
    }
}
