//! SMTP notification dispatcher using Lettre.

use crate::code::VerificationCode;
use crate::config::SmtpConfig;
use crate::error::{AuthError, Result};
use crate::providers::notification::{message_body, minutes_valid, subject_line};
use crate::providers::NotificationDispatcher;
use crate::state::{Purpose, SubjectId};
use chrono::{DateTime, Utc};
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::ExposeSecret;

/// Sends codes by email over SMTP.
///
/// Relay failures map to [`AuthError::DispatchFailed`] so the flow can
/// retry them; a recipient address the mail builder rejects maps to
/// [`AuthError::InvalidSubject`].
#[derive(Clone)]
pub struct SmtpDispatcher {
    transport: SmtpTransport,
    from: Mailbox,
}

impl std::fmt::Debug for SmtpDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpDispatcher")
            .field("from", &self.from.to_string())
            .finish_non_exhaustive()
    }
}

impl SmtpDispatcher {
    /// Build a dispatcher from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::ConfigError`] if the relay host or sender
    /// address is invalid.
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let credentials = Credentials::new(
            config.username.clone(),
            config.password.expose_secret().to_owned(),
        );

        let transport = SmtpTransport::relay(&config.server)
            .map_err(|e| AuthError::ConfigError(format!("SMTP relay error: {e}")))?
            .port(config.port)
            .credentials(credentials)
            .build();

        let from = format!("{} <{}>", config.from_name, config.from_email)
            .parse::<Mailbox>()
            .map_err(|e| AuthError::ConfigError(format!("invalid sender address: {e}")))?;

        Ok(Self { transport, from })
    }
}

impl NotificationDispatcher for SmtpDispatcher {
    async fn send(
        &self,
        subject: &SubjectId,
        code: &VerificationCode,
        purpose: Purpose,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let to = subject
            .as_str()
            .parse::<Mailbox>()
            .map_err(|_| AuthError::InvalidSubject)?;

        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject_line(purpose))
            .header(ContentType::TEXT_PLAIN)
            .body(message_body(code, purpose, minutes_valid(issued_at, expires_at)))
            .map_err(|e| AuthError::InternalError(format!("failed to build email: {e}")))?;

        let mailer = self.transport.clone();

        // The blocking transport runs off the async workers.
        let sent = tokio::task::spawn_blocking(move || mailer.send(&email))
            .await
            .map_err(|e| AuthError::InternalError(format!("email task failed: {e}")))?;

        match sent {
            Ok(_) => {
                tracing::debug!(subject = %subject, purpose = %purpose, "Verification email accepted by relay");
                Ok(())
            },
            Err(e) => {
                tracing::warn!(subject = %subject, purpose = %purpose, error = %e, "SMTP relay rejected verification email");
                Err(AuthError::DispatchFailed)
            },
        }
    }
}
