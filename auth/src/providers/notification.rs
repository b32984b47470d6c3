//! Notification dispatcher trait.

use crate::code::VerificationCode;
use crate::error::Result;
use crate::state::{Purpose, SubjectId};
use chrono::{DateTime, Utc};

/// Delivers a verification code to its subject.
///
/// The dispatcher owns the message wording; callers only hand over the
/// code, the purpose tag and the code's validity window. Both timestamps
/// come from the caller's clock, so the dispatcher never reads its own.
pub trait NotificationDispatcher: Send + Sync {
    /// Send `code` to `subject`. The code was issued at `issued_at` and
    /// stops working after `expires_at`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::DispatchFailed`](crate::AuthError::DispatchFailed)
    /// if the channel did not accept the message. Other variants signal
    /// problems retrying cannot fix (for example an unusable address).
    fn send(
        &self,
        subject: &SubjectId,
        code: &VerificationCode,
        purpose: Purpose,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// Subject line for a purpose.
#[must_use]
pub const fn subject_line(purpose: Purpose) -> &'static str {
    match purpose {
        Purpose::Login => "Your Agrogate sign-in code",
        Purpose::Registration => "Confirm your Agrogate account",
        Purpose::PasswordReset => "Reset your Agrogate password",
        Purpose::GoogleLink => "Confirm linking your Google account",
    }
}

/// Whole minutes from `issued_at` to `expires_at`, rounded up.
#[must_use]
pub fn minutes_valid(issued_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> i64 {
    let seconds = (expires_at - issued_at).num_seconds().max(0);
    (seconds + 59) / 60
}

/// Plain-text body shared by the console and SMTP dispatchers.
#[must_use]
pub fn message_body(code: &VerificationCode, purpose: Purpose, minutes_left: i64) -> String {
    let action = match purpose {
        Purpose::Login => "sign in",
        Purpose::Registration => "finish creating your account",
        Purpose::PasswordReset => "choose a new password",
        Purpose::GoogleLink => "link your Google account",
    };

    format!(
        "Use the code {} to {action}.\n\
         It expires in {minutes_left} minutes and can be used once.\n\n\
         If you did not ask for this code you can ignore this message.",
        code.expose()
    )
}
