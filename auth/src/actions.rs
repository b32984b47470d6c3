//! Verification flow actions.
//!
//! Commands come from the service ([`FlowAction::RequestCode`],
//! [`FlowAction::SubmitCode`]); everything else is produced by effects and
//! fed back into the reducer.

use crate::code::VerificationCode;
use crate::completion::Completion;
use crate::error::AuthError;
use crate::session::IssuedSession;
use crate::verifier::{VerificationFailure, VerifiedCode};
use chrono::{DateTime, Utc};
use std::time::Duration;
use uuid::Uuid;

/// Input to the flow reducer.
#[derive(Debug, Clone)]
pub enum FlowAction {
    // ═══════════════════════════════════════════════════════════════════════
    // Commands
    // ═══════════════════════════════════════════════════════════════════════
    /// Issue a new code and send it. Also used for resends; the previous
    /// code is superseded.
    RequestCode,

    /// Check a submitted code and, if accepted, complete the flow.
    SubmitCode {
        /// The code as typed by the user.
        code: VerificationCode,
        /// Side effect to run once verified.
        completion: Completion,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // Issue / dispatch results
    // ═══════════════════════════════════════════════════════════════════════
    /// Code stored and delivered.
    CodeDispatched {
        /// Issued request.
        request_id: Uuid,
        /// Code expiry.
        expires_at: DateTime<Utc>,
    },

    /// Code stored but every delivery attempt failed. The code stays valid.
    CodeDispatchFailed {
        /// Issued request.
        request_id: Uuid,
        /// Code expiry.
        expires_at: DateTime<Utc>,
    },

    /// Too many code requests for the subject.
    CodeRequestRateLimited {
        /// When a request will be allowed again.
        retry_after: Duration,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // Submission results
    // ═══════════════════════════════════════════════════════════════════════
    /// Too many submissions for the subject.
    SubmissionRateLimited {
        /// When a submission will be allowed again.
        retry_after: Duration,
    },

    /// The code was accepted and consumed.
    CodeVerified {
        /// Consumed request.
        verified: VerifiedCode,
        /// Side effect to run next.
        completion: Completion,
    },

    /// The code was rejected.
    CodeRejected {
        /// Why.
        failure: VerificationFailure,
    },

    /// Completion applied and session minted.
    SessionIssued {
        /// The new session.
        session: IssuedSession,
    },

    /// An effect failed with an infrastructure error.
    FlowErrored {
        /// The error.
        error: AuthError,
    },
}

impl FlowAction {
    /// `true` for actions that end a command's round trip.
    ///
    /// [`FlowAction::CodeVerified`] is not terminal: completion follows.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::CodeDispatched { .. }
                | Self::CodeDispatchFailed { .. }
                | Self::CodeRequestRateLimited { .. }
                | Self::SubmissionRateLimited { .. }
                | Self::CodeRejected { .. }
                | Self::SessionIssued { .. }
                | Self::FlowErrored { .. }
        )
    }
}
