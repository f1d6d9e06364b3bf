use thiserror::Error;

use votekit_session_store::SessionStoreError;

/// Error outputs from `VoteKit`.
///
/// Every variant is recoverable by the voter: the host renders the message and
/// offers a retry (re-submit the form, press resend, retake the photo). Server
/// rejection reasons are carried verbatim in the `reason` fields.
#[derive(Debug, Error)]
pub enum VoteKitError {
    /// The voting service rejected the submitted credential.
    #[error("authentication_failed: {reason}")]
    Authentication {
        /// Server-supplied reason, surfaced verbatim.
        reason: String,
    },
    /// The voting service rejected the one-time code.
    #[error("verification_failed: {reason}")]
    Verification {
        /// Server-supplied reason, surfaced verbatim.
        reason: String,
    },
    /// A challenge or resend was requested before the local cooldown elapsed.
    #[error("cooldown_active: {remaining_secs}s remaining")]
    CooldownActive {
        /// Whole seconds left until a resend is allowed again.
        remaining_secs: u64,
    },
    /// The capture device could not be acquired.
    #[error("device_unavailable: {reason}")]
    DeviceUnavailable {
        /// Why the device could not be opened.
        reason: String,
    },
    /// Upload was attempted with no captured frame present.
    #[error("no_frame_captured")]
    NoFrame,
    /// The voting service rejected the identity-photo upload.
    #[error("upload_failed: {reason}")]
    Upload {
        /// Server-supplied reason, surfaced verbatim.
        reason: String,
    },
    /// Ballot submission was attempted before authentication and identity
    /// upload both completed.
    #[error("precondition_unmet: {reason}")]
    Precondition {
        /// Which predecessor has not reached its terminal state.
        reason: String,
    },
    /// A ballot was already accepted for this session.
    #[error("already_submitted")]
    AlreadySubmitted,
    /// The voting service rejected the ballot.
    #[error("submission_failed: {reason}")]
    Submission {
        /// Server-supplied reason, surfaced verbatim.
        reason: String,
    },
    /// Network-level failure, distinct from a server-rejected request.
    #[error("transport_error: {error} ({url})")]
    Transport {
        /// URL of the failed request.
        url: String,
        /// HTTP status, when a response was received at all.
        status: Option<u16>,
        /// Underlying error description.
        error: String,
    },
    /// An operation was called outside the states in which it is valid.
    #[error("invalid_state: expected {expected}, currently {actual}")]
    InvalidState {
        /// States the operation is valid in.
        expected: &'static str,
        /// State the component is actually in.
        actual: &'static str,
    },
    /// Unexpected error serializing information.
    #[error("serialization_error: {0}")]
    Serialization(String),
    /// Durable session storage failure.
    #[error(transparent)]
    SessionStore(#[from] SessionStoreError),
}
