//! Two-factor session authentication for a voting session.
//!
//! The authenticator walks a voter through credential submission and one-time
//! code verification, producing the bearer [`SessionCredential`] every later
//! call is authenticated with. Transitions are validated against an explicit
//! state machine rather than inferred from which tokens happen to be set, and
//! every operation takes `&mut self`, so no two operations can interleave.

use std::sync::Arc;
use std::time::{Duration, Instant};

use secrecy::{ExposeSecret, SecretString};
use votekit_session_store::SessionStore;

use crate::defaults::RESEND_COOLDOWN;
use crate::error::VoteKitError;
use crate::gateway::{
    ElectionGateway, LoginRequest, ResendRequest, VerifyRequest, VoterProfile,
};

/// Authentication progress of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// No login attempt in progress.
    Idle,
    /// Credential form is up; nothing submitted or a submission was rejected.
    AwaitingCredential,
    /// Credential accepted; a one-time code is pending verification.
    ChallengeIssued,
    /// Two-factor verification complete. Terminal success state.
    Authenticated,
}

impl AuthState {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::AwaitingCredential => "AwaitingCredential",
            Self::ChallengeIssued => "ChallengeIssued",
            Self::Authenticated => "Authenticated",
        }
    }
}

/// Credential a voter submits to start a login attempt. Immutable for the
/// lifetime of the attempt.
#[derive(Debug, Clone)]
pub struct Credential {
    /// Voter registry identifier.
    pub voter_id: String,
    /// Date of birth, in the registry's `YYYY-MM-DD` form.
    pub date_of_birth: String,
    /// Email address the one-time code is sent to.
    pub email: String,
}

/// Opaque correlator between a login attempt and its pending one-time code.
/// At most one exists at a time; a new challenge replaces it.
#[derive(Debug)]
struct ChallengeTicket {
    temp_token: String,
    email: String,
}

/// Bearer proof of completed two-factor authentication.
///
/// The token is held as a [`SecretString`] so it never appears in debug or
/// log output.
#[derive(Debug)]
pub struct SessionCredential {
    token: SecretString,
}

impl SessionCredential {
    pub(crate) fn new(token: String) -> Self {
        Self {
            token: SecretString::from(token),
        }
    }

    /// Reveals the bearer token for an authorization header.
    #[must_use]
    pub fn expose_token(&self) -> &str {
        self.token.expose_secret()
    }
}

impl Clone for SessionCredential {
    fn clone(&self) -> Self {
        Self::new(self.token.expose_secret().to_owned())
    }
}

/// Outcome of issuing (or re-issuing) a one-time-code challenge.
#[derive(Debug, Clone)]
pub struct ChallengeReceipt {
    /// Human-readable delivery message from the service.
    pub message: String,
    /// Code echoed back by deployments without a mail transport. Test-only.
    pub debug_code: Option<String>,
}

/// Owns credential submission, one-time-code verification, resend cooldown,
/// and the resulting session credential.
pub struct SessionAuthenticator {
    gateway: Arc<ElectionGateway>,
    store: Arc<dyn SessionStore>,
    state: AuthState,
    challenge: Option<ChallengeTicket>,
    session: Option<SessionCredential>,
    voter: Option<VoterProfile>,
    cooldown_until: Option<Instant>,
}

impl SessionAuthenticator {
    /// Creates an authenticator, restoring a persisted session if the durable
    /// store holds one (a page reload does not force re-authentication).
    ///
    /// # Errors
    ///
    /// Returns an error if the durable store cannot be read.
    pub fn new(
        gateway: Arc<ElectionGateway>,
        store: Arc<dyn SessionStore>,
    ) -> Result<Self, VoteKitError> {
        let (state, session) = match store.load()? {
            Some(token) => {
                tracing::debug!("restored persisted voting session");
                (AuthState::Authenticated, Some(SessionCredential::new(token)))
            }
            None => (AuthState::Idle, None),
        };
        Ok(Self {
            gateway,
            store,
            state,
            challenge: None,
            session,
            voter: None,
            cooldown_until: None,
        })
    }

    /// Current state of the authentication flow.
    #[must_use]
    pub const fn state(&self) -> AuthState {
        self.state
    }

    /// Marks the start of a login attempt (the credential form is shown).
    /// A no-op outside `Idle`.
    pub fn begin_login(&mut self) {
        if self.state == AuthState::Idle {
            self.state = AuthState::AwaitingCredential;
        }
    }

    /// Submits a credential and requests a one-time-code challenge.
    ///
    /// On acceptance the returned [`ChallengeReceipt`] carries the delivery
    /// message, a [`ChallengeTicket`] replaces any previous one, and the
    /// resend cooldown starts. On rejection the state returns to
    /// `AwaitingCredential` with the server's reason.
    ///
    /// # Errors
    ///
    /// [`VoteKitError::CooldownActive`] while the cooldown runs (checked
    /// before any network call), [`VoteKitError::Authentication`] on a server
    /// rejection, [`VoteKitError::InvalidState`] once authenticated.
    pub async fn request_challenge(
        &mut self,
        credential: &Credential,
    ) -> Result<ChallengeReceipt, VoteKitError> {
        if self.state == AuthState::Authenticated {
            return Err(VoteKitError::InvalidState {
                expected: "Idle, AwaitingCredential or ChallengeIssued",
                actual: self.state.as_str(),
            });
        }
        self.check_cooldown(Instant::now())?;

        self.state = AuthState::AwaitingCredential;
        let response = self
            .gateway
            .login(&LoginRequest {
                voter_id: &credential.voter_id,
                dob: &credential.date_of_birth,
                email: &credential.email,
            })
            .await
            .map_err(|err| {
                self.challenge = None;
                err.into_domain(|reason| VoteKitError::Authentication { reason })
            })?;

        self.challenge = Some(ChallengeTicket {
            temp_token: response.temp_token,
            email: credential.email.clone(),
        });
        self.state = AuthState::ChallengeIssued;
        self.cooldown_until = Some(Instant::now() + RESEND_COOLDOWN);
        tracing::info!("one-time-code challenge issued");
        Ok(ChallengeReceipt {
            message: response.message,
            debug_code: response.test_otp,
        })
    }

    /// Verifies the one-time code the voter received.
    ///
    /// On acceptance the challenge ticket is discarded, the session credential
    /// is stored in memory and in durable storage, and the state becomes
    /// `Authenticated`. On rejection the state stays `ChallengeIssued`; the
    /// caller clears the code field and the voter may retry (the service owns
    /// attempt throttling, there is no local limit).
    ///
    /// # Errors
    ///
    /// [`VoteKitError::Verification`] on a rejected code,
    /// [`VoteKitError::InvalidState`] outside `ChallengeIssued`.
    pub async fn verify_challenge(
        &mut self,
        code: &str,
    ) -> Result<VoterProfile, VoteKitError> {
        let Some(ticket) = self.challenge.as_ref() else {
            return Err(VoteKitError::InvalidState {
                expected: "ChallengeIssued",
                actual: self.state.as_str(),
            });
        };

        let response = self
            .gateway
            .verify_one_time_code(&VerifyRequest {
                email: &ticket.email,
                otp: code,
                temp_token: &ticket.temp_token,
            })
            .await
            .map_err(|err| {
                err.into_domain(|reason| VoteKitError::Verification { reason })
            })?;

        self.store.save(&response.session_token)?;
        self.session = Some(SessionCredential::new(response.session_token));
        self.voter = Some(response.voter_info.clone());
        self.challenge = None;
        self.cooldown_until = None;
        self.state = AuthState::Authenticated;
        tracing::info!("voter session established");
        Ok(response.voter_info)
    }

    /// Requests a fresh one-time code under the same challenge correlation.
    ///
    /// Fails locally, without contacting the service, while the cooldown has
    /// not elapsed. On success the cooldown restarts at the full interval.
    ///
    /// # Errors
    ///
    /// [`VoteKitError::CooldownActive`] while the cooldown runs,
    /// [`VoteKitError::Authentication`] on a server rejection (e.g. expired
    /// ticket), [`VoteKitError::InvalidState`] outside `ChallengeIssued`.
    pub async fn resend_challenge(
        &mut self,
    ) -> Result<ChallengeReceipt, VoteKitError> {
        let Some(ticket) = self.challenge.as_ref() else {
            return Err(VoteKitError::InvalidState {
                expected: "ChallengeIssued",
                actual: self.state.as_str(),
            });
        };
        self.check_cooldown(Instant::now())?;

        let response = self
            .gateway
            .resend_one_time_code(&ResendRequest {
                email: &ticket.email,
                temp_token: &ticket.temp_token,
            })
            .await
            .map_err(|err| {
                err.into_domain(|reason| VoteKitError::Authentication { reason })
            })?;

        self.cooldown_until = Some(Instant::now() + RESEND_COOLDOWN);
        tracing::info!("one-time code re-sent");
        Ok(ChallengeReceipt {
            message: response.message,
            debug_code: response.test_otp,
        })
    }

    /// Returns the session credential from memory or, failing that, from the
    /// durable store.
    ///
    /// # Errors
    ///
    /// Returns an error if the durable store cannot be read.
    pub fn current_session(
        &self,
    ) -> Result<Option<SessionCredential>, VoteKitError> {
        if let Some(session) = &self.session {
            return Ok(Some(session.clone()));
        }
        Ok(self.store.load()?.map(SessionCredential::new))
    }

    /// In-memory session credential, if authenticated.
    #[must_use]
    pub const fn session(&self) -> Option<&SessionCredential> {
        self.session.as_ref()
    }

    /// Voter identity details from the completed verification, if any.
    #[must_use]
    pub const fn voter_profile(&self) -> Option<&VoterProfile> {
        self.voter.as_ref()
    }

    /// Time left until a challenge may be requested again, if a cooldown is
    /// running.
    #[must_use]
    pub fn cooldown_remaining(&self) -> Option<Duration> {
        let remaining = self
            .cooldown_until?
            .saturating_duration_since(Instant::now());
        (remaining > Duration::ZERO).then_some(remaining)
    }

    /// Clears the in-memory and durable session credential and any pending
    /// challenge, returning the flow to `Idle`.
    ///
    /// # Errors
    ///
    /// Returns an error if the durable store cannot be cleared.
    pub fn logout(&mut self) -> Result<(), VoteKitError> {
        self.store.clear()?;
        self.session = None;
        self.challenge = None;
        self.voter = None;
        self.cooldown_until = None;
        self.state = AuthState::Idle;
        tracing::info!("voting session cleared");
        Ok(())
    }

    fn check_cooldown(&self, now: Instant) -> Result<(), VoteKitError> {
        if let Some(until) = self.cooldown_until {
            let remaining = until.saturating_duration_since(now);
            if remaining > Duration::ZERO {
                return Err(VoteKitError::CooldownActive {
                    remaining_secs: remaining.as_secs().max(1),
                });
            }
        }
        Ok(())
    }
}
