//! Exactly-once ballot submission.
//!
//! The submitter is the last component in the flow and refuses to run until
//! both predecessors are in their terminal success states: the authenticator
//! holds a live session and the identity capture holds an uploaded binding.
//! The host UI disables the submit control after success, but the state
//! machine guards it as well.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::authenticator::{AuthState, SessionAuthenticator};
use crate::capture::{CaptureDevice, CaptureState, IdentityCapture};
use crate::error::VoteKitError;
use crate::gateway::{ElectionGateway, VoteReceipt, VoteRequest};

/// Progress of the submission flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitState {
    /// No ballot sent yet.
    Ready,
    /// A ballot was accepted. Terminal state.
    Submitted,
}

/// The ballot as constructed for submission: the chosen candidate, the hash
/// binding it to the verified identity photo, and a timestamp. Constructed
/// once, submitted once.
#[derive(Debug, Clone)]
pub struct Ballot {
    /// The candidate the voter chose.
    pub candidate_choice: String,
    /// Image hash from the session's identity binding.
    pub image_hash: String,
    /// Construction timestamp.
    pub timestamp: DateTime<Utc>,
}

/// Owns exactly-once ballot submission, gated on the two prior components.
pub struct VoteSubmitter {
    gateway: Arc<ElectionGateway>,
    state: SubmitState,
    ballot: Option<Ballot>,
}

impl VoteSubmitter {
    /// Creates a submitter in the `Ready` state.
    #[must_use]
    pub const fn new(gateway: Arc<ElectionGateway>) -> Self {
        Self {
            gateway,
            state: SubmitState::Ready,
            ballot: None,
        }
    }

    /// Current state of the submission flow.
    #[must_use]
    pub const fn state(&self) -> SubmitState {
        self.state
    }

    /// The submitted ballot, once one was accepted.
    #[must_use]
    pub const fn ballot(&self) -> Option<&Ballot> {
        self.ballot.as_ref()
    }

    /// Submits the voter's ballot.
    ///
    /// On acceptance the submitter enters its terminal `Submitted` state, the
    /// session is torn down (logout clears the in-memory and durable
    /// credential), and the service's receipt is returned. On rejection the
    /// state is unchanged and the voter may retry.
    ///
    /// # Errors
    ///
    /// [`VoteKitError::Precondition`] unless the authenticator is
    /// `Authenticated` and the capture is `Uploaded`;
    /// [`VoteKitError::AlreadySubmitted`] on any call after an accepted
    /// ballot, without contacting the service;
    /// [`VoteKitError::Submission`] on a server rejection.
    pub async fn submit<D: CaptureDevice>(
        &mut self,
        candidate_choice: &str,
        authenticator: &mut SessionAuthenticator,
        capture: &IdentityCapture<D>,
    ) -> Result<VoteReceipt, VoteKitError> {
        if self.state == SubmitState::Submitted {
            return Err(VoteKitError::AlreadySubmitted);
        }
        if authenticator.state() != AuthState::Authenticated {
            return Err(VoteKitError::Precondition {
                reason: format!(
                    "voter is not authenticated (session is {})",
                    authenticator.state().as_str()
                ),
            });
        }
        let Some(session) = authenticator.session() else {
            return Err(VoteKitError::Precondition {
                reason: "no session credential is held".to_string(),
            });
        };
        if capture.state() != CaptureState::Uploaded {
            return Err(VoteKitError::Precondition {
                reason: format!(
                    "identity photo is not uploaded (capture is {})",
                    capture.state().as_str()
                ),
            });
        }
        let Some(binding) = capture.identity_binding() else {
            return Err(VoteKitError::Precondition {
                reason: "no identity binding is held".to_string(),
            });
        };

        let ballot = Ballot {
            candidate_choice: candidate_choice.to_string(),
            image_hash: binding.image_hash().to_string(),
            timestamp: Utc::now(),
        };
        let receipt = self
            .gateway
            .submit_vote(
                session.expose_token(),
                &VoteRequest {
                    vote_choice: &ballot.candidate_choice,
                    kyc_image_hash: &ballot.image_hash,
                    timestamp: ballot.timestamp,
                },
            )
            .await
            .map_err(|err| {
                err.into_domain(|reason| VoteKitError::Submission { reason })
            })?;

        self.ballot = Some(ballot);
        self.state = SubmitState::Submitted;
        tracing::info!("ballot accepted by the voting service");

        // Post-vote completion destroys the session credential; the voter is
        // sent back to the login entry point by the host.
        authenticator.logout()?;
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authenticator::Credential;
    use crate::capture::{
        CaptureConfig, CaptureDeviceError, EncodedFrame,
    };
    use sha2::{Digest, Sha256};
    use votekit_session_store::{MemorySessionStore, SessionStore};

    struct StubDevice;

    impl CaptureDevice for StubDevice {
        async fn open(
            &mut self,
            _config: &CaptureConfig,
        ) -> Result<(), CaptureDeviceError> {
            Ok(())
        }

        async fn capture(
            &mut self,
            _quality: f32,
        ) -> Result<EncodedFrame, CaptureDeviceError> {
            Ok(EncodedFrame {
                bytes: b"identity-photo".to_vec(),
                mime_type: "image/jpeg".to_string(),
            })
        }

        fn stop(&mut self) {}
    }

    async fn mock_auth_endpoints(server: &mut mockito::ServerGuard) {
        server
            .mock("POST", "/api/auth/login")
            .with_status(200)
            .with_body(
                serde_json::json!({"temp_token": "T1", "message": "sent"})
                    .to_string(),
            )
            .create_async()
            .await;
        server
            .mock("POST", "/api/auth/verify-otp")
            .with_status(200)
            .with_body(
                serde_json::json!({
                    "session_token": "S1",
                    "voter_info": {"voter_id": "V123", "name": "Ada"}
                })
                .to_string(),
            )
            .create_async()
            .await;
    }

    async fn mock_upload_endpoint(server: &mut mockito::ServerGuard) {
        let image_hash = hex::encode(Sha256::digest(b"identity-photo"));
        server
            .mock("POST", "/api/kyc/upload")
            .with_status(200)
            .with_body(
                serde_json::json!({
                    "image_hash": image_hash,
                    "encrypted_reference": "ref.enc"
                })
                .to_string(),
            )
            .create_async()
            .await;
    }

    fn credential() -> Credential {
        Credential {
            voter_id: "V123".to_string(),
            date_of_birth: "1990-01-01".to_string(),
            email: "a@x.com".to_string(),
        }
    }

    /// Walks the whole flow up to a submittable state.
    async fn authenticated_components(
        server: &mut mockito::ServerGuard,
        store: Arc<MemorySessionStore>,
    ) -> (SessionAuthenticator, IdentityCapture<StubDevice>) {
        mock_auth_endpoints(server).await;
        mock_upload_endpoint(server).await;

        let gateway = Arc::new(ElectionGateway::with_base_url(server.url()));
        let mut auth =
            SessionAuthenticator::new(Arc::clone(&gateway), store)
                .expect("fresh store");
        auth.request_challenge(&credential()).await.expect("login");
        auth.verify_challenge("123456").await.expect("verify");

        let mut capture = IdentityCapture::new(gateway, StubDevice);
        capture.acquire_device().await.expect("acquire");
        capture.capture_frame().await.expect("capture");
        let session = auth.session().expect("session").clone();
        capture.upload(&session).await.expect("upload");

        (auth, capture)
    }

    #[tokio::test]
    async fn submit_requires_both_predecessors() {
        let mut server = mockito::Server::new_async().await;
        mock_auth_endpoints(&mut server).await;
        let gateway = Arc::new(ElectionGateway::with_base_url(server.url()));

        // Unauthenticated: fails on the session precondition.
        let mut auth = SessionAuthenticator::new(
            Arc::clone(&gateway),
            Arc::new(MemorySessionStore::new()),
        )
        .expect("fresh store");
        let capture = IdentityCapture::new(Arc::clone(&gateway), StubDevice);
        let mut submitter = VoteSubmitter::new(Arc::clone(&gateway));
        let err = submitter
            .submit("Ada Lovelace", &mut auth, &capture)
            .await
            .unwrap_err();
        assert!(matches!(err, VoteKitError::Precondition { .. }));

        // Authenticated but no uploaded photo: still a precondition failure.
        auth.request_challenge(&credential()).await.expect("login");
        auth.verify_challenge("123456").await.expect("verify");
        let err = submitter
            .submit("Ada Lovelace", &mut auth, &capture)
            .await
            .unwrap_err();
        assert!(matches!(err, VoteKitError::Precondition { .. }));
        assert_eq!(submitter.state(), SubmitState::Ready);
    }

    #[tokio::test]
    async fn second_submit_fails_without_contacting_the_service() {
        let mut server = mockito::Server::new_async().await;
        let store = Arc::new(MemorySessionStore::new());
        let (mut auth, capture) =
            authenticated_components(&mut server, Arc::clone(&store)).await;
        let vote_mock = server
            .mock("POST", "/api/vote/submit")
            .match_header("authorization", "Bearer S1")
            .with_status(200)
            .with_body(
                serde_json::json!({
                    "success": true,
                    "receipt": {"block_hash": "B1", "vote_hash": "H1"}
                })
                .to_string(),
            )
            .expect(1)
            .create_async()
            .await;

        let gateway = Arc::new(ElectionGateway::with_base_url(server.url()));
        let mut submitter = VoteSubmitter::new(gateway);
        let receipt = submitter
            .submit("Ada Lovelace", &mut auth, &capture)
            .await
            .expect("submit");
        assert_eq!(receipt.block_hash.as_deref(), Some("B1"));
        assert_eq!(submitter.state(), SubmitState::Submitted);
        assert_eq!(
            submitter.ballot().expect("ballot").candidate_choice,
            "Ada Lovelace"
        );

        // Post-vote completion destroys the session, durable copy included.
        assert_eq!(auth.state(), AuthState::Idle);
        assert!(store.load().expect("store").is_none());

        let err = submitter
            .submit("Ada Lovelace", &mut auth, &capture)
            .await
            .unwrap_err();
        assert!(matches!(err, VoteKitError::AlreadySubmitted));
        vote_mock.assert_async().await;
    }

    #[tokio::test]
    async fn rejected_ballot_leaves_state_for_retry() {
        let mut server = mockito::Server::new_async().await;
        let store = Arc::new(MemorySessionStore::new());
        let (mut auth, capture) =
            authenticated_components(&mut server, store).await;
        server
            .mock("POST", "/api/vote/submit")
            .with_status(403)
            .with_body(
                serde_json::json!({"error": "Duplicate vote detected"})
                    .to_string(),
            )
            .create_async()
            .await;

        let gateway = Arc::new(ElectionGateway::with_base_url(server.url()));
        let mut submitter = VoteSubmitter::new(gateway);
        let err = submitter
            .submit("Ada Lovelace", &mut auth, &capture)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            VoteKitError::Submission { ref reason }
                if reason == "Duplicate vote detected"
        ));
        // Rejection leaves everything in place for a voter-initiated retry.
        assert_eq!(submitter.state(), SubmitState::Ready);
        assert_eq!(auth.state(), AuthState::Authenticated);
    }
}
