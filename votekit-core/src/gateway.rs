//! Typed client for the remote voting service.
//!
//! One method per endpoint, JSON over HTTPS, bearer authorization on every
//! post-authentication call. Server rejections carry a human-readable `error`
//! string which is surfaced verbatim to the caller; when the body has no such
//! string the caller's fallback is used, matching the original client's
//! `data.error || fallback` behavior.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::defaults;
use crate::error::VoteKitError;
use crate::http_request::Request;
use crate::Environment;

/// Outcome of a gateway call before it is mapped into the domain taxonomy.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The service answered with an error status and (usually) a reason.
    #[error("rejected ({status}): {reason}")]
    Rejected {
        /// HTTP status of the rejection.
        status: u16,
        /// Reason string from the response body, surfaced verbatim.
        reason: String,
    },
    /// The request never produced a usable response.
    #[error("transport_error: {error} ({url})")]
    Transport {
        /// URL of the failed request.
        url: String,
        /// HTTP status, when a response was received at all.
        status: Option<u16>,
        /// Underlying error description.
        error: String,
    },
    /// The service answered 2xx but the body did not decode.
    #[error("decode_error: {error} ({url})")]
    Decode {
        /// URL of the request.
        url: String,
        /// What failed to decode.
        error: String,
    },
}

impl GatewayError {
    /// Maps this error into the domain taxonomy: rejections go through
    /// `on_rejection` (each operation owns its error variant), everything else
    /// becomes a transport/serialization error.
    pub(crate) fn into_domain(
        self,
        on_rejection: impl FnOnce(String) -> VoteKitError,
    ) -> VoteKitError {
        match self {
            Self::Rejected { reason, .. } => on_rejection(reason),
            Self::Transport { url, status, error } => {
                VoteKitError::Transport { url, status, error }
            }
            Self::Decode { url, error } => {
                VoteKitError::Serialization(format!("{error} ({url})"))
            }
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub voter_id: &'a str,
    pub dob: &'a str,
    pub email: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoginResponse {
    pub temp_token: String,
    pub message: String,
    #[serde(default)]
    pub test_otp: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct VerifyRequest<'a> {
    pub email: &'a str,
    pub otp: &'a str,
    pub temp_token: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VerifyResponse {
    pub session_token: String,
    pub voter_info: VoterProfile,
}

#[derive(Debug, Serialize)]
pub(crate) struct ResendRequest<'a> {
    pub email: &'a str,
    pub temp_token: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResendResponse {
    pub message: String,
    #[serde(default)]
    pub test_otp: Option<String>,
}

/// Voter identity details returned on successful code verification.
#[derive(Debug, Clone, Deserialize)]
pub struct VoterProfile {
    /// Registry identifier of the voter.
    pub voter_id: String,
    /// Registered name of the voter.
    pub name: String,
    /// Session creation timestamp, as reported by the service.
    #[serde(default)]
    pub created: Option<String>,
    /// Session expiry timestamp, as reported by the service.
    #[serde(default)]
    pub expires: Option<String>,
}

/// A candidate on the ballot, as listed by the voting service.
#[derive(Debug, Clone, Deserialize)]
pub struct Candidate {
    /// Candidate's name.
    #[serde(rename = "CandidateName")]
    pub name: String,
    /// Political party the candidate stands for.
    #[serde(rename = "PoliticalParty")]
    pub party: String,
    /// Party symbol, when the registry has one.
    #[serde(rename = "PartySymbol", default)]
    pub symbol: Option<String>,
    /// Campaign slogan, when the registry has one.
    #[serde(rename = "Slogan", default)]
    pub slogan: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidatesResponse {
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UploadResponse {
    pub image_hash: String,
    pub encrypted_reference: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct VoteRequest<'a> {
    pub vote_choice: &'a str,
    pub kyc_image_hash: &'a str,
    pub timestamp: DateTime<Utc>,
}

/// Acceptance receipt for a recorded ballot.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VoteReceipt {
    /// Hash of the tamper-evidence block the vote was recorded in.
    #[serde(default)]
    pub block_hash: Option<String>,
    /// Hash of the recorded vote itself.
    #[serde(default)]
    pub vote_hash: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VoteResponse {
    #[serde(default)]
    receipt: Option<VoteReceipt>,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
}

/// HTTP client for the voting service endpoints.
pub struct ElectionGateway {
    request: Request,
    base_url: String,
}

impl ElectionGateway {
    /// Creates a gateway against the default host for `environment`.
    #[must_use]
    pub fn new(environment: &Environment) -> Self {
        Self::with_base_url(defaults::api_base_url(environment))
    }

    /// Creates a gateway against an explicit base URL (no trailing slash).
    #[must_use]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            request: Request::new(),
            base_url,
        }
    }

    /// Checks that the voting service is reachable and reports itself healthy.
    ///
    /// # Errors
    ///
    /// Returns an error if the service is unreachable or reports a non-`ok`
    /// status.
    pub async fn health(&self) -> Result<(), GatewayError> {
        let url = format!("{}/api/health", self.base_url);
        let response = self.request.handle(self.request.get(&url)).await?;
        let health: HealthResponse =
            Self::decode(response, "Server error").await?;
        if health.status == "ok" {
            Ok(())
        } else {
            Err(GatewayError::Rejected {
                status: 200,
                reason: format!("service unhealthy: {}", health.status),
            })
        }
    }

    /// Fetches the candidate list.
    ///
    /// # Errors
    ///
    /// Returns an error if the service rejects the request or is unreachable.
    pub async fn list_candidates(&self) -> Result<Vec<Candidate>, GatewayError> {
        let url = format!("{}/api/candidates", self.base_url);
        let response = self.request.handle(self.request.get(&url)).await?;
        let body: CandidatesResponse =
            Self::decode(response, "Error loading candidates").await?;
        Ok(body.candidates)
    }

    pub(crate) async fn login(
        &self,
        body: &LoginRequest<'_>,
    ) -> Result<LoginResponse, GatewayError> {
        let url = format!("{}/api/auth/login", self.base_url);
        let response = self
            .request
            .handle(self.request.post(&url).json(body))
            .await?;
        Self::decode(response, "Authentication failed").await
    }

    pub(crate) async fn verify_one_time_code(
        &self,
        body: &VerifyRequest<'_>,
    ) -> Result<VerifyResponse, GatewayError> {
        let url = format!("{}/api/auth/verify-otp", self.base_url);
        let response = self
            .request
            .handle(self.request.post(&url).json(body))
            .await?;
        Self::decode(response, "OTP verification failed").await
    }

    pub(crate) async fn resend_one_time_code(
        &self,
        body: &ResendRequest<'_>,
    ) -> Result<ResendResponse, GatewayError> {
        let url = format!("{}/api/auth/resend-otp", self.base_url);
        let response = self
            .request
            .handle(self.request.post(&url).json(body))
            .await?;
        Self::decode(response, "Failed to resend OTP").await
    }

    pub(crate) async fn upload_identity_image(
        &self,
        bearer_token: &str,
        image_bytes: Vec<u8>,
        mime_type: &str,
        captured_at: DateTime<Utc>,
    ) -> Result<UploadResponse, GatewayError> {
        let url = format!("{}/api/kyc/upload", self.base_url);
        let part = reqwest::multipart::Part::bytes(image_bytes)
            .file_name("kyc_photo.jpg")
            .mime_str(mime_type)
            .map_err(|err| GatewayError::Transport {
                url: url.clone(),
                status: None,
                error: format!("invalid image mime type: {err}"),
            })?;
        let form = reqwest::multipart::Form::new()
            .part("kyc_image", part)
            .text("timestamp", captured_at.to_rfc3339());
        let response = self
            .request
            .handle(
                self.request
                    .post(&url)
                    .bearer_auth(bearer_token)
                    .multipart(form),
            )
            .await?;
        Self::decode(response, "Upload failed").await
    }

    pub(crate) async fn submit_vote(
        &self,
        bearer_token: &str,
        body: &VoteRequest<'_>,
    ) -> Result<VoteReceipt, GatewayError> {
        let url = format!("{}/api/vote/submit", self.base_url);
        let response = self
            .request
            .handle(
                self.request
                    .post(&url)
                    .bearer_auth(bearer_token)
                    .json(body),
            )
            .await?;
        let body: VoteResponse = Self::decode(response, "Unknown error").await?;
        Ok(body.receipt.unwrap_or_default())
    }

    /// Decodes a 2xx body as `T`; on an error status extracts the server's
    /// `error` string, falling back to `fallback_reason`.
    async fn decode<T: DeserializeOwned>(
        response: reqwest::Response,
        fallback_reason: &str,
    ) -> Result<T, GatewayError> {
        let status = response.status();
        let url = response.url().to_string();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|err| GatewayError::Decode {
                    url,
                    error: format!("invalid response body: {err}"),
                });
        }

        let reason = response
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|body| {
                body.get("error")
                    .and_then(serde_json::Value::as_str)
                    .map(ToOwned::to_owned)
            })
            .unwrap_or_else(|| fallback_reason.to_owned());
        Err(GatewayError::Rejected {
            status: status.as_u16(),
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn candidates_decode_the_registry_field_names() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/candidates")
            .with_status(200)
            .with_body(
                serde_json::json!({
                    "candidates": [
                        {
                            "CandidateName": "Ada Lovelace",
                            "PoliticalParty": "Analytical Party",
                            "PartySymbol": "gear",
                            "Slogan": "Count on us"
                        },
                        {
                            "CandidateName": "Charles Babbage",
                            "PoliticalParty": "Difference Party"
                        }
                    ]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let gateway = ElectionGateway::with_base_url(server.url());
        let candidates = gateway.list_candidates().await.expect("candidates");
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].name, "Ada Lovelace");
        assert_eq!(candidates[0].party, "Analytical Party");
        assert_eq!(candidates[0].symbol.as_deref(), Some("gear"));
        assert_eq!(candidates[1].name, "Charles Babbage");
        assert!(candidates[1].slogan.is_none());
    }

    #[tokio::test]
    async fn rejection_without_error_body_uses_the_fallback_reason() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/auth/login")
            .with_status(500)
            .with_body("<html>gateway timeout</html>")
            .create_async()
            .await;

        let gateway = ElectionGateway::with_base_url(server.url());
        let err = gateway
            .login(&LoginRequest {
                voter_id: "V123",
                dob: "1990-01-01",
                email: "a@x.com",
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Rejected { status: 500, ref reason }
                if reason == "Authentication failed"
        ));
    }

    #[tokio::test]
    async fn health_rejects_a_non_ok_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/health")
            .with_status(200)
            .with_body(serde_json::json!({"status": "degraded"}).to_string())
            .create_async()
            .await;

        let gateway = ElectionGateway::with_base_url(server.url());
        let err = gateway.health().await.unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Rejected { ref reason, .. }
                if reason == "service unhealthy: degraded"
        ));
    }
}
