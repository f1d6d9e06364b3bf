//! Protocol constants and per-environment service hosts.

use std::time::Duration;

use crate::Environment;

/// Minimum wait between successive one-time-code requests, enforced locally
/// before any network call. The service applies its own rate limit on top.
pub const RESEND_COOLDOWN: Duration = Duration::from_secs(60);

/// Lossy encoding quality for the captured identity frame.
pub const CAPTURE_QUALITY: f32 = 0.85;

/// Preferred capture resolution (width, height).
pub const CAPTURE_RESOLUTION: (u32, u32) = (1280, 720);

/// Key under which the session token is held in tab-scoped durable storage.
pub const SESSION_STORAGE_KEY: &str = "voting_session";

/// Default voting-service host for `environment`.
#[must_use]
pub fn api_base_url(environment: &Environment) -> &'static str {
    match environment {
        Environment::Staging => "https://voting-gateway.stage.securevote.org",
        Environment::Production => "https://voting-gateway.securevote.org",
    }
}
