//! Client-side control flow for a remote electronic-voting session.
//!
//! Three components, consumed in strict order by a host page:
//! [`SessionAuthenticator`] (credentials + one-time code),
//! [`IdentityCapture`] (identity photo + hash binding), and
//! [`VoteSubmitter`] (exactly-once ballot submission). Each owns an explicit
//! state machine; a voter can neither skip a step, replay a step, nor submit
//! more than one ballot per authenticated session.
#![deny(clippy::all, clippy::pedantic, clippy::nursery)]
use strum::EnumString;

/// Deployment the SDK talks to. Selects the default gateway host.
#[derive(Debug, Clone, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Environment {
    /// Pre-production deployment.
    Staging,
    /// Live election deployment.
    Production,
}

mod authenticator;
pub use authenticator::*;

mod ballot;
pub use ballot::*;

mod capture;
pub use capture::*;

mod error;
pub use error::*;

mod gateway;
pub use gateway::{
    Candidate, ElectionGateway, GatewayError, VoteReceipt, VoterProfile,
};

pub mod defaults;
pub mod logger;

// private modules
mod http_request;
