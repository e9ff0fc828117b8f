//! Shared deterministic types for the quest core.
//!
//! These types define stable contracts between core components. They should not
//! depend on external state or I/O.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A wallet driving one independent progress track.
///
/// The optional secret is only ever handed to an external signer; it is never
/// logged and never sent by this crate.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Credential {
    pub address: String,
    secret: Option<String>,
}

impl Credential {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            secret: None,
        }
    }

    pub fn with_secret(address: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            secret: Some(secret.into()),
        }
    }

    pub fn secret(&self) -> Option<&str> {
        self.secret.as_deref()
    }

    pub fn has_secret(&self) -> bool {
        self.secret.is_some()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("address", &self.address)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// One of several interchangeable answering backends.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentEndpoint {
    /// Network locator of the streaming chat endpoint.
    pub url: String,
    /// Stable deployment id reported to telemetry.
    pub id: String,
    /// Human-facing name used in console output.
    pub name: String,
}

/// Full answer assembled from one endpoint's stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentReply {
    pub text: String,
    /// Time from request start until the first text fragment arrived.
    pub first_token: Duration,
}

/// A useful answer together with the endpoint that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub endpoint: AgentEndpoint,
    pub text: String,
    pub first_token: Duration,
}

/// Result of asking the endpoint set about one prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerOutcome {
    /// Some endpoint produced a useful answer.
    Answered(Answer),
    /// Every endpoint was tried once and none produced a useful answer.
    Exhausted {
        /// Endpoint ids in the order they were tried.
        tried: Vec<String>,
    },
}
