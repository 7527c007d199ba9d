//! Data model shared by the scheduler, the connectors and the gateway.

mod automation;
mod token;

pub use automation::{Automation, AutomationUpdate, NewAutomation};
pub use token::OAuthToken;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a user row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an automation row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AutomationId(pub i64);

impl fmt::Display for AutomationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A user of the platform.
///
/// The engine only needs `id`; the remaining fields are carried so connectors
/// can personalise remote calls (e.g. a commit author).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub firstname: String,
    pub lastname: String,
}

/// Result of a trigger firing: a human-readable description plus the raw
/// remote payload. Reactions receive it untouched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FiredEvent {
    pub text: String,
    pub data: serde_json::Value,
}

impl FiredEvent {
    pub fn new(text: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            text: text.into(),
            data,
        }
    }
}
