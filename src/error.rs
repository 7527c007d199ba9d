//! Error taxonomy for the engine boundaries.
//!
//! Connector internals work with `anyhow::Result`; anything that crosses into
//! the registry, the gateway or the OAuth helpers is mapped onto [`AreaError`]
//! so callers can tell a missing credential from a flaky remote API.

/// Unified error type for the automation engine.
#[derive(Debug, thiserror::Error)]
pub enum AreaError {
    /// A connector or the process is missing required configuration
    /// (OAuth client credentials, encryption key, config file).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Missing or rejected OAuth token for a (user, service) pair, or a
    /// failed authorization code exchange.
    #[error("authorization error for service `{service}`: {reason}")]
    Authorization { service: String, reason: String },

    /// A third-party API call failed or returned a non-success response.
    #[error("remote API error from `{service}`: {reason}")]
    RemoteApi { service: String, reason: String },

    /// The persistence gateway failed to read or write a record.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Unknown connector, trigger or reaction id.
    #[error("{kind} not found: `{id}`")]
    NotFound { kind: &'static str, id: String },

    /// Two connectors (or two triggers/reactions of one connector) share an id.
    #[error("duplicate {kind} id `{id}`")]
    DuplicateConnector { kind: &'static str, id: String },
}

impl AreaError {
    pub fn authorization(service: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Authorization {
            service: service.into(),
            reason: reason.to_string(),
        }
    }

    pub fn remote(service: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::RemoteApi {
            service: service.into(),
            reason: reason.to_string(),
        }
    }

    /// Wraps any storage-layer failure, keeping the full context chain.
    pub fn persistence(err: impl Into<anyhow::Error>) -> Self {
        Self::Persistence(format!("{:#}", err.into()))
    }
}

/// Convenience alias used across the engine.
pub type Result<T> = std::result::Result<T, AreaError>;

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_persistence_keeps_context_chain() {
        let err: anyhow::Result<()> = Err(anyhow::anyhow!("disk full")).context("Failed to write row");
        let err = AreaError::persistence(err.unwrap_err());
        let msg = err.to_string();
        assert!(msg.contains("Failed to write row"));
        assert!(msg.contains("disk full"));
    }

    #[test]
    fn test_display_messages() {
        let err = AreaError::authorization("github", "no token");
        assert_eq!(err.to_string(), "authorization error for service `github`: no token");

        let err = AreaError::NotFound {
            kind: "connector",
            id: "gitlab".to_string(),
        };
        assert_eq!(err.to_string(), "connector not found: `gitlab`");
    }
}
