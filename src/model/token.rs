use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OAuth token stored for a (user, service) pair.
///
/// Created by a connector's `callback`, replaced on re-authorization and read
/// by the scheduler before each trigger/reaction call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OAuthToken {
    /// Bearer token used for API requests
    pub access_token: String,

    /// Refresh token, when the provider issues one
    pub refresh_token: Option<String>,

    /// When the access token expires (UTC); `None` for non-expiring tokens
    pub expires_at: Option<DateTime<Utc>>,
}

impl OAuthToken {
    /// A non-expiring bearer token without refresh token.
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: None,
        }
    }

    pub fn is_expired(&self) -> bool {
        matches!(self.expires_at, Some(at) if at <= Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_bearer_never_expires() {
        let token = OAuthToken::bearer("gho_123");
        assert_eq!(token.access_token, "gho_123");
        assert!(!token.is_expired());
    }

    #[test]
    fn test_expiry() {
        let mut token = OAuthToken::bearer("t");
        token.expires_at = Some(Utc::now() - Duration::seconds(1));
        assert!(token.is_expired());

        token.expires_at = Some(Utc::now() + Duration::hours(1));
        assert!(!token.is_expired());
    }
}
