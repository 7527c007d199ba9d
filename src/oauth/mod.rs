//! OAuth 2.0 authorization code flow shared by connectors.
//!
//! 1. Web layer asks a connector to `connect(user_id)` → authorization URL
//! 2. User authorizes on the provider's site
//! 3. Provider redirects to `{public_url}/service/oauth/{service}/callback?userId=..&code=..`
//! 4. Web layer parses the query ([`OAuthCallbackParams`]) and calls
//!    [`complete_authorization`], which runs the connector's `callback(code)`
//!    and stores the token through the persistence gateway
//! 5. The scheduler can now evaluate automations using that service

mod exchange;

pub use exchange::{exchange_code_for_token, CodeExchange};

use crate::error::AreaError;
use crate::model::{OAuthToken, UserId};
use crate::persistence::PersistenceGateway;
use crate::registry::ConnectorRegistry;
use serde::Deserialize;
use tracing::{info, warn};

/// Client credentials of a registered OAuth application.
#[derive(Clone, Debug)]
pub struct OAuthClient {
    pub client_id: String,
    pub client_secret: String,
}

impl OAuthClient {
    /// Reads `AREA_OAUTH_{SERVICE}_CLIENT_ID` and `AREA_OAUTH_{SERVICE}_CLIENT_SECRET`.
    ///
    /// Returns `None` when either variable is unset or empty.
    pub fn from_env(service_id: &str) -> Option<Self> {
        let prefix = format!("AREA_OAUTH_{}", service_id.to_uppercase());
        let client_id = std::env::var(format!("{}_CLIENT_ID", prefix)).ok()?;
        let client_secret = std::env::var(format!("{}_CLIENT_SECRET", prefix)).ok()?;
        if client_id.is_empty() || client_secret.is_empty() {
            return None;
        }
        Some(Self {
            client_id,
            client_secret,
        })
    }
}

/// OAuth provider configuration of one connector.
#[derive(Clone, Debug)]
pub struct OAuthProvider {
    /// Service id the provider belongs to (used in the callback path)
    pub service_id: String,

    /// OAuth authorization endpoint URL
    pub auth_url: String,

    /// OAuth token exchange endpoint URL
    pub token_url: String,

    /// Required OAuth scopes
    pub scopes: Vec<String>,

    /// Client credentials; `None` when not configured
    pub client: Option<OAuthClient>,

    /// Public base URL of the API, used to build the callback URL
    pub public_url: String,
}

impl OAuthProvider {
    fn client(&self) -> Option<&OAuthClient> {
        self.client.as_ref()
    }

    /// Builds the provider authorization URL for `user_id`.
    pub fn authorize_url(&self, user_id: UserId) -> Result<String, AreaError> {
        let client = self.client().ok_or_else(|| {
            AreaError::Configuration(format!(
                "OAuth not configured for service '{}'. Set AREA_OAUTH_{}_CLIENT_ID and AREA_OAUTH_{}_CLIENT_SECRET.",
                self.service_id,
                self.service_id.to_uppercase(),
                self.service_id.to_uppercase()
            ))
        })?;
        let redirect_uri = callback_redirect_uri(&self.public_url, &self.service_id, user_id);
        let scopes = self.scopes.join(" ");
        Ok(format!(
            "{}?client_id={}&redirect_uri={}&scope={}&response_type=code",
            self.auth_url,
            urlencoding::encode(&client.client_id),
            urlencoding::encode(&redirect_uri),
            urlencoding::encode(&scopes),
        ))
    }

    /// Exchanges `code` at the token endpoint.
    pub async fn exchange(&self, http: &reqwest::Client, code: &str) -> Result<OAuthToken, AreaError> {
        let client = self
            .client()
            .ok_or_else(|| AreaError::authorization(&self.service_id, "OAuth client not configured"))?;
        exchange_code_for_token(
            http,
            CodeExchange {
                service: &self.service_id,
                token_url: &self.token_url,
                code,
                redirect_uri: None,
                client_id: &client.client_id,
                client_secret: &client.client_secret,
            },
        )
        .await
    }
}

/// Callback URL the provider redirects to after authorization.
pub fn callback_redirect_uri(public_url: &str, service_id: &str, user_id: UserId) -> String {
    format!(
        "{}/service/oauth/{}/callback?userId={}",
        public_url.trim_end_matches('/'),
        service_id,
        user_id
    )
}

/// Query parameters of the provider redirect.
#[derive(Deserialize, Debug, PartialEq)]
pub struct OAuthCallbackParams {
    pub code: Option<String>,
    #[serde(rename = "userId")]
    pub user_id: Option<i64>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl OAuthCallbackParams {
    pub fn from_query(query: &str) -> Result<Self, AreaError> {
        serde_urlencoded::from_str(query)
            .map_err(|e| AreaError::authorization("oauth", format!("malformed callback query: {}", e)))
    }

    /// The `(user, code)` pair, or the provider's error.
    pub fn into_grant(self, service_id: &str) -> Result<(UserId, String), AreaError> {
        if let Some(error) = self.error {
            let description = self
                .error_description
                .unwrap_or_else(|| "Unknown error".to_string());
            return Err(AreaError::authorization(service_id, format!("{} - {}", error, description)));
        }
        let code = self
            .code
            .ok_or_else(|| AreaError::authorization(service_id, "missing 'code' parameter"))?;
        let user_id = self
            .user_id
            .ok_or_else(|| AreaError::authorization(service_id, "missing 'userId' parameter"))?;
        Ok((UserId(user_id), code))
    }
}

/// Runs a connector's `callback` and stores the resulting token for
/// `(user_id, service_id)`.
pub async fn complete_authorization<G>(
    registry: &ConnectorRegistry,
    gateway: &G,
    user_id: UserId,
    service_id: &str,
    code: &str,
) -> Result<OAuthToken, AreaError>
where
    G: PersistenceGateway + ?Sized,
{
    let connector = registry.get(service_id).ok_or_else(|| AreaError::NotFound {
        kind: "connector",
        id: service_id.to_string(),
    })?;

    let token = match connector.callback(code).await {
        Ok(token) => token,
        Err(e) => {
            warn!(user_id = %user_id, service = %service_id, error = %e, "OAuth callback failed");
            return Err(e);
        }
    };

    gateway.store_service_token(user_id, service_id, &token).await?;

    info!(
        user_id = %user_id,
        service = %service_id,
        has_refresh_token = token.refresh_token.is_some(),
        "OAuth flow completed successfully"
    );
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(client: Option<OAuthClient>) -> OAuthProvider {
        OAuthProvider {
            service_id: "github".to_string(),
            auth_url: "https://github.com/login/oauth/authorize".to_string(),
            token_url: "https://github.com/login/oauth/access_token".to_string(),
            scopes: vec!["user".to_string(), "repo".to_string()],
            client,
            public_url: "http://localhost:8080/".to_string(),
        }
    }

    #[test]
    fn test_authorize_url() {
        let provider = provider(Some(OAuthClient {
            client_id: "client_123".to_string(),
            client_secret: "secret".to_string(),
        }));
        let url = provider.authorize_url(UserId(42)).unwrap();

        assert!(url.starts_with("https://github.com/login/oauth/authorize?"));
        assert!(url.contains("client_id=client_123"));
        assert!(url.contains("scope=user%20repo"));
        assert!(url.contains(&format!(
            "redirect_uri={}",
            urlencoding::encode("http://localhost:8080/service/oauth/github/callback?userId=42")
        )));
        assert!(!url.contains("secret"));
    }

    #[test]
    fn test_authorize_url_without_client_is_configuration_error() {
        let err = provider(None).authorize_url(UserId(1)).unwrap_err();
        assert!(matches!(err, AreaError::Configuration(_)));
        assert!(err.to_string().contains("AREA_OAUTH_GITHUB_CLIENT_ID"));
    }

    #[tokio::test]
    async fn test_exchange_without_client_is_authorization_error() {
        let err = provider(None)
            .exchange(&reqwest::Client::new(), "code")
            .await
            .unwrap_err();
        assert!(matches!(err, AreaError::Authorization { .. }));
    }

    #[test]
    fn test_callback_params() {
        let params = OAuthCallbackParams::from_query("userId=7&code=auth_code_123").unwrap();
        assert_eq!(params.user_id, Some(7));
        let (user_id, code) = params.into_grant("github").unwrap();
        assert_eq!(user_id, UserId(7));
        assert_eq!(code, "auth_code_123");
    }

    #[test]
    fn test_callback_params_error() {
        let params =
            OAuthCallbackParams::from_query("userId=7&error=access_denied&error_description=User+cancelled")
                .unwrap();
        let err = params.into_grant("github").unwrap_err();
        assert!(err.to_string().contains("access_denied - User cancelled"));

        let params = OAuthCallbackParams::from_query("code=abc").unwrap();
        assert!(params.into_grant("github").is_err());
    }
}
