use area::oauth::{OAuthClient, OAuthProvider};

pub const SERVICE_ID: &str = "github";
pub const BASE_URL: &str = "https://api.github.com";
pub const AUTH_URL: &str = "https://github.com/login/oauth/authorize";
pub const TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
pub const SCOPES: &[&str] = &["user", "repo"];
pub const API_VERSION: &str = "2022-11-28";
pub const ACCEPT: &str = "application/vnd.github+json";

/// GitHub OAuth provider.
///
/// Client credentials come from `AREA_OAUTH_GITHUB_CLIENT_ID` and
/// `AREA_OAUTH_GITHUB_CLIENT_SECRET`; when either is missing the connector
/// still registers, but `connect`/`callback` fail.
pub fn oauth_provider(public_url: &str) -> OAuthProvider {
    oauth_provider_with_client(public_url, OAuthClient::from_env(SERVICE_ID))
}

pub fn oauth_provider_with_client(public_url: &str, client: Option<OAuthClient>) -> OAuthProvider {
    OAuthProvider {
        service_id: SERVICE_ID.to_string(),
        auth_url: AUTH_URL.to_string(),
        token_url: TOKEN_URL.to_string(),
        scopes: SCOPES.iter().map(|s| s.to_string()).collect(),
        client,
        public_url: public_url.to_string(),
    }
}
