//! OAuth token exchange logic.
//!
//! Handles exchanging authorization codes for access tokens.

use crate::error::AreaError;
use crate::model::OAuthToken;
use chrono::{Duration, Utc};
use serde::Deserialize;
use std::collections::HashMap;

/// OAuth token response (standard OAuth 2.0).
///
/// GitHub answers a bad code with `200 OK` and an `error` body, so both
/// shapes are accepted here and told apart afterwards.
#[derive(Deserialize, Debug)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// Parameters of an authorization code exchange.
pub struct CodeExchange<'a> {
    pub service: &'a str,
    pub token_url: &'a str,
    pub code: &'a str,
    /// Sent only when the provider requires it to match the authorize request
    pub redirect_uri: Option<&'a str>,
    pub client_id: &'a str,
    pub client_secret: &'a str,
}

/// Exchange an authorization code for an access token.
///
/// # Returns
/// * `Ok(OAuthToken)` - Access token, refresh token, and expiration
/// * `Err(AreaError::Authorization)` - Transport failure, non-success status,
///   provider error body or missing access token
pub async fn exchange_code_for_token(
    http: &reqwest::Client,
    exchange: CodeExchange<'_>,
) -> Result<OAuthToken, AreaError> {
    let service = exchange.service;

    let mut form_data = HashMap::new();
    form_data.insert("grant_type", "authorization_code");
    form_data.insert("code", exchange.code);
    if let Some(redirect_uri) = exchange.redirect_uri {
        form_data.insert("redirect_uri", redirect_uri);
    }
    form_data.insert("client_id", exchange.client_id);
    form_data.insert("client_secret", exchange.client_secret);

    tracing::debug!(service = %service, "Exchanging authorization code for token at {}", exchange.token_url);

    let response = http
        .post(exchange.token_url)
        .header("Accept", "application/json")
        .form(&form_data)
        .send()
        .await
        .map_err(|e| AreaError::authorization(service, format!("token request failed: {}", e)))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
        return Err(AreaError::authorization(
            service,
            format!("token exchange failed with status {}: {}", status, body),
        ));
    }

    let token_response: TokenResponse = response
        .json()
        .await
        .map_err(|e| AreaError::authorization(service, format!("invalid token response: {}", e)))?;

    into_token(service, token_response)
}

fn into_token(service: &str, response: TokenResponse) -> Result<OAuthToken, AreaError> {
    if let Some(error) = response.error {
        let description = response
            .error_description
            .unwrap_or_else(|| "no description".to_string());
        return Err(AreaError::authorization(service, format!("{}: {}", error, description)));
    }

    let access_token = response
        .access_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AreaError::authorization(service, "token response has no access_token"))?;

    tracing::debug!(
        service = %service,
        has_refresh_token = response.refresh_token.is_some(),
        expires_in = ?response.expires_in,
        "Token exchange successful"
    );

    Ok(OAuthToken {
        access_token,
        refresh_token: response.refresh_token,
        expires_at: response
            .expires_in
            .map(|seconds| Utc::now() + Duration::seconds(seconds)),
    })
}
