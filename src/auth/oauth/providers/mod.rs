//! Upstream OAuth2 provider adapters
//!
//! Each adapter builds the authorization URL, exchanges an authorization code
//! at the token endpoint, renews stored grants with their refresh token and
//! fetches the user's profile. Authorization URLs are
//! built with `oauth2`; the token and profile calls go through `reqwest`
//! directly so that provider quirks (GitHub's 200-with-error bodies, missing
//! `token_type`) can be handled explicitly.

pub mod github;
pub mod google;

use crate::{
    auth::{config::ProviderConfig, error::AuthError},
    config::Config,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use oauth2::{
    AuthUrl, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet, RedirectUrl, Scope,
    basic::BasicClient,
};
use reqwest::{Client, header::HeaderMap};
use serde::{Deserialize, de::DeserializeOwned};
use std::{collections::HashMap, sync::Arc, time::Duration};
use url::Url;

pub use crate::database::entities::ProviderKind;
pub use github::GitHubProvider;
pub use google::GoogleProvider;

// Only the authorization endpoint is needed from oauth2
pub type AuthorizeClient =
    BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet>;

/// Result of a successful code exchange
#[derive(Debug, Clone)]
pub struct ProviderGrant {
    pub access_token: String,
    pub token_type: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub refresh_expires_at: Option<DateTime<Utc>>,
    pub issued_at: DateTime<Utc>,
}

/// Validated profile returned by a provider
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderProfile {
    /// Email for identity providers, account login for storage providers
    pub identifier: String,
    pub display_name: String,
    pub email: Option<String>,
}

#[async_trait]
pub trait OAuthProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn authorization_url(&self, state: &str) -> Result<Url, AuthError>;

    async fn exchange_code(&self, code: &str) -> Result<ProviderGrant, AuthError>;

    /// Trade a stored refresh token for a new grant
    async fn refresh(&self, refresh_token: &str) -> Result<ProviderGrant, AuthError>;

    async fn fetch_profile(&self, access_token: &str) -> Result<ProviderProfile, AuthError>;
}

/// Configured providers keyed by kind
#[derive(Clone)]
pub struct ProviderRegistry {
    providers: HashMap<ProviderKind, Arc<dyn OAuthProvider>>,
    primary: ProviderKind,
}

impl ProviderRegistry {
    pub fn new(primary: ProviderKind) -> Self {
        Self {
            providers: HashMap::new(),
            primary,
        }
    }

    /// Register every provider that has client credentials configured
    pub fn from_config(config: &Config) -> Result<Self, AuthError> {
        let http = build_http_client(config.oauth.request_timeout_seconds)?;
        let timeout = Duration::from_secs(config.oauth.request_timeout_seconds);
        let mut registry = Self::new(ProviderKind::Google);

        if config.oauth.google.is_configured() {
            registry.register(Arc::new(GoogleProvider::new(
                config.oauth.google.clone(),
                http.clone(),
                timeout,
            )));
        }
        if config.oauth.github.is_configured() {
            registry.register(Arc::new(GitHubProvider::new(
                config.oauth.github.clone(),
                http,
                timeout,
            )));
        } else {
            tracing::warn!("GitHub OAuth client not configured; account linking disabled");
        }

        Ok(registry)
    }

    pub fn register(&mut self, provider: Arc<dyn OAuthProvider>) {
        self.providers.insert(provider.kind(), provider);
    }

    pub fn primary(&self) -> ProviderKind {
        self.primary
    }

    pub fn get(&self, kind: ProviderKind) -> Result<Arc<dyn OAuthProvider>, AuthError> {
        self.providers
            .get(&kind)
            .cloned()
            .ok_or_else(|| AuthError::UnsupportedProvider(kind.slug().to_string()))
    }

    pub fn configured(&self) -> Vec<ProviderKind> {
        let mut kinds: Vec<_> = self.providers.keys().copied().collect();
        kinds.sort_by_key(|kind| kind.slug());
        kinds
    }
}

pub fn build_http_client(timeout_seconds: u64) -> Result<Client, AuthError> {
    reqwest::ClientBuilder::new()
        // Following redirects opens the client up to SSRF vulnerabilities.
        .redirect(reqwest::redirect::Policy::none())
        .timeout(Duration::from_secs(timeout_seconds))
        .build()
        .map_err(|e| AuthError::ProviderMisconfigured {
            message: "Failed to build HTTP client".to_string(),
            details: Some(e.to_string()),
        })
}

/// Build the oauth2 client used for authorization URLs
pub(crate) fn authorize_client(config: &ProviderConfig) -> Result<AuthorizeClient, AuthError> {
    let auth_url = AuthUrl::new(config.authorization_url.clone())
        .map_err(|e| misconfigured("authorization URL", e))?;

    let mut client = BasicClient::new(ClientId::new(config.client_id.clone()))
        .set_client_secret(ClientSecret::new(config.client_secret.clone()))
        .set_auth_uri(auth_url);

    if !config.callback_url.is_empty() {
        let redirect_url = RedirectUrl::new(config.callback_url.clone())
            .map_err(|e| misconfigured("callback URL", e))?;
        client = client.set_redirect_uri(redirect_url);
    }

    Ok(client)
}

/// Authorization URL with offline access and forced consent
pub(crate) fn build_authorization_url(
    config: &ProviderConfig,
    scopes: &[&str],
    state: &str,
) -> Result<Url, AuthError> {
    let client = authorize_client(config)?;
    let (url, _csrf) = client
        .authorize_url(|| CsrfToken::new(state.to_string()))
        .add_scopes(scopes.iter().map(|s| Scope::new(s.to_string())))
        .add_extra_param("access_type", "offline")
        .add_extra_param("prompt", "consent")
        .url();
    Ok(url)
}

fn misconfigured(what: &str, err: impl ToString) -> AuthError {
    AuthError::ProviderMisconfigured {
        message: format!("Invalid {what} configured for OAuth provider"),
        details: Some(err.to_string()),
    }
}

/// Raw token endpoint body; providers differ in which fields they send
#[derive(Debug, Deserialize)]
pub(crate) struct TokenEndpointResponse {
    pub access_token: Option<String>,
    pub token_type: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
    pub refresh_token_expires_in: Option<i64>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl TokenEndpointResponse {
    /// Validate the body and turn it into a grant.
    ///
    /// A missing `token_type` means bearer. `expires_in` of zero or absent
    /// means the provider did not state an expiry.
    pub(crate) fn into_grant(self) -> Result<ProviderGrant, AuthError> {
        if let Some(error) = self.error {
            let details = match self.error_description {
                Some(description) => format!("{error}: {description}"),
                None => error,
            };
            return Err(AuthError::exchange_failed(details));
        }

        let access_token = self
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| AuthError::exchange_failed("token response has no access token"))?;

        let token_type = self
            .token_type
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| DEFAULT_TOKEN_TYPE.to_string());
        if !token_type.eq_ignore_ascii_case(DEFAULT_TOKEN_TYPE) {
            return Err(AuthError::exchange_failed(format!(
                "unsupported token type: {token_type}"
            )));
        }

        let issued_at = Utc::now();
        let expires_at = match self.expires_in {
            Some(secs) if secs < 0 => {
                return Err(AuthError::exchange_failed("token already expired"));
            }
            Some(0) | None => None,
            Some(secs) => Some(expiry_after(issued_at, secs)?),
        };
        let refresh_token = self.refresh_token.filter(|token| !token.is_empty());
        let refresh_expires_at = match (&refresh_token, self.refresh_token_expires_in) {
            (Some(_), Some(secs)) if secs > 0 => Some(expiry_after(issued_at, secs)?),
            _ => None,
        };

        Ok(ProviderGrant {
            access_token,
            token_type,
            refresh_token,
            expires_at,
            refresh_expires_at,
            issued_at,
        })
    }
}

const DEFAULT_TOKEN_TYPE: &str = "bearer";

fn expiry_after(issued_at: DateTime<Utc>, secs: i64) -> Result<DateTime<Utc>, AuthError> {
    chrono::Duration::try_seconds(secs)
        .and_then(|lifetime| issued_at.checked_add_signed(lifetime))
        .ok_or_else(|| AuthError::exchange_failed("token expiry out of range"))
}

/// POST the authorization code to the provider's token endpoint
pub(crate) async fn request_token(
    http: &Client,
    timeout: Duration,
    config: &ProviderConfig,
    code: &str,
    headers: HeaderMap,
) -> Result<ProviderGrant, AuthError> {
    if code.is_empty() {
        return Err(AuthError::exchange_failed("authorization code is empty"));
    }

    let mut form = vec![
        ("grant_type", "authorization_code"),
        ("code", code),
        ("client_id", config.client_id.as_str()),
        ("client_secret", config.client_secret.as_str()),
    ];
    if !config.callback_url.is_empty() {
        form.push(("redirect_uri", config.callback_url.as_str()));
    }

    post_token_form(http, timeout, &config.token_url, &form, headers)
        .await?
        .into_grant()
}

/// Renew a grant with the `refresh_token` grant type
pub(crate) async fn request_refresh(
    http: &Client,
    timeout: Duration,
    config: &ProviderConfig,
    refresh_token: &str,
    headers: HeaderMap,
) -> Result<ProviderGrant, AuthError> {
    if refresh_token.is_empty() {
        return Err(AuthError::refresh_failed("refresh token is empty"));
    }

    let form = [
        ("grant_type", "refresh_token"),
        ("refresh_token", refresh_token),
        ("client_id", config.client_id.as_str()),
        ("client_secret", config.client_secret.as_str()),
    ];

    post_token_form(http, timeout, &config.token_url, &form, headers)
        .await
        .and_then(TokenEndpointResponse::into_grant)
        .map_err(AuthError::into_refresh_failure)
}

async fn post_token_form(
    http: &Client,
    timeout: Duration,
    token_url: &str,
    form: &[(&str, &str)],
    headers: HeaderMap,
) -> Result<TokenEndpointResponse, AuthError> {
    let request = http
        .post(token_url)
        .headers(headers)
        .header(reqwest::header::ACCEPT, "application/json")
        .form(form)
        .send();

    let response = tokio::time::timeout(timeout, request)
        .await
        .map_err(|_| AuthError::exchange_failed("token request timed out"))?
        .map_err(|e| AuthError::exchange_failed(format!("token request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(AuthError::exchange_failed(format!(
            "token endpoint returned {status}"
        )));
    }

    response
        .json::<TokenEndpointResponse>()
        .await
        .map_err(|e| AuthError::exchange_failed(format!("invalid token response: {e}")))
}

/// GET a JSON profile document with the access token as bearer credential
pub(crate) async fn request_profile<T: DeserializeOwned>(
    http: &Client,
    timeout: Duration,
    url: &str,
    access_token: &str,
    headers: HeaderMap,
) -> Result<T, AuthError> {
    let request = http
        .get(url)
        .headers(headers)
        .bearer_auth(access_token)
        .send();

    let response = tokio::time::timeout(timeout, request)
        .await
        .map_err(|_| AuthError::profile_failed("profile request timed out"))?
        .map_err(|e| AuthError::profile_failed(format!("profile request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(AuthError::profile_failed(format!(
            "profile endpoint returned {status}"
        )));
    }

    response
        .json::<T>()
        .await
        .map_err(|e| AuthError::profile_failed(format!("invalid profile response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_response(json: serde_json::Value) -> TokenEndpointResponse {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_grant_from_complete_response() {
        let grant = token_response(serde_json::json!({
            "access_token": "ya29.token",
            "token_type": "Bearer",
            "expires_in": 3599,
            "refresh_token": "1//refresh"
        }))
        .into_grant()
        .unwrap();

        assert_eq!(grant.access_token, "ya29.token");
        assert_eq!(grant.refresh_token.as_deref(), Some("1//refresh"));
        let expires_at = grant.expires_at.unwrap();
        assert!(expires_at > grant.issued_at);
        assert!(grant.refresh_expires_at.is_none());
    }

    #[test]
    fn test_error_field_fails_exchange() {
        let err = token_response(serde_json::json!({
            "error": "bad_verification_code",
            "error_description": "The code passed is incorrect or expired."
        }))
        .into_grant()
        .unwrap_err();

        assert_eq!(err.code(), "TOKEN_EXCHANGE_FAILED");
        assert!(err.details().unwrap().contains("bad_verification_code"));
    }

    #[test]
    fn test_missing_token_type_defaults_to_bearer() {
        let grant = token_response(serde_json::json!({ "access_token": "gho_token" }))
            .into_grant()
            .unwrap();
        assert_eq!(grant.token_type, "bearer");
    }

    #[test]
    fn test_empty_access_token_and_expired_grant_fail() {
        assert!(
            token_response(serde_json::json!({ "access_token": "", "token_type": "bearer" }))
                .into_grant()
                .is_err()
        );
        let err = token_response(serde_json::json!({
            "access_token": "token",
            "token_type": "bearer",
            "expires_in": -30
        }))
        .into_grant()
        .unwrap_err();
        assert_eq!(err.details(), Some("token already expired"));
    }

    #[test]
    fn test_zero_expires_in_means_no_expiry() {
        let grant = token_response(serde_json::json!({
            "access_token": "token",
            "token_type": "bearer",
            "expires_in": 0
        }))
        .into_grant()
        .unwrap();
        assert!(grant.expires_at.is_none());
    }

    #[test]
    fn test_out_of_range_expiry_fails_exchange() {
        let err = token_response(serde_json::json!({
            "access_token": "t",
            "token_type": "bearer",
            "expires_in": 100_000_000_000_000_i64
        }))
        .into_grant()
        .unwrap_err();
        assert_eq!(err.code(), "TOKEN_EXCHANGE_FAILED");
        assert_eq!(err.details(), Some("token expiry out of range"));

        let err = token_response(serde_json::json!({
            "access_token": "t",
            "token_type": "bearer",
            "refresh_token": "r",
            "refresh_token_expires_in": i64::MAX
        }))
        .into_grant()
        .unwrap_err();
        assert_eq!(err.details(), Some("token expiry out of range"));
    }

    #[test]
    fn test_non_bearer_token_type_fails() {
        let err = token_response(serde_json::json!({
            "access_token": "token",
            "token_type": "mac"
        }))
        .into_grant()
        .unwrap_err();
        assert!(err.details().unwrap().contains("mac"));
    }

    #[test]
    fn test_authorization_url_parameters() {
        let mut config = ProviderConfig::google();
        config.client_id = "client-123".to_string();
        config.client_secret = "secret".to_string();
        config.callback_url = "http://localhost:3000/callback".to_string();

        let url = build_authorization_url(&config, &["scope-a", "scope-b"], "state-xyz").unwrap();
        let params: HashMap<String, String> = url.query_pairs().into_owned().collect();

        assert_eq!(params["client_id"], "client-123");
        assert_eq!(params["state"], "state-xyz");
        assert_eq!(params["redirect_uri"], "http://localhost:3000/callback");
        assert_eq!(params["scope"], "scope-a scope-b");
        assert_eq!(params["access_type"], "offline");
        assert_eq!(params["prompt"], "consent");
        assert_eq!(params["response_type"], "code");
    }

    #[test]
    fn test_invalid_authorization_endpoint_is_misconfiguration() {
        let mut config = ProviderConfig::github();
        config.authorization_url = "not a url".to_string();
        let err = build_authorization_url(&config, &["repo"], "state").unwrap_err();
        assert_eq!(err.code(), "PROVIDER_CONFIGURATION_ERROR");
    }

    #[test]
    fn test_registry_lookup() {
        let mut config = Config::default();
        config.oauth.google.client_id = "id".to_string();
        config.oauth.google.client_secret = "secret".to_string();

        let registry = ProviderRegistry::from_config(&config).unwrap();
        assert_eq!(registry.primary(), ProviderKind::Google);
        assert!(registry.get(ProviderKind::Google).is_ok());
        let err = registry.get(ProviderKind::GitHub).err().unwrap();
        assert_eq!(err.code(), "UNSUPPORTED_PROVIDER");
        assert_eq!(registry.configured(), vec![ProviderKind::Google]);
    }
}
