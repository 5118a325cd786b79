use super::{
    OAuthProvider, ProviderGrant, ProviderKind, ProviderProfile, build_authorization_url,
    request_profile, request_refresh, request_token,
};
use crate::auth::{config::ProviderConfig, error::AuthError};
use async_trait::async_trait;
use reqwest::{
    Client,
    header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT},
};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

pub const GITHUB_SCOPES: &[&str] = &["repo", "delete_repo"];

const GITHUB_ACCEPT: &str = "application/vnd.github.v3+json";
const GITHUB_USER_AGENT: &str = concat!("datahub-auth/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct GitHubUser {
    #[serde(default)]
    login: String,
    #[serde(default)]
    id: i64,
    name: Option<String>,
    email: Option<String>,
}

/// GitHub account linking, a storage provider keyed by login
pub struct GitHubProvider {
    config: ProviderConfig,
    http: Client,
    timeout: Duration,
}

impl GitHubProvider {
    pub fn new(config: ProviderConfig, http: Client, timeout: Duration) -> Self {
        Self {
            config,
            http,
            timeout,
        }
    }

    // GitHub rejects API requests without a User-Agent
    fn headers(accept: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(accept));
        headers.insert(USER_AGENT, HeaderValue::from_static(GITHUB_USER_AGENT));
        headers
    }

    fn token_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(GITHUB_USER_AGENT));
        headers
    }
}

#[async_trait]
impl OAuthProvider for GitHubProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::GitHub
    }

    fn authorization_url(&self, state: &str) -> Result<Url, AuthError> {
        build_authorization_url(&self.config, GITHUB_SCOPES, state)
    }

    async fn exchange_code(&self, code: &str) -> Result<ProviderGrant, AuthError> {
        request_token(&self.http, self.timeout, &self.config, code, Self::token_headers()).await
    }

    // Only GitHub App user tokens expire and carry a refresh token
    async fn refresh(&self, refresh_token: &str) -> Result<ProviderGrant, AuthError> {
        request_refresh(
            &self.http,
            self.timeout,
            &self.config,
            refresh_token,
            Self::token_headers(),
        )
        .await
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<ProviderProfile, AuthError> {
        let user: GitHubUser = request_profile(
            &self.http,
            self.timeout,
            &self.config.user_info_url,
            access_token,
            Self::headers(GITHUB_ACCEPT),
        )
        .await?;

        if user.login.is_empty() || user.id == 0 {
            return Err(AuthError::profile_failed("profile has no login or id"));
        }

        Ok(ProviderProfile {
            display_name: user.name.unwrap_or_else(|| user.login.clone()),
            identifier: user.login,
            email: user.email,
        })
    }
}
