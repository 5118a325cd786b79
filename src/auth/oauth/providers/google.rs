use super::{
    OAuthProvider, ProviderGrant, ProviderKind, ProviderProfile, build_authorization_url,
    request_profile, request_refresh, request_token,
};
use crate::auth::{config::ProviderConfig, error::AuthError};
use async_trait::async_trait;
use reqwest::{Client, header::HeaderMap};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

pub const GOOGLE_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/userinfo.email",
    "https://www.googleapis.com/auth/userinfo.profile",
];

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    #[serde(default)]
    email: String,
    #[serde(default)]
    name: String,
}

/// Google sign-in, the broker's identity provider
pub struct GoogleProvider {
    config: ProviderConfig,
    http: Client,
    timeout: Duration,
}

impl GoogleProvider {
    pub fn new(config: ProviderConfig, http: Client, timeout: Duration) -> Self {
        Self {
            config,
            http,
            timeout,
        }
    }
}

#[async_trait]
impl OAuthProvider for GoogleProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Google
    }

    fn authorization_url(&self, state: &str) -> Result<Url, AuthError> {
        build_authorization_url(&self.config, GOOGLE_SCOPES, state)
    }

    async fn exchange_code(&self, code: &str) -> Result<ProviderGrant, AuthError> {
        request_token(&self.http, self.timeout, &self.config, code, HeaderMap::new()).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<ProviderGrant, AuthError> {
        request_refresh(
            &self.http,
            self.timeout,
            &self.config,
            refresh_token,
            HeaderMap::new(),
        )
        .await
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<ProviderProfile, AuthError> {
        let info: GoogleUserInfo = request_profile(
            &self.http,
            self.timeout,
            &self.config.user_info_url,
            access_token,
            HeaderMap::new(),
        )
        .await?;

        if info.email.is_empty() {
            return Err(AuthError::profile_failed("profile has no email"));
        }

        Ok(ProviderProfile {
            identifier: info.email.clone(),
            display_name: info.name,
            email: Some(info.email),
        })
    }
}
