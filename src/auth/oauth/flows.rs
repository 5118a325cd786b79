use crate::{
    auth::{
        error::AuthError,
        oauth::{
            linking::AccountLinkingPolicy,
            providers::{
                OAuthProvider, ProviderGrant, ProviderKind, ProviderProfile, ProviderRegistry,
            },
            state::StateRegistry,
        },
        session::{SessionClaims, SessionService},
    },
    database::{
        DatabaseError, UserStore,
        entities::{ProviderTokenRecord, UserRecord},
    },
};
use chrono::Utc;
use std::{fmt, sync::Arc};

/// Progress of a single sign-in or linking attempt, recorded in the `stage` log field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStage {
    UrlRequested,
    StateIssued,
    CallbackReceived,
    StateVerified,
    CodeExchanged,
    ProfileFetched,
    Persisted,
    SessionIssued,
    LinkConfirmed,
    StateInvalid,
    ExchangeFailed,
    ProfileFailed,
    PersistFailed,
    SessionFailed,
}

impl FlowStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowStage::UrlRequested => "URL_REQUESTED",
            FlowStage::StateIssued => "STATE_ISSUED",
            FlowStage::CallbackReceived => "CALLBACK_RECEIVED",
            FlowStage::StateVerified => "STATE_VERIFIED",
            FlowStage::CodeExchanged => "CODE_EXCHANGED",
            FlowStage::ProfileFetched => "PROFILE_FETCHED",
            FlowStage::Persisted => "PERSISTED",
            FlowStage::SessionIssued => "SESSION_ISSUED",
            FlowStage::LinkConfirmed => "LINK_CONFIRMED",
            FlowStage::StateInvalid => "STATE_INVALID",
            FlowStage::ExchangeFailed => "EXCHANGE_FAILED",
            FlowStage::ProfileFailed => "PROFILE_FAILED",
            FlowStage::PersistFailed => "PERSIST_FAILED",
            FlowStage::SessionFailed => "SESSION_FAILED",
        }
    }

    /// Terminal stage for a failed flow, if the error belongs to one
    pub fn for_error(err: &AuthError) -> Option<Self> {
        match err {
            AuthError::InvalidState { .. } | AuthError::StateUnavailable { .. } => {
                Some(FlowStage::StateInvalid)
            }
            AuthError::ExchangeFailed { .. } => Some(FlowStage::ExchangeFailed),
            AuthError::ProfileFailed { .. } => Some(FlowStage::ProfileFailed),
            AuthError::UserCreationFailed { .. } | AuthError::PersistFailed { .. } => {
                Some(FlowStage::PersistFailed)
            }
            AuthError::SessionFailed { .. } => Some(FlowStage::SessionFailed),
            _ => None,
        }
    }
}

impl fmt::Display for FlowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct SignInOutcome {
    pub user: UserRecord,
    pub token: String,
}

#[derive(Debug, Clone)]
pub struct LinkOutcome {
    pub provider: ProviderKind,
    pub account: String,
}

/// OAuth flow handlers: sign-in with the identity provider and linking of
/// storage provider accounts
pub struct OAuthFlows {
    providers: ProviderRegistry,
    state: StateRegistry,
    linking: AccountLinkingPolicy,
    users: Arc<dyn UserStore>,
    session: Arc<dyn SessionService>,
}

impl OAuthFlows {
    pub fn new(
        providers: ProviderRegistry,
        state: StateRegistry,
        linking: AccountLinkingPolicy,
        users: Arc<dyn UserStore>,
        session: Arc<dyn SessionService>,
    ) -> Self {
        Self {
            providers,
            state,
            linking,
            users,
            session,
        }
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    pub fn state(&self) -> &StateRegistry {
        &self.state
    }

    pub fn session(&self) -> &Arc<dyn SessionService> {
        &self.session
    }

    /// Issue a state token and build the provider's authorization URL around it.
    ///
    /// Storage providers require a verified session.
    pub async fn authorization_url(
        &self,
        kind: ProviderKind,
        session: Option<&SessionClaims>,
    ) -> Result<String, AuthError> {
        trace_stage(FlowStage::UrlRequested, kind);

        if kind.requires_account_identifier() && session.is_none() {
            return Err(AuthError::unauthenticated("Authorization header is required"));
        }
        let provider = self.providers.get(kind)?;

        let state = self
            .state
            .issue()
            .await
            .map_err(AuthError::state_unavailable)?;
        trace_stage(FlowStage::StateIssued, kind);

        match provider.authorization_url(&state) {
            Ok(url) => Ok(url.to_string()),
            Err(err) => {
                if let Err(discard_err) = self.state.discard(&state).await {
                    tracing::warn!(provider = %kind, "Failed to discard state: {}", discard_err);
                }
                Err(err)
            }
        }
    }

    /// Complete sign-in with the identity provider and mint a session token
    pub async fn sign_in(
        &self,
        kind: ProviderKind,
        code: &str,
        state: &str,
    ) -> Result<SignInOutcome, AuthError> {
        let result = self.sign_in_internal(kind, code, state).await;
        trace_outcome(kind, None, &result);
        result
    }

    async fn sign_in_internal(
        &self,
        kind: ProviderKind,
        code: &str,
        state: &str,
    ) -> Result<SignInOutcome, AuthError> {
        if kind != self.providers.primary() {
            return Err(AuthError::UnsupportedProvider(kind.slug().to_string()));
        }
        let provider = self.providers.get(kind)?;

        let (grant, profile) = self.complete_provider_leg(provider.as_ref(), code, state).await?;

        let email = profile.email.as_deref().unwrap_or(&profile.identifier);
        let user = self.resolve_user(email, &profile.display_name).await?;

        self.linking.upsert(user.id, kind, None, &grant).await?;
        trace_stage_for_user(FlowStage::Persisted, kind, user.id);

        let token = self.session.issue(user.id, &user.email)?;
        trace_stage_for_user(FlowStage::SessionIssued, kind, user.id);

        Ok(SignInOutcome { user, token })
    }

    /// Link a storage provider account to the session's user
    pub async fn link_account(
        &self,
        kind: ProviderKind,
        session: &SessionClaims,
        code: &str,
        state: &str,
    ) -> Result<LinkOutcome, AuthError> {
        let result = self.link_account_internal(kind, session, code, state).await;
        trace_outcome(kind, Some(session.sub), &result);
        result
    }

    async fn link_account_internal(
        &self,
        kind: ProviderKind,
        session: &SessionClaims,
        code: &str,
        state: &str,
    ) -> Result<LinkOutcome, AuthError> {
        if !kind.requires_account_identifier() {
            return Err(AuthError::UnsupportedProvider(kind.slug().to_string()));
        }
        let provider = self.providers.get(kind)?;

        let (grant, profile) = self.complete_provider_leg(provider.as_ref(), code, state).await?;

        self.linking
            .upsert(session.sub, kind, Some(&profile.identifier), &grant)
            .await?;
        trace_stage_for_user(FlowStage::Persisted, kind, session.sub);
        trace_stage_for_user(FlowStage::LinkConfirmed, kind, session.sub);

        Ok(LinkOutcome {
            provider: kind,
            account: profile.identifier,
        })
    }

    /// Linked account identifiers of the session's user
    pub async fn list_accounts(
        &self,
        kind: ProviderKind,
        session: &SessionClaims,
    ) -> Result<Vec<String>, AuthError> {
        if !kind.requires_account_identifier() {
            return Err(AuthError::UnsupportedProvider(kind.slug().to_string()));
        }
        self.linking.list_accounts(session.sub, kind).await
    }

    /// Stored credential of a user for a provider account
    pub async fn credential(
        &self,
        kind: ProviderKind,
        user_id: i32,
        account_identifier: Option<&str>,
    ) -> Result<Option<ProviderTokenRecord>, AuthError> {
        self.linking.find(user_id, kind, account_identifier).await
    }

    /// Renew a stored credential with its refresh token and persist the new grant
    pub async fn refresh_credential(
        &self,
        kind: ProviderKind,
        user_id: i32,
        account_identifier: Option<&str>,
    ) -> Result<ProviderTokenRecord, AuthError> {
        let provider = self.providers.get(kind)?;
        let record = self
            .linking
            .find(user_id, kind, account_identifier)
            .await?
            .ok_or_else(|| AuthError::refresh_failed("no stored credential"))?;

        let refresh_token = match record.refresh_token.as_deref() {
            Some(token) if record.can_refresh(Utc::now()) => token.to_string(),
            _ => return Err(AuthError::refresh_failed("no usable refresh token")),
        };

        let grant = provider.refresh(&refresh_token).await.inspect_err(|err| {
            tracing::warn!(
                provider = %kind,
                user_id,
                code = err.code(),
                "Credential refresh failed: {}",
                err
            );
        })?;
        let updated = self.linking.apply_refresh(record, &grant).await?;

        tracing::info!(provider = %kind, user_id, "Provider credential refreshed");
        Ok(updated)
    }

    /// Probe the provider's profile endpoint with the stored access token.
    ///
    /// An unlinked account is reported as invalid.
    pub async fn is_credential_valid(
        &self,
        kind: ProviderKind,
        user_id: i32,
        account_identifier: Option<&str>,
    ) -> Result<bool, AuthError> {
        let provider = self.providers.get(kind)?;
        let Some(record) = self
            .linking
            .find(user_id, kind, account_identifier)
            .await?
        else {
            return Ok(false);
        };

        match provider.fetch_profile(&record.access_token).await {
            Ok(_) => Ok(true),
            Err(err) => {
                tracing::debug!(provider = %kind, user_id, "Stored access token rejected: {}", err);
                Ok(false)
            }
        }
    }

    /// State check, code exchange and profile fetch shared by both flows
    async fn complete_provider_leg(
        &self,
        provider: &dyn OAuthProvider,
        code: &str,
        state: &str,
    ) -> Result<(ProviderGrant, ProviderProfile), AuthError> {
        let kind = provider.kind();
        trace_stage(FlowStage::CallbackReceived, kind);

        let valid = self
            .state
            .verify_and_consume(state)
            .await
            .map_err(AuthError::state_check_failed)?;
        if !valid {
            return Err(AuthError::invalid_state());
        }
        trace_stage(FlowStage::StateVerified, kind);

        let grant = provider.exchange_code(code).await?;
        trace_stage(FlowStage::CodeExchanged, kind);

        let profile = provider.fetch_profile(&grant.access_token).await?;
        trace_stage(FlowStage::ProfileFetched, kind);

        Ok((grant, profile))
    }

    /// Find the user by email, creating it on first sign-in
    async fn resolve_user(&self, email: &str, name: &str) -> Result<UserRecord, AuthError> {
        if let Some(user) = self
            .users
            .find_by_email(email)
            .await
            .map_err(AuthError::user_creation_failed)?
        {
            return Ok(user);
        }

        match self.users.create(email, name).await {
            Ok(user) => {
                tracing::info!(user_id = user.id, "Created user on first sign-in");
                Ok(user)
            }
            // Concurrent first sign-in for the same email
            Err(DatabaseError::Constraint(_)) => self
                .users
                .find_by_email(email)
                .await
                .map_err(AuthError::user_creation_failed)?
                .ok_or_else(|| AuthError::user_creation_failed("user vanished after conflict")),
            Err(e) => Err(AuthError::user_creation_failed(e)),
        }
    }
}

fn trace_stage(stage: FlowStage, provider: ProviderKind) {
    tracing::debug!(stage = stage.as_str(), provider = %provider, "OAuth flow progressed");
}

fn trace_stage_for_user(stage: FlowStage, provider: ProviderKind, user_id: i32) {
    tracing::debug!(
        stage = stage.as_str(),
        provider = %provider,
        user_id,
        "OAuth flow progressed"
    );
}

fn trace_outcome<T>(provider: ProviderKind, user_id: Option<i32>, result: &Result<T, AuthError>) {
    match result {
        Ok(_) => tracing::info!(provider = %provider, user_id, "OAuth flow completed"),
        Err(err) => {
            let stage = FlowStage::for_error(err).map(|s| s.as_str());
            tracing::warn!(
                stage,
                provider = %provider,
                user_id,
                code = err.code(),
                "OAuth flow failed: {}",
                err
            );
        }
    }
}
