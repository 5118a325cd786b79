use crate::{
    auth::{error::AuthError, oauth::providers::ProviderGrant},
    database::{
        CredentialStore, DatabaseError,
        entities::{ProviderKind, ProviderTokenRecord, provider_tokens},
    },
};
use chrono::Utc;
use std::sync::Arc;

/// Create-or-update rules for provider credentials.
///
/// Identity providers hold one credential per user; storage providers hold
/// one per (user, external account).
#[derive(Clone)]
pub struct AccountLinkingPolicy {
    store: Arc<dyn CredentialStore>,
}

impl AccountLinkingPolicy {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    pub async fn upsert(
        &self,
        user_id: i32,
        provider: ProviderKind,
        account_identifier: Option<&str>,
        grant: &ProviderGrant,
    ) -> Result<ProviderTokenRecord, AuthError> {
        let account_identifier = normalize_account(provider, account_identifier)?;

        let existing = self
            .store
            .find(user_id, provider, account_identifier)
            .await
            .map_err(AuthError::persist_failed)?;

        if let Some(record) = existing {
            return self.update(record, grant).await;
        }

        let record = new_record(user_id, provider, account_identifier, grant);
        match self.store.create(&record).await {
            Ok(created) => {
                tracing::debug!(
                    user_id,
                    provider = %provider,
                    record_id = created.id,
                    "Stored new provider credential"
                );
                Ok(created)
            }
            Err(DatabaseError::Constraint(_)) => {
                // A concurrent request created the row first; treat it as existing
                tracing::debug!(
                    user_id,
                    provider = %provider,
                    "Credential created concurrently, updating"
                );
                let record = self
                    .store
                    .find(user_id, provider, account_identifier)
                    .await
                    .map_err(AuthError::persist_failed)?
                    .ok_or_else(|| {
                        AuthError::persist_failed("credential vanished after unique conflict")
                    })?;
                self.update(record, grant).await
            }
            Err(e) => Err(AuthError::persist_failed(e)),
        }
    }

    /// Stored credential for (user, provider, account), if linked
    pub async fn find(
        &self,
        user_id: i32,
        provider: ProviderKind,
        account_identifier: Option<&str>,
    ) -> Result<Option<ProviderTokenRecord>, AuthError> {
        let account_identifier = normalize_account(provider, account_identifier)?;
        self.store
            .find(user_id, provider, account_identifier)
            .await
            .map_err(AuthError::persist_failed)
    }

    /// Persist a grant obtained by refreshing `record`.
    ///
    /// The stored refresh token survives unless the provider rotated it.
    pub async fn apply_refresh(
        &self,
        mut record: ProviderTokenRecord,
        grant: &ProviderGrant,
    ) -> Result<ProviderTokenRecord, AuthError> {
        record.access_token = grant.access_token.clone();
        record.access_token_expires_at = grant.expires_at;
        record.access_token_issued_at = grant.issued_at;
        if grant.refresh_token.is_some() {
            record.refresh_token = grant.refresh_token.clone();
            record.refresh_token_expires_at = grant.refresh_expires_at;
            record.refresh_token_issued_at = Some(grant.issued_at);
        }
        record.updated_at = Utc::now();

        let updated = self
            .store
            .update(&record)
            .await
            .map_err(AuthError::persist_failed)?;

        tracing::debug!(
            user_id = updated.user_id,
            provider = %updated.provider,
            record_id = updated.id,
            rotated = grant.refresh_token.is_some(),
            "Refreshed provider credential"
        );
        Ok(updated)
    }

    /// Account identifiers linked by a user for a provider, oldest first
    pub async fn list_accounts(
        &self,
        user_id: i32,
        provider: ProviderKind,
    ) -> Result<Vec<String>, AuthError> {
        let records = self
            .store
            .list_for_user(user_id, provider)
            .await
            .map_err(|e| AuthError::AccountsUnavailable {
                message: "Failed to retrieve linked accounts".to_string(),
                details: Some(e.to_string()),
            })?;

        Ok(records
            .into_iter()
            .filter_map(|record| record.account_identifier)
            .collect())
    }

    async fn update(
        &self,
        mut record: ProviderTokenRecord,
        grant: &ProviderGrant,
    ) -> Result<ProviderTokenRecord, AuthError> {
        apply_grant(&mut record, grant);
        let updated = self
            .store
            .update(&record)
            .await
            .map_err(AuthError::persist_failed)?;

        tracing::debug!(
            user_id = updated.user_id,
            provider = %updated.provider,
            record_id = updated.id,
            "Updated provider credential"
        );
        Ok(updated)
    }
}

fn normalize_account(
    provider: ProviderKind,
    account_identifier: Option<&str>,
) -> Result<Option<&str>, AuthError> {
    let account_identifier = account_identifier.filter(|account| !account.is_empty());
    match (provider.requires_account_identifier(), account_identifier) {
        (true, None) => Err(AuthError::persist_failed(format!(
            "account identifier is required for {provider}"
        ))),
        (false, Some(_)) => Err(AuthError::persist_failed(format!(
            "{provider} credentials do not take an account identifier"
        ))),
        (_, account) => Ok(account),
    }
}

fn new_record(
    user_id: i32,
    provider: ProviderKind,
    account_identifier: Option<&str>,
    grant: &ProviderGrant,
) -> ProviderTokenRecord {
    let now = Utc::now();
    let mut record = ProviderTokenRecord {
        id: 0,
        user_id,
        provider,
        account_identifier: account_identifier.map(str::to_string),
        account_key: provider_tokens::account_key(account_identifier),
        access_token: String::new(),
        access_token_expires_at: None,
        refresh_token: None,
        refresh_token_expires_at: None,
        access_token_issued_at: grant.issued_at,
        refresh_token_issued_at: None,
        created_at: now,
        updated_at: now,
    };
    apply_grant(&mut record, grant);
    record
}

/// Overwrite token material; the refresh issue time is only set alongside a refresh token
fn apply_grant(record: &mut ProviderTokenRecord, grant: &ProviderGrant) {
    record.access_token = grant.access_token.clone();
    record.access_token_expires_at = grant.expires_at;
    record.access_token_issued_at = grant.issued_at;
    record.refresh_token = grant.refresh_token.clone();
    record.refresh_token_expires_at = grant.refresh_expires_at;
    record.refresh_token_issued_at = grant.refresh_token.as_ref().map(|_| grant.issued_at);
    record.updated_at = Utc::now();
}
