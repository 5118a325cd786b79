use crate::database::entities::{ProviderKind, ProviderTokenRecord, provider_tokens};
use crate::database::{CredentialStore, DatabaseResult, classify_db_error};
use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};

/// Provider credentials DAO
#[derive(Clone)]
pub struct ProviderTokensDao {
    db: DatabaseConnection,
}

impl ProviderTokensDao {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Find the credential for (user, provider, account)
    pub async fn find(
        &self,
        user_id: i32,
        provider: ProviderKind,
        account_identifier: Option<&str>,
    ) -> DatabaseResult<Option<ProviderTokenRecord>> {
        let record = provider_tokens::Entity::find()
            .filter(provider_tokens::Column::UserId.eq(user_id))
            .filter(provider_tokens::Column::Provider.eq(provider))
            .filter(
                provider_tokens::Column::AccountKey
                    .eq(provider_tokens::account_key(account_identifier)),
            )
            .one(&self.db)
            .await
            .map_err(classify_db_error)?;

        Ok(record)
    }

    /// Insert a credential; an existing (user, provider, account) row surfaces as
    /// `DatabaseError::Constraint`.
    pub async fn create(
        &self,
        record: &ProviderTokenRecord,
    ) -> DatabaseResult<ProviderTokenRecord> {
        let active_model = provider_tokens::ActiveModel {
            id: ActiveValue::NotSet,
            user_id: Set(record.user_id),
            provider: Set(record.provider),
            account_identifier: Set(record.account_identifier.clone()),
            account_key: Set(provider_tokens::account_key(
                record.account_identifier.as_deref(),
            )),
            access_token: Set(record.access_token.clone()),
            access_token_expires_at: Set(record.access_token_expires_at),
            refresh_token: Set(record.refresh_token.clone()),
            refresh_token_expires_at: Set(record.refresh_token_expires_at),
            access_token_issued_at: Set(record.access_token_issued_at),
            refresh_token_issued_at: Set(record.refresh_token_issued_at),
            created_at: Set(record.created_at),
            updated_at: Set(record.updated_at),
        };

        active_model
            .insert(&self.db)
            .await
            .map_err(classify_db_error)
    }

    /// Overwrite token material and timestamps of an existing row
    pub async fn update(
        &self,
        record: &ProviderTokenRecord,
    ) -> DatabaseResult<ProviderTokenRecord> {
        let active_model = provider_tokens::ActiveModel {
            id: Set(record.id),
            access_token: Set(record.access_token.clone()),
            access_token_expires_at: Set(record.access_token_expires_at),
            refresh_token: Set(record.refresh_token.clone()),
            refresh_token_expires_at: Set(record.refresh_token_expires_at),
            access_token_issued_at: Set(record.access_token_issued_at),
            refresh_token_issued_at: Set(record.refresh_token_issued_at),
            updated_at: Set(record.updated_at),
            ..Default::default()
        };

        active_model
            .update(&self.db)
            .await
            .map_err(classify_db_error)
    }

    /// All credentials a user holds for a provider, oldest first
    pub async fn list_for_user(
        &self,
        user_id: i32,
        provider: ProviderKind,
    ) -> DatabaseResult<Vec<ProviderTokenRecord>> {
        let records = provider_tokens::Entity::find()
            .filter(provider_tokens::Column::UserId.eq(user_id))
            .filter(provider_tokens::Column::Provider.eq(provider))
            .order_by_asc(provider_tokens::Column::CreatedAt)
            .order_by_asc(provider_tokens::Column::Id)
            .all(&self.db)
            .await
            .map_err(classify_db_error)?;

        Ok(records)
    }
}

#[async_trait]
impl CredentialStore for ProviderTokensDao {
    async fn find(
        &self,
        user_id: i32,
        provider: ProviderKind,
        account_identifier: Option<&str>,
    ) -> DatabaseResult<Option<ProviderTokenRecord>> {
        ProviderTokensDao::find(self, user_id, provider, account_identifier).await
    }

    async fn create(&self, record: &ProviderTokenRecord) -> DatabaseResult<ProviderTokenRecord> {
        ProviderTokensDao::create(self, record).await
    }

    async fn update(&self, record: &ProviderTokenRecord) -> DatabaseResult<ProviderTokenRecord> {
        ProviderTokensDao::update(self, record).await
    }

    async fn list_for_user(
        &self,
        user_id: i32,
        provider: ProviderKind,
    ) -> DatabaseResult<Vec<ProviderTokenRecord>> {
        ProviderTokensDao::list_for_user(self, user_id, provider).await
    }
}
