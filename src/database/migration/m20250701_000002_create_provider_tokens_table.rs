use super::{ProviderTokens, Users};
use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ProviderTokens::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProviderTokens::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ProviderTokens::UserId).integer().not_null())
                    .col(
                        ColumnDef::new(ProviderTokens::Provider)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProviderTokens::AccountIdentifier)
                            .string()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ProviderTokens::AccountKey)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(ColumnDef::new(ProviderTokens::AccessToken).text().not_null())
                    .col(
                        ColumnDef::new(ProviderTokens::AccessTokenExpiresAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(ProviderTokens::RefreshToken).text().null())
                    .col(
                        ColumnDef::new(ProviderTokens::RefreshTokenExpiresAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ProviderTokens::AccessTokenIssuedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProviderTokens::RefreshTokenIssuedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ProviderTokens::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProviderTokens::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_provider_tokens_user_id")
                            .from(ProviderTokens::Table, ProviderTokens::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // One credential per (user, provider, account); account_key is '' for identity providers
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_provider_tokens_user_provider_account")
                    .table(ProviderTokens::Table)
                    .col(ProviderTokens::UserId)
                    .col(ProviderTokens::Provider)
                    .col(ProviderTokens::AccountKey)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_provider_tokens_user_id")
                    .table(ProviderTokens::Table)
                    .col(ProviderTokens::UserId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ProviderTokens::Table).to_owned())
            .await
    }
}
