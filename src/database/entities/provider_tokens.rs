use chrono::{DateTime, Utc};
use sea_orm::{entity::prelude::*, sea_query::StringLen};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Upstream OAuth providers known to the broker.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum ProviderKind {
    #[sea_orm(string_value = "GOOGLE")]
    #[serde(rename = "GOOGLE")]
    Google,
    #[sea_orm(string_value = "GITHUB")]
    #[serde(rename = "GITHUB")]
    GitHub,
}

impl ProviderKind {
    /// Lowercase name used in routes and logs
    pub fn slug(&self) -> &'static str {
        match self {
            ProviderKind::Google => "google",
            ProviderKind::GitHub => "github",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        match slug {
            "google" => Some(ProviderKind::Google),
            "github" => Some(ProviderKind::GitHub),
            _ => None,
        }
    }

    /// Storage providers key credentials by external account, identity providers do not.
    pub fn requires_account_identifier(&self) -> bool {
        match self {
            ProviderKind::Google => false,
            ProviderKind::GitHub => true,
        }
    }

    /// Human-readable name for response messages
    pub fn label(&self) -> &'static str {
        match self {
            ProviderKind::Google => "Google",
            ProviderKind::GitHub => "GitHub",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "provider_tokens")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub user_id: i32,
    #[sea_orm(column_type = "String(StringLen::N(16))")]
    pub provider: ProviderKind,
    pub account_identifier: Option<String>,
    /// Account identifier, or the empty string when there is none.
    pub account_key: String,
    #[serde(skip_serializing)]
    pub access_token: String,
    pub access_token_expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    pub refresh_token_expires_at: Option<DateTime<Utc>>,
    pub access_token_issued_at: DateTime<Utc>,
    pub refresh_token_issued_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Id",
        on_delete = "Cascade"
    )]
    User,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Remaining access token lifetime at `now`, zero once expired.
    ///
    /// `None` when the provider stated no expiry.
    pub fn access_token_validity_left(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.access_token_expires_at
            .map(|expires_at| (expires_at - now).max(chrono::Duration::zero()))
    }

    pub fn is_access_token_expired(&self, now: DateTime<Utc>) -> bool {
        self.access_token_expires_at
            .is_some_and(|expires_at| expires_at <= now)
    }

    /// A refresh token is stored and has not passed its own expiry
    pub fn can_refresh(&self, now: DateTime<Utc>) -> bool {
        self.refresh_token.as_deref().is_some_and(|token| !token.is_empty())
            && self
                .refresh_token_expires_at
                .is_none_or(|expires_at| expires_at > now)
    }
}

/// Maps an optional account identifier onto the non-null unique-index column.
pub fn account_key(account_identifier: Option<&str>) -> String {
    account_identifier.unwrap_or_default().to_string()
}
