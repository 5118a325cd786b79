//! Database access layer with domain-specific DAOs
//!
//! Users and provider credentials each have their own DAO. The auth layer
//! consumes them through the `UserStore` and `CredentialStore` traits.

use std::time::Duration;

use crate::config::Config;
use crate::health::{HealthCheckResult, HealthChecker};
use async_trait::async_trait;
use sea_orm::{ConnectOptions, ConnectionTrait, DatabaseConnection, DbErr, SqlErr};
use thiserror::Error;

pub mod config;
pub mod dao;
pub mod entities;
pub mod migration;

pub use dao::{ProviderTokensDao, UsersDao};
use entities::{ProviderKind, ProviderTokenRecord, UserRecord};

/// Database error types
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Constraint violation: {0}")]
    Constraint(String),
    #[error("Migration error: {0}")]
    Migration(String),
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Separates unique-constraint violations from other failures
pub(crate) fn classify_db_error(err: DbErr) -> DatabaseError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(msg)) => DatabaseError::Constraint(msg),
        _ => DatabaseError::Database(err.to_string()),
    }
}

/// User persistence consumed by the sign-in flow
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, user_id: i32) -> DatabaseResult<Option<UserRecord>>;

    async fn find_by_email(&self, email: &str) -> DatabaseResult<Option<UserRecord>>;

    async fn create(&self, email: &str, name: &str) -> DatabaseResult<UserRecord>;
}

/// Provider credential persistence consumed by the account linking policy
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// `Ok(None)` is the only "no matching row" signal.
    async fn find(
        &self,
        user_id: i32,
        provider: ProviderKind,
        account_identifier: Option<&str>,
    ) -> DatabaseResult<Option<ProviderTokenRecord>>;

    async fn create(&self, record: &ProviderTokenRecord) -> DatabaseResult<ProviderTokenRecord>;

    async fn update(&self, record: &ProviderTokenRecord) -> DatabaseResult<ProviderTokenRecord>;

    async fn list_for_user(
        &self,
        user_id: i32,
        provider: ProviderKind,
    ) -> DatabaseResult<Vec<ProviderTokenRecord>>;
}

/// Database manager trait for dependency injection and testing
#[async_trait]
pub trait DatabaseManager: Send + Sync {
    /// Run database migrations
    async fn migrate(&self) -> DatabaseResult<()>;

    /// Health check for database connection
    async fn health_check(&self) -> DatabaseResult<()>;

    /// Get users DAO
    fn users(&self) -> UsersDao;

    /// Get provider credentials DAO
    fn provider_tokens(&self) -> ProviderTokensDao;

    /// Get direct database connection (for migrations and admin operations)
    fn connection(&self) -> &DatabaseConnection;
}

/// Database connection manager implementation
pub struct DatabaseManagerImpl {
    pub connection: DatabaseConnection,
}

impl DatabaseManagerImpl {
    /// Create database manager from configuration
    pub async fn new_from_config(config: &Config) -> Result<Self, DatabaseError> {
        let mut options = ConnectOptions::new(config.database.url.clone());
        options
            .max_connections(config.database.max_connections)
            .connect_timeout(Duration::from_secs(config.database.connect_timeout_seconds))
            .acquire_timeout(Duration::from_secs(config.database.connect_timeout_seconds))
            .sqlx_logging(false);

        let connection = sea_orm::Database::connect(options)
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))?;

        Ok(Self { connection })
    }
}

#[async_trait]
impl DatabaseManager for DatabaseManagerImpl {
    async fn migrate(&self) -> DatabaseResult<()> {
        use crate::database::migration::Migrator;
        use sea_orm_migration::MigratorTrait;

        tracing::info!("Running database migrations");

        Migrator::up(&self.connection, None)
            .await
            .map_err(|e| DatabaseError::Migration(format!("Failed to run migrations: {}", e)))?;

        tracing::info!("Successfully completed all migrations");
        Ok(())
    }

    async fn health_check(&self) -> DatabaseResult<()> {
        self.connection
            .ping()
            .await
            .map_err(|e| DatabaseError::Database(format!("db error: {}", e)))
    }

    fn users(&self) -> UsersDao {
        UsersDao::new(self.connection.clone())
    }

    fn provider_tokens(&self) -> ProviderTokensDao {
        ProviderTokensDao::new(self.connection.clone())
    }

    fn connection(&self) -> &DatabaseConnection {
        &self.connection
    }
}

#[async_trait]
impl HealthChecker for DatabaseManagerImpl {
    fn name(&self) -> &str {
        "database"
    }

    async fn check(&self) -> HealthCheckResult {
        match self.health_check().await {
            Ok(_) => HealthCheckResult::healthy_with_details(serde_json::json!({
                "backend": format!("{:?}", self.connection.get_database_backend()),
                "connection": "ok"
            })),
            Err(err) => HealthCheckResult::unhealthy(format!("DB health check failed: {err}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::HealthStatus;

    async fn memory_manager() -> DatabaseManagerImpl {
        let mut config = Config::default();
        config.database.url = "sqlite::memory:".to_string();
        config.database.max_connections = 1;
        DatabaseManagerImpl::new_from_config(&config).await.unwrap()
    }

    #[tokio::test]
    async fn test_migrate_and_health_check() {
        let db = memory_manager().await;
        db.migrate().await.unwrap();
        db.health_check().await.unwrap();

        let user = db.users().create("bob@example.com", "Bob").await.unwrap();
        let tokens = db
            .provider_tokens()
            .list_for_user(user.id, ProviderKind::GitHub)
            .await
            .unwrap();
        assert!(tokens.is_empty());
    }

    #[tokio::test]
    async fn test_health_checker_reports_database() {
        let db = memory_manager().await;
        let result = db.check().await;
        assert_eq!(result.status, HealthStatus::Healthy);
        assert_eq!(db.name(), "database");
    }

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let db = memory_manager().await;
        db.migrate().await.unwrap();
        db.migrate().await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_failure_is_database_error() {
        let mut config = Config::default();
        config.database.url = "not-a-database-url".to_string();
        let result = DatabaseManagerImpl::new_from_config(&config).await;
        assert!(matches!(result, Err(DatabaseError::Database(_))));
    }
}
