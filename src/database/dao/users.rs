use crate::database::entities::{UserRecord, users};
use crate::database::{DatabaseResult, UserStore, classify_db_error};
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};

/// Users DAO for database operations
#[derive(Clone)]
pub struct UsersDao {
    db: DatabaseConnection,
}

impl UsersDao {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Find user by ID
    pub async fn find_by_id(&self, user_id: i32) -> DatabaseResult<Option<UserRecord>> {
        let user = users::Entity::find_by_id(user_id)
            .one(&self.db)
            .await
            .map_err(classify_db_error)?;

        Ok(user)
    }

    /// Find user by email
    pub async fn find_by_email(&self, email: &str) -> DatabaseResult<Option<UserRecord>> {
        let user = users::Entity::find()
            .filter(users::Column::Email.eq(email))
            .one(&self.db)
            .await
            .map_err(classify_db_error)?;

        Ok(user)
    }

    /// Insert a new user; a duplicate email surfaces as `DatabaseError::Constraint`.
    pub async fn create(&self, email: &str, name: &str) -> DatabaseResult<UserRecord> {
        let now = Utc::now();
        let active_model = users::ActiveModel {
            id: ActiveValue::NotSet,
            email: Set(email.to_string()),
            name: Set(name.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        };

        active_model
            .insert(&self.db)
            .await
            .map_err(classify_db_error)
    }
}

#[async_trait]
impl UserStore for UsersDao {
    async fn find_by_id(&self, user_id: i32) -> DatabaseResult<Option<UserRecord>> {
        UsersDao::find_by_id(self, user_id).await
    }

    async fn find_by_email(&self, email: &str) -> DatabaseResult<Option<UserRecord>> {
        UsersDao::find_by_email(self, email).await
    }

    async fn create(&self, email: &str, name: &str) -> DatabaseResult<UserRecord> {
        UsersDao::create(self, email, name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{DatabaseError, migration::Migrator};
    use sea_orm::Database;
    use sea_orm_migration::MigratorTrait;

    async fn setup() -> UsersDao {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        UsersDao::new(db)
    }

    #[tokio::test]
    async fn test_create_and_find_user() {
        let dao = setup().await;

        let created = dao.create("alice@example.com", "Alice").await.unwrap();
        assert!(created.id > 0);
        assert_eq!(created.email, "alice@example.com");
        assert_eq!(created.name, "Alice");

        let by_email = dao.find_by_email("alice@example.com").await.unwrap().unwrap();
        assert_eq!(by_email.id, created.id);

        let by_id = dao.find_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(by_id.email, "alice@example.com");
    }

    #[tokio::test]
    async fn test_find_missing_user_is_none() {
        let dao = setup().await;
        assert!(dao.find_by_email("nobody@example.com").await.unwrap().is_none());
        assert!(dao.find_by_id(42).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_is_constraint_error() {
        let dao = setup().await;
        dao.create("alice@example.com", "Alice").await.unwrap();

        let err = dao.create("alice@example.com", "Alice Again").await.unwrap_err();
        assert!(matches!(err, DatabaseError::Constraint(_)));
    }
}
