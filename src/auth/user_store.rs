//! User storage and management.

use anyhow::{Result, anyhow};
use surrealdb::RecordId;

use crate::db::Db;
use crate::db::schema::{UserCreate, UserRecord};

/// Canonical form of an email for storage and lookup.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// User store for database operations.
#[derive(Clone)]
pub struct UserStore {
    db: Db,
}

impl UserStore {
    /// Create a new user store.
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Insert a new user. The email is normalized first; a duplicate email
    /// fails on the unique index.
    pub async fn create_user(&self, create: &UserCreate) -> Result<UserRecord> {
        let query = r#"
            CREATE users CONTENT {
                institution_id: $institution_id,
                name: $name,
                email: $email,
                password_hash: $password_hash,
                phone_number: $phone_number,
                is_active: $is_active,
                created_by: $created_by
            }
        "#;

        let mut res = self
            .db
            .query(query)
            .bind(("institution_id", create.institution_id))
            .bind(("name", create.name.clone()))
            .bind(("email", normalize_email(&create.email)))
            .bind(("password_hash", create.password_hash.clone()))
            .bind(("phone_number", create.phone_number.clone()))
            .bind(("is_active", create.is_active))
            .bind(("created_by", create.created_by.clone()))
            .await?
            .check()?;

        let users: Vec<UserRecord> = res.take(0)?;
        users
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Failed to create user"))
    }

    /// Look up a user by email among active users only.
    pub async fn find_active_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let query = "SELECT * FROM users WHERE email = $email AND is_active = true LIMIT 1";

        let mut res = self
            .db
            .query(query)
            .bind(("email", normalize_email(email)))
            .await?;

        let users: Vec<UserRecord> = res.take(0)?;
        Ok(users.into_iter().next())
    }

    /// Look up a user by email regardless of status.
    pub async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let query = "SELECT * FROM users WHERE email = $email LIMIT 1";

        let mut res = self
            .db
            .query(query)
            .bind(("email", normalize_email(email)))
            .await?;

        let users: Vec<UserRecord> = res.take(0)?;
        Ok(users.into_iter().next())
    }

    /// Get a user by record id.
    pub async fn get_user(&self, user_id: &RecordId) -> Result<Option<UserRecord>> {
        let mut res = self
            .db
            .query("SELECT * FROM $id")
            .bind(("id", user_id.clone()))
            .await?;

        let users: Vec<UserRecord> = res.take(0)?;
        Ok(users.into_iter().next())
    }

    /// Soft-disable a user account. Existing sessions are left alone; use
    /// the session store to revoke them.
    pub async fn deactivate_user(
        &self,
        user_id: &RecordId,
        updated_by: Option<RecordId>,
    ) -> Result<()> {
        let query = r#"
            UPDATE $id SET
                is_active = false,
                updated_by = $updated_by
        "#;

        self.db
            .query(query)
            .bind(("id", user_id.clone()))
            .bind(("updated_by", updated_by))
            .await?
            .check()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DatabaseConfig, create_connection, ensure_schema};

    async fn setup_test_db() -> Db {
        let config = DatabaseConfig {
            url: "memory".to_string(),
            ..Default::default()
        };
        let db = create_connection(config).await.unwrap();
        ensure_schema(&db).await.unwrap();
        db
    }

    fn user_create(email: &str) -> UserCreate {
        UserCreate {
            institution_id: 1,
            name: "John Doe".to_string(),
            email: email.to_string(),
            password_hash: "$argon2id$placeholder".to_string(),
            phone_number: Some("081234567890".to_string()),
            is_active: true,
            created_by: None,
        }
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  John@Example.COM "), "john@example.com");
    }

    #[tokio::test]
    async fn test_create_and_find_user() {
        let store = UserStore::new(setup_test_db().await);

        let created = store.create_user(&user_create("John@Example.com")).await.unwrap();
        assert_eq!(created.email, "john@example.com");
        assert!(created.is_active);

        let found = store
            .find_active_by_email("john@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, created.id);

        let by_id = store.get_user(&created.id).await.unwrap().unwrap();
        assert_eq!(by_id.name, "John Doe");
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let store = UserStore::new(setup_test_db().await);

        store.create_user(&user_create("jane@example.com")).await.unwrap();
        let second = store.create_user(&user_create("JANE@example.com")).await;
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn test_inactive_user_hidden_from_active_lookup() {
        let store = UserStore::new(setup_test_db().await);

        let user = store.create_user(&user_create("bob@example.com")).await.unwrap();
        store.deactivate_user(&user.id, None).await.unwrap();

        assert!(
            store
                .find_active_by_email("bob@example.com")
                .await
                .unwrap()
                .is_none()
        );
        let any = store.find_by_email("bob@example.com").await.unwrap().unwrap();
        assert!(!any.is_active);
    }

    #[tokio::test]
    async fn test_get_unknown_user() {
        let store = UserStore::new(setup_test_db().await);
        let missing = RecordId::from_table_key("users", "nobody");
        assert!(store.get_user(&missing).await.unwrap().is_none());
    }
}
