use async_trait::async_trait;
use sqlx::PgPool;

use crate::models::users::{NewUser, Role, User, UserChanges, UserFilter};
use crate::models::Page;

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn insert_user(&self, new_user: &NewUser) -> Result<User, anyhow::Error>;

    async fn get_user_by_id(&self, user_id: i64) -> Result<Option<User>, anyhow::Error>;

    async fn get_user_by_phone(&self, phone: &str) -> Result<Option<User>, anyhow::Error>;

    async fn list_users(&self, filter: &UserFilter, page: Page) -> Result<Vec<User>, anyhow::Error>;

    /// Applies `changes` to the user. A user whose role ends up other than
    /// driver loses any presence state it had.
    async fn update_user(
        &self,
        user_id: i64,
        changes: &UserChanges,
    ) -> Result<Option<User>, anyhow::Error>;

    /// Deletes the user together with its driver logs.
    async fn delete_user(&self, user_id: i64) -> Result<bool, anyhow::Error>;

    async fn count_users(&self, role: Option<Role>) -> Result<i64, anyhow::Error>;
}

/// Another user already holds the phone number.
#[derive(Debug, thiserror::Error)]
#[error("Phone already registered: {0}")]
pub struct PhoneTaken(pub String);

/// Reports a violated `users.phone` unique constraint as [`PhoneTaken`].
fn phone_conflict(e: sqlx::Error, phone: &str) -> anyhow::Error {
    match e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            PhoneTaken(phone.to_string()).into()
        }
        other => other.into(),
    }
}

#[derive(Clone)]
pub struct PgUserRepository {
    conn: PgPool,
}

impl PgUserRepository {
    pub fn new(conn: PgPool) -> Self {
        Self { conn }
    }
}

fn role_names(roles: &[Role]) -> Option<Vec<String>> {
    if roles.is_empty() {
        None
    } else {
        Some(roles.iter().map(|r| r.as_str().to_string()).collect())
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn insert_user(&self, new_user: &NewUser) -> Result<User, anyhow::Error> {
        let user = sqlx::query_as::<_, User>(
            r#"
                INSERT INTO users (phone, display_name, password_hash, role, is_active)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING *
            "#,
        )
        .bind(&new_user.phone)
        .bind(&new_user.display_name)
        .bind(&new_user.password_hash)
        .bind(new_user.role)
        .bind(new_user.is_active)
        .fetch_one(&self.conn)
        .await
        .map_err(|e| phone_conflict(e, &new_user.phone))?;

        Ok(user)
    }

    async fn get_user_by_id(&self, user_id: i64) -> Result<Option<User>, anyhow::Error> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.conn)
            .await?;

        Ok(user)
    }

    async fn get_user_by_phone(&self, phone: &str) -> Result<Option<User>, anyhow::Error> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE phone = $1")
            .bind(phone)
            .fetch_optional(&self.conn)
            .await?;

        Ok(user)
    }

    async fn list_users(&self, filter: &UserFilter, page: Page) -> Result<Vec<User>, anyhow::Error> {
        let users = sqlx::query_as::<_, User>(
            r#"
                SELECT * FROM users
                WHERE ($1::varchar[] IS NULL OR role = ANY($1))
                AND ($2::boolean IS NULL OR is_active = $2)
                ORDER BY id DESC
                LIMIT $3 OFFSET $4
            "#,
        )
        .bind(role_names(&filter.roles))
        .bind(filter.is_active)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.conn)
        .await?;

        Ok(users)
    }

    async fn update_user(
        &self,
        user_id: i64,
        changes: &UserChanges,
    ) -> Result<Option<User>, anyhow::Error> {
        let user = sqlx::query_as::<_, User>(
            r#"
                UPDATE users SET
                    display_name = COALESCE($2, display_name),
                    phone = COALESCE($3, phone),
                    role = COALESCE($4, role),
                    is_active = COALESCE($5, is_active),
                    is_online = CASE WHEN COALESCE($4, role) = 'driver' THEN is_online ELSE FALSE END,
                    last_latitude = CASE WHEN COALESCE($4, role) = 'driver' THEN last_latitude ELSE NULL END,
                    last_longitude = CASE WHEN COALESCE($4, role) = 'driver' THEN last_longitude ELSE NULL END,
                    last_location_at = CASE WHEN COALESCE($4, role) = 'driver' THEN last_location_at ELSE NULL END,
                    updated_at = CURRENT_TIMESTAMP
                WHERE id = $1
                RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(changes.display_name.as_deref())
        .bind(changes.phone.as_deref())
        .bind(changes.role)
        .bind(changes.is_active)
        .fetch_optional(&self.conn)
        .await
        .map_err(|e| phone_conflict(e, changes.phone.as_deref().unwrap_or_default()))?;

        Ok(user)
    }

    async fn delete_user(&self, user_id: i64) -> Result<bool, anyhow::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&self.conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn count_users(&self, role: Option<Role>) -> Result<i64, anyhow::Error> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM users WHERE ($1::varchar IS NULL OR role = $1)")
                .bind(role)
                .fetch_one(&self.conn)
                .await?;

        Ok(count)
    }
}

/// These run against a live Postgres: `DATABASE_URL=postgres://… cargo test -- --ignored`.
#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) async fn add_user(pool: &PgPool, phone: &str, role: Role) -> i64 {
        PgUserRepository::new(pool.clone())
            .insert_user(&NewUser {
                display_name: format!("User {}", phone),
                phone: phone.to_string(),
                password_hash: "salt$hash".to_string(),
                role,
                is_active: true,
            })
            .await
            .unwrap()
            .id
    }

    #[sqlx::test]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn test_unique_phone_violation_is_phone_taken(pool: PgPool) {
        add_user(&pool, "0917", Role::Passenger).await;
        let other = add_user(&pool, "0918", Role::Passenger).await;
        let users = PgUserRepository::new(pool);

        let duplicate = NewUser {
            display_name: "Copy".to_string(),
            phone: "0917".to_string(),
            password_hash: "salt$hash".to_string(),
            role: Role::Driver,
            is_active: false,
        };
        let error = users.insert_user(&duplicate).await.unwrap_err();
        assert!(error.is::<PhoneTaken>());

        let changes = UserChanges {
            phone: Some("0917".to_string()),
            ..Default::default()
        };
        let error = users.update_user(other, &changes).await.unwrap_err();
        assert!(error.is::<PhoneTaken>());
    }

    #[sqlx::test]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn test_role_change_clears_presence(pool: PgPool) {
        let driver = add_user(&pool, "0918", Role::Driver).await;
        sqlx::query(
            "UPDATE users SET is_online = TRUE, last_latitude = 1, last_longitude = 2, \
             last_location_at = CURRENT_TIMESTAMP WHERE id = $1",
        )
        .bind(driver)
        .execute(&pool)
        .await
        .unwrap();

        let changes = UserChanges {
            role: Some(Role::Passenger),
            ..Default::default()
        };
        let user = PgUserRepository::new(pool)
            .update_user(driver, &changes)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(user.role, Role::Passenger);
        assert!(!user.is_online);
        assert!(!user.has_location());
    }
}
