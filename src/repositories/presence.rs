use async_trait::async_trait;
use sqlx::PgPool;

use crate::models::driver_logs::{DriverLocationLog, DriverStatusLog, PresenceStatus};
use crate::models::users::{DriverLocation, User};
use crate::models::Page;

/// Driver presence: the mutable projection on `users` plus the two
/// insert-only audit tables. Each write touches the projection and appends
/// its log row in one transaction.
#[async_trait]
pub trait PresenceRepository: Send + Sync {
    /// Returns `None` when `driver_id` is not a driver.
    async fn set_online(&self, driver_id: i64) -> Result<Option<User>, anyhow::Error>;

    /// Clears the last known location together with the flag. Returns `None`
    /// when `driver_id` is not a driver.
    async fn set_offline(&self, driver_id: i64) -> Result<Option<User>, anyhow::Error>;

    /// Returns `None` when the driver is not online at the time of the write.
    async fn record_location(
        &self,
        driver_id: i64,
        latitude: f64,
        longitude: f64,
    ) -> Result<Option<User>, anyhow::Error>;

    async fn status_logs(
        &self,
        driver_id: Option<i64>,
        page: Page,
    ) -> Result<Vec<DriverStatusLog>, anyhow::Error>;

    async fn location_logs(
        &self,
        driver_id: Option<i64>,
        page: Page,
    ) -> Result<Vec<DriverLocationLog>, anyhow::Error>;

    async fn online_drivers(&self) -> Result<Vec<DriverLocation>, anyhow::Error>;
}

#[derive(Clone)]
pub struct PgPresenceRepository {
    conn: PgPool,
}

impl PgPresenceRepository {
    pub fn new(conn: PgPool) -> Self {
        Self { conn }
    }

    async fn set_presence(
        &self,
        driver_id: i64,
        status: PresenceStatus,
    ) -> Result<Option<User>, anyhow::Error> {
        let mut tx = self.conn.begin().await?;

        let user = sqlx::query_as::<_, User>(
            r#"
                UPDATE users SET
                    is_online = $2,
                    last_latitude = CASE WHEN $2 THEN last_latitude ELSE NULL END,
                    last_longitude = CASE WHEN $2 THEN last_longitude ELSE NULL END,
                    last_location_at = CASE WHEN $2 THEN last_location_at ELSE NULL END,
                    updated_at = CURRENT_TIMESTAMP
                WHERE id = $1 AND role = 'driver'
                RETURNING *
            "#,
        )
        .bind(driver_id)
        .bind(status == PresenceStatus::Online)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(user) = user else {
            tx.rollback().await?;
            return Ok(None);
        };

        sqlx::query("INSERT INTO driver_status_logs (user_id, status) VALUES ($1, $2)")
            .bind(driver_id)
            .bind(status)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(Some(user))
    }
}

#[async_trait]
impl PresenceRepository for PgPresenceRepository {
    async fn set_online(&self, driver_id: i64) -> Result<Option<User>, anyhow::Error> {
        self.set_presence(driver_id, PresenceStatus::Online).await
    }

    async fn set_offline(&self, driver_id: i64) -> Result<Option<User>, anyhow::Error> {
        self.set_presence(driver_id, PresenceStatus::Offline).await
    }

    async fn record_location(
        &self,
        driver_id: i64,
        latitude: f64,
        longitude: f64,
    ) -> Result<Option<User>, anyhow::Error> {
        let mut tx = self.conn.begin().await?;

        let user = sqlx::query_as::<_, User>(
            r#"
                UPDATE users SET
                    last_latitude = $2,
                    last_longitude = $3,
                    last_location_at = CURRENT_TIMESTAMP,
                    updated_at = CURRENT_TIMESTAMP
                WHERE id = $1 AND role = 'driver' AND is_online
                RETURNING *
            "#,
        )
        .bind(driver_id)
        .bind(latitude)
        .bind(longitude)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(user) = user else {
            tx.rollback().await?;
            return Ok(None);
        };

        sqlx::query(
            "INSERT INTO driver_location_logs (user_id, latitude, longitude) VALUES ($1, $2, $3)",
        )
        .bind(driver_id)
        .bind(latitude)
        .bind(longitude)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(user))
    }

    async fn status_logs(
        &self,
        driver_id: Option<i64>,
        page: Page,
    ) -> Result<Vec<DriverStatusLog>, anyhow::Error> {
        let logs = sqlx::query_as::<_, DriverStatusLog>(
            r#"
                SELECT * FROM driver_status_logs
                WHERE ($1::bigint IS NULL OR user_id = $1)
                ORDER BY id DESC
                LIMIT $2 OFFSET $3
            "#,
        )
        .bind(driver_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.conn)
        .await?;

        Ok(logs)
    }

    async fn location_logs(
        &self,
        driver_id: Option<i64>,
        page: Page,
    ) -> Result<Vec<DriverLocationLog>, anyhow::Error> {
        let logs = sqlx::query_as::<_, DriverLocationLog>(
            r#"
                SELECT * FROM driver_location_logs
                WHERE ($1::bigint IS NULL OR user_id = $1)
                ORDER BY id DESC
                LIMIT $2 OFFSET $3
            "#,
        )
        .bind(driver_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.conn)
        .await?;

        Ok(logs)
    }

    async fn online_drivers(&self) -> Result<Vec<DriverLocation>, anyhow::Error> {
        let drivers = sqlx::query_as::<_, DriverLocation>(
            r#"
                SELECT
                    id,
                    display_name,
                    phone,
                    last_latitude AS latitude,
                    last_longitude AS longitude,
                    last_location_at
                FROM users
                WHERE role = 'driver'
                AND is_online
                AND last_latitude IS NOT NULL
                AND last_longitude IS NOT NULL
                AND last_location_at IS NOT NULL
                ORDER BY id
            "#,
        )
        .fetch_all(&self.conn)
        .await?;

        Ok(drivers)
    }
}

/// These run against a live Postgres: `DATABASE_URL=postgres://… cargo test -- --ignored`.
#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::users::Role;
    use crate::repositories::users::tests::add_user;

    #[sqlx::test]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn test_location_is_recorded_only_while_online(pool: PgPool) {
        let driver = add_user(&pool, "0918", Role::Driver).await;
        let passenger = add_user(&pool, "0917", Role::Passenger).await;
        let presence = PgPresenceRepository::new(pool);
        let page = Page::new(None, None, 50);

        assert!(presence.record_location(driver, 14.6, 121.0).await.unwrap().is_none());
        assert!(presence.set_online(passenger).await.unwrap().is_none());

        presence.set_online(driver).await.unwrap().unwrap();
        let user = presence
            .record_location(driver, 14.6, 121.0)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.last_latitude, Some(14.6));
        assert_eq!(user.last_longitude, Some(121.0));
        assert_eq!(presence.online_drivers().await.unwrap().len(), 1);

        let offline = presence.set_offline(driver).await.unwrap().unwrap();
        assert!(!offline.is_online);
        assert!(!offline.has_location());
        assert!(presence.record_location(driver, 14.7, 121.1).await.unwrap().is_none());

        let locations = presence.location_logs(Some(driver), page).await.unwrap();
        assert_eq!(locations.len(), 1);
        let statuses = presence.status_logs(Some(driver), page).await.unwrap();
        assert_eq!(statuses.len(), 2);
        assert!(presence.online_drivers().await.unwrap().is_empty());
    }
}
