use async_trait::async_trait;
use sqlx::PgPool;

use crate::models::rides::{NewRide, Ride, RideFilter, StatusChange};
use crate::models::Page;

#[async_trait]
pub trait RideRepository: Send + Sync {
    async fn insert_ride(&self, new_ride: &NewRide) -> Result<Ride, anyhow::Error>;

    async fn get_ride_by_id(&self, ride_id: i64) -> Result<Option<Ride>, anyhow::Error>;

    /// Applies `change` as a single conditional write. Returns `None` when the
    /// ride no longer satisfies the change's precondition, leaving it untouched.
    async fn apply_status_change(
        &self,
        ride_id: i64,
        change: StatusChange,
    ) -> Result<Option<Ride>, anyhow::Error>;

    async fn list_rides(&self, filter: RideFilter, page: Page) -> Result<Vec<Ride>, anyhow::Error>;

    async fn count_rides(&self, filter: RideFilter) -> Result<i64, anyhow::Error>;
}

#[derive(Clone)]
pub struct PgRideRepository {
    conn: PgPool,
}

impl PgRideRepository {
    pub fn new(conn: PgPool) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl RideRepository for PgRideRepository {
    async fn insert_ride(&self, new_ride: &NewRide) -> Result<Ride, anyhow::Error> {
        let ride = sqlx::query_as::<_, Ride>(
            r#"
                INSERT INTO rides
                (passenger_id, status, origin_text, destination_text,
                 pickup_lat, pickup_lng, dropoff_lat, dropoff_lng, distance_km)
                VALUES ($1, 'requested', $2, $3, $4, $5, $6, $7, $8)
                RETURNING *
            "#,
        )
        .bind(new_ride.passenger_id)
        .bind(&new_ride.origin_text)
        .bind(&new_ride.destination_text)
        .bind(new_ride.pickup_lat)
        .bind(new_ride.pickup_lng)
        .bind(new_ride.dropoff_lat)
        .bind(new_ride.dropoff_lng)
        .bind(new_ride.distance_km)
        .fetch_one(&self.conn)
        .await?;

        Ok(ride)
    }

    async fn get_ride_by_id(&self, ride_id: i64) -> Result<Option<Ride>, anyhow::Error> {
        let ride = sqlx::query_as::<_, Ride>("SELECT * FROM rides WHERE id = $1")
            .bind(ride_id)
            .fetch_optional(&self.conn)
            .await?;

        Ok(ride)
    }

    async fn apply_status_change(
        &self,
        ride_id: i64,
        change: StatusChange,
    ) -> Result<Option<Ride>, anyhow::Error> {
        let from: Vec<String> = change.from.iter().map(|s| s.as_str().to_string()).collect();

        // Postgres re-evaluates the WHERE clause against the latest row version
        // after waiting on a concurrent writer, so only one caller can match.
        let ride = sqlx::query_as::<_, Ride>(
            r#"
                UPDATE rides SET
                    status = $2,
                    driver_id = COALESCE($3, driver_id),
                    updated_at = CURRENT_TIMESTAMP
                WHERE id = $1
                AND status = ANY($4)
                AND ($5::bigint IS NULL OR driver_id = $5)
                RETURNING *
            "#,
        )
        .bind(ride_id)
        .bind(change.to)
        .bind(change.new_driver)
        .bind(from)
        .bind(change.expected_driver)
        .fetch_optional(&self.conn)
        .await?;

        Ok(ride)
    }

    async fn list_rides(&self, filter: RideFilter, page: Page) -> Result<Vec<Ride>, anyhow::Error> {
        let rides = sqlx::query_as::<_, Ride>(
            r#"
                SELECT * FROM rides
                WHERE ($1::varchar IS NULL OR status = $1)
                AND ($2::bigint IS NULL OR passenger_id = $2)
                AND ($3::bigint IS NULL OR driver_id = $3)
                ORDER BY id DESC
                LIMIT $4 OFFSET $5
            "#,
        )
        .bind(filter.status)
        .bind(filter.passenger_id)
        .bind(filter.driver_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.conn)
        .await?;

        Ok(rides)
    }

    async fn count_rides(&self, filter: RideFilter) -> Result<i64, anyhow::Error> {
        let count: i64 = sqlx::query_scalar(
            r#"
                SELECT COUNT(1) FROM rides
                WHERE ($1::varchar IS NULL OR status = $1)
                AND ($2::bigint IS NULL OR passenger_id = $2)
                AND ($3::bigint IS NULL OR driver_id = $3)
            "#,
        )
        .bind(filter.status)
        .bind(filter.passenger_id)
        .bind(filter.driver_id)
        .fetch_one(&self.conn)
        .await?;

        Ok(count)
    }
}
