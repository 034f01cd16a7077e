use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::presence::PresenceRepository;
use super::rides::RideRepository;
use super::users::{PhoneTaken, UserRepository};
use crate::models::driver_logs::{DriverLocationLog, DriverStatusLog, PresenceStatus};
use crate::models::rides::{NewRide, Ride, RideFilter, RideStatus, StatusChange};
use crate::models::users::{DriverLocation, NewUser, Role, User, UserChanges, UserFilter};
use crate::models::Page;

#[derive(Default)]
struct MemoryState {
    users: BTreeMap<i64, User>,
    rides: BTreeMap<i64, Ride>,
    status_logs: Vec<DriverStatusLog>,
    location_logs: Vec<DriverLocationLog>,
    last_user_id: i64,
    last_ride_id: i64,
    last_status_log_id: i64,
    last_location_log_id: i64,
}

impl MemoryState {
    fn driver_mut(&mut self, driver_id: i64) -> Option<&mut User> {
        self.users
            .get_mut(&driver_id)
            .filter(|user| user.role == Role::Driver)
    }
}

/// Process-local store backing every repository trait. All tables share one
/// lock, so each method is one atomic step just like a transaction would be.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn paginate<T: Clone>(items: impl Iterator<Item = T>, page: Page) -> Vec<T> {
    let skip = usize::try_from(page.offset()).unwrap_or(usize::MAX);
    items.skip(skip).take(page.per_page as usize).collect()
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn insert_user(&self, new_user: &NewUser) -> Result<User, anyhow::Error> {
        let mut state = self.state.lock().await;

        if state.users.values().any(|u| u.phone == new_user.phone) {
            return Err(PhoneTaken(new_user.phone.clone()).into());
        }

        state.last_user_id += 1;
        let now = Utc::now();
        let user = User {
            id: state.last_user_id,
            phone: new_user.phone.clone(),
            display_name: new_user.display_name.clone(),
            password_hash: new_user.password_hash.clone(),
            role: new_user.role,
            is_active: new_user.is_active,
            is_online: false,
            last_latitude: None,
            last_longitude: None,
            last_location_at: None,
            created_at: now,
            updated_at: now,
        };
        state.users.insert(user.id, user.clone());

        Ok(user)
    }

    async fn get_user_by_id(&self, user_id: i64) -> Result<Option<User>, anyhow::Error> {
        Ok(self.state.lock().await.users.get(&user_id).cloned())
    }

    async fn get_user_by_phone(&self, phone: &str) -> Result<Option<User>, anyhow::Error> {
        let state = self.state.lock().await;
        Ok(state.users.values().find(|u| u.phone == phone).cloned())
    }

    async fn list_users(&self, filter: &UserFilter, page: Page) -> Result<Vec<User>, anyhow::Error> {
        let state = self.state.lock().await;
        let users = state.users.values().rev().filter(|u| filter.matches(u)).cloned();
        Ok(paginate(users, page))
    }

    async fn update_user(
        &self,
        user_id: i64,
        changes: &UserChanges,
    ) -> Result<Option<User>, anyhow::Error> {
        let mut state = self.state.lock().await;

        if let Some(phone) = &changes.phone {
            if state.users.values().any(|u| u.id != user_id && &u.phone == phone) {
                return Err(PhoneTaken(phone.clone()).into());
            }
        }

        let Some(user) = state.users.get_mut(&user_id) else {
            return Ok(None);
        };

        if let Some(display_name) = &changes.display_name {
            user.display_name = display_name.clone();
        }
        if let Some(phone) = &changes.phone {
            user.phone = phone.clone();
        }
        if let Some(role) = changes.role {
            user.role = role;
        }
        if let Some(is_active) = changes.is_active {
            user.is_active = is_active;
        }
        if user.role != Role::Driver {
            user.is_online = false;
            user.last_latitude = None;
            user.last_longitude = None;
            user.last_location_at = None;
        }
        user.updated_at = Utc::now();

        Ok(Some(user.clone()))
    }

    async fn delete_user(&self, user_id: i64) -> Result<bool, anyhow::Error> {
        let mut state = self.state.lock().await;

        if state.rides.values().any(|r| r.passenger_id == user_id || r.driver_id == Some(user_id)) {
            anyhow::bail!("User {} is still referenced by rides", user_id);
        }

        let removed = state.users.remove(&user_id).is_some();
        if removed {
            state.status_logs.retain(|log| log.user_id != user_id);
            state.location_logs.retain(|log| log.user_id != user_id);
        }

        Ok(removed)
    }

    async fn count_users(&self, role: Option<Role>) -> Result<i64, anyhow::Error> {
        let state = self.state.lock().await;
        let count = state
            .users
            .values()
            .filter(|u| role.map_or(true, |r| u.role == r))
            .count();
        Ok(i64::try_from(count)?)
    }
}

#[async_trait]
impl PresenceRepository for MemoryStore {
    async fn set_online(&self, driver_id: i64) -> Result<Option<User>, anyhow::Error> {
        let mut state = self.state.lock().await;

        let Some(driver) = state.driver_mut(driver_id) else {
            return Ok(None);
        };
        driver.is_online = true;
        driver.updated_at = Utc::now();
        let driver = driver.clone();

        state.last_status_log_id += 1;
        let log = DriverStatusLog {
            id: state.last_status_log_id,
            user_id: driver_id,
            status: PresenceStatus::Online,
            created_at: Utc::now(),
        };
        state.status_logs.push(log);

        Ok(Some(driver))
    }

    async fn set_offline(&self, driver_id: i64) -> Result<Option<User>, anyhow::Error> {
        let mut state = self.state.lock().await;

        let Some(driver) = state.driver_mut(driver_id) else {
            return Ok(None);
        };
        driver.is_online = false;
        driver.last_latitude = None;
        driver.last_longitude = None;
        driver.last_location_at = None;
        driver.updated_at = Utc::now();
        let driver = driver.clone();

        state.last_status_log_id += 1;
        let log = DriverStatusLog {
            id: state.last_status_log_id,
            user_id: driver_id,
            status: PresenceStatus::Offline,
            created_at: Utc::now(),
        };
        state.status_logs.push(log);

        Ok(Some(driver))
    }

    async fn record_location(
        &self,
        driver_id: i64,
        latitude: f64,
        longitude: f64,
    ) -> Result<Option<User>, anyhow::Error> {
        let mut state = self.state.lock().await;

        let Some(driver) = state.driver_mut(driver_id).filter(|d| d.is_online) else {
            return Ok(None);
        };
        let now = Utc::now();
        driver.last_latitude = Some(latitude);
        driver.last_longitude = Some(longitude);
        driver.last_location_at = Some(now);
        driver.updated_at = now;
        let driver = driver.clone();

        state.last_location_log_id += 1;
        let log = DriverLocationLog {
            id: state.last_location_log_id,
            user_id: driver_id,
            latitude,
            longitude,
            created_at: now,
        };
        state.location_logs.push(log);

        Ok(Some(driver))
    }

    async fn status_logs(
        &self,
        driver_id: Option<i64>,
        page: Page,
    ) -> Result<Vec<DriverStatusLog>, anyhow::Error> {
        let state = self.state.lock().await;
        let logs = state
            .status_logs
            .iter()
            .rev()
            .filter(|log| driver_id.map_or(true, |id| log.user_id == id))
            .cloned();
        Ok(paginate(logs, page))
    }

    async fn location_logs(
        &self,
        driver_id: Option<i64>,
        page: Page,
    ) -> Result<Vec<DriverLocationLog>, anyhow::Error> {
        let state = self.state.lock().await;
        let logs = state
            .location_logs
            .iter()
            .rev()
            .filter(|log| driver_id.map_or(true, |id| log.user_id == id))
            .cloned();
        Ok(paginate(logs, page))
    }

    async fn online_drivers(&self) -> Result<Vec<DriverLocation>, anyhow::Error> {
        let state = self.state.lock().await;
        let drivers = state
            .users
            .values()
            .filter(|u| u.role == Role::Driver && u.is_online && u.has_location())
            .filter_map(|u| {
                Some(DriverLocation {
                    id: u.id,
                    display_name: u.display_name.clone(),
                    phone: u.phone.clone(),
                    latitude: u.last_latitude?,
                    longitude: u.last_longitude?,
                    last_location_at: u.last_location_at?,
                })
            })
            .collect();
        Ok(drivers)
    }
}

#[async_trait]
impl RideRepository for MemoryStore {
    async fn insert_ride(&self, new_ride: &NewRide) -> Result<Ride, anyhow::Error> {
        let mut state = self.state.lock().await;

        if !state.users.contains_key(&new_ride.passenger_id) {
            anyhow::bail!("Unknown passenger: {}", new_ride.passenger_id);
        }

        state.last_ride_id += 1;
        let now = Utc::now();
        let ride = Ride {
            id: state.last_ride_id,
            passenger_id: new_ride.passenger_id,
            driver_id: None,
            status: RideStatus::Requested,
            origin_text: new_ride.origin_text.clone(),
            destination_text: new_ride.destination_text.clone(),
            pickup_lat: new_ride.pickup_lat,
            pickup_lng: new_ride.pickup_lng,
            dropoff_lat: new_ride.dropoff_lat,
            dropoff_lng: new_ride.dropoff_lng,
            distance_km: new_ride.distance_km,
            created_at: now,
            updated_at: now,
        };
        state.rides.insert(ride.id, ride.clone());

        Ok(ride)
    }

    async fn get_ride_by_id(&self, ride_id: i64) -> Result<Option<Ride>, anyhow::Error> {
        Ok(self.state.lock().await.rides.get(&ride_id).cloned())
    }

    async fn apply_status_change(
        &self,
        ride_id: i64,
        change: StatusChange,
    ) -> Result<Option<Ride>, anyhow::Error> {
        let mut state = self.state.lock().await;

        let Some(ride) = state.rides.get_mut(&ride_id).filter(|r| change.matches(r)) else {
            return Ok(None);
        };
        ride.status = change.to;
        if let Some(driver_id) = change.new_driver {
            ride.driver_id = Some(driver_id);
        }
        ride.updated_at = Utc::now();

        Ok(Some(ride.clone()))
    }

    async fn list_rides(&self, filter: RideFilter, page: Page) -> Result<Vec<Ride>, anyhow::Error> {
        let state = self.state.lock().await;
        let rides = state.rides.values().rev().filter(|r| filter.matches(r)).cloned();
        Ok(paginate(rides, page))
    }

    async fn count_rides(&self, filter: RideFilter) -> Result<i64, anyhow::Error> {
        let state = self.state.lock().await;
        let count = state.rides.values().filter(|r| filter.matches(r)).count();
        Ok(i64::try_from(count)?)
    }
}
