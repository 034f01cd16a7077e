use std::sync::Arc;

use sqlx::PgPool;

pub mod memory;
pub mod presence;
pub mod rides;
pub mod users;

use memory::MemoryStore;
use presence::{PgPresenceRepository, PresenceRepository};
use rides::{PgRideRepository, RideRepository};
use users::{PgUserRepository, UserRepository};

/// Handles on every store seam, shared by the services.
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub presence: Arc<dyn PresenceRepository>,
    pub rides: Arc<dyn RideRepository>,
}

impl Repositories {
    pub fn postgres(conn: PgPool) -> Self {
        Self {
            users: Arc::new(PgUserRepository::new(conn.clone())),
            presence: Arc::new(PgPresenceRepository::new(conn.clone())),
            rides: Arc::new(PgRideRepository::new(conn)),
        }
    }

    pub fn memory() -> Self {
        let store = Arc::new(MemoryStore::new());

        Self {
            users: store.clone(),
            presence: store.clone(),
            rides: store,
        }
    }
}
