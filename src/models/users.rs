use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Passenger,
    Driver,
    Admin,
    SuperAdmin,
}

impl Role {
    pub const ALL: &'static [Role] = &[Role::Passenger, Role::Driver, Role::Admin, Role::SuperAdmin];
    pub const STAFF: &'static [Role] = &[Role::Admin, Role::SuperAdmin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Passenger => "passenger",
            Role::Driver => "driver",
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
        }
    }

    /// Roles that only a super admin may hand out or take away.
    pub fn is_privileged(&self) -> bool {
        matches!(self, Role::Admin | Role::SuperAdmin)
    }

    /// Drivers wait for approval, everyone else can use the account right away.
    pub fn starts_active(&self) -> bool {
        !matches!(self, Role::Driver)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub phone: String,
    pub display_name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub is_active: bool,
    pub is_online: bool,
    pub last_latitude: Option<f64>,
    pub last_longitude: Option<f64>,
    pub last_location_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn has_location(&self) -> bool {
        self.last_latitude.is_some() && self.last_longitude.is_some() && self.last_location_at.is_some()
    }
}

#[derive(Clone, Debug)]
pub struct NewUser {
    pub display_name: String,
    pub phone: String,
    pub password_hash: String,
    pub role: Role,
    pub is_active: bool,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct UserChanges {
    pub display_name: Option<String>,
    pub phone: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

/// Empty `roles` matches every role.
#[derive(Clone, Debug, Default)]
pub struct UserFilter {
    pub roles: Vec<Role>,
    pub is_active: Option<bool>,
}

impl UserFilter {
    pub fn matches(&self, user: &User) -> bool {
        (self.roles.is_empty() || self.roles.contains(&user.role))
            && self.is_active.map_or(true, |active| user.is_active == active)
    }
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct DriverLocation {
    pub id: i64,
    pub display_name: String,
    pub phone: String,
    pub latitude: f64,
    pub longitude: f64,
    pub last_location_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct UserStats {
    pub total_users: i64,
    pub total_drivers: i64,
    pub total_passengers: i64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Registration {
    pub display_name: String,
    pub phone: String,
    pub password: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Credentials {
    pub phone: String,
    pub password: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct AuthenticatedUser {
    pub user: User,
    pub token: String,
}
