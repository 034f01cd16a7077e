use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RideStatus {
    Requested,
    Assigned,
    DriverAtPickup,
    InProgress,
    Completed,
    Cancelled,
}

impl RideStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RideStatus::Requested => "requested",
            RideStatus::Assigned => "assigned",
            RideStatus::DriverAtPickup => "driver_at_pickup",
            RideStatus::InProgress => "in_progress",
            RideStatus::Completed => "completed",
            RideStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RideStatus::Completed | RideStatus::Cancelled)
    }
}

/// Every way a ride may change status after it has been requested.
///
/// The transition table lives here and nowhere else: the engine checks a
/// ride against `sources` before touching it, and the store repeats the same
/// check inside the conditional write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RideTransition {
    Accept,
    ArrivePickup,
    StartTrip,
    Complete,
    Assign,
    Cancel,
}

impl RideTransition {
    pub fn sources(&self) -> &'static [RideStatus] {
        match self {
            RideTransition::Accept | RideTransition::Assign => &[RideStatus::Requested],
            RideTransition::ArrivePickup => &[RideStatus::Assigned],
            RideTransition::StartTrip => &[RideStatus::Assigned, RideStatus::DriverAtPickup],
            RideTransition::Complete => &[RideStatus::InProgress],
            RideTransition::Cancel => &[
                RideStatus::Requested,
                RideStatus::Assigned,
                RideStatus::DriverAtPickup,
                RideStatus::InProgress,
            ],
        }
    }

    pub fn target(&self) -> RideStatus {
        match self {
            RideTransition::Accept | RideTransition::Assign => RideStatus::Assigned,
            RideTransition::ArrivePickup => RideStatus::DriverAtPickup,
            RideTransition::StartTrip => RideStatus::InProgress,
            RideTransition::Complete => RideStatus::Completed,
            RideTransition::Cancel => RideStatus::Cancelled,
        }
    }

    pub fn allows(&self, status: RideStatus) -> bool {
        self.sources().contains(&status)
    }

    /// Message reported when the ride is not in one of `sources`.
    pub fn conflict_message(&self) -> &'static str {
        match self {
            RideTransition::Accept => "Ride is not available.",
            RideTransition::ArrivePickup => "Invalid state for arrived at pickup.",
            RideTransition::StartTrip => "Invalid state to start trip.",
            RideTransition::Complete => "Complete the trip first (start trip to destination).",
            RideTransition::Assign => "Only requested rides can be assigned.",
            RideTransition::Cancel => "Ride cannot be cancelled in current state.",
        }
    }
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct Ride {
    pub id: i64,
    pub passenger_id: i64,
    pub driver_id: Option<i64>,
    pub status: RideStatus,
    pub origin_text: String,
    pub destination_text: String,
    pub pickup_lat: f64,
    pub pickup_lng: f64,
    pub dropoff_lat: f64,
    pub dropoff_lng: f64,
    pub distance_km: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RideRequestForm {
    pub pickup_lat: f64,
    pub pickup_lng: f64,
    pub dropoff_lat: f64,
    pub dropoff_lng: f64,
    pub origin_text: Option<String>,
    pub destination_text: Option<String>,
}

#[derive(Clone, Debug)]
pub struct NewRide {
    pub passenger_id: i64,
    pub origin_text: String,
    pub destination_text: String,
    pub pickup_lat: f64,
    pub pickup_lng: f64,
    pub dropoff_lat: f64,
    pub dropoff_lng: f64,
    pub distance_km: f64,
}

/// Conditional status write: applied only while the ride is still in one of
/// `from` and, when `expected_driver` is set, still held by that driver.
#[derive(Clone, Copy, Debug)]
pub struct StatusChange {
    pub from: &'static [RideStatus],
    pub to: RideStatus,
    pub expected_driver: Option<i64>,
    pub new_driver: Option<i64>,
}

impl StatusChange {
    pub fn new(transition: RideTransition) -> Self {
        Self {
            from: transition.sources(),
            to: transition.target(),
            expected_driver: None,
            new_driver: None,
        }
    }

    pub fn held_by(mut self, driver_id: i64) -> Self {
        self.expected_driver = Some(driver_id);
        self
    }

    pub fn assigning(mut self, driver_id: i64) -> Self {
        self.new_driver = Some(driver_id);
        self
    }

    pub fn matches(&self, ride: &Ride) -> bool {
        self.from.contains(&ride.status)
            && self
                .expected_driver
                .map_or(true, |driver_id| ride.driver_id == Some(driver_id))
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RideFilter {
    pub status: Option<RideStatus>,
    pub passenger_id: Option<i64>,
    pub driver_id: Option<i64>,
}

impl RideFilter {
    pub fn matches(&self, ride: &Ride) -> bool {
        self.status.map_or(true, |status| ride.status == status)
            && self.passenger_id.map_or(true, |id| ride.passenger_id == id)
            && self.driver_id.map_or(true, |id| ride.driver_id == Some(id))
    }
}
