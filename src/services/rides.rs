use async_trait::async_trait;

use super::{RequestHandler, Responder, Service, ServiceError};
use crate::auth::{self, Operation};
use crate::models::rides::{NewRide, Ride, RideRequestForm, RideTransition, StatusChange};
use crate::models::users::{Role, User};
use crate::repositories::Repositories;
use crate::utils;

const MAX_PLACE_TEXT_LENGTH: usize = 255;

pub enum RideRequest {
    Create {
        actor: User,
        form: RideRequestForm,
        response: Responder<Ride>,
    },
    Accept {
        actor: User,
        ride_id: i64,
        response: Responder<Ride>,
    },
    ArrivePickup {
        actor: User,
        ride_id: i64,
        response: Responder<Ride>,
    },
    StartTrip {
        actor: User,
        ride_id: i64,
        response: Responder<Ride>,
    },
    Complete {
        actor: User,
        ride_id: i64,
        response: Responder<Ride>,
    },
    AssignDriver {
        actor: User,
        ride_id: i64,
        driver_id: i64,
        response: Responder<Ride>,
    },
    Cancel {
        actor: User,
        ride_id: i64,
        response: Responder<Ride>,
    },
}

#[derive(Clone)]
pub struct RideRequestHandler {
    repositories: Repositories,
}

fn validate_coordinate(
    name: &str,
    value: f64,
    valid: fn(f64) -> bool,
    bound: u8,
) -> Result<(), ServiceError> {
    if !valid(value) {
        return Err(ServiceError::Validation(format!(
            "The {} field must be between -{} and {}.",
            name, bound, bound
        )));
    }
    Ok(())
}

fn place_text(
    name: &str,
    text: Option<String>,
    default: impl FnOnce() -> String,
) -> Result<String, ServiceError> {
    match text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()) {
        Some(text) if text.chars().count() > MAX_PLACE_TEXT_LENGTH => {
            Err(ServiceError::Validation(format!(
                "The {} may not be greater than {} characters.",
                name, MAX_PLACE_TEXT_LENGTH
            )))
        }
        Some(text) => Ok(text),
        None => Ok(default()),
    }
}

fn new_ride(passenger_id: i64, form: RideRequestForm) -> Result<NewRide, ServiceError> {
    validate_coordinate("pickup lat", form.pickup_lat, utils::is_valid_latitude, 90)?;
    validate_coordinate("pickup lng", form.pickup_lng, utils::is_valid_longitude, 180)?;
    validate_coordinate("dropoff lat", form.dropoff_lat, utils::is_valid_latitude, 90)?;
    validate_coordinate("dropoff lng", form.dropoff_lng, utils::is_valid_longitude, 180)?;

    let origin_text = place_text("origin text", form.origin_text, || {
        format!("Pickup ({:.4}, {:.4})", form.pickup_lat, form.pickup_lng)
    })?;
    let destination_text = place_text("destination text", form.destination_text, || {
        format!("Dropoff ({:.4}, {:.4})", form.dropoff_lat, form.dropoff_lng)
    })?;

    Ok(NewRide {
        passenger_id,
        origin_text,
        destination_text,
        pickup_lat: form.pickup_lat,
        pickup_lng: form.pickup_lng,
        dropoff_lat: form.dropoff_lat,
        dropoff_lng: form.dropoff_lng,
        distance_km: utils::haversine_km(
            form.pickup_lat,
            form.pickup_lng,
            form.dropoff_lat,
            form.dropoff_lng,
        ),
    })
}

impl RideRequestHandler {
    pub fn new(repositories: Repositories) -> Self {
        RideRequestHandler { repositories }
    }

    async fn find_ride(&self, ride_id: i64) -> Result<Ride, ServiceError> {
        self.repositories
            .rides
            .get_ride_by_id(ride_id)
            .await
            .map_err(ServiceError::database)?
            .ok_or_else(|| ServiceError::NotFound("Ride not found.".to_string()))
    }

    /// Commits `change` through the store's conditional write. Losing a race
    /// shows up as a missing row and is reported like any other bad state.
    async fn commit(
        &self,
        actor: &User,
        ride_id: i64,
        transition: RideTransition,
        change: StatusChange,
    ) -> Result<Ride, ServiceError> {
        let ride = self
            .repositories
            .rides
            .apply_status_change(ride_id, change)
            .await
            .map_err(ServiceError::database)?;

        match ride {
            Some(ride) => {
                log::info!(
                    "Ride {} is now {} ({:?} by user {}).",
                    ride.id,
                    ride.status.as_str(),
                    transition,
                    actor.id
                );
                if ride.status.is_terminal() {
                    log::info!("Ride {} closed after {} km.", ride.id, ride.distance_km);
                }
                Ok(ride)
            }
            None => {
                log::debug!(
                    "Ride {} {:?} by user {} lost to a concurrent change.",
                    ride_id,
                    transition,
                    actor.id
                );
                Err(ServiceError::StateConflict(
                    transition.conflict_message().to_string(),
                ))
            }
        }
    }

    fn ensure_state(ride: &Ride, transition: RideTransition) -> Result<(), ServiceError> {
        if !transition.allows(ride.status) {
            return Err(ServiceError::StateConflict(
                transition.conflict_message().to_string(),
            ));
        }
        Ok(())
    }

    async fn create(&self, actor: &User, form: RideRequestForm) -> Result<Ride, ServiceError> {
        auth::authorize(actor, Operation::CreateRide)?;
        let new_ride = new_ride(actor.id, form)?;

        let ride = self
            .repositories
            .rides
            .insert_ride(&new_ride)
            .await
            .map_err(ServiceError::database)?;

        log::info!(
            "Ride {} requested by passenger {} ({} km).",
            ride.id,
            actor.id,
            ride.distance_km
        );
        Ok(ride)
    }

    async fn accept(&self, actor: &User, ride_id: i64) -> Result<Ride, ServiceError> {
        auth::authorize(actor, Operation::AcceptRide)?;
        let transition = RideTransition::Accept;
        let ride = self.find_ride(ride_id).await?;
        Self::ensure_state(&ride, transition)?;

        let change = StatusChange::new(transition).assigning(actor.id);
        self.commit(actor, ride.id, transition, change).await
    }

    /// Trip progress steps are reserved to the driver holding the ride.
    async fn advance(
        &self,
        actor: &User,
        ride_id: i64,
        operation: Operation,
        transition: RideTransition,
    ) -> Result<Ride, ServiceError> {
        auth::authorize(actor, operation)?;
        let ride = self.find_ride(ride_id).await?;
        auth::ensure_assigned_driver(actor, &ride)?;
        Self::ensure_state(&ride, transition)?;

        let change = StatusChange::new(transition).held_by(actor.id);
        self.commit(actor, ride.id, transition, change).await
    }

    async fn assign_driver(
        &self,
        actor: &User,
        ride_id: i64,
        driver_id: i64,
    ) -> Result<Ride, ServiceError> {
        auth::authorize(actor, Operation::AssignDriver)?;
        let transition = RideTransition::Assign;
        let ride = self.find_ride(ride_id).await?;

        let driver = self
            .repositories
            .users
            .get_user_by_id(driver_id)
            .await
            .map_err(ServiceError::database)?
            .ok_or_else(|| ServiceError::NotFound("Driver not found.".to_string()))?;
        if driver.role != Role::Driver || !driver.is_active {
            return Err(ServiceError::StateConflict(
                "Selected user is not an active driver.".to_string(),
            ));
        }
        Self::ensure_state(&ride, transition)?;

        let change = StatusChange::new(transition).assigning(driver.id);
        self.commit(actor, ride.id, transition, change).await
    }

    async fn cancel(&self, actor: &User, ride_id: i64) -> Result<Ride, ServiceError> {
        auth::authorize(actor, Operation::CancelRide)?;
        let transition = RideTransition::Cancel;
        let ride = self.find_ride(ride_id).await?;
        Self::ensure_state(&ride, transition)?;

        self.commit(actor, ride.id, transition, StatusChange::new(transition))
            .await
    }
}

#[async_trait]
impl RequestHandler<RideRequest> for RideRequestHandler {
    async fn handle_request(&self, request: RideRequest) {
        match request {
            RideRequest::Create {
                actor,
                form,
                response,
            } => {
                let result = self.create(&actor, form).await;
                let _ = response.send(result);
            }
            RideRequest::Accept {
                actor,
                ride_id,
                response,
            } => {
                let result = self.accept(&actor, ride_id).await;
                let _ = response.send(result);
            }
            RideRequest::ArrivePickup {
                actor,
                ride_id,
                response,
            } => {
                let result = self
                    .advance(&actor, ride_id, Operation::ArrivePickup, RideTransition::ArrivePickup)
                    .await;
                let _ = response.send(result);
            }
            RideRequest::StartTrip {
                actor,
                ride_id,
                response,
            } => {
                let result = self
                    .advance(&actor, ride_id, Operation::StartTrip, RideTransition::StartTrip)
                    .await;
                let _ = response.send(result);
            }
            RideRequest::Complete {
                actor,
                ride_id,
                response,
            } => {
                let result = self
                    .advance(&actor, ride_id, Operation::CompleteRide, RideTransition::Complete)
                    .await;
                let _ = response.send(result);
            }
            RideRequest::AssignDriver {
                actor,
                ride_id,
                driver_id,
                response,
            } => {
                let result = self.assign_driver(&actor, ride_id, driver_id).await;
                let _ = response.send(result);
            }
            RideRequest::Cancel {
                actor,
                ride_id,
                response,
            } => {
                let result = self.cancel(&actor, ride_id).await;
                let _ = response.send(result);
            }
        }
    }
}

pub struct RideService;

impl RideService {
    pub fn new() -> Self {
        RideService {}
    }
}

#[async_trait]
impl Service<RideRequest, RideRequestHandler> for RideService {}
