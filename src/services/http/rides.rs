use axum::{extract::State, http::StatusCode};
use serde::Deserialize;

use super::{data, ApiResult, AppState, JsonBody, RideId, Session};
use crate::models::rides::RideRequestForm;
use crate::services::{call, rides::RideRequest};

const SERVICE: &str = "RideService";

#[derive(Deserialize)]
pub struct Assignment {
    driver_id: i64,
}

pub async fn create(
    State(state): State<AppState>,
    session: Session,
    JsonBody(form): JsonBody<RideRequestForm>,
) -> ApiResult {
    let ride = call(&state.ride_channel, SERVICE, |response| RideRequest::Create {
        actor: session.user,
        form,
        response,
    })
    .await?;

    data(StatusCode::CREATED, ride)
}

pub async fn accept(
    State(state): State<AppState>,
    session: Session,
    RideId(ride_id): RideId,
) -> ApiResult {
    let ride = call(&state.ride_channel, SERVICE, |response| RideRequest::Accept {
        actor: session.user,
        ride_id,
        response,
    })
    .await?;

    data(StatusCode::OK, ride)
}

pub async fn arrive_pickup(
    State(state): State<AppState>,
    session: Session,
    RideId(ride_id): RideId,
) -> ApiResult {
    let ride = call(&state.ride_channel, SERVICE, |response| {
        RideRequest::ArrivePickup {
            actor: session.user,
            ride_id,
            response,
        }
    })
    .await?;

    data(StatusCode::OK, ride)
}

pub async fn start_trip(
    State(state): State<AppState>,
    session: Session,
    RideId(ride_id): RideId,
) -> ApiResult {
    let ride = call(&state.ride_channel, SERVICE, |response| {
        RideRequest::StartTrip {
            actor: session.user,
            ride_id,
            response,
        }
    })
    .await?;

    data(StatusCode::OK, ride)
}

pub async fn complete(
    State(state): State<AppState>,
    session: Session,
    RideId(ride_id): RideId,
) -> ApiResult {
    let ride = call(&state.ride_channel, SERVICE, |response| {
        RideRequest::Complete {
            actor: session.user,
            ride_id,
            response,
        }
    })
    .await?;

    data(StatusCode::OK, ride)
}

pub async fn assign_driver(
    State(state): State<AppState>,
    session: Session,
    RideId(ride_id): RideId,
    JsonBody(assignment): JsonBody<Assignment>,
) -> ApiResult {
    let ride = call(&state.ride_channel, SERVICE, |response| {
        RideRequest::AssignDriver {
            actor: session.user,
            ride_id,
            driver_id: assignment.driver_id,
            response,
        }
    })
    .await?;

    data(StatusCode::OK, ride)
}

pub async fn cancel(
    State(state): State<AppState>,
    session: Session,
    RideId(ride_id): RideId,
) -> ApiResult {
    let ride = call(&state.ride_channel, SERVICE, |response| RideRequest::Cancel {
        actor: session.user,
        ride_id,
        response,
    })
    .await?;

    data(StatusCode::OK, ride)
}
