use axum::{extract::State, http::StatusCode};

use super::{data, ApiResult, AppState, JsonBody, Session};
use crate::models::driver_logs::LocationReport;
use crate::services::{call, presence::PresenceRequest};

const SERVICE: &str = "PresenceService";

pub async fn go_online(State(state): State<AppState>, session: Session) -> ApiResult {
    let driver = call(&state.presence_channel, SERVICE, |response| {
        PresenceRequest::GoOnline {
            actor: session.user,
            response,
        }
    })
    .await?;

    data(StatusCode::OK, driver)
}

pub async fn go_offline(State(state): State<AppState>, session: Session) -> ApiResult {
    let driver = call(&state.presence_channel, SERVICE, |response| {
        PresenceRequest::GoOffline {
            actor: session.user,
            response,
        }
    })
    .await?;

    data(StatusCode::OK, driver)
}

pub async fn report_location(
    State(state): State<AppState>,
    session: Session,
    JsonBody(report): JsonBody<LocationReport>,
) -> ApiResult {
    let driver = call(&state.presence_channel, SERVICE, |response| {
        PresenceRequest::ReportLocation {
            actor: session.user,
            report,
            response,
        }
    })
    .await?;

    data(StatusCode::OK, driver)
}
