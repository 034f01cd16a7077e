use axum::{extract::State, http::StatusCode};
use serde::Deserialize;

use super::{data, ApiQuery, ApiResult, AppState, PageQuery, Session};
use crate::models::users::Role;
use crate::models::Page;
use crate::services::call;
use crate::services::reports::{
    DriverApproval, ReportRequest, AVAILABLE_RIDES_PER_PAGE, LOCATION_LOGS_PER_PAGE,
    RIDES_PER_PAGE, STATUS_LOGS_PER_PAGE, USERS_PER_PAGE,
};

const SERVICE: &str = "ReportService";

#[derive(Deserialize)]
pub struct LogQuery {
    driver_id: Option<i64>,
    page: Option<u32>,
    per_page: Option<u32>,
}

#[derive(Deserialize)]
pub struct UserQuery {
    role: Option<Role>,
    page: Option<u32>,
    per_page: Option<u32>,
}

#[derive(Deserialize)]
pub struct DriverQuery {
    status: Option<DriverApproval>,
    page: Option<u32>,
    per_page: Option<u32>,
}

pub async fn profile(State(state): State<AppState>, session: Session) -> ApiResult {
    let user = call(&state.report_channel, SERVICE, |response| {
        ReportRequest::Profile {
            actor: session.user,
            response,
        }
    })
    .await?;

    data(StatusCode::OK, user)
}

pub async fn available_rides(
    State(state): State<AppState>,
    session: Session,
    ApiQuery(paging): ApiQuery<PageQuery>,
) -> ApiResult {
    let rides = call(&state.report_channel, SERVICE, |response| {
        ReportRequest::AvailableRides {
            actor: session.user,
            page: paging.page(AVAILABLE_RIDES_PER_PAGE),
            response,
        }
    })
    .await?;

    data(StatusCode::OK, rides)
}

pub async fn my_rides(
    State(state): State<AppState>,
    session: Session,
    ApiQuery(paging): ApiQuery<PageQuery>,
) -> ApiResult {
    let rides = call(&state.report_channel, SERVICE, |response| {
        ReportRequest::MyRides {
            actor: session.user,
            page: paging.page(RIDES_PER_PAGE),
            response,
        }
    })
    .await?;

    data(StatusCode::OK, rides)
}

pub async fn all_rides(
    State(state): State<AppState>,
    session: Session,
    ApiQuery(paging): ApiQuery<PageQuery>,
) -> ApiResult {
    let rides = call(&state.report_channel, SERVICE, |response| {
        ReportRequest::AllRides {
            actor: session.user,
            page: paging.page(RIDES_PER_PAGE),
            response,
        }
    })
    .await?;

    data(StatusCode::OK, rides)
}

pub async fn status_logs(
    State(state): State<AppState>,
    session: Session,
    ApiQuery(query): ApiQuery<LogQuery>,
) -> ApiResult {
    let logs = call(&state.report_channel, SERVICE, |response| {
        ReportRequest::StatusLogs {
            actor: session.user,
            driver_id: query.driver_id,
            page: Page::new(query.page, query.per_page, STATUS_LOGS_PER_PAGE),
            response,
        }
    })
    .await?;

    data(StatusCode::OK, logs)
}

pub async fn location_logs(
    State(state): State<AppState>,
    session: Session,
    ApiQuery(query): ApiQuery<LogQuery>,
) -> ApiResult {
    let logs = call(&state.report_channel, SERVICE, |response| {
        ReportRequest::LocationLogs {
            actor: session.user,
            driver_id: query.driver_id,
            page: Page::new(query.page, query.per_page, LOCATION_LOGS_PER_PAGE),
            response,
        }
    })
    .await?;

    data(StatusCode::OK, logs)
}

pub async fn driver_map(State(state): State<AppState>, session: Session) -> ApiResult {
    let drivers = call(&state.report_channel, SERVICE, |response| {
        ReportRequest::DriverMap {
            actor: session.user,
            response,
        }
    })
    .await?;

    data(StatusCode::OK, drivers)
}

pub async fn stats(State(state): State<AppState>, session: Session) -> ApiResult {
    let stats = call(&state.report_channel, SERVICE, |response| ReportRequest::Stats {
        actor: session.user,
        response,
    })
    .await?;

    data(StatusCode::OK, stats)
}

pub async fn list_users(
    State(state): State<AppState>,
    session: Session,
    ApiQuery(query): ApiQuery<UserQuery>,
) -> ApiResult {
    let users = call(&state.report_channel, SERVICE, |response| ReportRequest::Users {
        actor: session.user,
        role: query.role,
        page: Page::new(query.page, query.per_page, USERS_PER_PAGE),
        response,
    })
    .await?;

    data(StatusCode::OK, users)
}

pub async fn list_drivers(
    State(state): State<AppState>,
    session: Session,
    ApiQuery(query): ApiQuery<DriverQuery>,
) -> ApiResult {
    let drivers = call(&state.report_channel, SERVICE, |response| {
        ReportRequest::Drivers {
            actor: session.user,
            approval: query.status,
            page: Page::new(query.page, query.per_page, USERS_PER_PAGE),
            response,
        }
    })
    .await?;

    data(StatusCode::OK, drivers)
}

pub async fn list_admins(
    State(state): State<AppState>,
    session: Session,
    ApiQuery(paging): ApiQuery<PageQuery>,
) -> ApiResult {
    let admins = call(&state.report_channel, SERVICE, |response| {
        ReportRequest::Admins {
            actor: session.user,
            page: paging.page(USERS_PER_PAGE),
            response,
        }
    })
    .await?;

    data(StatusCode::OK, admins)
}
