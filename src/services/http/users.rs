use axum::{extract::State, http::StatusCode};
use serde::Deserialize;
use serde_json::json;

use super::{data, ApiResult, AppState, JsonBody, Session, UserId};
use crate::models::users::{Credentials, Registration, Role, UserChanges};
use crate::services::{call, users::UserRequest};

const SERVICE: &str = "UserService";

#[derive(Deserialize)]
pub struct NewAccount {
    #[serde(flatten)]
    registration: Registration,
    role: Role,
}

pub async fn register_passenger(
    State(state): State<AppState>,
    JsonBody(registration): JsonBody<Registration>,
) -> ApiResult {
    let account = call(&state.user_channel, SERVICE, |response| {
        UserRequest::RegisterPassenger {
            registration,
            response,
        }
    })
    .await?;

    data(StatusCode::CREATED, account)
}

pub async fn register_driver(
    State(state): State<AppState>,
    JsonBody(registration): JsonBody<Registration>,
) -> ApiResult {
    let account = call(&state.user_channel, SERVICE, |response| {
        UserRequest::RegisterDriver {
            registration,
            response,
        }
    })
    .await?;

    data(StatusCode::CREATED, account)
}

pub async fn login(
    State(state): State<AppState>,
    JsonBody(credentials): JsonBody<Credentials>,
) -> ApiResult {
    let account = call(&state.user_channel, SERVICE, |response| UserRequest::Login {
        credentials,
        response,
    })
    .await?;

    data(StatusCode::OK, account)
}

pub async fn logout(State(state): State<AppState>, session: Session) -> ApiResult {
    call(&state.user_channel, SERVICE, |response| UserRequest::Logout {
        actor: session.user,
        token: session.token,
        response,
    })
    .await?;

    data(StatusCode::OK, json!({ "message": "Logged out." }))
}

pub async fn create_user(
    State(state): State<AppState>,
    session: Session,
    JsonBody(account): JsonBody<NewAccount>,
) -> ApiResult {
    let user = call(&state.user_channel, SERVICE, |response| {
        UserRequest::CreateUser {
            actor: session.user,
            registration: account.registration,
            role: account.role,
            response,
        }
    })
    .await?;

    data(StatusCode::CREATED, user)
}

pub async fn create_driver(
    State(state): State<AppState>,
    session: Session,
    JsonBody(registration): JsonBody<Registration>,
) -> ApiResult {
    let user = call(&state.user_channel, SERVICE, |response| {
        UserRequest::CreateDriver {
            actor: session.user,
            registration,
            response,
        }
    })
    .await?;

    data(StatusCode::CREATED, user)
}

pub async fn create_admin(
    State(state): State<AppState>,
    session: Session,
    JsonBody(registration): JsonBody<Registration>,
) -> ApiResult {
    let user = call(&state.user_channel, SERVICE, |response| {
        UserRequest::CreateAdmin {
            actor: session.user,
            registration,
            response,
        }
    })
    .await?;

    data(StatusCode::CREATED, user)
}

pub async fn update_user(
    State(state): State<AppState>,
    session: Session,
    UserId(user_id): UserId,
    JsonBody(changes): JsonBody<UserChanges>,
) -> ApiResult {
    let user = call(&state.user_channel, SERVICE, |response| {
        UserRequest::UpdateUser {
            actor: session.user,
            user_id,
            changes,
            response,
        }
    })
    .await?;

    data(StatusCode::OK, user)
}

pub async fn update_admin(
    State(state): State<AppState>,
    session: Session,
    UserId(user_id): UserId,
    JsonBody(changes): JsonBody<UserChanges>,
) -> ApiResult {
    let user = call(&state.user_channel, SERVICE, |response| {
        UserRequest::UpdateAdmin {
            actor: session.user,
            user_id,
            changes,
            response,
        }
    })
    .await?;

    data(StatusCode::OK, user)
}

pub async fn approve_driver(
    State(state): State<AppState>,
    session: Session,
    UserId(user_id): UserId,
) -> ApiResult {
    let user = call(&state.user_channel, SERVICE, |response| {
        UserRequest::ApproveDriver {
            actor: session.user,
            user_id,
            response,
        }
    })
    .await?;

    data(StatusCode::OK, user)
}

pub async fn reject_driver(
    State(state): State<AppState>,
    session: Session,
    UserId(user_id): UserId,
) -> ApiResult {
    call(&state.user_channel, SERVICE, |response| {
        UserRequest::RejectDriver {
            actor: session.user,
            user_id,
            response,
        }
    })
    .await?;

    data(StatusCode::OK, json!({ "message": "Driver rejected." }))
}
