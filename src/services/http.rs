use axum::{
    extract::{rejection::JsonRejection, FromRequest, FromRequestParts, Path, Query, Request},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;

use super::{
    call, presence::PresenceRequest, reports::ReportRequest, rides::RideRequest,
    users::UserRequest, ServiceChannels, ServiceError,
};
use crate::models::{users::User, Page};

mod presence;
mod reports;
mod rides;
mod users;

#[derive(Clone)]
pub struct AppState {
    user_channel: mpsc::Sender<UserRequest>,
    presence_channel: mpsc::Sender<PresenceRequest>,
    ride_channel: mpsc::Sender<RideRequest>,
    report_channel: mpsc::Sender<ReportRequest>,
}

impl From<ServiceChannels> for AppState {
    fn from(channels: ServiceChannels) -> Self {
        AppState {
            user_channel: channels.users,
            presence_channel: channels.presence,
            ride_channel: channels.rides,
            report_channel: channels.reports,
        }
    }
}

pub struct ApiError(ServiceError);

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self.0 {
            ServiceError::AuthenticationRequired(message) => (StatusCode::UNAUTHORIZED, message),
            ServiceError::Forbidden(message) => (StatusCode::FORBIDDEN, message),
            ServiceError::Validation(message) => (StatusCode::UNPROCESSABLE_ENTITY, message),
            ServiceError::StateConflict(message) => (StatusCode::BAD_REQUEST, message),
            ServiceError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            e @ (ServiceError::Database(_) | ServiceError::Communication(..)) => {
                log::error!("Request failed: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error.".to_string(),
                )
            }
        };

        if status.is_client_error() {
            log::debug!("Request rejected ({}): {}", status, message);
        }

        (status, Json(json!({ "errors": { "message": message } }))).into_response()
    }
}

pub type ApiResult = Result<(StatusCode, Json<Value>), ApiError>;

pub fn data<T: Serialize>(status: StatusCode, value: T) -> ApiResult {
    Ok((status, Json(json!({ "data": value }))))
}

/// JSON body whose rejections use the API error envelope.
pub struct JsonBody<T>(pub T);

impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err(ApiError(ServiceError::Validation(rejection_message(
                rejection,
            )))),
        }
    }
}

fn rejection_message(rejection: JsonRejection) -> String {
    match rejection {
        JsonRejection::MissingJsonContentType(_) => {
            "Expected request with `Content-Type: application/json`.".to_string()
        }
        other => other.body_text(),
    }
}

/// Query string whose rejections use the API error envelope.
pub struct ApiQuery<T>(pub T);

impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(ApiQuery(value)),
            Err(rejection) => Err(ApiError(ServiceError::Validation(rejection.body_text()))),
        }
    }
}

/// `{ride}` path segment. An id that does not parse names no ride.
pub struct RideId(pub i64);

impl<S: Send + Sync> FromRequestParts<S> for RideId {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        path_id(parts, state, "Ride not found.").await.map(RideId)
    }
}

/// `{user}` path segment.
pub struct UserId(pub i64);

impl<S: Send + Sync> FromRequestParts<S> for UserId {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        path_id(parts, state, "User not found.").await.map(UserId)
    }
}

async fn path_id<S: Send + Sync>(
    parts: &mut Parts,
    state: &S,
    not_found: &str,
) -> Result<i64, ApiError> {
    match Path::<i64>::from_request_parts(parts, state).await {
        Ok(Path(id)) => Ok(id),
        Err(rejection) => {
            log::debug!("Unusable path id: {}", rejection.body_text());
            Err(ApiError(ServiceError::NotFound(not_found.to_string())))
        }
    }
}

/// The authenticated caller, resolved from an `Authorization: Bearer` header.
pub struct Session {
    pub user: User,
    pub token: String,
}

fn bearer_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

impl FromRequestParts<AppState> for Session {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or_else(ServiceError::unauthenticated)?;

        let user = call(&state.user_channel, "UserService", |response| {
            UserRequest::Authenticate {
                token: token.clone(),
                response,
            }
        })
        .await?;

        Ok(Session { user, token })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl PageQuery {
    pub fn page(&self, default_per_page: u32) -> Page {
        Page::new(self.page, self.per_page, default_per_page)
    }
}

pub fn router(channels: ServiceChannels) -> Router {
    let admin = Router::new()
        .route("/stats", get(reports::stats))
        .route("/users", get(reports::list_users).post(users::create_user))
        .route("/users/{user}", patch(users::update_user))
        .route("/drivers", get(reports::list_drivers).post(users::create_driver))
        .route("/drivers/locations", get(reports::driver_map))
        .route("/drivers/{user}/approve", post(users::approve_driver))
        .route("/drivers/{user}/reject", post(users::reject_driver))
        .route("/rides", get(reports::all_rides))
        .route("/rides/{ride}/assign", post(rides::assign_driver))
        .route("/rides/{ride}/cancel", post(rides::cancel))
        .route("/driver-status-logs", get(reports::status_logs))
        .route("/driver-location-logs", get(reports::location_logs))
        .route("/admins", get(reports::list_admins).post(users::create_admin))
        .route("/admins/{user}", patch(users::update_admin));

    Router::new()
        .route("/health", get(|| async { Json(json!({ "status": "ok" })) }))
        .route("/auth/register-passenger", post(users::register_passenger))
        .route("/auth/register-driver", post(users::register_driver))
        .route("/auth/login", post(users::login))
        .route("/auth/logout", post(users::logout))
        .route("/me", get(reports::profile))
        .route("/my/rides", get(reports::my_rides))
        .route("/rides", post(rides::create))
        .route("/rides/available", get(reports::available_rides))
        .route("/rides/{ride}/accept", post(rides::accept))
        .route("/rides/{ride}/arrived-pickup", post(rides::arrive_pickup))
        .route("/rides/{ride}/start", post(rides::start_trip))
        .route("/rides/{ride}/complete", post(rides::complete))
        .route("/driver/online", post(presence::go_online))
        .route("/driver/offline", post(presence::go_offline))
        .route("/driver/location", post(presence::report_location))
        .nest("/admin", admin)
        .with_state(AppState::from(channels))
        .layer(TraceLayer::new_for_http())
}

pub async fn start_http_server(channels: ServiceChannels, listen: &str) -> Result<(), anyhow::Error> {
    let app = router(channels);

    let listener = tokio::net::TcpListener::bind(listen).await?;
    log::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::Method;
    use tower::ServiceExt;

    use super::*;
    use crate::repositories::Repositories;
    use crate::services::start_services;
    use crate::services::users::seed_super_admin;
    use crate::settings::SuperAdmin;

    const ROOT_PHONE: &str = "0900";
    const ROOT_PASSWORD: &str = "rootpass";

    async fn app() -> Router {
        let repositories = Repositories::memory();
        seed_super_admin(
            repositories.users.as_ref(),
            &SuperAdmin {
                phone: ROOT_PHONE.to_string(),
                display_name: "Root".to_string(),
                password: ROOT_PASSWORD.to_string(),
            },
        )
        .await
        .unwrap();

        router(start_services(repositories))
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = axum::http::Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn register(app: &Router, kind: &str, phone: &str) -> (i64, String) {
        let (status, body) = send(
            app,
            Method::POST,
            &format!("/auth/register-{}", kind),
            None,
            Some(json!({ "display_name": phone, "phone": phone, "password": "secret1" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let id = body["data"]["user"]["id"].as_i64().unwrap();
        let token = body["data"]["token"].as_str().unwrap().to_string();
        (id, token)
    }

    async fn login(app: &Router, phone: &str, password: &str) -> String {
        let (status, body) = send(
            app,
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "phone": phone, "password": password })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        body["data"]["token"].as_str().unwrap().to_string()
    }

    fn manila_trip() -> Value {
        json!({
            "pickup_lat": 14.5995,
            "pickup_lng": 120.9842,
            "dropoff_lat": 14.6760,
            "dropoff_lng": 121.0437
        })
    }

    #[tokio::test]
    async fn test_health() {
        let app = app().await;
        let (status, body) = send(&app, Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn test_missing_token_is_unauthenticated() {
        let app = app().await;
        let (status, body) = send(&app, Method::GET, "/me", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["errors"]["message"], "Unauthenticated.");

        let (status, _) = send(&app, Method::GET, "/me", Some("bogus"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_passenger_creates_ride() {
        let app = app().await;
        let (passenger_id, token) = register(&app, "passenger", "0917").await;

        let (status, body) =
            send(&app, Method::POST, "/rides", Some(&token), Some(manila_trip())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["status"], "requested");
        assert_eq!(body["data"]["passenger_id"], passenger_id);
        assert_eq!(body["data"]["distance_km"], 10.65);
        assert!(body["data"]["driver_id"].is_null());
    }

    #[tokio::test]
    async fn test_malformed_body_is_unprocessable() {
        let app = app().await;
        let (_, token) = register(&app, "passenger", "0917").await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/rides",
            Some(&token),
            Some(json!({ "pickup_lat": "north" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["errors"]["message"].is_string());

        let mut trip = manila_trip();
        trip["pickup_lat"] = json!(95.0);
        let (status, _) = send(&app, Method::POST, "/rides", Some(&token), Some(trip)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_pending_driver_is_forbidden_until_approved() {
        let app = app().await;
        let (driver_id, driver_token) = register(&app, "driver", "0918").await;

        let (status, body) =
            send(&app, Method::POST, "/driver/online", Some(&driver_token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(body["errors"]["message"].is_string());

        let (status, body) = send(
            &app,
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "phone": "0918", "password": "secret1" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["errors"]["message"], "Account is not active.");

        let root_token = login(&app, ROOT_PHONE, ROOT_PASSWORD).await;
        let (status, _) = send(
            &app,
            Method::POST,
            &format!("/admin/drivers/{}/approve", driver_id),
            Some(&root_token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) =
            send(&app, Method::POST, "/driver/online", Some(&driver_token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["is_online"], true);
    }

    #[tokio::test]
    async fn test_ride_lifecycle_over_http() {
        let app = app().await;
        let root_token = login(&app, ROOT_PHONE, ROOT_PASSWORD).await;
        let (_, passenger_token) = register(&app, "passenger", "0917").await;
        let (driver_id, driver_token) = register(&app, "driver", "0918").await;
        send(
            &app,
            Method::POST,
            &format!("/admin/drivers/{}/approve", driver_id),
            Some(&root_token),
            None,
        )
        .await;

        let (_, body) = send(
            &app,
            Method::POST,
            "/rides",
            Some(&passenger_token),
            Some(manila_trip()),
        )
        .await;
        let ride_id = body["data"]["id"].as_i64().unwrap();

        let (status, body) =
            send(&app, Method::GET, "/rides/available", Some(&driver_token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["items"][0]["id"], ride_id);
        assert_eq!(body["data"]["per_page"], 20);

        let (status, _) = send(
            &app,
            Method::POST,
            &format!("/rides/{}/accept", ride_id),
            Some(&passenger_token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(
            &app,
            Method::POST,
            &format!("/rides/{}/complete", ride_id),
            Some(&driver_token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        for (step, expected) in [
            ("accept", "assigned"),
            ("arrived-pickup", "driver_at_pickup"),
            ("start", "in_progress"),
            ("complete", "completed"),
        ] {
            let (status, body) = send(
                &app,
                Method::POST,
                &format!("/rides/{}/{}", ride_id, step),
                Some(&driver_token),
                None,
            )
            .await;
            assert_eq!(status, StatusCode::OK, "step {}", step);
            assert_eq!(body["data"]["status"], expected);
        }

        let (status, body) = send(
            &app,
            Method::POST,
            &format!("/admin/rides/{}/cancel", ride_id),
            Some(&root_token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["errors"]["message"],
            "Ride cannot be cancelled in current state."
        );

        let (status, body) =
            send(&app, Method::GET, "/my/rides", Some(&passenger_token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["items"][0]["status"], "completed");
    }

    #[tokio::test]
    async fn test_unknown_ride_is_not_found() {
        let app = app().await;
        let root_token = login(&app, ROOT_PHONE, ROOT_PASSWORD).await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/admin/rides/999/cancel",
            Some(&root_token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["errors"]["message"], "Ride not found.");
    }

    #[tokio::test]
    async fn test_bad_path_and_query_values_use_the_envelope() {
        let app = app().await;
        let (_, token) = register(&app, "passenger", "0917").await;

        let (status, body) =
            send(&app, Method::POST, "/rides/abc/accept", Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["errors"]["message"], "Ride not found.");

        let (status, body) = send(
            &app,
            Method::POST,
            "/rides/99999999999999999999/start",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["errors"]["message"], "Ride not found.");

        let (status, body) =
            send(&app, Method::GET, "/my/rides?page=abc", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["errors"]["message"].is_string());

        let root_token = login(&app, ROOT_PHONE, ROOT_PASSWORD).await;
        let (status, body) = send(
            &app,
            Method::POST,
            "/admin/drivers/abc/approve",
            Some(&root_token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["errors"]["message"], "User not found.");

        let (status, body) = send(
            &app,
            Method::GET,
            "/admin/drivers?status=foo",
            Some(&root_token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["errors"]["message"].is_string());

        let (status, body) = send(
            &app,
            Method::GET,
            "/admin/drivers?status=pending&page=2",
            Some(&root_token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["page"], 2);
    }

    #[tokio::test]
    async fn test_admin_routes_reject_passengers() {
        let app = app().await;
        let (_, token) = register(&app, "passenger", "0917").await;

        let (status, _) = send(&app, Method::GET, "/admin/stats", Some(&token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let root_token = login(&app, ROOT_PHONE, ROOT_PASSWORD).await;
        let (status, body) =
            send(&app, Method::GET, "/admin/stats", Some(&root_token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["total_users"], 2);
        assert_eq!(body["data"]["total_passengers"], 1);
    }

    #[tokio::test]
    async fn test_logout_invalidates_token() {
        let app = app().await;
        let (_, token) = register(&app, "passenger", "0917").await;

        let (status, _) = send(&app, Method::POST, "/auth/logout", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(&app, Method::GET, "/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
