use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::repositories::Repositories;

pub mod http;
pub mod presence;
pub mod reports;
pub mod rides;
pub mod users;

const CHANNEL_CAPACITY: usize = 512;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    AuthenticationRequired(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    StateConflict(String),
    #[error("{0}")]
    NotFound(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Communication error: {0} - {1}")]
    Communication(String, String),
}

impl ServiceError {
    pub fn database(e: anyhow::Error) -> Self {
        log::error!("Store operation failed: {:#}", e);
        ServiceError::Database(e.to_string())
    }

    pub fn unauthenticated() -> Self {
        ServiceError::AuthenticationRequired("Unauthenticated.".to_string())
    }
}

pub type Responder<T> = oneshot::Sender<Result<T, ServiceError>>;

/// Sends a request built around a fresh oneshot channel and waits for the
/// service's answer.
pub async fn call<R, T>(
    channel: &mpsc::Sender<R>,
    service: &str,
    request: impl FnOnce(Responder<T>) -> R,
) -> Result<T, ServiceError> {
    let (response_tx, response_rx) = oneshot::channel();

    channel
        .send(request(response_tx))
        .await
        .map_err(|e| ServiceError::Communication(service.to_string(), e.to_string()))?;

    response_rx
        .await
        .map_err(|e| ServiceError::Communication(service.to_string(), e.to_string()))?
}

#[async_trait]
pub trait RequestHandler<T>: Send + Sync + 'static
where
    T: Send + 'static,
{
    async fn handle_request(&self, request: T);
}

#[async_trait]
pub trait Service<T, H>: Send + Sync + 'static
where
    T: Send + 'static,
    H: RequestHandler<T> + Clone + Send,
{
    async fn run(&mut self, handler: H, receiver: &mut mpsc::Receiver<T>) {
        while let Some(request) = receiver.recv().await {
            let handler = handler.clone();

            tokio::spawn(async move {
                handler.handle_request(request).await;
            });
        }
    }
}

#[derive(Clone)]
pub struct ServiceChannels {
    pub users: mpsc::Sender<users::UserRequest>,
    pub presence: mpsc::Sender<presence::PresenceRequest>,
    pub rides: mpsc::Sender<rides::RideRequest>,
    pub reports: mpsc::Sender<reports::ReportRequest>,
}

/// Spawns every domain service on the current runtime and returns the
/// channels used to reach them.
pub fn start_services(repositories: Repositories) -> ServiceChannels {
    let (user_tx, mut user_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (presence_tx, mut presence_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (ride_tx, mut ride_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (report_tx, mut report_rx) = mpsc::channel(CHANNEL_CAPACITY);

    let mut user_service = users::UserService::new();
    let mut presence_service = presence::PresenceService::new();
    let mut ride_service = rides::RideService::new();
    let mut report_service = reports::ReportService::new();

    log::info!("Starting user service.");
    let user_repositories = repositories.clone();
    tokio::spawn(async move {
        user_service
            .run(users::UserRequestHandler::new(user_repositories), &mut user_rx)
            .await;
    });

    log::info!("Starting presence service.");
    let presence_repositories = repositories.clone();
    tokio::spawn(async move {
        presence_service
            .run(
                presence::PresenceRequestHandler::new(presence_repositories),
                &mut presence_rx,
            )
            .await;
    });

    log::info!("Starting ride service.");
    let ride_repositories = repositories.clone();
    tokio::spawn(async move {
        ride_service
            .run(rides::RideRequestHandler::new(ride_repositories), &mut ride_rx)
            .await;
    });

    log::info!("Starting report service.");
    tokio::spawn(async move {
        report_service
            .run(reports::ReportRequestHandler::new(repositories), &mut report_rx)
            .await;
    });

    ServiceChannels {
        users: user_tx,
        presence: presence_tx,
        rides: ride_tx,
        reports: report_tx,
    }
}
