use async_trait::async_trait;

use super::{RequestHandler, Responder, Service, ServiceError};
use crate::auth::{self, Operation};
use crate::models::driver_logs::LocationReport;
use crate::models::users::User;
use crate::repositories::Repositories;
use crate::utils;

const MUST_BE_ONLINE: &str = "You must be online to send location.";

pub enum PresenceRequest {
    GoOnline {
        actor: User,
        response: Responder<User>,
    },
    GoOffline {
        actor: User,
        response: Responder<User>,
    },
    ReportLocation {
        actor: User,
        report: LocationReport,
        response: Responder<User>,
    },
}

#[derive(Clone)]
pub struct PresenceRequestHandler {
    repositories: Repositories,
}

fn validate_report(report: &LocationReport) -> Result<(), ServiceError> {
    if !utils::is_valid_latitude(report.latitude) {
        return Err(ServiceError::Validation(
            "The latitude field must be between -90 and 90.".to_string(),
        ));
    }
    if !utils::is_valid_longitude(report.longitude) {
        return Err(ServiceError::Validation(
            "The longitude field must be between -180 and 180.".to_string(),
        ));
    }
    Ok(())
}

impl PresenceRequestHandler {
    pub fn new(repositories: Repositories) -> Self {
        PresenceRequestHandler { repositories }
    }

    /// Going online again while already online is allowed and writes another
    /// status log row.
    async fn go_online(&self, actor: &User) -> Result<User, ServiceError> {
        auth::authorize(actor, Operation::GoOnline)?;

        let driver = self
            .repositories
            .presence
            .set_online(actor.id)
            .await
            .map_err(ServiceError::database)?
            .ok_or_else(|| ServiceError::NotFound("Driver not found.".to_string()))?;

        log::info!("Driver {} is online.", driver.id);
        Ok(driver)
    }

    async fn go_offline(&self, actor: &User) -> Result<User, ServiceError> {
        auth::authorize(actor, Operation::GoOffline)?;

        let driver = self
            .repositories
            .presence
            .set_offline(actor.id)
            .await
            .map_err(ServiceError::database)?
            .ok_or_else(|| ServiceError::NotFound("Driver not found.".to_string()))?;

        log::info!("Driver {} is offline.", driver.id);
        Ok(driver)
    }

    async fn report_location(
        &self,
        actor: &User,
        report: LocationReport,
    ) -> Result<User, ServiceError> {
        auth::authorize(actor, Operation::ReportLocation)?;

        if !actor.is_online {
            return Err(ServiceError::StateConflict(MUST_BE_ONLINE.to_string()));
        }
        validate_report(&report)?;

        // The store re-checks the flag, a concurrent go-offline wins over us.
        let driver = self
            .repositories
            .presence
            .record_location(actor.id, report.latitude, report.longitude)
            .await
            .map_err(ServiceError::database)?
            .ok_or_else(|| ServiceError::StateConflict(MUST_BE_ONLINE.to_string()))?;

        log::debug!(
            "Driver {} at ({}, {}).",
            driver.id,
            report.latitude,
            report.longitude
        );
        Ok(driver)
    }
}

#[async_trait]
impl RequestHandler<PresenceRequest> for PresenceRequestHandler {
    async fn handle_request(&self, request: PresenceRequest) {
        match request {
            PresenceRequest::GoOnline { actor, response } => {
                let result = self.go_online(&actor).await;
                let _ = response.send(result);
            }
            PresenceRequest::GoOffline { actor, response } => {
                let result = self.go_offline(&actor).await;
                let _ = response.send(result);
            }
            PresenceRequest::ReportLocation {
                actor,
                report,
                response,
            } => {
                let result = self.report_location(&actor, report).await;
                let _ = response.send(result);
            }
        }
    }
}

pub struct PresenceService;

impl PresenceService {
    pub fn new() -> Self {
        PresenceService {}
    }
}

#[async_trait]
impl Service<PresenceRequest, PresenceRequestHandler> for PresenceService {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::driver_logs::PresenceStatus;
    use crate::models::users::{NewUser, Role};
    use crate::models::Page;

    async fn setup(role: Role) -> (PresenceRequestHandler, User) {
        let repositories = Repositories::memory();
        let user = repositories
            .users
            .insert_user(&NewUser {
                display_name: "Dana".to_string(),
                phone: "0918".to_string(),
                password_hash: String::new(),
                role,
                is_active: true,
            })
            .await
            .unwrap();

        (PresenceRequestHandler::new(repositories), user)
    }

    async fn reload(handler: &PresenceRequestHandler, user: &User) -> User {
        handler
            .repositories
            .users
            .get_user_by_id(user.id)
            .await
            .unwrap()
            .unwrap()
    }

    fn at(latitude: f64, longitude: f64) -> LocationReport {
        LocationReport {
            latitude,
            longitude,
        }
    }

    #[tokio::test]
    async fn test_online_report_offline_scenario() {
        let (handler, driver) = setup(Role::Driver).await;

        let driver = handler.go_online(&driver).await.unwrap();
        assert!(driver.is_online);

        let driver = handler.report_location(&driver, at(10.0, 20.0)).await.unwrap();
        assert_eq!(driver.last_latitude, Some(10.0));
        assert_eq!(driver.last_longitude, Some(20.0));
        assert!(driver.last_location_at.is_some());

        let driver = handler.go_offline(&driver).await.unwrap();
        assert!(!driver.is_online);
        assert_eq!(driver.last_latitude, None);
        assert_eq!(driver.last_longitude, None);
        assert_eq!(driver.last_location_at, None);

        let page = Page::new(None, None, 100);
        let status_logs = handler
            .repositories
            .presence
            .status_logs(Some(driver.id), page)
            .await
            .unwrap();
        let statuses: Vec<_> = status_logs.iter().rev().map(|log| log.status).collect();
        assert_eq!(statuses, vec![PresenceStatus::Online, PresenceStatus::Offline]);

        let location_logs = handler
            .repositories
            .presence
            .location_logs(Some(driver.id), page)
            .await
            .unwrap();
        assert_eq!(location_logs.len(), 1);
        assert_eq!(location_logs[0].latitude, 10.0);
        assert_eq!(location_logs[0].longitude, 20.0);
    }

    #[tokio::test]
    async fn test_repeated_online_logs_every_call() {
        let (handler, driver) = setup(Role::Driver).await;

        handler.go_online(&driver).await.unwrap();
        let driver = handler.go_online(&driver).await.unwrap();
        assert!(driver.is_online);

        let logs = handler
            .repositories
            .presence
            .status_logs(Some(driver.id), Page::new(None, None, 100))
            .await
            .unwrap();
        assert_eq!(logs.len(), 2);
        assert!(logs.iter().all(|log| log.status == PresenceStatus::Online));
    }

    #[tokio::test]
    async fn test_report_requires_online() {
        let (handler, driver) = setup(Role::Driver).await;

        let result = handler.report_location(&driver, at(10.0, 20.0)).await;
        assert!(matches!(result, Err(ServiceError::StateConflict(_))));

        let stored = reload(&handler, &driver).await;
        assert!(!stored.has_location());
    }

    #[tokio::test]
    async fn test_stale_online_flag_is_rechecked_by_store() {
        let (handler, driver) = setup(Role::Driver).await;
        let online = handler.go_online(&driver).await.unwrap();
        handler.go_offline(&online).await.unwrap();

        // `online` still claims the driver is online.
        let result = handler.report_location(&online, at(1.0, 1.0)).await;
        assert!(matches!(result, Err(ServiceError::StateConflict(_))));
    }

    #[tokio::test]
    async fn test_out_of_range_coordinates_are_rejected() {
        let (handler, driver) = setup(Role::Driver).await;
        let driver = handler.go_online(&driver).await.unwrap();

        let result = handler.report_location(&driver, at(91.0, 0.0)).await;
        assert!(matches!(result, Err(ServiceError::Validation(_))));

        let result = handler.report_location(&driver, at(0.0, -180.5)).await;
        assert!(matches!(result, Err(ServiceError::Validation(_))));

        let logs = handler
            .repositories
            .presence
            .location_logs(Some(driver.id), Page::new(None, None, 200))
            .await
            .unwrap();
        assert!(logs.is_empty());
    }

    #[tokio::test]
    async fn test_only_drivers_manage_presence() {
        let (handler, passenger) = setup(Role::Passenger).await;

        let result = handler.go_online(&passenger).await;
        assert!(matches!(result, Err(ServiceError::Forbidden(_))));

        let logs = handler
            .repositories
            .presence
            .status_logs(None, Page::new(None, None, 100))
            .await
            .unwrap();
        assert!(logs.is_empty());
    }

    #[tokio::test]
    async fn test_location_is_overwritten_while_log_grows() {
        let (handler, driver) = setup(Role::Driver).await;
        let driver = handler.go_online(&driver).await.unwrap();

        handler.report_location(&driver, at(1.0, 1.0)).await.unwrap();
        let driver = handler.report_location(&driver, at(2.0, 2.0)).await.unwrap();

        assert_eq!(driver.last_latitude, Some(2.0));
        let logs = handler
            .repositories
            .presence
            .location_logs(Some(driver.id), Page::new(None, None, 200))
            .await
            .unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].latitude, 2.0);
    }
}
