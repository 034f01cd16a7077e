use async_trait::async_trait;
use serde::Deserialize;

use super::{RequestHandler, Responder, Service, ServiceError};
use crate::auth::{self, Operation};
use crate::models::driver_logs::{DriverLocationLog, DriverStatusLog};
use crate::models::rides::{Ride, RideFilter, RideStatus};
use crate::models::users::{DriverLocation, Role, User, UserFilter, UserStats};
use crate::models::{Page, Paginated};
use crate::repositories::Repositories;

pub const AVAILABLE_RIDES_PER_PAGE: u32 = 20;
pub const RIDES_PER_PAGE: u32 = 50;
pub const USERS_PER_PAGE: u32 = 50;
pub const STATUS_LOGS_PER_PAGE: u32 = 100;
pub const LOCATION_LOGS_PER_PAGE: u32 = 200;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverApproval {
    Pending,
    Approved,
}

pub enum ReportRequest {
    Profile {
        actor: User,
        response: Responder<User>,
    },
    AvailableRides {
        actor: User,
        page: Page,
        response: Responder<Paginated<Ride>>,
    },
    MyRides {
        actor: User,
        page: Page,
        response: Responder<Paginated<Ride>>,
    },
    AllRides {
        actor: User,
        page: Page,
        response: Responder<Paginated<Ride>>,
    },
    StatusLogs {
        actor: User,
        driver_id: Option<i64>,
        page: Page,
        response: Responder<Paginated<DriverStatusLog>>,
    },
    LocationLogs {
        actor: User,
        driver_id: Option<i64>,
        page: Page,
        response: Responder<Paginated<DriverLocationLog>>,
    },
    DriverMap {
        actor: User,
        response: Responder<Vec<DriverLocation>>,
    },
    Stats {
        actor: User,
        response: Responder<UserStats>,
    },
    Users {
        actor: User,
        role: Option<Role>,
        page: Page,
        response: Responder<Paginated<User>>,
    },
    Drivers {
        actor: User,
        approval: Option<DriverApproval>,
        page: Page,
        response: Responder<Paginated<User>>,
    },
    Admins {
        actor: User,
        page: Page,
        response: Responder<Paginated<User>>,
    },
}

/// Read-only projections. Nothing here writes to the store.
#[derive(Clone)]
pub struct ReportRequestHandler {
    repositories: Repositories,
}

/// Passengers see the rides they requested and drivers the rides they hold;
/// staff see everything.
fn my_rides_filter(actor: &User) -> RideFilter {
    match actor.role {
        Role::Passenger => RideFilter {
            passenger_id: Some(actor.id),
            ..Default::default()
        },
        Role::Driver => RideFilter {
            driver_id: Some(actor.id),
            ..Default::default()
        },
        Role::Admin | Role::SuperAdmin => RideFilter::default(),
    }
}

impl ReportRequestHandler {
    pub fn new(repositories: Repositories) -> Self {
        ReportRequestHandler { repositories }
    }

    async fn rides(&self, filter: RideFilter, page: Page) -> Result<Paginated<Ride>, ServiceError> {
        let rides = self
            .repositories
            .rides
            .list_rides(filter, page)
            .await
            .map_err(ServiceError::database)?;
        Ok(Paginated::new(rides, page))
    }

    async fn users(&self, filter: UserFilter, page: Page) -> Result<Paginated<User>, ServiceError> {
        let users = self
            .repositories
            .users
            .list_users(&filter, page)
            .await
            .map_err(ServiceError::database)?;
        Ok(Paginated::new(users, page))
    }

    async fn available_rides(
        &self,
        actor: &User,
        page: Page,
    ) -> Result<Paginated<Ride>, ServiceError> {
        auth::authorize(actor, Operation::ListAvailableRides)?;
        let filter = RideFilter {
            status: Some(RideStatus::Requested),
            ..Default::default()
        };
        self.rides(filter, page).await
    }

    async fn my_rides(&self, actor: &User, page: Page) -> Result<Paginated<Ride>, ServiceError> {
        auth::authorize(actor, Operation::ListMyRides)?;
        self.rides(my_rides_filter(actor), page).await
    }

    async fn all_rides(&self, actor: &User, page: Page) -> Result<Paginated<Ride>, ServiceError> {
        auth::authorize(actor, Operation::ListAllRides)?;
        self.rides(RideFilter::default(), page).await
    }

    async fn status_logs(
        &self,
        actor: &User,
        driver_id: Option<i64>,
        page: Page,
    ) -> Result<Paginated<DriverStatusLog>, ServiceError> {
        auth::authorize(actor, Operation::ViewDriverLogs)?;
        let logs = self
            .repositories
            .presence
            .status_logs(driver_id, page)
            .await
            .map_err(ServiceError::database)?;
        Ok(Paginated::new(logs, page))
    }

    async fn location_logs(
        &self,
        actor: &User,
        driver_id: Option<i64>,
        page: Page,
    ) -> Result<Paginated<DriverLocationLog>, ServiceError> {
        auth::authorize(actor, Operation::ViewDriverLogs)?;
        let logs = self
            .repositories
            .presence
            .location_logs(driver_id, page)
            .await
            .map_err(ServiceError::database)?;
        Ok(Paginated::new(logs, page))
    }

    async fn driver_map(&self, actor: &User) -> Result<Vec<DriverLocation>, ServiceError> {
        auth::authorize(actor, Operation::ViewDriverMap)?;
        self.repositories
            .presence
            .online_drivers()
            .await
            .map_err(ServiceError::database)
    }

    async fn stats(&self, actor: &User) -> Result<UserStats, ServiceError> {
        auth::authorize(actor, Operation::ViewStats)?;
        let users = &self.repositories.users;

        let total_users = users.count_users(None).await;
        let total_drivers = users.count_users(Some(Role::Driver)).await;
        let total_passengers = users.count_users(Some(Role::Passenger)).await;

        Ok(UserStats {
            total_users: total_users.map_err(ServiceError::database)?,
            total_drivers: total_drivers.map_err(ServiceError::database)?,
            total_passengers: total_passengers.map_err(ServiceError::database)?,
        })
    }

    async fn list_users(
        &self,
        actor: &User,
        role: Option<Role>,
        page: Page,
    ) -> Result<Paginated<User>, ServiceError> {
        auth::authorize(actor, Operation::ListUsers)?;
        let filter = UserFilter {
            roles: role.into_iter().collect(),
            is_active: None,
        };
        self.users(filter, page).await
    }

    async fn list_drivers(
        &self,
        actor: &User,
        approval: Option<DriverApproval>,
        page: Page,
    ) -> Result<Paginated<User>, ServiceError> {
        auth::authorize(actor, Operation::ListDrivers)?;
        let filter = UserFilter {
            roles: vec![Role::Driver],
            is_active: approval.map(|approval| approval == DriverApproval::Approved),
        };
        self.users(filter, page).await
    }

    async fn list_admins(&self, actor: &User, page: Page) -> Result<Paginated<User>, ServiceError> {
        auth::authorize(actor, Operation::ListAdmins)?;
        let filter = UserFilter {
            roles: Role::STAFF.to_vec(),
            is_active: None,
        };
        self.users(filter, page).await
    }
}

#[async_trait]
impl RequestHandler<ReportRequest> for ReportRequestHandler {
    async fn handle_request(&self, request: ReportRequest) {
        match request {
            ReportRequest::Profile { actor, response } => {
                let result = auth::authorize(&actor, Operation::ViewProfile).map(|_| actor);
                let _ = response.send(result);
            }
            ReportRequest::AvailableRides {
                actor,
                page,
                response,
            } => {
                let result = self.available_rides(&actor, page).await;
                let _ = response.send(result);
            }
            ReportRequest::MyRides {
                actor,
                page,
                response,
            } => {
                let result = self.my_rides(&actor, page).await;
                let _ = response.send(result);
            }
            ReportRequest::AllRides {
                actor,
                page,
                response,
            } => {
                let result = self.all_rides(&actor, page).await;
                let _ = response.send(result);
            }
            ReportRequest::StatusLogs {
                actor,
                driver_id,
                page,
                response,
            } => {
                let result = self.status_logs(&actor, driver_id, page).await;
                let _ = response.send(result);
            }
            ReportRequest::LocationLogs {
                actor,
                driver_id,
                page,
                response,
            } => {
                let result = self.location_logs(&actor, driver_id, page).await;
                let _ = response.send(result);
            }
            ReportRequest::DriverMap { actor, response } => {
                let result = self.driver_map(&actor).await;
                let _ = response.send(result);
            }
            ReportRequest::Stats { actor, response } => {
                let result = self.stats(&actor).await;
                let _ = response.send(result);
            }
            ReportRequest::Users {
                actor,
                role,
                page,
                response,
            } => {
                let result = self.list_users(&actor, role, page).await;
                let _ = response.send(result);
            }
            ReportRequest::Drivers {
                actor,
                approval,
                page,
                response,
            } => {
                let result = self.list_drivers(&actor, approval, page).await;
                let _ = response.send(result);
            }
            ReportRequest::Admins {
                actor,
                page,
                response,
            } => {
                let result = self.list_admins(&actor, page).await;
                let _ = response.send(result);
            }
        }
    }
}

pub struct ReportService;

impl ReportService {
    pub fn new() -> Self {
        ReportService {}
    }
}

#[async_trait]
impl Service<ReportRequest, ReportRequestHandler> for ReportService {}
