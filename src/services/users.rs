use std::sync::Arc;

use async_trait::async_trait;

use super::{RequestHandler, Responder, Service, ServiceError};
use crate::auth::credentials::{self, MIN_PASSWORD_LENGTH};
use crate::auth::sessions::Sessions;
use crate::auth::{self, Operation};
use crate::models::rides::RideFilter;
use crate::models::users::{
    AuthenticatedUser, Credentials, NewUser, Registration, Role, User, UserChanges,
};
use crate::repositories::users::{PhoneTaken, UserRepository};
use crate::repositories::Repositories;
use crate::settings::SuperAdmin;

const MAX_DISPLAY_NAME_LENGTH: usize = 255;
const MAX_PHONE_LENGTH: usize = 32;

pub enum UserRequest {
    RegisterPassenger {
        registration: Registration,
        response: Responder<AuthenticatedUser>,
    },
    RegisterDriver {
        registration: Registration,
        response: Responder<AuthenticatedUser>,
    },
    Login {
        credentials: Credentials,
        response: Responder<AuthenticatedUser>,
    },
    Authenticate {
        token: String,
        response: Responder<User>,
    },
    Logout {
        actor: User,
        token: String,
        response: Responder<()>,
    },
    CreateUser {
        actor: User,
        registration: Registration,
        role: Role,
        response: Responder<User>,
    },
    CreateDriver {
        actor: User,
        registration: Registration,
        response: Responder<User>,
    },
    CreateAdmin {
        actor: User,
        registration: Registration,
        response: Responder<User>,
    },
    UpdateUser {
        actor: User,
        user_id: i64,
        changes: UserChanges,
        response: Responder<User>,
    },
    UpdateAdmin {
        actor: User,
        user_id: i64,
        changes: UserChanges,
        response: Responder<User>,
    },
    ApproveDriver {
        actor: User,
        user_id: i64,
        response: Responder<User>,
    },
    RejectDriver {
        actor: User,
        user_id: i64,
        response: Responder<()>,
    },
}

fn phone_taken() -> ServiceError {
    ServiceError::Validation("The phone has already been taken.".to_string())
}

/// A write that lost a race for the phone number still answers 422.
fn store_error(e: anyhow::Error) -> ServiceError {
    if e.is::<PhoneTaken>() {
        phone_taken()
    } else {
        ServiceError::database(e)
    }
}

#[derive(Clone)]
pub struct UserRequestHandler {
    repositories: Repositories,
    sessions: Arc<Sessions>,
}

fn validate_display_name(display_name: &str) -> Result<(), ServiceError> {
    let length = display_name.trim().chars().count();
    if length == 0 || length > MAX_DISPLAY_NAME_LENGTH {
        return Err(ServiceError::Validation(format!(
            "The display name must be between 1 and {} characters.",
            MAX_DISPLAY_NAME_LENGTH
        )));
    }
    Ok(())
}

fn validate_phone(phone: &str) -> Result<(), ServiceError> {
    let length = phone.trim().chars().count();
    if length == 0 || length > MAX_PHONE_LENGTH {
        return Err(ServiceError::Validation(format!(
            "The phone must be between 1 and {} characters.",
            MAX_PHONE_LENGTH
        )));
    }
    Ok(())
}

fn validate_registration(registration: &Registration) -> Result<(), ServiceError> {
    validate_display_name(&registration.display_name)?;
    validate_phone(&registration.phone)?;

    if registration.password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ServiceError::Validation(format!(
            "The password must be at least {} characters.",
            MIN_PASSWORD_LENGTH
        )));
    }
    Ok(())
}

fn ensure_role_in(role: Option<Role>, allowed: &[Role]) -> Result<(), ServiceError> {
    match role {
        Some(role) if !allowed.contains(&role) => Err(ServiceError::Validation(
            "The selected role is invalid.".to_string(),
        )),
        _ => Ok(()),
    }
}

/// Creates the configured super admin unless its phone is already taken.
pub async fn seed_super_admin(
    repository: &dyn UserRepository,
    settings: &SuperAdmin,
) -> Result<(), anyhow::Error> {
    if repository.get_user_by_phone(&settings.phone).await?.is_some() {
        log::info!("Super admin {} already present.", settings.phone);
        return Ok(());
    }

    let user = repository
        .insert_user(&NewUser {
            display_name: settings.display_name.clone(),
            phone: settings.phone.clone(),
            password_hash: credentials::hash_password(&settings.password),
            role: Role::SuperAdmin,
            is_active: true,
        })
        .await?;

    log::info!("Seeded super admin {} ({}).", user.id, user.phone);
    Ok(())
}

impl UserRequestHandler {
    pub fn new(repositories: Repositories) -> Self {
        UserRequestHandler {
            repositories,
            sessions: Arc::new(Sessions::new()),
        }
    }

    async fn find_user(&self, user_id: i64) -> Result<User, ServiceError> {
        self.repositories
            .users
            .get_user_by_id(user_id)
            .await
            .map_err(ServiceError::database)?
            .ok_or_else(|| ServiceError::NotFound("User not found.".to_string()))
    }

    async fn ensure_phone_available(
        &self,
        phone: &str,
        owner: Option<i64>,
    ) -> Result<(), ServiceError> {
        let existing = self
            .repositories
            .users
            .get_user_by_phone(phone)
            .await
            .map_err(ServiceError::database)?;

        match existing {
            Some(user) if Some(user.id) != owner => Err(phone_taken()),
            _ => Ok(()),
        }
    }

    async fn create_account(
        &self,
        registration: Registration,
        role: Role,
        is_active: bool,
    ) -> Result<User, ServiceError> {
        validate_registration(&registration)?;
        let phone = registration.phone.trim().to_string();
        self.ensure_phone_available(&phone, None).await?;

        let user = self
            .repositories
            .users
            .insert_user(&NewUser {
                display_name: registration.display_name.trim().to_string(),
                phone,
                password_hash: credentials::hash_password(&registration.password),
                role,
                is_active,
            })
            .await
            .map_err(store_error)?;

        log::info!("Created {} {} (active: {}).", user.role, user.id, user.is_active);
        Ok(user)
    }

    async fn register(
        &self,
        registration: Registration,
        role: Role,
    ) -> Result<AuthenticatedUser, ServiceError> {
        let user = self
            .create_account(registration, role, role.starts_active())
            .await?;
        let token = self.sessions.issue(user.id);

        Ok(AuthenticatedUser { user, token })
    }

    async fn login(&self, form: Credentials) -> Result<AuthenticatedUser, ServiceError> {
        let user = self
            .repositories
            .users
            .get_user_by_phone(form.phone.trim())
            .await
            .map_err(ServiceError::database)?
            .filter(|user| credentials::verify_password(&form.password, &user.password_hash))
            .ok_or_else(|| {
                ServiceError::AuthenticationRequired("Invalid credentials.".to_string())
            })?;

        if !user.is_active {
            return Err(ServiceError::Forbidden("Account is not active.".to_string()));
        }

        let token = self.sessions.issue(user.id);
        log::debug!("User {} logged in.", user.id);

        Ok(AuthenticatedUser { user, token })
    }

    async fn authenticate(&self, token: &str) -> Result<User, ServiceError> {
        let user_id = self
            .sessions
            .resolve(token)
            .ok_or_else(ServiceError::unauthenticated)?;

        match self.repositories.users.get_user_by_id(user_id).await {
            Ok(Some(user)) => Ok(user),
            Ok(None) => {
                self.sessions.revoke(token);
                Err(ServiceError::unauthenticated())
            }
            Err(e) => Err(ServiceError::database(e)),
        }
    }

    fn logout(&self, actor: &User, token: &str) -> Result<(), ServiceError> {
        auth::authorize(actor, Operation::Logout)?;
        self.sessions.revoke(token);
        Ok(())
    }

    async fn create_user(
        &self,
        actor: &User,
        registration: Registration,
        role: Role,
    ) -> Result<User, ServiceError> {
        auth::authorize(actor, Operation::CreateUser)?;
        ensure_role_in(Some(role), &[Role::Passenger, Role::Driver, Role::Admin])?;
        auth::ensure_can_grant(actor, role)?;

        self.create_account(registration, role, role.starts_active())
            .await
    }

    async fn create_driver(
        &self,
        actor: &User,
        registration: Registration,
    ) -> Result<User, ServiceError> {
        auth::authorize(actor, Operation::CreateDriver)?;

        // Drivers created from the dashboard skip the approval step.
        self.create_account(registration, Role::Driver, true).await
    }

    async fn create_admin(
        &self,
        actor: &User,
        registration: Registration,
    ) -> Result<User, ServiceError> {
        auth::authorize(actor, Operation::CreateAdmin)?;
        auth::ensure_can_grant(actor, Role::Admin)?;

        self.create_account(registration, Role::Admin, true).await
    }

    async fn apply_changes(
        &self,
        actor: &User,
        target: &User,
        mut changes: UserChanges,
    ) -> Result<User, ServiceError> {
        auth::ensure_can_modify(actor, target, changes.role)?;

        if let Some(display_name) = &changes.display_name {
            validate_display_name(display_name)?;
            changes.display_name = Some(display_name.trim().to_string());
        }
        if let Some(phone) = &changes.phone {
            validate_phone(phone)?;
            let phone = phone.trim().to_string();
            self.ensure_phone_available(&phone, Some(target.id)).await?;
            changes.phone = Some(phone);
        }

        let user = self
            .repositories
            .users
            .update_user(target.id, &changes)
            .await
            .map_err(store_error)?
            .ok_or_else(|| ServiceError::NotFound("User not found.".to_string()))?;

        log::info!("User {} updated by {}.", user.id, actor.id);
        Ok(user)
    }

    async fn update_user(
        &self,
        actor: &User,
        user_id: i64,
        changes: UserChanges,
    ) -> Result<User, ServiceError> {
        auth::authorize(actor, Operation::UpdateUser)?;
        ensure_role_in(changes.role, &[Role::Passenger, Role::Driver, Role::Admin])?;
        let target = self.find_user(user_id).await?;

        self.apply_changes(actor, &target, changes).await
    }

    async fn update_admin(
        &self,
        actor: &User,
        user_id: i64,
        changes: UserChanges,
    ) -> Result<User, ServiceError> {
        auth::authorize(actor, Operation::UpdateAdmin)?;
        let target = self.find_user(user_id).await?;
        if !target.role.is_privileged() {
            return Err(ServiceError::StateConflict("User is not an admin.".to_string()));
        }
        ensure_role_in(changes.role, &[Role::Admin, Role::Passenger])?;

        self.apply_changes(actor, &target, changes).await
    }

    async fn find_driver(&self, user_id: i64) -> Result<User, ServiceError> {
        let user = self.find_user(user_id).await?;
        if user.role != Role::Driver {
            return Err(ServiceError::StateConflict("User is not a driver.".to_string()));
        }
        Ok(user)
    }

    async fn approve_driver(&self, actor: &User, user_id: i64) -> Result<User, ServiceError> {
        auth::authorize(actor, Operation::ApproveDriver)?;
        let driver = self.find_driver(user_id).await?;

        let changes = UserChanges {
            is_active: Some(true),
            ..Default::default()
        };
        let driver = self
            .repositories
            .users
            .update_user(driver.id, &changes)
            .await
            .map_err(ServiceError::database)?
            .ok_or_else(|| ServiceError::NotFound("User not found.".to_string()))?;

        log::info!("Driver {} approved by {}.", driver.id, actor.id);
        Ok(driver)
    }

    async fn reject_driver(&self, actor: &User, user_id: i64) -> Result<(), ServiceError> {
        auth::authorize(actor, Operation::RejectDriver)?;
        let driver = self.find_driver(user_id).await?;

        let rides = self
            .repositories
            .rides
            .count_rides(RideFilter {
                driver_id: Some(driver.id),
                ..Default::default()
            })
            .await
            .map_err(ServiceError::database)?;
        if rides > 0 {
            return Err(ServiceError::StateConflict(
                "Driver has rides and cannot be deleted.".to_string(),
            ));
        }

        let deleted = self
            .repositories
            .users
            .delete_user(driver.id)
            .await
            .map_err(ServiceError::database)?;
        if !deleted {
            return Err(ServiceError::NotFound("User not found.".to_string()));
        }
        self.sessions.revoke_user(driver.id);

        log::info!("Driver {} rejected and deleted by {}.", driver.id, actor.id);
        Ok(())
    }
}

#[async_trait]
impl RequestHandler<UserRequest> for UserRequestHandler {
    async fn handle_request(&self, request: UserRequest) {
        match request {
            UserRequest::RegisterPassenger {
                registration,
                response,
            } => {
                let result = self.register(registration, Role::Passenger).await;
                let _ = response.send(result);
            }
            UserRequest::RegisterDriver {
                registration,
                response,
            } => {
                let result = self.register(registration, Role::Driver).await;
                let _ = response.send(result);
            }
            UserRequest::Login {
                credentials,
                response,
            } => {
                let result = self.login(credentials).await;
                let _ = response.send(result);
            }
            UserRequest::Authenticate { token, response } => {
                let result = self.authenticate(&token).await;
                let _ = response.send(result);
            }
            UserRequest::Logout {
                actor,
                token,
                response,
            } => {
                let result = self.logout(&actor, &token);
                let _ = response.send(result);
            }
            UserRequest::CreateUser {
                actor,
                registration,
                role,
                response,
            } => {
                let result = self.create_user(&actor, registration, role).await;
                let _ = response.send(result);
            }
            UserRequest::CreateDriver {
                actor,
                registration,
                response,
            } => {
                let result = self.create_driver(&actor, registration).await;
                let _ = response.send(result);
            }
            UserRequest::CreateAdmin {
                actor,
                registration,
                response,
            } => {
                let result = self.create_admin(&actor, registration).await;
                let _ = response.send(result);
            }
            UserRequest::UpdateUser {
                actor,
                user_id,
                changes,
                response,
            } => {
                let result = self.update_user(&actor, user_id, changes).await;
                let _ = response.send(result);
            }
            UserRequest::UpdateAdmin {
                actor,
                user_id,
                changes,
                response,
            } => {
                let result = self.update_admin(&actor, user_id, changes).await;
                let _ = response.send(result);
            }
            UserRequest::ApproveDriver {
                actor,
                user_id,
                response,
            } => {
                let result = self.approve_driver(&actor, user_id).await;
                let _ = response.send(result);
            }
            UserRequest::RejectDriver {
                actor,
                user_id,
                response,
            } => {
                let result = self.reject_driver(&actor, user_id).await;
                let _ = response.send(result);
            }
        }
    }
}

pub struct UserService;

impl UserService {
    pub fn new() -> Self {
        UserService {}
    }
}

#[async_trait]
impl Service<UserRequest, UserRequestHandler> for UserService {}
