//! Who may do what.
//!
//! Every service call starts with [`authorize`]. Checks that depend on the
//! resource being touched (ride ownership, role elevation) have their own
//! predicates below. None of these functions have side effects.

use crate::models::rides::Ride;
use crate::models::users::{Role, User};
use crate::services::ServiceError;

pub mod credentials;
pub mod sessions;

const UNAUTHORIZED: &str = "This action is unauthorized.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    ViewProfile,
    Logout,
    ListMyRides,

    CreateRide,
    ListAvailableRides,
    AcceptRide,
    ArrivePickup,
    StartTrip,
    CompleteRide,

    GoOnline,
    GoOffline,
    ReportLocation,

    ViewStats,
    ListUsers,
    CreateUser,
    UpdateUser,
    ListDrivers,
    CreateDriver,
    ApproveDriver,
    RejectDriver,
    ListAllRides,
    AssignDriver,
    CancelRide,
    ViewDriverLogs,
    ViewDriverMap,

    ListAdmins,
    CreateAdmin,
    UpdateAdmin,
}

impl Operation {
    pub fn allowed_roles(&self) -> &'static [Role] {
        match self {
            Operation::ViewProfile | Operation::Logout | Operation::ListMyRides => Role::ALL,

            Operation::CreateRide => &[Role::Passenger],

            Operation::ListAvailableRides
            | Operation::AcceptRide
            | Operation::ArrivePickup
            | Operation::StartTrip
            | Operation::CompleteRide
            | Operation::GoOnline
            | Operation::GoOffline
            | Operation::ReportLocation => &[Role::Driver],

            Operation::ViewStats
            | Operation::ListUsers
            | Operation::CreateUser
            | Operation::UpdateUser
            | Operation::ListDrivers
            | Operation::CreateDriver
            | Operation::ApproveDriver
            | Operation::RejectDriver
            | Operation::ListAllRides
            | Operation::AssignDriver
            | Operation::CancelRide
            | Operation::ViewDriverLogs
            | Operation::ViewDriverMap => Role::STAFF,

            Operation::ListAdmins | Operation::CreateAdmin | Operation::UpdateAdmin => {
                &[Role::SuperAdmin]
            }
        }
    }

    fn denial_message(&self) -> &'static str {
        match self {
            Operation::CreateRide => "Only passengers can create rides.",
            Operation::ListAvailableRides => "Only drivers can list available rides.",
            Operation::AcceptRide => "Only drivers can accept rides.",
            Operation::GoOnline => "Only drivers can go online.",
            Operation::GoOffline => "Only drivers can go offline.",
            Operation::ReportLocation => "Only drivers can send location.",
            _ => UNAUTHORIZED,
        }
    }
}

/// The actor must be active and hold one of the operation's roles.
pub fn authorize(actor: &User, operation: Operation) -> Result<(), ServiceError> {
    if !actor.is_active {
        return Err(ServiceError::Forbidden(UNAUTHORIZED.to_string()));
    }

    if !operation.allowed_roles().contains(&actor.role) {
        return Err(ServiceError::Forbidden(operation.denial_message().to_string()));
    }

    Ok(())
}

pub fn ensure_assigned_driver(actor: &User, ride: &Ride) -> Result<(), ServiceError> {
    if ride.driver_id != Some(actor.id) {
        return Err(ServiceError::Forbidden(
            "You are not assigned to this ride.".to_string(),
        ));
    }

    Ok(())
}

/// Only a super admin may create a user with, or move a user into or out
/// of, a privileged role.
pub fn ensure_can_grant(actor: &User, role: Role) -> Result<(), ServiceError> {
    if role.is_privileged() && actor.role != Role::SuperAdmin {
        return Err(ServiceError::Forbidden(
            "Only Super Admin can assign admin roles.".to_string(),
        ));
    }

    Ok(())
}

/// A super admin record can only be modified by its owner, and its role can
/// not be changed at all.
pub fn ensure_can_modify(
    actor: &User,
    target: &User,
    new_role: Option<Role>,
) -> Result<(), ServiceError> {
    if target.role == Role::SuperAdmin {
        if actor.id != target.id {
            return Err(ServiceError::Forbidden(
                "Cannot modify another Super Admin.".to_string(),
            ));
        }
        if new_role.is_some_and(|role| role != Role::SuperAdmin) {
            return Err(ServiceError::Forbidden(
                "Super Admins cannot be demoted.".to_string(),
            ));
        }
    }

    if let Some(role) = new_role {
        if role != target.role {
            ensure_can_grant(actor, role)?;
            ensure_can_grant(actor, target.role)?;
        }
    }

    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Utc;

    pub(crate) fn user(id: i64, role: Role) -> User {
        User {
            id,
            phone: format!("0900{}", id),
            display_name: format!("{} {}", role, id),
            password_hash: String::new(),
            role,
            is_active: true,
            is_online: false,
            last_latitude: None,
            last_longitude: None,
            last_location_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn is_forbidden(result: Result<(), ServiceError>) -> bool {
        matches!(result, Err(ServiceError::Forbidden(_)))
    }

    #[test]
    fn test_inactive_actor_is_denied_everything() {
        let mut driver = user(1, Role::Driver);
        driver.is_active = false;

        assert!(is_forbidden(authorize(&driver, Operation::AcceptRide)));
        assert!(is_forbidden(authorize(&driver, Operation::ViewProfile)));
    }

    #[test]
    fn test_role_gates() {
        let passenger = user(1, Role::Passenger);
        let driver = user(2, Role::Driver);
        let admin = user(3, Role::Admin);
        let root = user(4, Role::SuperAdmin);

        assert!(authorize(&passenger, Operation::CreateRide).is_ok());
        assert!(is_forbidden(authorize(&driver, Operation::CreateRide)));
        assert!(authorize(&driver, Operation::AcceptRide).is_ok());
        assert!(is_forbidden(authorize(&passenger, Operation::AcceptRide)));
        assert!(is_forbidden(authorize(&admin, Operation::GoOnline)));
        assert!(authorize(&admin, Operation::CancelRide).is_ok());
        assert!(authorize(&root, Operation::CancelRide).is_ok());
        assert!(is_forbidden(authorize(&admin, Operation::CreateAdmin)));
        assert!(authorize(&root, Operation::CreateAdmin).is_ok());
        assert!(authorize(&passenger, Operation::ListMyRides).is_ok());
    }

    #[test]
    fn test_denial_message_names_the_role() {
        let admin = user(1, Role::Admin);
        match authorize(&admin, Operation::CreateRide) {
            Err(ServiceError::Forbidden(message)) => {
                assert_eq!(message, "Only passengers can create rides.")
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_only_assigned_driver_owns_the_ride() {
        let mut ride = crate::services::rides::tests::ride(1, 10);
        ride.driver_id = Some(2);

        assert!(ensure_assigned_driver(&user(2, Role::Driver), &ride).is_ok());
        assert!(is_forbidden(ensure_assigned_driver(&user(3, Role::Driver), &ride)));
    }

    #[test]
    fn test_admin_cannot_grant_privileged_roles() {
        let admin = user(1, Role::Admin);
        let root = user(2, Role::SuperAdmin);

        assert!(is_forbidden(ensure_can_grant(&admin, Role::Admin)));
        assert!(is_forbidden(ensure_can_grant(&admin, Role::SuperAdmin)));
        assert!(ensure_can_grant(&admin, Role::Driver).is_ok());
        assert!(ensure_can_grant(&root, Role::Admin).is_ok());
        assert!(ensure_can_grant(&root, Role::SuperAdmin).is_ok());
    }

    #[test]
    fn test_super_admin_records_are_protected() {
        let root = user(1, Role::SuperAdmin);
        let other_root = user(2, Role::SuperAdmin);
        let admin = user(3, Role::Admin);

        assert!(is_forbidden(ensure_can_modify(&root, &other_root, None)));
        assert!(is_forbidden(ensure_can_modify(&admin, &root, None)));
        assert!(ensure_can_modify(&root, &root, None).is_ok());
        assert!(is_forbidden(ensure_can_modify(&root, &root, Some(Role::Passenger))));
    }

    #[test]
    fn test_admin_cannot_demote_another_admin() {
        let admin = user(1, Role::Admin);
        let other_admin = user(2, Role::Admin);
        let root = user(3, Role::SuperAdmin);

        assert!(is_forbidden(ensure_can_modify(&admin, &other_admin, Some(Role::Passenger))));
        assert!(ensure_can_modify(&admin, &other_admin, None).is_ok());
        assert!(ensure_can_modify(&root, &other_admin, Some(Role::Passenger)).is_ok());
    }

    #[test]
    fn test_admin_cannot_promote_passenger() {
        let admin = user(1, Role::Admin);
        let passenger = user(2, Role::Passenger);

        assert!(is_forbidden(ensure_can_modify(&admin, &passenger, Some(Role::Admin))));
        assert!(ensure_can_modify(&admin, &passenger, Some(Role::Driver)).is_ok());
    }
}
