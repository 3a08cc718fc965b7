use uuid::Uuid;

use super::evaluator;
use super::matrix::UserPermissions;
use super::store::UserRecord;
use super::{Action, Module, Role};

/// Identity claimed by the session. A hint only; decisions re-verify it
/// against the user store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionActor {
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub role: Role,
}

impl SessionActor {
    pub fn new(user_id: Uuid, organization_id: Uuid, role: Role) -> Self {
        Self {
            user_id,
            organization_id,
            role,
        }
    }
}

/// Principal represents the verified user with their resolved permission matrix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub role: Role,
    pub permissions: UserPermissions,
}

impl Principal {
    pub fn new(user_id: Uuid, organization_id: Uuid, role: Role) -> Self {
        Self {
            user_id,
            organization_id,
            role,
            permissions: super::defaults_for_role(role),
        }
    }

    pub fn with_permissions(mut self, permissions: UserPermissions) -> Self {
        self.permissions = permissions;
        self
    }

    /// Builds the principal from the system of record, parsing the stored matrix.
    pub fn from_record(record: &UserRecord) -> Self {
        Self {
            user_id: record.user_id,
            organization_id: record.organization_id,
            role: record.role,
            permissions: UserPermissions::parse(record.permissions.as_deref(), record.role),
        }
    }

    pub fn is_owner(&self) -> bool {
        self.role == Role::Owner
    }

    pub fn authorize(&self, module: Module, action: Action) -> bool {
        evaluator::authorize(self.role, &self.permissions, module, action)
    }

    pub fn can_access(&self, module: Module) -> bool {
        evaluator::can_access(self.role, &self.permissions, module)
    }

    /// First grant in `matrix` this principal does not hold itself, if any.
    /// Nobody hands out a permission they could not use.
    pub fn ungranted_in(&self, matrix: &UserPermissions) -> Option<(Module, Action)> {
        matrix.iter().find_map(|(module, grant)| {
            Action::ALL
                .into_iter()
                .find(|&action| grant.allows(action) && !self.authorize(module, action))
                .map(|action| (module, action))
        })
    }
}
