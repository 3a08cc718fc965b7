use std::collections::BTreeMap;

use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::authz::{Module, Principal, Role, UserPermissions};

/// What a client needs to gate its UI for the current user.
#[derive(Debug, Serialize, ToSchema)]
pub struct AccessProfile {
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub role: Role,
    #[schema(value_type = Object)]
    pub permissions: UserPermissions,
    /// Module name -> may open the module at all.
    #[schema(value_type = Object)]
    pub navigation: BTreeMap<Module, bool>,
}

impl From<Principal> for AccessProfile {
    fn from(principal: Principal) -> Self {
        let navigation = Module::ALL
            .into_iter()
            .map(|module| (module, principal.can_access(module)))
            .collect();

        Self {
            user_id: principal.user_id,
            organization_id: principal.organization_id,
            role: principal.role,
            permissions: principal.permissions,
            navigation,
        }
    }
}
