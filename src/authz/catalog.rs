//! Factory-default permission matrices per role.

use super::matrix::{ModulePermissions, UserPermissions};
use super::{Module, Role};

const VIEW_ONLY: ModulePermissions = ModulePermissions::new(true, false, false, false);
const VIEW_CREATE: ModulePermissions = ModulePermissions::new(true, true, false, false);
const NO_DELETE: ModulePermissions = ModulePermissions::new(true, true, true, false);

/// Default grant of `role` on `module`.
fn default_grant(role: Role, module: Module) -> ModulePermissions {
    use Module::*;

    match role {
        Role::Owner | Role::Admin => ModulePermissions::ALL,
        Role::Manager => match module {
            Leads | Tasks | Projects | ServiceOrders | Agenda | Kanban => NO_DELETE,
            Reports | Goals => VIEW_ONLY,
            Integrations | Settings | Users => ModulePermissions::NONE,
        },
        Role::User => match module {
            Leads | Tasks | Agenda => VIEW_CREATE,
            _ => ModulePermissions::NONE,
        },
    }
}

/// Complete default matrix for `role`.
pub fn defaults_for_role(role: Role) -> UserPermissions {
    Module::ALL
        .into_iter()
        .fold(UserPermissions::none(), |matrix, module| {
            matrix.with(module, default_grant(role, module))
        })
}
