use super::matrix::UserPermissions;
use super::{Action, Module, Role};

/// Plain matrix lookup. The matrix is total, so every pair has an answer.
pub fn has_permission(matrix: &UserPermissions, module: Module, action: Action) -> bool {
    matrix.get(module).allows(action)
}

/// Role-aware decision
///
/// Evaluation order:
/// 1. owner role -> allow, matrix is not consulted
/// 2. matrix[module][action]
pub fn authorize(role: Role, matrix: &UserPermissions, module: Module, action: Action) -> bool {
    if role == Role::Owner {
        tracing::trace!(module = %module, action = %action, "owner bypass");
        return true;
    }

    let allowed = has_permission(matrix, module, action);
    if !allowed {
        tracing::debug!(role = %role, module = %module, action = %action, "permission denied");
    }
    allowed
}

/// Navigation check: may the role see `module` at all.
pub fn can_access(role: Role, matrix: &UserPermissions, module: Module) -> bool {
    authorize(role, matrix, module, Action::View)
}
