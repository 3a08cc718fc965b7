//! Authorization module - permission engine and enforcement
//!
//! This module implements the per-user module/action permission matrix:
//! - Role-derived default matrices (the policy catalog)
//! - Lenient parsing of stored matrices with default completion
//! - Owner bypass for grant checks (never for tenant isolation)
//! - Server-side enforcement and a UI-side presentation gate
//! - Backfill of legacy stored permissions

mod backfill;
mod catalog;
mod enforcement;
mod evaluator;
mod gate;
mod matrix;
mod principal;
mod store;

pub use backfill::{Backfill, BackfillOutcome, BackfillReport, RecordOutcome};
pub use catalog::defaults_for_role;
pub use enforcement::{Decision, Enforcer};
pub use evaluator::{authorize, can_access, has_permission};
pub use gate::{gate_state, GateState, PresentationGate};
pub use matrix::{is_current_format, ModulePermissions, UserPermissions};
pub use principal::{Principal, SessionActor};
pub use store::{MemoryUserStore, UserRecord, UserStore};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Coarse role of a user, ordered by privilege (`User < Manager < Admin < Owner`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Manager,
    Admin,
    Owner,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Owner, Role::Admin, Role::Manager, Role::User];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::User => "user",
        }
    }

    pub fn is_admin_or_owner(&self) -> bool {
        matches!(self, Role::Owner | Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(Role::Owner),
            "admin" => Ok(Role::Admin),
            "manager" => Ok(Role::Manager),
            "user" => Ok(Role::User),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// Functional area of the CRM with its own grant set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum Module {
    Leads,
    Tasks,
    Projects,
    ServiceOrders,
    Agenda,
    Kanban,
    Reports,
    Goals,
    Integrations,
    Settings,
    Users,
}

impl Module {
    pub const COUNT: usize = 11;

    /// Canonical order; serialized documents list modules in this order.
    pub const ALL: [Module; Module::COUNT] = [
        Module::Leads,
        Module::Tasks,
        Module::Projects,
        Module::ServiceOrders,
        Module::Agenda,
        Module::Kanban,
        Module::Reports,
        Module::Goals,
        Module::Integrations,
        Module::Settings,
        Module::Users,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Module::Leads => "leads",
            Module::Tasks => "tasks",
            Module::Projects => "projects",
            Module::ServiceOrders => "service-orders",
            Module::Agenda => "agenda",
            Module::Kanban => "kanban",
            Module::Reports => "reports",
            Module::Goals => "goals",
            Module::Integrations => "integrations",
            Module::Settings => "settings",
            Module::Users => "users",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown module: {0}")]
pub struct UnknownModule(pub String);

impl FromStr for Module {
    type Err = UnknownModule;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Module::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| UnknownModule(s.to_string()))
    }
}

/// Operation within a module. Each action is granted independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    View,
    Create,
    Edit,
    Delete,
}

impl Action {
    pub const ALL: [Action; 4] = [Action::View, Action::Create, Action::Edit, Action::Delete];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::View => "view",
            Action::Create => "create",
            Action::Edit => "edit",
            Action::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_order_follows_privilege() {
        assert!(Role::Owner > Role::Admin);
        assert!(Role::Admin > Role::Manager);
        assert!(Role::Manager > Role::User);
    }

    #[test]
    fn module_names_round_trip() {
        for module in Module::ALL {
            assert_eq!(module.as_str().parse::<Module>().unwrap(), module);
            let json = serde_json::to_string(&module).unwrap();
            assert_eq!(json, format!("\"{}\"", module.as_str()));
        }
        assert!("service_orders".parse::<Module>().is_err());
    }

    #[test]
    fn module_index_matches_canonical_order() {
        for (i, module) in Module::ALL.into_iter().enumerate() {
            assert_eq!(module.index(), i);
        }
    }

    #[test]
    fn unknown_role_is_rejected() {
        assert_eq!("manager".parse::<Role>().unwrap(), Role::Manager);
        assert_eq!("root".parse::<Role>(), Err(UnknownRole("root".to_string())));
    }
}
