use std::sync::Arc;

use uuid::Uuid;

use super::principal::{Principal, SessionActor};
use super::store::UserStore;
use super::{Action, Module};
use crate::errors::{AppError, AppResult};

/// Outcome of a server-side authorization check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Unauthenticated,
    ForbiddenTenant,
    ForbiddenGrant,
    /// Carries the verified organization for data-layer scoping.
    Allowed(Uuid),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed(_))
    }
}

#[derive(Debug, Clone, Copy)]
enum Requirement {
    Authenticated,
    AdminOrOwner,
    Grant(Module, Action),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Denial {
    Unauthenticated,
    Tenant,
    Grant,
}

impl Denial {
    fn decision(self) -> Decision {
        match self {
            Denial::Unauthenticated => Decision::Unauthenticated,
            Denial::Tenant => Decision::ForbiddenTenant,
            Denial::Grant => Decision::ForbiddenGrant,
        }
    }

    fn error(self) -> AppError {
        match self {
            Denial::Unauthenticated => AppError::unauthorized("authentication required"),
            Denial::Tenant => AppError::TenantViolation,
            Denial::Grant => AppError::denied(),
        }
    }
}

/// Request-boundary enforcement: authentication, then tenant isolation, then
/// the module/action decision.
///
/// Identity is re-read from the store on every call; nothing is cached
/// between requests.
#[derive(Clone)]
pub struct Enforcer {
    store: Arc<dyn UserStore>,
}

impl Enforcer {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }

    async fn evaluate(
        &self,
        actor: Option<&SessionActor>,
        requirement: Requirement,
    ) -> AppResult<Result<Principal, Denial>> {
        let Some(actor) = actor else {
            return Ok(Err(Denial::Unauthenticated));
        };

        let Some(record) = self.store.find_user(actor.user_id).await? else {
            tracing::debug!(user_id = %actor.user_id, "session names a user that no longer exists");
            return Ok(Err(Denial::Unauthenticated));
        };

        if record.organization_id != actor.organization_id {
            tracing::warn!(
                target: "security",
                user_id = %actor.user_id,
                claimed_org = %actor.organization_id,
                stored_org = %record.organization_id,
                "tenant isolation violation"
            );
            return Ok(Err(Denial::Tenant));
        }

        if record.role != actor.role {
            tracing::debug!(
                user_id = %actor.user_id,
                claimed_role = %actor.role,
                stored_role = %record.role,
                "session role is stale, using stored role"
            );
        }

        let principal = Principal::from_record(&record);
        let allowed = match requirement {
            Requirement::Authenticated => true,
            Requirement::AdminOrOwner => principal.role.is_admin_or_owner(),
            Requirement::Grant(module, action) => principal.authorize(module, action),
        };

        Ok(if allowed { Ok(principal) } else { Err(Denial::Grant) })
    }

    async fn decide(&self, actor: Option<&SessionActor>, requirement: Requirement) -> AppResult<Decision> {
        Ok(match self.evaluate(actor, requirement).await? {
            Ok(principal) => Decision::Allowed(principal.organization_id),
            Err(denial) => denial.decision(),
        })
    }

    async fn enforce(&self, actor: &SessionActor, requirement: Requirement) -> AppResult<Principal> {
        self.evaluate(Some(actor), requirement)
            .await?
            .map_err(Denial::error)
    }

    pub async fn check(&self, actor: Option<&SessionActor>, module: Module, action: Action) -> AppResult<Decision> {
        self.decide(actor, Requirement::Grant(module, action)).await
    }

    pub async fn check_authenticated(&self, actor: Option<&SessionActor>) -> AppResult<Decision> {
        self.decide(actor, Requirement::Authenticated).await
    }

    pub async fn check_admin_or_owner(&self, actor: Option<&SessionActor>) -> AppResult<Decision> {
        self.decide(actor, Requirement::AdminOrOwner).await
    }

    /// Returns the verified principal when `actor` may perform `action` on `module`.
    pub async fn require(&self, actor: &SessionActor, module: Module, action: Action) -> AppResult<Principal> {
        self.enforce(actor, Requirement::Grant(module, action)).await
    }

    pub async fn require_authenticated(&self, actor: &SessionActor) -> AppResult<Principal> {
        self.enforce(actor, Requirement::Authenticated).await
    }

    pub async fn require_admin_or_owner(&self, actor: &SessionActor) -> AppResult<Principal> {
        self.enforce(actor, Requirement::AdminOrOwner).await
    }
}
