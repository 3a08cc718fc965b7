use axum::extract::State;
use axum::Json;

use crate::app::AppState;
use crate::authz::SessionActor;
use crate::errors::AppResult;
use crate::models::access::AccessProfile;

/// Resolved permissions of the caller, for client-side gating. The server
/// still enforces every operation independently.
#[utoipa::path(
    get,
    path = "/auth/me/permissions",
    tag = "Auth",
    responses(
        (status = 200, description = "Caller's resolved access profile", body = AccessProfile),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Session does not match stored organization")
    ),
    security(("bearerAuth" = []))
)]
pub async fn my_permissions(State(state): State<AppState>, actor: SessionActor) -> AppResult<Json<AccessProfile>> {
    let principal = state.enforcer.require_authenticated(&actor).await?;
    Ok(Json(principal.into()))
}
